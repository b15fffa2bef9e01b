//! Magnet links for sites that only publish an info hash.

const PUBLIC_TRACKERS: &[&str] = &[
    "http://tracker.opentrackr.org:1337/announce",
    "udp://tracker.auctor.tv:6969/announce",
    "udp://opentracker.i2p.rocks:6969/announce",
    "https://opentracker.i2p.rocks:443/announce",
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.openbittorrent.com:6969/announce",
    "http://tracker.openbittorrent.com:80/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://tracker.moeking.me:6969/announce",
    "udp://explodie.org:6969/announce",
    "udp://exodus.desync.com:6969/announce",
    "udp://tracker.tiny-vps.com:6969/announce",
    "udp://tracker.theoks.net:6969/announce",
    "udp://open.tracker.ink:6969/announce",
];

fn is_info_hash(hash: &str) -> bool {
    (hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()))
        || (hash.len() == 32 && hash.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// A v1 magnet URI announcing to a fixed set of public trackers.
/// Returns `None` when `info_hash` is not a hex or base32 BitTorrent hash.
pub fn build_public_magnet(info_hash: &str, title: &str) -> Option<String> {
    let hash = info_hash.trim();
    if !is_info_hash(hash) {
        return None;
    }

    let mut uri = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        hash.to_uppercase(),
        urlencoding::encode(title)
    );
    for tracker in PUBLIC_TRACKERS {
        uri.push_str("&tr=");
        uri.push_str(&urlencoding::encode(tracker));
    }

    Some(uri)
}

/// The info hash in a magnet URI's `xt` parameter
pub fn info_hash_from_magnet(magnet: &str) -> Option<String> {
    let query = magnet.strip_prefix("magnet:?")?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "xt")
        .and_then(|(_, value)| value.rsplit(':').next())
        .filter(|hash| is_info_hash(hash))
        .map(str::to_uppercase)
}
