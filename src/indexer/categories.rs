//! Standard category taxonomy and per-site category mapping
//!
//! Standard categories follow the Newznab numbering scheme.
//! Main categories are in thousands (1000, 2000, etc.) and subcategories
//! add tens (2010, 2020, etc.). Sites use their own tokens, which a
//! [`CategoryMap`] translates in both directions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One association between a site-native category token and a standard category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// The site's own category token (numeric ids are kept as strings)
    pub native_id: String,
    /// The standard category id
    pub standard: i32,
    /// Human-readable label as the site shows it
    pub label: Option<String>,
}

/// A standard category definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCategory {
    pub id: i32,
    pub name: &'static str,
    pub parent_id: Option<i32>,
}

impl StandardCategory {
    pub const fn new(id: i32, name: &'static str, parent_id: Option<i32>) -> Self {
        Self {
            id,
            name,
            parent_id,
        }
    }

    pub fn is_parent(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Standard categories (Newznab numbering)
pub static STANDARD_CATEGORIES: &[StandardCategory] = &[
    // Console (1000)
    StandardCategory::new(1000, "Console", None),
    StandardCategory::new(1010, "Console/NDS", Some(1000)),
    StandardCategory::new(1020, "Console/PSP", Some(1000)),
    StandardCategory::new(1030, "Console/Wii", Some(1000)),
    StandardCategory::new(1040, "Console/XBox", Some(1000)),
    StandardCategory::new(1050, "Console/XBox 360", Some(1000)),
    StandardCategory::new(1060, "Console/Wiiware", Some(1000)),
    StandardCategory::new(1070, "Console/XBox 360 DLC", Some(1000)),
    StandardCategory::new(1080, "Console/PS3", Some(1000)),
    StandardCategory::new(1090, "Console/Other", Some(1000)),
    StandardCategory::new(1110, "Console/3DS", Some(1000)),
    StandardCategory::new(1120, "Console/PS Vita", Some(1000)),
    StandardCategory::new(1130, "Console/WiiU", Some(1000)),
    StandardCategory::new(1140, "Console/XBox One", Some(1000)),
    StandardCategory::new(1180, "Console/PS4", Some(1000)),
    // Movies (2000)
    StandardCategory::new(2000, "Movies", None),
    StandardCategory::new(2010, "Movies/Foreign", Some(2000)),
    StandardCategory::new(2020, "Movies/Other", Some(2000)),
    StandardCategory::new(2030, "Movies/SD", Some(2000)),
    StandardCategory::new(2040, "Movies/HD", Some(2000)),
    StandardCategory::new(2045, "Movies/UHD", Some(2000)),
    StandardCategory::new(2050, "Movies/BluRay", Some(2000)),
    StandardCategory::new(2060, "Movies/3D", Some(2000)),
    StandardCategory::new(2070, "Movies/DVD", Some(2000)),
    StandardCategory::new(2080, "Movies/WEB-DL", Some(2000)),
    StandardCategory::new(2090, "Movies/x265", Some(2000)),
    // Audio (3000)
    StandardCategory::new(3000, "Audio", None),
    StandardCategory::new(3010, "Audio/MP3", Some(3000)),
    StandardCategory::new(3020, "Audio/Video", Some(3000)),
    StandardCategory::new(3030, "Audio/Audiobook", Some(3000)),
    StandardCategory::new(3040, "Audio/Lossless", Some(3000)),
    StandardCategory::new(3050, "Audio/Other", Some(3000)),
    StandardCategory::new(3060, "Audio/Foreign", Some(3000)),
    // PC (4000)
    StandardCategory::new(4000, "PC", None),
    StandardCategory::new(4010, "PC/0day", Some(4000)),
    StandardCategory::new(4020, "PC/ISO", Some(4000)),
    StandardCategory::new(4030, "PC/Mac", Some(4000)),
    StandardCategory::new(4040, "PC/Mobile-Other", Some(4000)),
    StandardCategory::new(4050, "PC/Games", Some(4000)),
    StandardCategory::new(4060, "PC/Mobile-iOS", Some(4000)),
    StandardCategory::new(4070, "PC/Mobile-Android", Some(4000)),
    // TV (5000)
    StandardCategory::new(5000, "TV", None),
    StandardCategory::new(5010, "TV/WEB-DL", Some(5000)),
    StandardCategory::new(5020, "TV/Foreign", Some(5000)),
    StandardCategory::new(5030, "TV/SD", Some(5000)),
    StandardCategory::new(5040, "TV/HD", Some(5000)),
    StandardCategory::new(5045, "TV/UHD", Some(5000)),
    StandardCategory::new(5050, "TV/Other", Some(5000)),
    StandardCategory::new(5060, "TV/Sport", Some(5000)),
    StandardCategory::new(5070, "TV/Anime", Some(5000)),
    StandardCategory::new(5080, "TV/Documentary", Some(5000)),
    StandardCategory::new(5090, "TV/x265", Some(5000)),
    // XXX (6000)
    StandardCategory::new(6000, "XXX", None),
    StandardCategory::new(6010, "XXX/DVD", Some(6000)),
    StandardCategory::new(6020, "XXX/WMV", Some(6000)),
    StandardCategory::new(6030, "XXX/XviD", Some(6000)),
    StandardCategory::new(6040, "XXX/x264", Some(6000)),
    StandardCategory::new(6045, "XXX/UHD", Some(6000)),
    StandardCategory::new(6050, "XXX/Pack", Some(6000)),
    StandardCategory::new(6060, "XXX/ImageSet", Some(6000)),
    StandardCategory::new(6070, "XXX/Other", Some(6000)),
    StandardCategory::new(6080, "XXX/SD", Some(6000)),
    StandardCategory::new(6090, "XXX/WEB-DL", Some(6000)),
    // Books (7000)
    StandardCategory::new(7000, "Books", None),
    StandardCategory::new(7010, "Books/Mags", Some(7000)),
    StandardCategory::new(7020, "Books/EBook", Some(7000)),
    StandardCategory::new(7030, "Books/Comics", Some(7000)),
    StandardCategory::new(7040, "Books/Technical", Some(7000)),
    StandardCategory::new(7050, "Books/Other", Some(7000)),
    StandardCategory::new(7060, "Books/Foreign", Some(7000)),
    // Other (8000)
    StandardCategory::new(8000, "Other", None),
    StandardCategory::new(8010, "Other/Misc", Some(8000)),
    StandardCategory::new(8020, "Other/Hashed", Some(8000)),
];

/// Category ids used by the built-in adapters
pub mod cats {
    pub const CONSOLE: i32 = 1000;
    pub const MOVIES: i32 = 2000;
    pub const AUDIO: i32 = 3000;
    pub const PC: i32 = 4000;
    pub const TV: i32 = 5000;
    pub const XXX: i32 = 6000;
    pub const BOOKS: i32 = 7000;
    pub const OTHER: i32 = 8000;

    pub const MOVIES_FOREIGN: i32 = 2010;
    pub const MOVIES_OTHER: i32 = 2020;
    pub const MOVIES_SD: i32 = 2030;
    pub const MOVIES_HD: i32 = 2040;
    pub const MOVIES_UHD: i32 = 2045;
    pub const MOVIES_BLURAY: i32 = 2050;
    pub const MOVIES_3D: i32 = 2060;
    pub const MOVIES_DVD: i32 = 2070;
    pub const MOVIES_WEBDL: i32 = 2080;

    pub const TV_WEBDL: i32 = 5010;
    pub const TV_FOREIGN: i32 = 5020;
    pub const TV_SD: i32 = 5030;
    pub const TV_HD: i32 = 5040;
    pub const TV_UHD: i32 = 5045;
    pub const TV_OTHER: i32 = 5050;
    pub const TV_SPORT: i32 = 5060;
    pub const TV_ANIME: i32 = 5070;
    pub const TV_DOCUMENTARY: i32 = 5080;

    pub const AUDIO_MP3: i32 = 3010;
    pub const AUDIO_VIDEO: i32 = 3020;
    pub const AUDIO_AUDIOBOOK: i32 = 3030;
    pub const AUDIO_LOSSLESS: i32 = 3040;
    pub const AUDIO_OTHER: i32 = 3050;

    pub const BOOKS_MAGS: i32 = 7010;
    pub const BOOKS_EBOOK: i32 = 7020;
    pub const BOOKS_COMICS: i32 = 7030;
    pub const BOOKS_TECHNICAL: i32 = 7040;
    pub const BOOKS_OTHER: i32 = 7050;

    pub const PC_0DAY: i32 = 4010;
    pub const PC_ISO: i32 = 4020;
    pub const PC_MAC: i32 = 4030;
    pub const PC_GAMES: i32 = 4050;
    pub const PC_MOBILE_OTHER: i32 = 4040;

    pub const CONSOLE_WII: i32 = 1030;
    pub const CONSOLE_XBOX: i32 = 1040;
    pub const CONSOLE_OTHER: i32 = 1090;
    pub const CONSOLE_PS4: i32 = 1180;

    pub const XXX_PACK: i32 = 6050;
    pub const XXX_IMAGESET: i32 = 6060;
    pub const XXX_OTHER: i32 = 6070;
    pub const OTHER_MISC: i32 = 8010;
}

/// Look up a standard category by id
pub fn get_category(id: i32) -> Option<&'static StandardCategory> {
    STANDARD_CATEGORIES.iter().find(|c| c.id == id)
}

/// All direct children of a parent category
pub fn get_subcategories(parent_id: i32) -> Vec<&'static StandardCategory> {
    STANDARD_CATEGORIES
        .iter()
        .filter(|c| c.parent_id == Some(parent_id))
        .collect()
}

pub fn get_parent_category(id: i32) -> Option<&'static StandardCategory> {
    let cat = get_category(id)?;
    cat.parent_id.and_then(get_category)
}

/// Expand parents to include their subcategories.
/// E.g., [2000] -> [2000, 2010, 2020, 2030, 2040, 2045, 2050, 2060, 2070, 2080, 2090]
pub fn expand_categories(categories: &[i32]) -> Vec<i32> {
    let mut expanded: Vec<i32> = categories
        .iter()
        .flat_map(|&cat| {
            std::iter::once(cat).chain(get_subcategories(cat).into_iter().map(|c| c.id))
        })
        .collect();

    expanded.sort_unstable();
    expanded.dedup();
    expanded
}

/// Many-to-many relation between site-native category tokens and standard categories.
///
/// Built once while an adapter's capabilities are assembled and read-only afterwards.
/// Unknown native tokens map to an empty set; an empty standard request maps to every
/// native token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    mappings: Vec<CategoryMapping>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one native/standard association. Repeated calls with the same
    /// native token accumulate.
    pub fn add_mapping(&mut self, native_id: impl Into<String>, standard: i32, label: Option<&str>) {
        let mapping = CategoryMapping {
            native_id: native_id.into(),
            standard,
            label: label.map(str::to_string),
        };

        if !self.mappings.contains(&mapping) {
            self.mappings.push(mapping);
        }
    }

    /// Builder form of [`add_mapping`](Self::add_mapping)
    pub fn with(mut self, native_id: impl Into<String>, standard: i32, label: &str) -> Self {
        self.add_mapping(native_id, standard, Some(label));
        self
    }

    pub fn mappings(&self) -> &[CategoryMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Distinct native tokens in registration order
    pub fn native_tokens(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.mappings
            .iter()
            .filter(|m| seen.insert(m.native_id.to_lowercase()))
            .map(|m| m.native_id.clone())
            .collect()
    }

    /// Every standard category the site serves, parents of mapped subcategories included
    pub fn standard_categories(&self) -> BTreeSet<i32> {
        let mut cats = BTreeSet::new();
        for mapping in &self.mappings {
            cats.insert(mapping.standard);
            if let Some(parent) = get_parent_category(mapping.standard) {
                cats.insert(parent.id);
            }
        }
        cats
    }

    /// Standard categories for a native token. Matching is case-insensitive and an
    /// unknown token yields an empty set.
    pub fn map_native_to_standard(&self, native_id: &str) -> BTreeSet<i32> {
        self.mappings
            .iter()
            .filter(|m| m.native_id.eq_ignore_ascii_case(native_id))
            .map(|m| m.standard)
            .collect()
    }

    /// Like [`map_native_to_standard`](Self::map_native_to_standard) but keyed on the
    /// site's label, for sites that only print category names in their results
    pub fn map_label_to_standard(&self, label: &str) -> BTreeSet<i32> {
        self.mappings
            .iter()
            .filter(|m| {
                m.label
                    .as_deref()
                    .is_some_and(|l| l.eq_ignore_ascii_case(label.trim()))
            })
            .map(|m| m.standard)
            .collect()
    }

    /// Standard categories for a native token, falling back to Other for unknown tokens
    pub fn map_native_or_other(&self, native_id: &str) -> Vec<i32> {
        let mapped = self.map_native_to_standard(native_id);
        if mapped.is_empty() {
            vec![cats::OTHER]
        } else {
            mapped.into_iter().collect()
        }
    }

    /// Native tokens whose mapping intersects `requested`, distinct and in registration
    /// order. An empty request returns every native token.
    pub fn map_standard_to_native(&self, requested: &[i32]) -> Vec<String> {
        if requested.is_empty() {
            return self.native_tokens();
        }

        let mut seen = BTreeSet::new();
        self.mappings
            .iter()
            .filter(|m| requested.contains(&m.standard))
            .filter(|m| seen.insert(m.native_id.to_lowercase()))
            .map(|m| m.native_id.clone())
            .collect()
    }

    /// Native tokens a request should filter on, after expanding requested parents.
    ///
    /// Returns `None` when no filter should be sent: nothing was requested, or the
    /// request covers the whole native category space.
    pub fn native_filter(&self, requested: &[i32]) -> Option<Vec<String>> {
        if requested.is_empty() {
            return None;
        }

        let mut wanted = expand_categories(requested);
        // a child with no token of its own is served by its parent's tokens
        for &cat in requested {
            if self.map_standard_to_native(&[cat]).is_empty() {
                if let Some(parent) = get_parent_category(cat) {
                    wanted.extend(expand_categories(&[parent.id]));
                }
            }
        }

        let natives = self.map_standard_to_native(&wanted);
        if !natives.is_empty() && natives.len() == self.native_tokens().len() {
            return None;
        }

        Some(natives)
    }

    /// The subset of `requested` this site can serve. A parent request is served by
    /// any mapped child and a child request by a mapped parent.
    pub fn supported_categories(&self, requested: &[i32]) -> Vec<i32> {
        let mapped = self.standard_categories();
        requested
            .iter()
            .copied()
            .filter(|&cat| {
                mapped.contains(&cat)
                    || get_parent_category(cat).is_some_and(|p| mapped.contains(&p.id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_map() -> CategoryMap {
        let mut map = CategoryMap::new();
        map.add_mapping("1", cats::MOVIES_HD, Some("Movies/HD"));
        map.add_mapping("2", cats::TV_SD, Some("TV Packs"));
        map.add_mapping("2", cats::TV_HD, Some("TV Packs"));
        map.add_mapping("mus", cats::AUDIO_LOSSLESS, Some("FLAC"));
        map
    }

    #[test]
    fn test_expand_categories() {
        let expanded = expand_categories(&[2000]);
        assert!(expanded.contains(&2000));
        assert!(expanded.contains(&2040));
        assert!(expanded.contains(&2045));
        assert!(!expanded.contains(&5000));
    }

    #[test]
    fn test_get_subcategories() {
        let subs = get_subcategories(5000);
        assert!(subs.iter().any(|c| c.id == 5040));
        assert!(subs.iter().any(|c| c.id == 5070));
        assert_eq!(get_parent_category(5040).map(|c| c.id), Some(5000));
    }

    #[test]
    fn test_native_to_standard_accumulates() {
        let map = sample_map();
        assert_eq!(
            map.map_native_to_standard("2"),
            BTreeSet::from([cats::TV_SD, cats::TV_HD])
        );
        assert_eq!(map.map_native_to_standard("MUS"), BTreeSet::from([3040]));
        assert!(map.map_native_to_standard("999").is_empty());
        assert_eq!(map.map_native_or_other("999"), vec![cats::OTHER]);
    }

    #[test]
    fn test_label_lookup() {
        let map = sample_map();
        assert_eq!(
            map.map_label_to_standard(" tv packs "),
            BTreeSet::from([cats::TV_SD, cats::TV_HD])
        );
        assert!(map.map_label_to_standard("Games").is_empty());
    }

    #[test]
    fn test_standard_to_native() {
        let map = sample_map();
        assert_eq!(map.map_standard_to_native(&[]), vec!["1", "2", "mus"]);
        assert_eq!(map.map_standard_to_native(&[cats::TV_HD]), vec!["2"]);
        assert_eq!(
            map.map_standard_to_native(&[cats::TV_HD, cats::TV_SD, cats::MOVIES_HD]),
            vec!["1", "2"]
        );
        assert!(map.map_standard_to_native(&[cats::BOOKS]).is_empty());
    }

    #[test]
    fn test_every_returned_native_intersects_request() {
        let map = sample_map();
        let requested = [cats::TV_SD, cats::AUDIO_LOSSLESS];
        let natives = map.map_standard_to_native(&requested);

        for native in map.native_tokens() {
            let intersects = map
                .map_native_to_standard(&native)
                .iter()
                .any(|c| requested.contains(c));
            assert_eq!(natives.contains(&native), intersects, "token {native}");
        }
    }

    #[test]
    fn test_round_trip_contains_token() {
        let map = sample_map();
        for native in map.native_tokens() {
            let standard: Vec<i32> = map.map_native_to_standard(&native).into_iter().collect();
            assert!(map.map_standard_to_native(&standard).contains(&native));
        }
    }

    #[test]
    fn test_native_filter_omitted_when_unfiltered() {
        let map = sample_map();
        assert_eq!(map.native_filter(&[]), None);
        assert_eq!(
            map.native_filter(&[cats::MOVIES, cats::TV, cats::AUDIO]),
            None
        );
        assert_eq!(map.native_filter(&[cats::MOVIES]), Some(vec!["1".to_string()]));
        assert_eq!(map.native_filter(&[cats::BOOKS]), Some(vec![]));
        assert_eq!(map.native_filter(&[cats::TV_UHD]), Some(vec!["2".to_string()]));
    }

    #[test]
    fn test_supported_categories() {
        let map = sample_map();
        assert_eq!(map.supported_categories(&[cats::MOVIES, cats::BOOKS]), vec![2000]);
        assert_eq!(map.supported_categories(&[cats::TV_UHD]), vec![5045]);
        assert!(map.supported_categories(&[cats::PC_GAMES]).is_empty());
    }
}
