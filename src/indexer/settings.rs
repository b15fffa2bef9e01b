//! Adapter settings: declared fields, user-supplied values and secret handling.
//!
//! Every adapter declares its recognised options as [`SettingDefinition`]s. The
//! values a user supplies are checked against those declarations before any
//! request is made. Fields with a non-`Normal` [`PrivacyLevel`] are write-only:
//! they are masked in `Debug` output and scrubbed from any text passed
//! through [`IndexerSettings::redact`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use super::error::{IndexerError, Result};

pub const REDACTED: &str = "(removed)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    Text,
    Password,
    Checkbox,
    Select,
    /// Read-only help text, never holds a value
    Info,
}

/// Whether a value may be shown or logged in cleartext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Normal,
    UserName,
    Password,
    ApiKey,
}

/// Definition of a configurable setting
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub setting_type: SettingType,
    pub privacy: PrivacyLevel,
    pub required: bool,
    pub default_value: Option<&'static str>,
    pub options: Option<&'static [(&'static str, &'static str)]>,
    pub help: Option<&'static str>,
}

impl SettingDefinition {
    const fn base(key: &'static str, label: &'static str, setting_type: SettingType) -> Self {
        Self {
            key,
            label,
            setting_type,
            privacy: PrivacyLevel::Normal,
            required: false,
            default_value: None,
            options: None,
            help: None,
        }
    }

    pub const fn text(key: &'static str, label: &'static str) -> Self {
        Self::base(key, label, SettingType::Text)
    }

    pub const fn username(key: &'static str, label: &'static str) -> Self {
        let mut def = Self::base(key, label, SettingType::Text);
        def.privacy = PrivacyLevel::UserName;
        def.required = true;
        def
    }

    pub const fn password(key: &'static str, label: &'static str) -> Self {
        let mut def = Self::base(key, label, SettingType::Password);
        def.privacy = PrivacyLevel::Password;
        def.required = true;
        def
    }

    pub const fn api_key(key: &'static str, label: &'static str) -> Self {
        let mut def = Self::base(key, label, SettingType::Text);
        def.privacy = PrivacyLevel::ApiKey;
        def.required = true;
        def
    }

    pub const fn checkbox(key: &'static str, label: &'static str, default: bool) -> Self {
        let mut def = Self::base(key, label, SettingType::Checkbox);
        def.default_value = Some(if default { "true" } else { "false" });
        def
    }

    pub const fn select(
        key: &'static str,
        label: &'static str,
        default: &'static str,
        options: &'static [(&'static str, &'static str)],
    ) -> Self {
        let mut def = Self::base(key, label, SettingType::Select);
        def.default_value = Some(default);
        def.options = Some(options);
        def
    }

    pub const fn info(key: &'static str, label: &'static str, help: &'static str) -> Self {
        let mut def = Self::base(key, label, SettingType::Info);
        def.help = Some(help);
        def
    }

    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub const fn with_default(mut self, value: &'static str) -> Self {
        self.default_value = Some(value);
        self
    }

    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_secret(&self) -> bool {
        self.privacy != PrivacyLevel::Normal
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Settings for one configured indexer instance.
///
/// Construct with [`IndexerSettings::new`] and the builder methods, then call
/// [`resolve`](Self::resolve) against the adapter's definitions.
#[derive(Clone, Default)]
pub struct IndexerSettings {
    base_url: Option<String>,
    values: BTreeMap<String, String>,
    secret_keys: BTreeSet<String>,
}

impl IndexerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Non-empty value of a setting
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(parse_bool).unwrap_or(false)
    }

    /// Value of a setting that [`resolve`](Self::resolve) guaranteed to be present
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| IndexerError::configuration(format!("setting '{key}' is required")))
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_default().trim_end_matches('/')
    }

    /// `path` joined onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Apply defaults, pick a base URL and check every declared field.
    ///
    /// `links` are the adapter's known mirrors; the first one is used when no base
    /// URL was configured. Errors are `Configuration` and never echo secret values.
    pub fn resolve(mut self, definitions: &[SettingDefinition], links: &[&str]) -> Result<Self> {
        let base_url = match self.base_url.take().filter(|u| !u.trim().is_empty()) {
            Some(url) => url.trim().to_string(),
            None => links
                .first()
                .map(|l| l.to_string())
                .ok_or_else(|| IndexerError::configuration("a base URL is required"))?,
        };

        let parsed = url::Url::parse(&base_url)
            .map_err(|e| IndexerError::configuration(format!("invalid base URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IndexerError::configuration("base URL must use http or https"));
        }
        if !links.is_empty()
            && !links
                .iter()
                .any(|l| l.trim_end_matches('/') == base_url.trim_end_matches('/'))
        {
            warn!(base_url = %base_url, "Base URL is not one of the known site links");
        }
        self.base_url = Some(base_url);

        for def in definitions {
            if def.setting_type == SettingType::Info {
                continue;
            }
            if def.is_secret() {
                self.secret_keys.insert(def.key.to_string());
            }

            if self.get(def.key).is_none() {
                if let Some(default) = def.default_value {
                    self.values.insert(def.key.to_string(), default.to_string());
                } else if def.required {
                    return Err(IndexerError::configuration(format!(
                        "setting '{}' ({}) is required",
                        def.key, def.label
                    )));
                }
                continue;
            }

            let value = self.values.get(def.key).map(String::as_str).unwrap_or_default();
            match def.setting_type {
                SettingType::Checkbox if parse_bool(value).is_none() => {
                    return Err(IndexerError::configuration(format!(
                        "setting '{}' must be true or false",
                        def.key
                    )));
                }
                SettingType::Select => {
                    let options = def.options.unwrap_or_default();
                    if !options.iter().any(|(v, _)| *v == value) {
                        return Err(IndexerError::configuration(format!(
                            "setting '{}' must be one of: {}",
                            def.key,
                            options.iter().map(|(v, _)| *v).collect::<Vec<_>>().join(", ")
                        )));
                    }
                }
                _ => {}
            }
        }

        for key in self.values.keys() {
            if !definitions.iter().any(|d| d.key == key) {
                warn!(setting = %key, "Ignoring unrecognised setting");
            }
        }

        Ok(self)
    }

    /// Scrub secret setting values and well-known credential parameters from text
    /// destined for logs or error messages.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for key in &self.secret_keys {
            if let Some(secret) = self.get(key) {
                out = out.replace(secret, REDACTED);
                let encoded = urlencoding::encode(secret);
                if encoded != secret {
                    out = out.replace(encoded.as_ref(), REDACTED);
                }
            }
        }
        cleanse(&out)
    }
}

impl fmt::Debug for IndexerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: BTreeMap<&str, &str> = self
            .values
            .iter()
            .map(|(k, v)| {
                let shown = if self.secret_keys.contains(k) { REDACTED } else { v.as_str() };
                (k.as_str(), shown)
            })
            .collect();

        f.debug_struct("IndexerSettings")
            .field("base_url", &self.base_url)
            .field("values", &values)
            .finish()
    }
}

static CLEANSE_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // query string and form parameters
        r"(?i)([?&;\s](?:apikey|api_key|api_token|access_token|token|passkey|pass|passwd|password|pwd|authkey|auth|torrent_pass|rsskey|username|user|uid|tp)=)([^&\s;]+)",
        // JSON bodies
        r#"(?i)("(?:password|passkey|pass_key|api_key|apikey|api_token|token|authkey|rsskey|username)"\s*:\s*")([^"]+)"#,
        // cookie headers
        r"(?i)(cookie:\s*)(.+)$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Mask credential-looking parameters in a URL or message
pub fn cleanse(text: &str) -> String {
    CLEANSE_RULES
        .iter()
        .fold(text.to_string(), |acc, rule| {
            rule.replace_all(&acc, format!("${{1}}{REDACTED}").as_str())
                .into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    const OPTIONS: &[(&str, &str)] = &[("time", "Created"), ("size", "Size")];

    fn definitions() -> Vec<SettingDefinition> {
        vec![
            SettingDefinition::username("username", "Username"),
            SettingDefinition::password("password", "Password"),
            SettingDefinition::checkbox("freeleech", "Freeleech only", false),
            SettingDefinition::select("sort", "Sort", "time", OPTIONS),
            SettingDefinition::info("notice", "Notice", "Use your site login"),
        ]
    }

    #[test]
    fn test_resolve_applies_defaults_and_first_link() {
        let settings = IndexerSettings::new()
            .with("username", "alice")
            .with("password", "hunter22")
            .resolve(&definitions(), &["https://site.example/"])
            .unwrap();

        assert_eq!(settings.base_url(), "https://site.example");
        assert_eq!(settings.get("sort"), Some("time"));
        assert!(!settings.get_bool("freeleech"));
        assert_eq!(settings.url("/login.php"), "https://site.example/login.php");
    }

    #[test]
    fn test_resolve_rejects_missing_and_invalid_values() {
        let missing = IndexerSettings::new()
            .with("username", "alice")
            .resolve(&definitions(), &["https://site.example/"]);
        assert_matches!(missing, Err(IndexerError::Configuration { reason }) if reason.contains("password"));

        let bad_select = IndexerSettings::new()
            .with("username", "alice")
            .with("password", "hunter22")
            .with("sort", "random")
            .resolve(&definitions(), &["https://site.example/"]);
        assert_matches!(bad_select, Err(IndexerError::Configuration { .. }));

        let bad_url = IndexerSettings::new()
            .with_base_url("ftp://site.example")
            .with("username", "alice")
            .with("password", "hunter22")
            .resolve(&definitions(), &[]);
        assert_matches!(bad_url, Err(IndexerError::Configuration { .. }));
    }

    #[test]
    fn test_configuration_errors_do_not_echo_secrets() {
        let err = IndexerSettings::new()
            .with("username", "alice")
            .with("password", "hunter22")
            .with("freeleech", "maybe")
            .resolve(&definitions(), &["https://site.example/"])
            .unwrap_err();
        assert!(!err.to_string().contains("hunter22"));
    }

    #[test]
    fn test_debug_and_redact_hide_secrets() {
        let settings = IndexerSettings::new()
            .with("username", "alice")
            .with("password", "p@ss word")
            .with("sort", "size")
            .resolve(&definitions(), &["https://site.example/"])
            .unwrap();

        let debug = format!("{settings:?}");
        assert!(!debug.contains("alice"));
        assert!(!debug.contains("p@ss word"));
        assert!(debug.contains("size"));

        let redacted = settings.redact("login failed for alice with p%40ss%20word");
        assert_eq!(redacted, "login failed for (removed) with (removed)");
    }

    #[test]
    fn test_cleanse_known_parameters() {
        assert_eq!(
            cleanse("https://api.example/api?t=search&apikey=abc123&q=foo"),
            "https://api.example/api?t=search&apikey=(removed)&q=foo"
        );
        assert_eq!(
            cleanse("https://site.example/api/torrents/filter?api_token=xyz&name=foo"),
            "https://site.example/api/torrents/filter?api_token=(removed)&name=foo"
        );
        assert_eq!(
            cleanse(r#"{"username":"bob","password":"secret"}"#),
            r#"{"username":"(removed)","password":"(removed)"}"#
        );
    }
}
