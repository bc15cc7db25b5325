//! Supported locales and browser-language normalization.
//!
//! Every locale this crate can emit is a variant of [`Locale`]. Untrusted
//! language strings (browser lists, environment variables, `Accept-Language`
//! headers) are only ever compared against fixed tables with `match` or a
//! linear scan over a static slice; nothing is looked up by indexing a
//! mutable map with the raw string.

mod sources;

pub use sources::{
    AcceptLanguage, EnvLanguages, LanguageSource, StaticLanguages, parse_accept_language,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unic_langid::LanguageIdentifier;

use crate::error::Error;

/// A locale the front-end can render.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Chinese.
    Zh,
}

/// Codes of every supported locale, in display order.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "zh"];

/// Longest language tag accepted from untrusted input.
const MAX_TAG_LEN: usize = 35;

/// Browser-reported tags that map to a supported locale, lower-cased.
///
/// Tags not listed here still match when their base language is listed.
const BROWSER_LANGUAGE_MAP: &[(&str, Locale)] = &[
    ("zh", Locale::Zh),
    ("zh-cn", Locale::Zh),
    ("zh-tw", Locale::Zh),
    ("zh-hk", Locale::Zh),
    ("zh-mo", Locale::Zh),
    ("zh-sg", Locale::Zh),
    ("zh-hans", Locale::Zh),
    ("zh-hant", Locale::Zh),
    ("en", Locale::En),
    ("en-us", Locale::En),
    ("en-gb", Locale::En),
    ("en-ca", Locale::En),
    ("en-au", Locale::En),
    ("en-nz", Locale::En),
    ("en-ie", Locale::En),
    ("en-in", Locale::En),
];

impl Locale {
    /// All supported locales.
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Zh];

    /// Short language code (`"en"`, `"zh"`).
    pub const fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    /// Human-readable name in the locale's own language.
    pub const fn native_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Zh => "中文",
        }
    }

    /// Look up a supported locale by its exact code.
    ///
    /// Matching is ASCII case-insensitive; anything else is rejected.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.eq_ignore_ascii_case("en") {
            Some(Locale::En)
        } else if code.eq_ignore_ascii_case("zh") {
            Some(Locale::Zh)
        } else {
            None
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::from_code(s).ok_or_else(|| Error::UnsupportedLocale(sanitize_for_display(s)))
    }
}

/// Check if a locale code is supported.
pub fn is_supported(code: &str) -> bool {
    Locale::from_code(code).is_some()
}

/// Normalize a raw locale string to a BCP 47 tag.
///
/// Strips encoding suffixes (`.UTF-8`) and variants (`@latin`), replaces
/// underscores with hyphens and validates the result. Returns `None` for
/// anything that is not a well-formed tag.
///
/// - `"en_US.UTF-8"` -> `Some("en-US")`
/// - `"zh-TW"` -> `Some("zh-TW")`
/// - `"__proto__"` -> `None`
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_TAG_LEN {
        return None;
    }
    let stripped = trimmed.split(['.', '@']).next().unwrap_or_default().trim();
    if stripped.is_empty()
        || !stripped.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return None;
    }
    let candidate = stripped.replace('_', "-");
    LanguageIdentifier::from_str(&candidate).ok().map(|id| id.to_string())
}

/// Map a browser-reported language to a supported locale.
///
/// The full tag is tried against the mapping table first, then its base
/// language, so `zh-TW` and `zh-HK` both give [`Locale::Zh`] and `en-GB` and
/// `en-CA` both give [`Locale::En`]. Malformed or unsupported input gives
/// `None`.
pub fn map_browser_language(raw: &str) -> Option<Locale> {
    let tag = normalize_tag(raw)?.to_ascii_lowercase();
    if let Some(locale) = lookup_browser_tag(&tag) {
        return Some(locale);
    }
    let base = tag.split('-').next()?;
    lookup_browser_tag(base)
}

fn lookup_browser_tag(tag: &str) -> Option<Locale> {
    BROWSER_LANGUAGE_MAP.iter().find(|(known, _)| *known == tag).map(|(_, locale)| *locale)
}

/// Make an untrusted string safe to echo in logs and error messages.
pub(crate) fn sanitize_for_display(raw: &str) -> String {
    raw.chars()
        .take(MAX_TAG_LEN)
        .map(|c| if c.is_ascii_graphic() { c } else { '?' })
        .collect()
}
