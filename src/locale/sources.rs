//! Providers of the host's preferred-language list.

/// Something that reports the user's preferred languages, most preferred first.
///
/// Entries are untrusted raw strings; the resolver normalizes and validates them.
pub trait LanguageSource {
    /// Preferred languages in priority order.
    fn languages(&self) -> Vec<String>;
}

/// A fixed list, e.g. `navigator.languages` handed over by a front-end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLanguages(pub Vec<String>);

impl StaticLanguages {
    /// Build from anything string-like.
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(languages.into_iter().map(Into::into).collect())
    }
}

impl LanguageSource for StaticLanguages {
    fn languages(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Languages from the process environment.
///
/// Checks in order:
/// 1. `LANGUAGE` - colon-separated priority list
/// 2. `LC_ALL` - POSIX locale override
/// 3. `LC_MESSAGES`
/// 4. `LANG` - default POSIX locale
///
/// `C` and `POSIX` are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvLanguages;

impl EnvLanguages {
    /// Collect languages using an arbitrary variable lookup.
    pub fn collect_with(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |value: &str| {
            let value = value.trim();
            if value.is_empty() || value == "C" || value == "POSIX" {
                return;
            }
            if !out.iter().any(|existing| existing == value) {
                out.push(value.to_string());
            }
        };

        if let Some(list) = lookup("LANGUAGE") {
            list.split(':').for_each(&mut push);
        }
        for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
            if let Some(value) = lookup(var) {
                push(value.as_str());
            }
        }
        out
    }
}

impl LanguageSource for EnvLanguages {
    fn languages(&self) -> Vec<String> {
        Self::collect_with(|key| std::env::var(key).ok())
    }
}

/// Languages from an HTTP `Accept-Language` header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptLanguage(pub String);

impl LanguageSource for AcceptLanguage {
    fn languages(&self) -> Vec<String> {
        parse_accept_language(&self.0)
    }
}

/// Parse an `Accept-Language` header into tags ordered by quality.
///
/// `"zh-TW,zh;q=0.9,en;q=0.8"` gives `["zh-TW", "zh", "en"]`. Entries with
/// `q=0`, an unparseable weight or a wildcard are dropped. Equal weights keep
/// header order.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let mut quality = 1.0_f32;
            for param in pieces {
                let param = param.trim();
                if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                    quality = q.trim().parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q))?;
                }
            }
            (quality > 0.0).then(|| (tag.to_string(), quality))
        })
        .collect();

    // Stable sort keeps header order for equal weights.
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}
