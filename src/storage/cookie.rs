//! Cookie-jar backend.
//!
//! Cookies carry a max-age, are scoped to `/`, and are flagged `Secure` when
//! the store runs in a secure context. A secure cookie is invisible to an
//! insecure context, as it would be to a page served over plain HTTP.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::form_urlencoded;

use super::{Backend, keys};
use crate::clock::{Clock, DAY_MS};
use crate::error::{Error, Result};

/// Largest cookie (name plus value) a browser is guaranteed to keep.
pub const MAX_COOKIE_BYTES: usize = 4096;

const NAME: &str = "cookie";

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (the storage key).
    pub name: String,
    /// Raw, unencoded value.
    pub value: String,
    /// Expiry as epoch milliseconds.
    pub expires_at: i64,
    /// Only sent over secure transports.
    pub secure: bool,
    /// Path scope.
    pub path: String,
}

impl Cookie {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Jar {
    #[serde(default)]
    cookies: Vec<Cookie>,
}

/// Cookie jar persisted to a JSON file.
#[derive(Clone)]
pub struct CookieStore {
    path: PathBuf,
    max_age_days: u32,
    secure_context: bool,
    enabled: bool,
    mirrored: &'static [&'static str],
    clock: Rc<dyn Clock>,
}

impl CookieStore {
    /// File name inside the state directory.
    pub const FILE_NAME: &'static str = "cookies.json";

    /// Create a jar in `dir` with a 30-day max-age, insecure context.
    pub fn new(dir: impl AsRef<Path>, clock: Rc<dyn Clock>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            max_age_days: 30,
            secure_context: false,
            enabled: true,
            mirrored: keys::COOKIE_MIRRORED,
            clock,
        }
    }

    /// Set the max-age in days.
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Declare whether the host is served over a secure scheme.
    pub fn with_secure_context(mut self, secure: bool) -> Self {
        self.secure_context = secure;
        self
    }

    /// Mark cookies as disabled by the host.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the set of keys mirrored into cookies.
    pub fn with_mirrored_keys(mut self, mirrored: &'static [&'static str]) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn max_age_ms(&self) -> i64 {
        i64::from(self.max_age_days) * DAY_MS
    }

    fn load(&self) -> Result<Jar> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Jar::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::corrupt(self.path.display().to_string(), format!("unreadable cookie jar: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Jar::default()),
            Err(e) => Err(Error::backend(NAME, format!("read {}: {e}", self.path.display()))),
        }
    }

    fn load_for_write(&self) -> Result<Jar> {
        match self.load() {
            Err(Error::CorruptData { reason, .. }) => {
                warn!(path = %self.path.display(), reason, "replacing corrupt cookie jar");
                Ok(Jar::default())
            },
            other => other,
        }
    }

    fn save(&self, jar: &mut Jar) -> Result<()> {
        let now = self.clock.now_ms();
        jar.cookies.retain(|c| !c.is_expired(now));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::backend(NAME, format!("create {}: {e}", parent.display())))?;
        }
        let contents = serde_json::to_string_pretty(jar)?;
        std::fs::write(&self.path, contents)
            .map_err(|e| Error::backend(NAME, format!("write {}: {e}", self.path.display())))
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.enabled { Ok(()) } else { Err(Error::BackendUnavailable { backend: NAME }) }
    }

    fn visible(&self, cookie: &Cookie, now_ms: i64) -> bool {
        !cookie.is_expired(now_ms) && (self.secure_context || !cookie.secure)
    }

    /// The live cookie for `name`, if any.
    pub fn cookie(&self, name: &str) -> Result<Option<Cookie>> {
        self.ensure_enabled()?;
        let now = self.clock.now_ms();
        Ok(self.load()?.cookies.into_iter().find(|c| c.name == name && self.visible(c, now)))
    }

    /// Render the `Set-Cookie` header that would carry `name` to a browser.
    ///
    /// A missing cookie renders as an expiring header, which is also what
    /// removal sends.
    pub fn set_cookie_header(&self, name: &str) -> Result<String> {
        let Some(cookie) = self.cookie(name)? else {
            return Ok(expiry_header(name));
        };
        let remaining_secs = ((cookie.expires_at - self.clock.now_ms()) / 1000).max(0);
        let mut header = format!(
            "{}={}; Max-Age={}; Path={}; SameSite=Lax",
            cookie.name,
            encode(&cookie.value),
            remaining_secs,
            cookie.path
        );
        if cookie.secure {
            header.push_str("; Secure");
        }
        Ok(header)
    }

    /// Ingest a `Cookie:` request header, storing every mirrored pair.
    ///
    /// Pairs for unknown names are ignored. Returns how many were stored.
    pub fn load_cookie_header(&self, header: &str) -> Result<usize> {
        let mut stored = 0;
        for pair in header.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            if !self.accepts(name) {
                debug!(name = %crate::locale::sanitize_for_display(name), "ignoring unmirrored cookie");
                continue;
            }
            let value = decode(value);
            self.set(name, &value)?;
            stored += 1;
        }
        Ok(stored)
    }
}

/// Header that deletes a cookie: empty value, expiry in the past.
pub fn expiry_header(name: &str) -> String {
    format!("{name}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; SameSite=Lax")
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn decode(value: &str) -> String {
    form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

impl Backend for CookieStore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn accepts(&self, key: &str) -> bool {
        self.mirrored.contains(&key)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cookie(key)?.map(|c| c.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_enabled()?;
        let needed = key.len() + encode(value).len();
        if needed > MAX_COOKIE_BYTES {
            return Err(Error::QuotaExceeded { backend: NAME, needed, limit: MAX_COOKIE_BYTES });
        }

        let mut jar = self.load_for_write()?;
        jar.cookies.retain(|c| c.name != key);
        jar.cookies.push(Cookie {
            name: key.to_string(),
            value: value.to_string(),
            expires_at: self.clock.now_ms() + self.max_age_ms(),
            secure: self.secure_context,
            path: "/".to_string(),
        });
        self.save(&mut jar)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.ensure_enabled()?;
        let mut jar = self.load_for_write()?;
        let before = jar.cookies.len();
        jar.cookies.retain(|c| c.name != key);
        if jar.cookies.len() != before {
            debug!(key, header = %expiry_header(key), "cookie expired");
        }
        self.save(&mut jar)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.ensure_enabled()?;
        let now = self.clock.now_ms();
        Ok(self.load()?.cookies.into_iter().filter(|c| self.visible(c, now)).map(|c| c.name).collect())
    }
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("path", &self.path)
            .field("max_age_days", &self.max_age_days)
            .field("secure_context", &self.secure_context)
            .field("enabled", &self.enabled)
            .finish()
    }
}
