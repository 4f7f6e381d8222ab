//! Deciding between development and production behavior.
//!
//! The [`OperatingMode`] is either forced by the application or detected from
//! the request: a request coming from a whitelisted address (or carrying the
//! debug secret cookie together with a whitelisted `secret@address` entry)
//! gets the development treatment, everything else production.
//!
//! # Examples
//!
//! ```
//! use faultline::mode::{ModeSetting, OperatingMode, RequestOrigin, Whitelist, resolve};
//!
//! let origin = RequestOrigin {
//!     remote_addr: Some("10.0.0.5".into()),
//!     ..RequestOrigin::default()
//! };
//!
//! let setting = ModeSetting::Detect(Whitelist::parse("10.0.0.5, 10.0.0.6"));
//! assert_eq!(resolve(&setting, &origin), OperatingMode::Development);
//!
//! // A forced mode skips detection.
//! assert_eq!(resolve(&ModeSetting::from(true), &origin), OperatingMode::Production);
//! ```

use std::sync::OnceLock;

use regex::Regex;

/// Name of the cookie carrying the developer secret.
pub const COOKIE_SECRET: &str = "faultline-debug";

/// Whether failure details may be shown to whoever triggered them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    /// Full diagnostics are shown.
    Development,
    /// Failures are logged and only a generic page is shown.
    Production,
}

impl OperatingMode {
    /// Whether this is [`Production`](Self::Production).
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether this is [`Development`](Self::Development).
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// How the operating mode should be decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeSetting {
    /// Always development.
    Development,
    /// Always production.
    Production,
    /// Development iff the request comes from the whitelist.
    Detect(Whitelist),
}

impl Default for ModeSetting {
    fn default() -> Self {
        Self::Detect(Whitelist::default())
    }
}

impl From<bool> for ModeSetting {
    /// `true` forces production, `false` forces development.
    fn from(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Development
        }
    }
}

impl From<OperatingMode> for ModeSetting {
    fn from(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Development => Self::Development,
            OperatingMode::Production => Self::Production,
        }
    }
}

impl From<Whitelist> for ModeSetting {
    fn from(whitelist: Whitelist) -> Self {
        Self::Detect(whitelist)
    }
}

impl From<&str> for ModeSetting {
    fn from(whitelist: &str) -> Self {
        Self::Detect(Whitelist::parse(whitelist))
    }
}

/// Addresses (and `secret@address` tokens) that count as developers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Whitelist(Vec<String>);

impl Whitelist {
    /// Parses a comma and/or whitespace separated list.
    pub fn parse(list: &str) -> Self {
        static SEPARATOR: OnceLock<Regex> = OnceLock::new();
        let separator = SEPARATOR.get_or_init(|| {
            Regex::new(r"[,\s]+").expect("built-in whitelist separator pattern should be valid")
        });

        Self(
            separator
                .split(list)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// The entries.
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Whether `token` is listed verbatim.
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|entry| entry == token)
    }

    fn push(&mut self, entry: &str) {
        self.0.push(entry.to_owned());
    }
}

impl<S: Into<String>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for Whitelist {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

/// What the resolver may know about the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Network address of the client, if there is a client.
    pub remote_addr: Option<String>,
    /// Local host name, used when there is no remote address.
    pub host_name: String,
    /// Value of the [`COOKIE_SECRET`] cookie.
    pub secret: Option<String>,
    /// Whether the request passed through a proxy (`X-Forwarded-For` or
    /// `Forwarded` present).
    pub forwarded: bool,
}

impl RequestOrigin {
    /// Reads the origin from CGI-style environment variables:
    /// `REMOTE_ADDR`, `HTTP_COOKIE`, `HTTP_X_FORWARDED_FOR`, `HTTP_FORWARDED`
    /// and `HOSTNAME`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

        Self {
            remote_addr: var("REMOTE_ADDR"),
            host_name: var("HOSTNAME").unwrap_or_else(|| String::from("localhost")),
            secret: var("HTTP_COOKIE").and_then(|cookies| cookie_value(&cookies, COOKIE_SECRET)),
            forwarded: var("HTTP_X_FORWARDED_FOR").is_some() || var("HTTP_FORWARDED").is_some(),
        }
    }

    /// The address matched against the whitelist.
    pub fn address(&self) -> &str {
        self.remote_addr.as_deref().unwrap_or(&self.host_name)
    }
}

/// Extracts one cookie from a `Cookie` header value.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().to_owned())
    })
}

/// Whether `origin` belongs to a developer according to `whitelist`.
///
/// Without a forwarding header, same-host access (`127.0.0.1`, `::1`) always
/// counts.
pub fn detect_debug_mode(whitelist: &Whitelist, origin: &RequestOrigin) -> bool {
    let mut list = whitelist.clone();
    if !origin.forwarded {
        list.push("127.0.0.1");
        list.push("::1");
    }

    let address = origin.address();
    let secret = origin.secret.as_deref().unwrap_or_default();
    list.contains(address) || list.contains(&format!("{secret}@{address}"))
}

/// Resolves the operating mode for `origin`.
pub fn resolve(setting: &ModeSetting, origin: &RequestOrigin) -> OperatingMode {
    match setting {
        ModeSetting::Development => OperatingMode::Development,
        ModeSetting::Production => OperatingMode::Production,
        ModeSetting::Detect(whitelist) => {
            if detect_debug_mode(whitelist, origin) {
                OperatingMode::Development
            } else {
                OperatingMode::Production
            }
        }
    }
}
