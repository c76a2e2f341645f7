use std::collections::BTreeMap;

use rolegate_core::Identity;

/// Framework-free view of an authenticated request.
///
/// The web layer copies the identity, cookies, headers and referrer into this
/// value; nothing HTTP-specific crosses into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    identity: Identity,
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    referrer: Option<String>,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            cookies: BTreeMap::new(),
            headers: BTreeMap::new(),
            referrer: None,
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Header names are stored lowercased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }
}
