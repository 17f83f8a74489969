use std::time::Duration;

use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use url::Url;

/// Timeout applied to every HTTP call made by an interaction unless overridden.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl BaseUrl {
    /// The well-known URL for `suffix`, e.g. `openid-credential-issuer`.
    pub fn well_known(&self, suffix: &str) -> Result<Url, url::ParseError> {
        self.0.join(&format!(".well-known/{suffix}"))
    }
}

/// Transport settings shared by the issuance and presentation interactions.
#[derive(Debug, Clone)]
pub struct HttpOpts {
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) disable_tls_verify: bool,
}

impl Default for HttpOpts {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            timeout: Some(DEFAULT_HTTP_TIMEOUT),
            disable_tls_verify: false,
        }
    }
}

impl HttpOpts {
    /// Add a header sent with every outbound request.
    pub fn add_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set the timeout for every outbound request. A zero duration disables it.
    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Accept any TLS certificate presented by the remote side.
    pub fn disable_tls_verify(mut self) -> Self {
        self.disable_tls_verify = true;
        self
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn tls_verify_disabled(&self) -> bool {
        self.disable_tls_verify
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_url_joins_well_known() {
        let base = BaseUrl::try_from("https://example.com/issuer".to_string()).unwrap();
        assert_eq!(
            base.well_known("openid-credential-issuer").unwrap().as_str(),
            "https://example.com/issuer/.well-known/openid-credential-issuer"
        );
    }

    #[test]
    fn zero_timeout_disables() {
        let opts = HttpOpts::default().set_timeout(Duration::ZERO);
        assert_eq!(opts.timeout(), None);
        assert_eq!(HttpOpts::default().timeout(), Some(DEFAULT_HTTP_TIMEOUT));
    }
}
