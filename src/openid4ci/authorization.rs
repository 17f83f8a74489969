use anyhow::{anyhow, bail, Context, Result};
use base64::prelude::*;
use serde::Serialize;
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};
use url::Url;

use super::offer::OfferedCredentialObject;
use crate::utils::random_token;

/// A PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// A fresh verifier: 43 base64url characters encoding 32 random bytes.
    pub fn generate() -> Self {
        Self::from_verifier(random_token(32))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// State kept between creating the authorization URL and handling the
/// redirect back to the wallet.
#[derive(Debug, Clone)]
pub(crate) struct PendingAuthorization {
    pub(crate) pkce: Pkce,
    pub(crate) state: String,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: String,
}

#[derive(Serialize)]
struct AuthorizationQuery<'a> {
    response_type: &'static str,
    client_id: &'a str,
    redirect_uri: &'a str,
    state: &'a str,
    code_challenge: &'a str,
    code_challenge_method: &'static str,
    authorization_details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_state: Option<&'a str>,
}

/// One `openid_credential` authorization detail per offered credential.
pub(crate) fn authorization_details(offered: &[OfferedCredentialObject]) -> Json {
    offered
        .iter()
        .map(|credential| {
            json!({
                "type": "openid_credential",
                "format": credential.format,
                "types": credential.types(),
            })
        })
        .collect()
}

pub(crate) fn authorization_url(
    authorization_endpoint: &str,
    pending: &PendingAuthorization,
    offered: &[OfferedCredentialObject],
    scopes: &[String],
    issuer_state: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint)
        .with_context(|| format!("invalid authorization endpoint '{authorization_endpoint}'"))?;

    let query = AuthorizationQuery {
        response_type: "code",
        client_id: &pending.client_id,
        redirect_uri: &pending.redirect_uri,
        state: &pending.state,
        code_challenge: &pending.pkce.challenge,
        code_challenge_method: "S256",
        authorization_details: authorization_details(offered).to_string(),
        scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        issuer_state,
    };

    let encoded =
        serde_urlencoded::to_string(query).context("unable to encode authorization request")?;
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(&encoded).context("unable to encode authorization request")?;
    // Parameters already on the endpoint are kept.
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.to_string())
}

/// Extract the authorization code from the redirect, checking the `state`
/// matches the one sent.
pub(crate) fn authorization_code(
    redirect_uri_with_code: &str,
    expected_state: &str,
) -> Result<String> {
    let url = Url::parse(redirect_uri_with_code).context("redirect URI is not a valid URI")?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        bail!("redirect URI state does not match the authorization request")
    }

    code.ok_or(anyhow!("redirect URI has no authorization code"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pkce_s256() {
        // RFC 7636, appendix B.
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");

        assert_eq!(Pkce::generate().verifier.len(), 43);
    }

    #[test]
    fn url_parameters() {
        let offered: OfferedCredentialObject = serde_json::from_value(json!({
            "format": "jwt_vc_json",
            "types": ["VerifiableCredential", "PermanentResidentCard"]
        }))
        .unwrap();
        let pending = PendingAuthorization {
            pkce: Pkce::generate(),
            state: "s1".into(),
            client_id: "wallet".into(),
            redirect_uri: "https://wallet.example.com/cb".into(),
        };

        let url = authorization_url(
            "https://auth.example.com/authorize",
            &pending,
            &[offered],
            &["openid".into(), "profile".into()],
            Some("1234"),
        )
        .unwrap();
        let url = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["code_challenge"], pending.pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], "openid profile");
        assert_eq!(params["issuer_state"], "1234");

        let details: Json = serde_json::from_str(&params["authorization_details"]).unwrap();
        assert_eq!(details[0]["type"], "openid_credential");
        assert_eq!(details[0]["format"], "jwt_vc_json");
    }

    #[test]
    fn endpoint_query_is_kept() {
        let pending = PendingAuthorization {
            pkce: Pkce::generate(),
            state: "s1".into(),
            client_id: "wallet".into(),
            redirect_uri: "https://wallet.example.com/cb".into(),
        };

        let url = authorization_url(
            "https://auth.example.com/authorize?tenant=a",
            &pending,
            &[],
            &[],
            None,
        )
        .unwrap();
        let url = Url::parse(&url).unwrap();
        let params: Vec<_> = url.query_pairs().into_owned().collect();

        assert_eq!(params[0], ("tenant".to_string(), "a".to_string()));
        assert!(params.contains(&("response_type".to_string(), "code".to_string())));
        assert!(params.contains(&("state".to_string(), "s1".to_string())));
        assert!(!params.iter().any(|(key, _)| key == "scope"));
    }

    #[test]
    fn redirect_state_must_match() {
        assert_eq!(
            authorization_code("https://wallet.example.com/cb?code=c1&state=s1", "s1").unwrap(),
            "c1"
        );
        assert!(
            authorization_code("https://wallet.example.com/cb?code=c1&state=other", "s1").is_err()
        );
        assert!(authorization_code("https://wallet.example.com/cb?state=s1", "s1").is_err());
    }
}
