use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::core::presentation_definition::PresentationDefinition;

/// Where the request object of a presentation initiation is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIndirection {
    /// `request` parameter, or a bare compact JWS.
    ByValue(String),
    /// `request_uri` parameter.
    ByReference(Url),
}

#[derive(Deserialize)]
struct InitiationQuery {
    request: Option<String>,
    request_uri: Option<Url>,
}

impl RequestIndirection {
    /// Parse `openid-vc://?request_uri=<url>`, `openid-vc://?request=<jws>` or a
    /// bare JWS.
    pub fn parse(authorization_request: &str) -> Result<Self> {
        let authorization_request = authorization_request.trim();
        if authorization_request.is_empty() {
            bail!("authorization request is empty")
        }

        let Some((_, query)) = authorization_request.split_once('?') else {
            return Ok(Self::ByValue(authorization_request.to_string()));
        };

        let query: InitiationQuery = serde_urlencoded::from_str(query)
            .context("unable to parse authorization request parameters")?;
        match (query.request, query.request_uri) {
            (Some(request), _) => Ok(Self::ByValue(request)),
            (None, Some(request_uri)) => Ok(Self::ByReference(request_uri)),
            (None, None) => bail!("authorization request has neither 'request' nor 'request_uri'"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_purpose: Option<String>,
    #[serde(
        default,
        alias = "client_logo_uri",
        skip_serializing_if = "Option::is_none"
    )]
    pub logo_uri: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpTokenClaim {
    pub presentation_definition: PresentationDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestClaims {
    pub vp_token: VpTokenClaim,
}

/// Verified claims of a verifier's signed authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestObject {
    pub client_id: String,
    pub redirect_uri: String,
    pub nonce: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub registration: Registration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<RequestClaims>,
    /// Newer drafts carry the definition at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,
}

impl RequestObject {
    pub fn from_claims(claims: Json) -> Result<Self> {
        let request: Self =
            serde_json::from_value(claims).context("unable to decode request object claims")?;
        if request.presentation_definition().is_none() {
            bail!("request object carries no presentation definition")
        }
        Ok(request)
    }

    pub fn presentation_definition(&self) -> Option<&PresentationDefinition> {
        self.claims
            .as_ref()
            .map(|claims| &claims.vp_token.presentation_definition)
            .or(self.presentation_definition.as_ref())
    }

    /// The verifier name shown to the user and recorded in activities.
    pub fn client_name(&self) -> &str {
        self.registration
            .client_name
            .as_deref()
            .unwrap_or_default()
    }
}

/// What the wallet shows the user about the verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierDisplayData {
    pub did: String,
    pub name: String,
    pub purpose: String,
    pub logo_uri: String,
}

impl From<&RequestObject> for VerifierDisplayData {
    fn from(request: &RequestObject) -> Self {
        let registration = &request.registration;
        Self {
            did: request.client_id.clone(),
            name: registration.client_name.clone().unwrap_or_default(),
            purpose: registration.client_purpose.clone().unwrap_or_default(),
            logo_uri: registration.logo_uri.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn initiation_forms() {
        assert_eq!(
            RequestIndirection::parse("openid-vc://?request_uri=https%3A%2F%2Fverifier.example.com%2Frequest%2F1")
                .unwrap(),
            RequestIndirection::ByReference(
                Url::parse("https://verifier.example.com/request/1").unwrap()
            )
        );
        assert_eq!(
            RequestIndirection::parse("openid-vc://?request=a.b.c").unwrap(),
            RequestIndirection::ByValue("a.b.c".into())
        );
        assert_eq!(
            RequestIndirection::parse("a.b.c").unwrap(),
            RequestIndirection::ByValue("a.b.c".into())
        );
        assert!(RequestIndirection::parse("openid-vc://?client_id=x").is_err());
        assert!(RequestIndirection::parse("  ").is_err());
    }

    #[test]
    fn request_object_claims() {
        let request = RequestObject::from_claims(json!({
            "response_type": "id_token",
            "response_mode": "post",
            "client_id": "did:example:verifier",
            "redirect_uri": "https://verifier.example.com/cb",
            "nonce": "n-0S6_WzA2Mj",
            "state": "af0ifjsldkj",
            "registration": {
                "client_name": "Verifier",
                "client_purpose": "age check",
                "logo_uri": "https://verifier.example.com/logo.png",
                "subject_syntax_types_supported": ["did:ion"]
            },
            "claims": {"vp_token": {"presentation_definition": {
                "id": "pd",
                "input_descriptors": [{"id": "degree", "constraints": {}}]
            }}}
        }))
        .unwrap();

        assert_eq!(request.presentation_definition().unwrap().id(), "pd");
        assert_eq!(request.client_name(), "Verifier");

        let display = VerifierDisplayData::from(&request);
        assert_eq!(display.did, "did:example:verifier");
        assert_eq!(display.purpose, "age check");
        assert_eq!(display.logo_uri, "https://verifier.example.com/logo.png");

        assert!(RequestObject::from_claims(json!({
            "client_id": "x",
            "redirect_uri": "https://verifier.example.com/cb",
            "nonce": "n"
        }))
        .is_err());
    }
}
