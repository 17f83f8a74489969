use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::offer::{OfferedCredential, OfferedCredentialObject};

pub const CREDENTIAL_ISSUER_WELL_KNOWN: &str = "openid-credential-issuer";
pub const OPENID_CONFIGURATION_WELL_KNOWN: &str = "openid-configuration";

/// Credential issuer metadata, from `/.well-known/openid-credential-issuer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerMetadata {
    pub credential_issuer: String,
    pub credential_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Either the older array of `{id, format, types}` objects or the newer
    /// `credential_configurations_supported` map keyed by id.
    #[serde(
        default,
        alias = "credential_configurations_supported",
        skip_serializing_if = "Json::is_null"
    )]
    pub credentials_supported: Json,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<IssuerDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerDisplay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl IssuerMetadata {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("unable to parse credential issuer metadata")
    }

    /// Resolve an offered credential to its format and type, looking up ids
    /// in the supported credentials.
    pub fn resolve_offered(&self, offered: &OfferedCredential) -> Result<OfferedCredentialObject> {
        let id = match offered {
            OfferedCredential::Object(object) => return Ok(object.clone()),
            OfferedCredential::Id(id) => id,
        };

        let supported = match &self.credentials_supported {
            Json::Object(map) => map.get(id),
            Json::Array(list) => list
                .iter()
                .find(|entry| entry.get("id").and_then(Json::as_str) == Some(id)),
            _ => None,
        }
        .with_context(|| format!("issuer does not support offered credential '{id}'"))?;

        serde_json::from_value(supported.clone())
            .with_context(|| format!("supported credential '{id}' is malformed"))
    }
}

/// The OpenID provider configuration of the issuer, from
/// `/.well-known/openid-configuration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
}

impl OpenIdConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("unable to parse OpenID configuration")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::credential_format::ClaimFormatDesignation;
    use serde_json::json;

    #[test]
    fn resolve_offered_ids() {
        let metadata = IssuerMetadata::from_json(
            json!({
                "credential_issuer": "https://issuer.example.com",
                "credential_endpoint": "https://issuer.example.com/credential",
                "credential_configurations_supported": {
                    "UniversityDegree_JWT": {
                        "format": "jwt_vc_json",
                        "credential_definition": {"type": ["VerifiableCredential", "UniversityDegreeCredential"]}
                    }
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let resolved = metadata
            .resolve_offered(&OfferedCredential::Id("UniversityDegree_JWT".into()))
            .unwrap();
        assert_eq!(resolved.format, ClaimFormatDesignation::JwtVcJson);
        assert_eq!(resolved.types()[1], "UniversityDegreeCredential");

        assert!(metadata
            .resolve_offered(&OfferedCredential::Id("Unknown".into()))
            .is_err());
    }

    #[test]
    fn legacy_supported_array() {
        let metadata = IssuerMetadata::from_json(
            json!({
                "credential_issuer": "https://issuer.example.com",
                "credential_endpoint": "https://issuer.example.com/credential",
                "credentials_supported": [
                    {"id": "prc", "format": "ldp_vc", "types": ["VerifiableCredential", "PermanentResidentCard"]}
                ]
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let resolved = metadata
            .resolve_offered(&OfferedCredential::Id("prc".into()))
            .unwrap();
        assert_eq!(resolved.format, ClaimFormatDesignation::LdpVc);
    }
}
