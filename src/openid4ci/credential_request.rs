use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use super::offer::OfferedCredentialObject;
use crate::core::credential_format::ClaimFormatDesignation;

pub const PROOF_JWT_TYP: &str = "openid4vci-proof+jwt";

/// Claims of the key proof sent with a credential request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub aud: String,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub proof_type: String,
    pub jwt: String,
}

impl Proof {
    pub fn jwt(jwt: String) -> Self {
        Self {
            proof_type: "jwt".into(),
            jwt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialRequest {
    pub format: ClaimFormatDesignation,
    pub types: Vec<String>,
    pub credential_definition: Json,
    pub proof: Proof,
}

impl CredentialRequest {
    pub fn new(offered: &OfferedCredentialObject, proof: Proof) -> Self {
        let types = offered.types();
        let credential_definition = offered
            .credential_definition
            .clone()
            .unwrap_or_else(|| json!({ "type": types }));

        Self {
            format: offered.format.clone(),
            types,
            credential_definition,
            proof,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ClaimFormatDesignation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<u64>,
}

impl CredentialResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("unable to parse credential response")
    }

    /// Every credential carried by the response. Entries of `credentials`
    /// may be wrapped as `{"credential": ...}`.
    pub fn into_credentials(self) -> Result<Vec<Json>> {
        let mut all: Vec<Json> = self.credential.into_iter().collect();
        all.extend(self.credentials.into_iter().map(|entry| match entry {
            Json::Object(mut object) if object.contains_key("credential") => {
                object.remove("credential").unwrap_or(Json::Null)
            }
            other => other,
        }));

        if all.is_empty() {
            bail!("credential response contains no credential")
        }
        Ok(all)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_body_shape() {
        let offered: OfferedCredentialObject = serde_json::from_value(json!({
            "format": "jwt_vc_json",
            "types": ["VerifiableCredential", "PermanentResidentCard"]
        }))
        .unwrap();

        let body = serde_json::to_value(CredentialRequest::new(&offered, Proof::jwt("a.b.c".into())))
            .unwrap();

        assert_eq!(
            body,
            json!({
                "format": "jwt_vc_json",
                "types": ["VerifiableCredential", "PermanentResidentCard"],
                "credential_definition": {"type": ["VerifiableCredential", "PermanentResidentCard"]},
                "proof": {"proof_type": "jwt", "jwt": "a.b.c"}
            })
        );
    }

    #[test]
    fn batch_and_single_responses() {
        let single = CredentialResponse::from_json(br#"{"credential":"a.b.c","c_nonce":"n2"}"#).unwrap();
        assert_eq!(single.c_nonce.as_deref(), Some("n2"));
        assert_eq!(single.into_credentials().unwrap(), vec![json!("a.b.c")]);

        let batch =
            CredentialResponse::from_json(br#"{"credentials":[{"credential":"a.b.c"},"d.e.f"]}"#)
                .unwrap();
        assert_eq!(batch.into_credentials().unwrap().len(), 2);

        let empty = CredentialResponse::from_json(b"{}").unwrap();
        assert!(empty.into_credentials().is_err());
    }
}
