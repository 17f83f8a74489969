use std::fmt;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;

use super::{jwk::Jwk, jwt::Algorithm};
use crate::api::DidResolver;

/// A DID document, reduced to the parts needed for signing and verification.
#[derive(Debug, Clone, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default, rename = "verificationMethod")]
    verification_method: Vec<VerificationMethod>,
    #[serde(default, rename = "assertionMethod")]
    assertion_method: Vec<VerificationRelationship>,
    #[serde(default)]
    authentication: Vec<VerificationRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VerificationRelationship {
    Reference(String),
    Embedded(VerificationMethod),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub controller: String,
    #[serde(rename = "publicKeyJwk")]
    pub public_key_jwk: Option<Jwk>,
}

impl VerificationMethod {
    pub fn new(id: impl Into<String>, key_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            controller: id.split('#').next().unwrap_or_default().to_string(),
            id,
            key_type: key_type.into(),
            public_key_jwk: None,
        }
    }

    pub fn set_public_key_jwk(mut self, jwk: Jwk) -> Self {
        self.public_key_jwk = Some(jwk);
        self
    }

    /// The JWS algorithm matching this method's key type, if it is one this
    /// crate can both sign and verify.
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self.key_type.as_str() {
            "Ed25519VerificationKey2018" | "Ed25519VerificationKey2020" => Some(Algorithm::EdDSA),
            "JsonWebKey2020" => {
                let jwk = self.public_key_jwk.as_ref()?;
                match (jwk.kty.as_str(), jwk.crv.as_deref()?) {
                    ("OKP", "Ed25519") => Some(Algorithm::EdDSA),
                    ("EC", "P-256") => Some(Algorithm::ES256),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The DID this method belongs to.
    pub fn did(&self) -> &str {
        self.id.split('#').next().unwrap_or(&self.id)
    }
}

impl DidDocument {
    /// Parse resolver output, which is either a bare DID document or a DID
    /// resolution result wrapping one under `didDocument`.
    pub fn from_resolution(bytes: &[u8]) -> Result<Self> {
        let mut value: Json =
            serde_json::from_slice(bytes).context("DID resolution was not valid JSON")?;

        if let Some(document) = value.get_mut("didDocument") {
            value = document.take();
        }

        let mut document: Self =
            serde_json::from_value(value).context("unable to parse DID document")?;
        document.absolutize();
        Ok(document)
    }

    fn absolutize(&mut self) {
        let did = self.id.clone();
        let absolute = |id: &mut String| {
            if id.starts_with('#') {
                *id = format!("{did}{id}");
            }
        };

        for vm in self.verification_method.iter_mut() {
            absolute(&mut vm.id);
        }
        for relationship in self
            .assertion_method
            .iter_mut()
            .chain(self.authentication.iter_mut())
        {
            match relationship {
                VerificationRelationship::Reference(id) => absolute(id),
                VerificationRelationship::Embedded(vm) => absolute(&mut vm.id),
            }
        }
    }

    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method
            .iter()
            .chain(
                self.assertion_method
                    .iter()
                    .chain(self.authentication.iter())
                    .filter_map(|r| match r {
                        VerificationRelationship::Embedded(vm) => Some(vm),
                        VerificationRelationship::Reference(_) => None,
                    }),
            )
            .find(|vm| vm.id == id)
    }

    /// All methods with the assertion relationship, in document order.
    pub fn assertion_methods(&self) -> Vec<&VerificationMethod> {
        self.assertion_method
            .iter()
            .filter_map(|relationship| match relationship {
                VerificationRelationship::Embedded(vm) => Some(vm),
                VerificationRelationship::Reference(id) => self
                    .verification_method
                    .iter()
                    .find(|vm| &vm.id == id),
            })
            .collect()
    }
}

/// Tags a resolver failure so it surfaces as
/// [crate::error::ErrorKind::DidResolutionFailed] from any step.
#[derive(Debug)]
pub(crate) struct DidResolutionFailure(String);

impl fmt::Display for DidResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to resolve {}", self.0)
    }
}

pub async fn resolve_document(resolver: &dyn DidResolver, did: &str) -> Result<DidDocument> {
    let bytes = resolver
        .resolve(did)
        .await
        .context(DidResolutionFailure(did.to_string()))?;
    DidDocument::from_resolution(&bytes)
}

/// Resolve `did` and return the first verification method with the
/// assertion relationship.
pub async fn resolve_signing_method(
    resolver: &dyn DidResolver,
    did: &str,
) -> Result<VerificationMethod> {
    let document = resolve_document(resolver, did).await?;

    let Some(vm) = document.assertion_methods().into_iter().next() else {
        bail!("{did} has no assertion method for signing")
    };

    tracing::debug!("signing with verification method {}", vm.id);

    Ok(vm.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn document() -> Json {
        json!({
            "didDocument": {
                "id": "did:example:holder",
                "verificationMethod": [{
                    "id": "#key-1",
                    "type": "JsonWebKey2020",
                    "controller": "did:example:holder",
                    "publicKeyJwk": {"kty": "EC", "crv": "P-256", "x": "x", "y": "y"}
                }],
                "assertionMethod": ["#key-1"]
            }
        })
    }

    #[test]
    fn resolution_result_with_relative_ids() {
        let doc = DidDocument::from_resolution(document().to_string().as_bytes()).unwrap();
        let vms = doc.assertion_methods();

        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].id, "did:example:holder#key-1");
        assert_eq!(vms[0].algorithm(), Some(Algorithm::ES256));
        assert_eq!(vms[0].did(), "did:example:holder");
    }

    #[test]
    fn embedded_assertion_method() {
        let value = json!({
            "id": "did:example:issuer",
            "assertionMethod": [{
                "id": "did:example:issuer#k",
                "type": "Ed25519VerificationKey2018"
            }]
        });
        let doc = DidDocument::from_resolution(value.to_string().as_bytes()).unwrap();
        assert_eq!(doc.assertion_methods()[0].algorithm(), Some(Algorithm::EdDSA));
        assert!(doc.verification_method("did:example:issuer#k").is_some());
    }

    #[test]
    fn key_type_to_algorithm() {
        let secp = VerificationMethod::new("did:example:a#1", "EcdsaSecp256k1VerificationKey2019");
        assert_eq!(secp.algorithm(), None);

        let p384 = VerificationMethod::new("did:example:a#1", "JsonWebKey2020").set_public_key_jwk(
            Jwk {
                kty: "EC".into(),
                crv: Some("P-384".into()),
                ..Default::default()
            },
        );
        assert_eq!(p384.algorithm(), None);

        let p256 = VerificationMethod::new("did:example:a#1", "JsonWebKey2020").set_public_key_jwk(
            Jwk {
                kty: "EC".into(),
                crv: Some("P-256".into()),
                ..Default::default()
            },
        );
        assert_eq!(p256.algorithm(), Some(Algorithm::ES256));

        let rsa = VerificationMethod::new("did:example:a#1", "RsaVerificationKey2018");
        assert_eq!(rsa.algorithm(), None);
    }
}
