use std::fmt;

use anyhow::{bail, Context, Result};
use base64::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as Json;

use super::{
    did::{resolve_document, VerificationMethod},
    jwk::verify_signature,
};
use crate::api::{Crypto, DidResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    EdDSA,
    ES256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdDSA => "EdDSA",
            Self::ES256 => "ES256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Signs compact JWS tokens with one verification method through the
/// [Crypto] collaborator.
pub struct JwsSigner<'a> {
    crypto: &'a dyn Crypto,
    key_id: String,
    alg: Algorithm,
}

impl<'a> JwsSigner<'a> {
    /// Returns `None` when the method's key type has no supported algorithm.
    pub fn new(crypto: &'a dyn Crypto, vm: &VerificationMethod) -> Option<Self> {
        Some(Self {
            crypto,
            key_id: vm.id.clone(),
            alg: vm.algorithm()?,
        })
    }

    pub fn alg(&self) -> Algorithm {
        self.alg
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn sign(&self, typ: &str, claims: &(impl Serialize + Sync)) -> Result<String> {
        let header = JwsHeader {
            alg: self.alg.to_string(),
            kid: Some(self.key_id.clone()),
            typ: Some(typ.to_string()),
        };

        let header = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&header).context("failed to serialize jws header")?);
        let payload = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(claims).context("failed to serialize jws claims")?);
        let signing_input = format!("{header}.{payload}");

        let signature = self
            .crypto
            .sign(signing_input.as_bytes(), &self.key_id)
            .await
            .with_context(|| format!("failed to sign with {}", self.key_id))?;

        Ok(format!(
            "{signing_input}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

fn split(jws: &str) -> Result<(&str, &str, &str)> {
    let mut parts = jws.trim().splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature)) if !signature.contains('.') => {
            Ok((header, payload, signature))
        }
        _ => bail!("token is not a compact JWS"),
    }
}

fn decode_part<T: DeserializeOwned>(part: &str, name: &str) -> Result<T> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(part)
        .with_context(|| format!("jwt {name} were not valid base64url"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("jwt {name} were not valid json"))
}

/// Decode a compact JWS without checking its signature.
pub fn decode(jws: &str) -> Result<(JwsHeader, Json)> {
    let (header, payload, _) = split(jws)?;
    Ok((decode_part(header, "headers")?, decode_part(payload, "claims")?))
}

/// Verify a compact JWS against the key its `kid` header names, resolved
/// through the signer's DID document.
pub async fn verify(jws: &str, resolver: &dyn DidResolver) -> Result<(JwsHeader, Json)> {
    let (header_b64, payload_b64, signature_b64) = split(jws)?;
    let header: JwsHeader = decode_part(header_b64, "headers")?;

    let kid = header
        .kid
        .as_deref()
        .context("'kid' was missing from jwt headers")?;
    let (did, _fragment) = kid.split_once('#').context(format!(
        "expected a DID verification method in 'kid' header, received '{kid}'"
    ))?;

    let document = resolve_document(resolver, did).await?;
    let jwk = document
        .verification_method(kid)
        .with_context(|| format!("{kid} not found in DID document"))?
        .public_key_jwk
        .as_ref()
        .with_context(|| format!("{kid} has no public key JWK"))?;

    let signature = BASE64_URL_SAFE_NO_PAD
        .decode(signature_b64)
        .context("jwt signature was not valid base64url")?;

    verify_signature(
        jwk,
        &header.alg,
        format!("{header_b64}.{payload_b64}").as_bytes(),
        &signature,
    )
    .context("token signature could not be verified")?;

    Ok((header, decode_part(payload_b64, "claims")?))
}

/// Verifies compact JWS tokens signed by DID verification methods.
#[derive(Clone, Copy)]
pub struct JwsVerifier<'a> {
    resolver: &'a dyn DidResolver,
}

impl<'a> JwsVerifier<'a> {
    pub fn new(resolver: &'a dyn DidResolver) -> Self {
        Self { resolver }
    }

    pub async fn verify(&self, jws: &str) -> Result<(JwsHeader, Json)> {
        verify(jws, self.resolver).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        api::{KeyType, KeyWriter},
        crypto::LocalKms,
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct Resolver(Json);

    #[async_trait]
    impl DidResolver for Resolver {
        async fn resolve(&self, _did: &str) -> Result<Vec<u8>> {
            Ok(self.0.to_string().into_bytes())
        }
    }

    #[tokio::test]
    async fn sign_then_verify() {
        let kms = LocalKms::new();
        let jwk = kms.create(KeyType::Ed25519).await.unwrap();
        let vm_id = format!("did:example:holder#{}", jwk.kid.clone().unwrap());
        let resolver = Resolver(json!({
            "id": "did:example:holder",
            "verificationMethod": [{
                "id": vm_id,
                "type": "JsonWebKey2020",
                "publicKeyJwk": jwk,
            }],
            "assertionMethod": [vm_id],
        }));

        let vm = VerificationMethod::new(vm_id.clone(), "JsonWebKey2020").set_public_key_jwk(jwk);
        let signer = JwsSigner::new(&kms, &vm).unwrap();
        assert_eq!(signer.alg(), Algorithm::EdDSA);

        let token = signer.sign("JWT", &json!({"nonce": "n1"})).await.unwrap();
        let (header, claims) = verify(&token, &resolver).await.unwrap();

        assert_eq!(header.kid.as_deref(), Some(vm_id.as_str()));
        assert_eq!(claims["nonce"], "n1");

        let (_, payload, signature) = split(&token).unwrap();
        let forged = format!(
            "{}.{payload}.{signature}",
            BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"EdDSA","kid":"did:example:holder#other"}"#)
        );
        assert!(verify(&forged, &resolver).await.is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not-a-token").is_err());
        assert!(decode("a.b.c.d").is_err());
    }
}
