use anyhow::{anyhow, bail, Context, Error, Result};
use base64::prelude::*;
use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Verifier as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Public JSON Web Key, as found in `publicKeyJwk` of a DID verification
/// method or returned by a key store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl Jwk {
    pub fn from_p256(pk: &p256::PublicKey) -> Result<Self> {
        serde_json::from_str(&pk.to_jwk_string()).context("unable to convert P-256 key to JWK")
    }

    pub fn from_ed25519(pk: &ed25519_dalek::VerifyingKey) -> Self {
        Self {
            kty: "OKP".into(),
            crv: Some("Ed25519".into()),
            x: Some(BASE64_URL_SAFE_NO_PAD.encode(pk.as_bytes())),
            ..Default::default()
        }
    }

    pub fn set_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    fn coordinate(&self, name: &str, value: &Option<String>) -> Result<String> {
        value
            .clone()
            .with_context(|| format!("'{name}' is missing from the {} JWK", self.kty))
    }
}

pub trait Verifier: Sized {
    /// Construct a [Verifier] from a public [Jwk].
    ///
    /// ## Params
    /// * `jwk` - the public key of the signer.
    /// * `algorithm` - the value taken from the `alg` header of the token, to check the key is used with the expected curve.
    fn from_jwk(jwk: &Jwk, algorithm: &str) -> Result<Self>;
    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct P256Verifier(p256::ecdsa::VerifyingKey);

impl Verifier for P256Verifier {
    fn from_jwk(jwk: &Jwk, algorithm: &str) -> Result<Self> {
        if algorithm != "ES256" {
            bail!("P256Verifier cannot verify tokens signed with '{algorithm}'")
        }
        if jwk.kty != "EC" || jwk.crv.as_deref() != Some("P-256") {
            bail!("expected a P-256 public key, received kty '{}'", jwk.kty)
        }

        let key = json!({
            "kty": "EC",
            "crv": "P-256",
            "x": jwk.coordinate("x", &jwk.x)?,
            "y": jwk.coordinate("y", &jwk.y)?,
        });
        let pk = p256::PublicKey::from_jwk_str(&key.to_string())
            .map_err(|_| anyhow!("invalid P-256 public key"))?;

        Ok(Self(pk.into()))
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let signature = p256::ecdsa::Signature::from_slice(signature)?;
        self.0.verify(payload, &signature).map_err(Error::from)
    }
}

#[derive(Debug, Clone)]
pub struct Ed25519Verifier(ed25519_dalek::VerifyingKey);

impl Verifier for Ed25519Verifier {
    fn from_jwk(jwk: &Jwk, algorithm: &str) -> Result<Self> {
        if algorithm != "EdDSA" {
            bail!("Ed25519Verifier cannot verify tokens signed with '{algorithm}'")
        }
        if jwk.kty != "OKP" || jwk.crv.as_deref() != Some("Ed25519") {
            bail!("expected an Ed25519 public key, received kty '{}'", jwk.kty)
        }

        let x = BASE64_URL_SAFE_NO_PAD
            .decode(jwk.coordinate("x", &jwk.x)?)
            .context("'x' was not valid base64url")?;
        let bytes: [u8; 32] = x
            .try_into()
            .map_err(|_| anyhow!("Ed25519 public key must be 32 bytes"))?;

        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(Error::from)
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let signature = ed25519_dalek::Signature::from_slice(signature)?;
        self.0.verify(payload, &signature).map_err(Error::from)
    }
}

/// Verify a raw JWS signature over `payload` with the verifier matching `alg`.
pub fn verify_signature(jwk: &Jwk, alg: &str, payload: &[u8], signature: &[u8]) -> Result<()> {
    match alg {
        "ES256" => P256Verifier::from_jwk(jwk, alg)?.verify(payload, signature),
        "EdDSA" => Ed25519Verifier::from_jwk(jwk, alg)?.verify(payload, signature),
        _ => bail!("no verifier available for tokens signed with '{alg}'"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ed25519_dalek::Signer as _;
    use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};

    #[test]
    fn p256_round_trip() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = Jwk::from_p256(&pk).unwrap();
        let sig: Signature = key.sign(b"payload");

        verify_signature(&jwk, "ES256", b"payload", &sig.to_vec()).unwrap();
        assert!(verify_signature(&jwk, "ES256", b"tampered", &sig.to_vec()).is_err());
    }

    #[test]
    fn ed25519_round_trip() {
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        let jwk = Jwk::from_ed25519(&key.verifying_key());
        let sig = key.sign(b"payload");

        verify_signature(&jwk, "EdDSA", b"payload", &sig.to_bytes()).unwrap();
    }

    #[test]
    fn algorithm_and_key_type_must_agree() {
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        let jwk = Jwk::from_ed25519(&key.verifying_key());
        assert!(P256Verifier::from_jwk(&jwk, "ES256").is_err());
        assert!(verify_signature(&jwk, "ES384", b"", &[]).is_err());
    }
}
