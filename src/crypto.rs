//! In-memory key store implementing [Crypto], [KeyWriter] and [KeyReader].

use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use p256::ecdsa::{signature::Signer as _, Signature};

use crate::{
    api::{Crypto, KeyReader, KeyType, KeyWriter},
    core::jwk::{verify_signature, Jwk},
    utils::random_token,
};

#[derive(Debug, Clone)]
enum PrivateKey {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    fn public_jwk(&self) -> Result<Jwk> {
        match self {
            Self::P256(key) => {
                let pk: p256::PublicKey = key.verifying_key().into();
                Jwk::from_p256(&pk)
            }
            Self::Ed25519(key) => Ok(Jwk::from_ed25519(&key.verifying_key())),
        }
    }

    fn alg(&self) -> &'static str {
        match self {
            Self::P256(_) => "ES256",
            Self::Ed25519(_) => "EdDSA",
        }
    }

    fn sign(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            Self::P256(key) => {
                let sig: Signature = key.sign(msg);
                sig.to_vec()
            }
            Self::Ed25519(key) => key.sign(msg).to_bytes().to_vec(),
        }
    }
}

/// Keys are stored under a random `kid`. A DID URL resolves to the key named
/// by its fragment, so `did:example:123#<kid>` addresses the same key.
#[derive(Debug, Default)]
pub struct LocalKms {
    keys: Mutex<HashMap<String, PrivateKey>>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import an existing P-256 key under `kid`.
    pub fn import_p256(&self, kid: impl Into<String>, key: p256::ecdsa::SigningKey) -> Result<()> {
        self.insert(kid.into(), PrivateKey::P256(key))
    }

    fn insert(&self, kid: String, key: PrivateKey) -> Result<()> {
        self.keys
            .lock()
            .map_err(|_| anyhow!("key store lock poisoned"))?
            .insert(kid, key);
        Ok(())
    }

    fn key(&self, key_id: &str) -> Result<PrivateKey> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| anyhow!("key store lock poisoned"))?;

        keys.get(key_id)
            .or_else(|| {
                key_id
                    .split_once('#')
                    .and_then(|(_, fragment)| keys.get(fragment))
            })
            .cloned()
            .with_context(|| format!("key '{key_id}' not found"))
    }
}

#[async_trait]
impl Crypto for LocalKms {
    async fn sign(&self, msg: &[u8], key_id: &str) -> Result<Vec<u8>> {
        Ok(self.key(key_id)?.sign(msg))
    }

    async fn verify(&self, signature: &[u8], msg: &[u8], key_id: &str) -> Result<()> {
        let key = self.key(key_id)?;
        verify_signature(&key.public_jwk()?, key.alg(), msg, signature)
    }
}

#[async_trait]
impl KeyWriter for LocalKms {
    async fn create(&self, key_type: KeyType) -> Result<Jwk> {
        let key = match key_type {
            KeyType::P256 => {
                PrivateKey::P256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
            }
            KeyType::Ed25519 => {
                PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
            }
        };
        let kid = random_token(16);
        let jwk = key.public_jwk()?.set_kid(kid.clone());
        self.insert(kid, key)?;
        Ok(jwk)
    }
}

#[async_trait]
impl KeyReader for LocalKms {
    async fn export_pub_key(&self, key_id: &str) -> Result<Jwk> {
        Ok(self.key(key_id)?.public_jwk()?.set_kid(key_id))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn sign_and_verify_through_did_url() {
        let kms = LocalKms::new();
        for key_type in [KeyType::P256, KeyType::Ed25519] {
            let jwk = kms.create(key_type).await.unwrap();
            let kid = jwk.kid.clone().unwrap();
            let vm_id = format!("did:example:holder#{kid}");

            let sig = kms.sign(b"message", &vm_id).await.unwrap();
            kms.verify(&sig, b"message", &kid).await.unwrap();
            assert!(kms.verify(&sig, b"other", &vm_id).await.is_err());
            assert_eq!(kms.export_pub_key(&kid).await.unwrap().x, jwk.x);
        }
    }

    #[tokio::test]
    async fn unknown_key() {
        assert!(LocalKms::new().sign(b"message", "missing").await.is_err());
    }
}
