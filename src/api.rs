//! Capabilities the wallet core consumes but does not implement.
//!
//! Each trait is a single substitution point chosen when an interaction is
//! constructed. Reference implementations live in [crate::crypto],
//! [crate::activity], [crate::metrics] and [crate::core::util].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as Json;

use crate::core::{credential::Credential, jwk::Jwk};

pub use crate::{
    activity::{Activity, ActivityLogger},
    core::util::AsyncHttpClient,
    metrics::{MetricsEvent, MetricsLogger},
};

/// Resolves a DID to the bytes of its DID document (or DID resolution result).
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<Vec<u8>>;
}

/// Signing backend. Keys are referenced by identifier and never leave the backend.
///
/// `key_id` is the id of a DID verification method, e.g. `did:example:123#key-1`.
#[async_trait]
pub trait Crypto: Send + Sync {
    /// Sign `msg` with the key referenced by `key_id`. ECDSA signatures are
    /// returned in the fixed-size `r || s` form used by JWS.
    async fn sign(&self, msg: &[u8], key_id: &str) -> Result<Vec<u8>>;
    async fn verify(&self, signature: &[u8], msg: &[u8], key_id: &str) -> Result<()>;
}

/// The kind of key a [KeyWriter] should create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    P256,
    Ed25519,
}

#[async_trait]
pub trait KeyWriter: Send + Sync {
    /// Create a new key and return its public JWK, with `kid` set.
    async fn create(&self, key_type: KeyType) -> Result<Jwk>;
}

#[async_trait]
pub trait KeyReader: Send + Sync {
    async fn export_pub_key(&self, key_id: &str) -> Result<Jwk>;
}

/// A remote JSON-LD document, as returned by a [DocumentLoader].
#[derive(Debug, Clone, PartialEq)]
pub struct LdDocument {
    pub document_url: String,
    pub document: Json,
    pub context_url: Option<String>,
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<LdDocument>;
}

/// Source of held credentials for the credential matcher.
#[async_trait]
pub trait CredentialReader: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Credential>>;
    async fn get_all(&self) -> Result<Vec<Credential>>;
}
