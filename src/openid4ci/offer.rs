use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::core::credential_format::ClaimFormatDesignation;

pub const PRE_AUTHORIZED_CODE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:pre-authorized_code";
pub const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";

/// A credential offer, passed by value or by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OfferIndirection {
    #[serde(rename = "credential_offer")]
    ByValue(String),
    #[serde(rename = "credential_offer_uri")]
    ByReference(Url),
}

/// The query of an issuance initiation URI, e.g.
/// `openid-credential-offer://?credential_offer=...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceInitiation {
    #[serde(flatten)]
    pub offer_indirection: OfferIndirection,
}

impl IssuanceInitiation {
    /// Parse an initiation URI. The scheme is not checked.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).context("issuance URI is not a valid URI")?;
        let query = url
            .query()
            .ok_or(anyhow!("missing query params in issuance URI"))?;
        serde_urlencoded::from_str(query)
            .context("issuance URI has neither 'credential_offer' nor 'credential_offer_uri'")
    }
}

/// A Credential Offer object, as sent by the issuer to start issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub credential_issuer: String,
    /// Offered credentials, by `credential_configuration_ids` or the older
    /// `credentials` array.
    #[serde(alias = "credential_configuration_ids")]
    pub credentials: Vec<OfferedCredential>,
    #[serde(default)]
    pub grants: Grants,
}

impl CredentialOffer {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("unable to parse credential offer")
    }
}

/// An offered credential: an id into the issuer's supported credentials, or
/// an inline `{format, types}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OfferedCredential {
    Id(String),
    Object(OfferedCredentialObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferedCredentialObject {
    pub format: ClaimFormatDesignation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<Json>,
}

impl OfferedCredentialObject {
    /// `types`, falling back to `credential_definition.type`.
    pub fn types(&self) -> Vec<String> {
        if !self.types.is_empty() {
            return self.types.clone();
        }
        crate::utils::string_or_array(
            self.credential_definition
                .as_ref()
                .and_then(|definition| definition.get("type")),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(default)]
    pub user_pin_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
}

/// Describes the transaction code (PIN) the user must enter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

/// What the wallet must supply for the pre-authorized code grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrantParams {
    pin_required: bool,
    tx_code: Option<TxCode>,
}

impl PreAuthorizedCodeGrantParams {
    pub fn pin_required(&self) -> bool {
        self.pin_required
    }

    pub fn tx_code(&self) -> Option<&TxCode> {
        self.tx_code.as_ref()
    }
}

impl From<&PreAuthorizedCodeGrant> for PreAuthorizedCodeGrantParams {
    fn from(grant: &PreAuthorizedCodeGrant) -> Self {
        Self {
            // A tx_code object means a code is expected.
            pin_required: grant.user_pin_required || grant.tx_code.is_some(),
            tx_code: grant.tx_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCodeGrantParams {
    issuer_state: Option<String>,
}

impl AuthorizationCodeGrantParams {
    pub fn has_issuer_state(&self) -> bool {
        self.issuer_state.is_some()
    }

    pub fn issuer_state(&self) -> Option<&str> {
        self.issuer_state.as_deref()
    }
}

impl From<&AuthorizationCodeGrant> for AuthorizationCodeGrantParams {
    fn from(grant: &AuthorizationCodeGrant) -> Self {
        Self {
            issuer_state: grant.issuer_state.clone(),
        }
    }
}
