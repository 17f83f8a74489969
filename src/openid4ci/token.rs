use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::offer::{AUTHORIZATION_CODE_GRANT_TYPE, PRE_AUTHORIZED_CODE_GRANT_TYPE};

/// Form body of a token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "grant_type")]
pub enum TokenRequest {
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    PreAuthorizedCode {
        #[serde(rename = "pre-authorized_code")]
        pre_authorized_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_code: Option<String>,
        /// Pre-draft-13 name of `tx_code`.
        #[serde(skip_serializing_if = "Option::is_none")]
        user_pin: Option<String>,
    },
    #[serde(rename = "authorization_code")]
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        client_id: String,
        code_verifier: String,
    },
}

impl TokenRequest {
    pub fn pre_authorized(code: impl Into<String>, pin: Option<&str>) -> Self {
        Self::PreAuthorizedCode {
            pre_authorized_code: code.into(),
            tx_code: pin.map(str::to_string),
            user_pin: pin.map(str::to_string),
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::PreAuthorizedCode { .. } => PRE_AUTHORIZED_CODE_GRANT_TYPE,
            Self::AuthorizationCode { .. } => AUTHORIZATION_CODE_GRANT_TYPE,
        }
    }

    pub fn to_form(&self) -> Result<String> {
        serde_urlencoded::to_string(self).context("unable to encode token request")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<u64>,
}

impl TokenResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("unable to parse token response")
    }
}
