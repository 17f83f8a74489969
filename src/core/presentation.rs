use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{credential::Credential, presentation_submission::PresentationSubmission};

pub const CREDENTIALS_CONTEXT_V1: &str = "https://www.w3.org/2018/credentials/v1";
pub const PRESENTATION_SUBMISSION_CONTEXT_V1: &str =
    "https://identity.foundation/presentation-exchange/submission/v1";

/// A W3C verifiable presentation built from held credentials.
///
/// The credentials it was built from are kept alongside the JSON form, so the
/// signing holder can be recovered without re-parsing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Presentation {
    #[serde(rename = "@context")]
    context: Vec<String>,
    #[serde(rename = "type")]
    types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    holder: Option<String>,
    #[serde(rename = "verifiableCredential", default)]
    verifiable_credential: Vec<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presentation_submission: Option<PresentationSubmission>,
    #[serde(skip)]
    credentials: Vec<Credential>,
}

impl Presentation {
    pub fn new(credentials: Vec<Credential>, submission: Option<PresentationSubmission>) -> Self {
        Self {
            context: vec![
                CREDENTIALS_CONTEXT_V1.to_string(),
                PRESENTATION_SUBMISSION_CONTEXT_V1.to_string(),
            ],
            types: vec![
                "VerifiablePresentation".to_string(),
                "PresentationSubmission".to_string(),
            ],
            holder: None,
            verifiable_credential: credentials
                .iter()
                .map(Credential::to_presentation_value)
                .collect(),
            presentation_submission: submission,
            credentials,
        }
    }

    pub fn set_holder(mut self, holder: String) -> Self {
        self.holder = Some(holder);
        self
    }

    pub fn holder(&self) -> Option<&String> {
        self.holder.as_ref()
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// The `verifiableCredential` entries, in submission order.
    pub fn verifiable_credential(&self) -> &[Json] {
        &self.verifiable_credential
    }

    pub fn presentation_submission(&self) -> Option<&PresentationSubmission> {
        self.presentation_submission.as_ref()
    }

    /// Remove the embedded submission, e.g. to carry it in an ID token instead.
    pub fn take_presentation_submission(&mut self) -> Option<PresentationSubmission> {
        self.presentation_submission.take()
    }
}
