//! Matching held credentials against a verifier's presentation definition.

use std::sync::Arc;

use anyhow::Context;

use crate::{
    api::{CredentialReader, DocumentLoader},
    core::{
        credential::Credential,
        presentation::Presentation,
        presentation_definition::{MatchError, PresentationDefinition},
        submission_requirement::MatchedSubmissionRequirement,
    },
    error::{Error, ErrorKind, Result, WithKind},
};

/// The credentials a query is evaluated against. A non-empty list takes
/// precedence over the reader.
#[derive(Clone, Default)]
pub struct CredentialsArg {
    credentials: Vec<Credential>,
    reader: Option<Arc<dyn CredentialReader>>,
}

impl CredentialsArg {
    pub fn list(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            reader: None,
        }
    }

    pub fn reader(reader: Arc<dyn CredentialReader>) -> Self {
        Self {
            credentials: Vec::new(),
            reader: Some(reader),
        }
    }

    pub fn set_reader(mut self, reader: Arc<dyn CredentialReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    async fn resolve(self) -> Result<Vec<Credential>> {
        if !self.credentials.is_empty() {
            return Ok(self.credentials);
        }

        match self.reader {
            Some(reader) => reader
                .get_all()
                .await
                .context("credential reader failed")
                .with_kind(ErrorKind::CredentialReaderFailed),
            None => Err(Error::msg(
                ErrorKind::InvalidArgument,
                "either a credential list or a credential reader must be given",
            )),
        }
    }
}

#[derive(Clone, Default)]
pub struct InquirerOpts {
    document_loader: Option<Arc<dyn DocumentLoader>>,
}

impl InquirerOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the JSON-LD contexts of candidate credentials before matching.
    pub fn set_document_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.document_loader = Some(loader);
        self
    }
}

/// Evaluates presentation definitions (queries) against held credentials.
#[derive(Clone, Default)]
pub struct Inquirer {
    opts: InquirerOpts,
}

impl Inquirer {
    pub fn new(opts: InquirerOpts) -> Self {
        Self { opts }
    }

    fn parse_query(query: &[u8]) -> Result<PresentationDefinition> {
        let definition: PresentationDefinition = serde_json::from_slice(query)
            .context("unmarshal of presentation definition failed")
            .with_kind(ErrorKind::InvalidQuery)?;
        definition
            .validate()
            .context("validation of presentation definition failed")
            .with_kind(ErrorKind::InvalidQuery)?;
        Ok(definition)
    }

    async fn candidates(&self, credentials: CredentialsArg) -> Result<Vec<Credential>> {
        let candidates = credentials.resolve().await?;

        if let Some(loader) = &self.opts.document_loader {
            for credential in &candidates {
                credential
                    .check_contexts(loader.as_ref())
                    .await
                    .with_kind(ErrorKind::CredentialParseFailed)?;
            }
        }

        Ok(candidates)
    }

    /// Evaluate `query` and report, per submission requirement, which
    /// credentials match each input descriptor.
    pub async fn get_submission_requirements(
        &self,
        query: &[u8],
        credentials: CredentialsArg,
    ) -> Result<Vec<MatchedSubmissionRequirement>> {
        let definition = Self::parse_query(query)?;
        let candidates = self.candidates(credentials).await?;

        definition
            .match_submission_requirements(&candidates)
            .map_err(match_error)
    }

    /// Select the credentials answering `query` and build the presentation.
    pub async fn query(&self, query: &[u8], credentials: CredentialsArg) -> Result<Presentation> {
        let definition = Self::parse_query(query)?;
        let candidates = self.candidates(credentials).await?;

        definition.create_vp(&candidates).map_err(match_error)
    }
}

fn match_error(e: MatchError) -> Error {
    let kind = match e {
        MatchError::InvalidDefinition(_) => ErrorKind::InvalidQuery,
        _ => ErrorKind::NoCredentialsSatisfyQuery,
    };
    Error::new(kind, e)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::credential::test::unsigned_jwt;
    use async_trait::async_trait;
    use serde_json::json;

    fn credential(kind: &str) -> Credential {
        Credential::parse_str(&unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "sub": "did:example:holder",
            "vc": {
                "@context": ["https://www.w3.org/2018/credentials/v1"],
                "type": ["VerifiableCredential", kind],
                "credentialSubject": {"id": "did:example:holder"}
            }
        })))
        .unwrap()
    }

    fn query(kind: &str) -> Vec<u8> {
        json!({
            "id": "q1",
            "input_descriptors": [{
                "id": "d1",
                "constraints": {"fields": [{
                    "path": ["$.type"],
                    "filter": {"type": "array", "contains": {"const": kind}}
                }]}
            }]
        })
        .to_string()
        .into_bytes()
    }

    struct Reader(Vec<Credential>);

    #[async_trait]
    impl CredentialReader for Reader {
        async fn get(&self, id: &str) -> anyhow::Result<Option<Credential>> {
            Ok(self.0.iter().find(|c| c.id() == Some(id)).cloned())
        }

        async fn get_all(&self) -> anyhow::Result<Vec<Credential>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn list_takes_precedence_over_reader() {
        let inquirer = Inquirer::new(InquirerOpts::new());
        let reader = Arc::new(Reader(vec![credential("Other")]));

        let presentation = inquirer
            .query(
                &query("Degree"),
                CredentialsArg::list(vec![credential("Degree")]).set_reader(reader.clone()),
            )
            .await
            .unwrap();
        assert_eq!(presentation.credentials().len(), 1);

        let err = inquirer
            .query(&query("Degree"), CredentialsArg::reader(reader))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCredentialsSatisfyQuery);
    }

    #[tokio::test]
    async fn invalid_query() {
        let inquirer = Inquirer::default();

        let err = inquirer
            .get_submission_requirements(b"{}", CredentialsArg::list(vec![credential("Degree")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }

    #[tokio::test]
    async fn requirements_report_matches() {
        let requirements = Inquirer::default()
            .get_submission_requirements(
                &query("Degree"),
                CredentialsArg::list(vec![credential("Degree"), credential("Other")]),
            )
            .await
            .unwrap();

        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].descriptors[0].matched.len(), 1);
    }
}
