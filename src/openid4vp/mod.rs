//! OpenID for Verifiable Presentations, wallet side.
//!
//! An [Interaction] fetches and verifies a verifier's signed request object,
//! exposes its presentation definition, and answers it with an ID token and a
//! VP token signed by the presenting holders.

use std::sync::Arc;

use anyhow::Context;

use crate::{
    activity::Activity,
    api::{Crypto, DidResolver},
    core::{
        credential::Credential,
        jwt::JwsVerifier,
        presentation_definition::PresentationDefinition,
        util::{default_client, new_trace_id, Body, HttpRequester},
    },
    error::{Error, ErrorKind, Result, WithKind},
    metrics::Timer,
};

use self::{
    request_object::{RequestIndirection, RequestObject, VerifierDisplayData},
    response::create_authorized_response,
};

pub use self::opts::{IdTokenSignerPolicy, Opts};

pub mod opts;
pub mod request_object;
pub mod response;

pub const PRESENTATION_OPERATION: &str = "oidc-presentation";

const GET_QUERY_EVENT: &str = "Get query";
const PRESENT_CREDENTIAL_EVENT: &str = "Present credential";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationState {
    Created,
    QueryReady,
    Presented,
    Failed(ErrorKind),
}

/// One presentation exchange with one verifier.
pub struct Interaction {
    authorization_request: String,
    crypto: Arc<dyn Crypto>,
    did_resolver: Arc<dyn DidResolver>,
    opts: Opts,
    http: HttpRequester,
    trace_id: Option<String>,
    request_object: Option<RequestObject>,
    state: PresentationState,
}

impl Interaction {
    /// `authorization_request` is `openid-vc://?request_uri=...`,
    /// `openid-vc://?request=...` or the request object JWS itself.
    pub fn new(
        authorization_request: impl Into<String>,
        crypto: Arc<dyn Crypto>,
        did_resolver: Arc<dyn DidResolver>,
        opts: Opts,
    ) -> Result<Self> {
        let authorization_request = authorization_request.into();
        if authorization_request.trim().is_empty() {
            return Err(Error::msg(
                ErrorKind::InvalidArgument,
                "authorization request must not be empty",
            ));
        }

        let client = match &opts.http_client {
            Some(client) => client.clone(),
            None => default_client(&opts.http).with_kind(ErrorKind::InvalidArgument)?,
        };
        let trace_id = (!opts.disable_open_telemetry).then(new_trace_id);
        let http = HttpRequester::new(
            client,
            opts.http.clone(),
            trace_id.clone(),
            opts.metrics_logger.clone(),
        );

        Ok(Self {
            authorization_request,
            crypto,
            did_resolver,
            opts,
            http,
            trace_id,
            request_object: None,
            state: PresentationState::Created,
        })
    }

    pub fn state(&self) -> PresentationState {
        self.state
    }

    pub fn otel_trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.state = PresentationState::Failed(e.kind());
        }
        result
    }

    /// Fetch and verify the request object, returning the presentation
    /// definition the verifier asks to be satisfied.
    pub async fn get_query(&mut self) -> Result<PresentationDefinition> {
        let result = self.get_query_inner().await;
        self.track(result)
    }

    async fn get_query_inner(&mut self) -> Result<PresentationDefinition> {
        let timer = Timer::start(GET_QUERY_EVENT, "");

        let jws = self
            .fetch_request_object()
            .await
            .context("fetch request object")
            .with_kind(ErrorKind::RequestObjectFetchFailed)?;

        let request = self
            .verify_request_object(&jws)
            .await
            .context("verify authorization request")
            .with_kind(ErrorKind::VerifyAuthorizationRequestFailed)?;

        let definition = request
            .presentation_definition()
            .cloned()
            .ok_or_else(|| {
                Error::msg(
                    ErrorKind::VerifyAuthorizationRequestFailed,
                    "request object carries no presentation definition",
                )
            })?;

        tracing::debug!(
            "request object from {} asks for definition '{}'",
            request.client_id,
            definition.id()
        );

        self.request_object = Some(request);
        self.state = PresentationState::QueryReady;

        timer
            .finish(self.http.metrics())
            .with_kind(ErrorKind::LoggingFailed)?;

        Ok(definition)
    }

    async fn fetch_request_object(&self) -> anyhow::Result<String> {
        match RequestIndirection::parse(&self.authorization_request)? {
            RequestIndirection::ByValue(jws) => Ok(jws),
            RequestIndirection::ByReference(url) => {
                let bytes = self
                    .http
                    .get(
                        url.as_str(),
                        &format!("Fetch request object via an HTTP GET request to {url}"),
                        GET_QUERY_EVENT,
                    )
                    .await?;
                let jws = String::from_utf8(bytes).context("request object was not UTF-8")?;
                Ok(jws.trim().to_string())
            }
        }
    }

    async fn verify_request_object(&self, jws: &str) -> anyhow::Result<RequestObject> {
        let (header, claims) = JwsVerifier::new(self.did_resolver.as_ref())
            .verify(jws)
            .await
            .context("parse JWT")?;
        let request = RequestObject::from_claims(claims).context("decode claims")?;

        // A DID client must have signed its own request.
        let kid = header.kid.as_deref().unwrap_or_default();
        let signer = kid.split_once('#').map_or(kid, |(did, _)| did);
        if request.client_id.starts_with("did:") && request.client_id != signer {
            anyhow::bail!(
                "request object for '{}' was signed by '{kid}'",
                request.client_id
            )
        }
        Ok(request)
    }

    fn request_object(&self) -> Result<&RequestObject> {
        self.request_object.as_ref().ok_or_else(|| {
            Error::msg(ErrorKind::NotInitializedProperly, "call get_query first")
        })
    }

    /// Display information about the verifier. Requires [Self::get_query].
    pub fn verifier_display_data(&self) -> Result<VerifierDisplayData> {
        self.request_object().map(VerifierDisplayData::from)
    }

    /// Present `credentials` to the verifier's redirect URI. Requires
    /// [Self::get_query].
    pub async fn present_credential(&mut self, credentials: &[Credential]) -> Result<()> {
        let result = self.present_credential_inner(credentials).await;
        self.track(result)
    }

    async fn present_credential_inner(&mut self, credentials: &[Credential]) -> Result<()> {
        let timer = Timer::start(PRESENT_CREDENTIAL_EVENT, "");

        let request = self.request_object()?;

        if let Some(loader) = &self.opts.document_loader {
            for credential in credentials {
                credential
                    .check_contexts(loader.as_ref())
                    .await
                    .context("create authorized response failed")
                    .with_kind(ErrorKind::CreateAuthorizedResponseFailed)?;
            }
        }

        let response = create_authorized_response(
            credentials,
            request,
            self.did_resolver.as_ref(),
            self.crypto.as_ref(),
            self.opts.id_token_signer,
        )
        .await
        .context("create authorized response failed")
        .with_kind(ErrorKind::CreateAuthorizedResponseFailed)?;

        let form = response
            .to_form()
            .with_kind(ErrorKind::CreateAuthorizedResponseFailed)?;

        let redirect_uri = &request.redirect_uri;
        self.http
            .post(
                redirect_uri,
                None,
                Body::Form(form),
                &format!("Send authorized response via an HTTP POST request to {redirect_uri}"),
                PRESENT_CREDENTIAL_EVENT,
            )
            .await
            .context("send authorized response failed")
            .with_kind(ErrorKind::SendAuthorizedResponseFailed)?;

        timer
            .finish(self.http.metrics())
            .with_kind(ErrorKind::LoggingFailed)?;

        self.opts
            .activity_logger
            .log(&Activity::success(
                request.client_name(),
                PRESENTATION_OPERATION,
            ))
            .with_kind(ErrorKind::LoggingFailed)?;

        self.state = PresentationState::Presented;

        Ok(())
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
