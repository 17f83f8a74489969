//! OpenID for Verifiable Credential Issuance, wallet side.
//!
//! An [Interaction] is created from an issuance initiation URI and obtains
//! credentials through either the pre-authorized code grant or the
//! authorization code grant (with PKCE).

use std::sync::Arc;

use anyhow::Context;

use crate::{
    activity::Activity,
    api::{Crypto, DidResolver},
    config::BaseUrl,
    core::{
        credential::Credential,
        did::VerificationMethod,
        jwt::JwsSigner,
        util::{default_client, new_trace_id, Body, HttpRequester},
    },
    error::{Error, ErrorKind, Result, WithKind},
    metrics::Timer,
    utils::{now, random_token},
};

use self::{
    authorization::{authorization_code, authorization_url, PendingAuthorization, Pkce},
    credential_request::{
        CredentialRequest, CredentialResponse, Proof, ProofClaims, PROOF_JWT_TYP,
    },
    metadata::{
        IssuerMetadata, OpenIdConfig, CREDENTIAL_ISSUER_WELL_KNOWN,
        OPENID_CONFIGURATION_WELL_KNOWN,
    },
    offer::{
        AuthorizationCodeGrantParams, CredentialOffer, IssuanceInitiation, OfferIndirection,
        OfferedCredential, OfferedCredentialObject, PreAuthorizedCodeGrantParams,
    },
    token::{TokenRequest, TokenResponse},
};

pub use self::opts::{
    CreateAuthorizationUrlOpts, InteractionArgs, InteractionOpts, RequestCredentialOpts,
};

pub mod authorization;
pub mod credential_request;
pub mod metadata;
pub mod offer;
pub mod opts;
pub mod token;

pub const ISSUANCE_OPERATION: &str = "oidc-issuance";

const NEW_INTERACTION_EVENT: &str = "New interaction";
const REQUEST_CREDENTIAL_EVENT: &str = "Request credential";

/// Progress of an issuance [Interaction].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    Created,
    MetadataResolved,
    AuthorizationUrlIssued,
    TokenObtained,
    CredentialsRequested,
    /// The last operation failed. Does not prevent a retry.
    Failed(ErrorKind),
}

/// One credential issuance exchange with one issuer.
pub struct Interaction {
    offer: CredentialOffer,
    crypto: Arc<dyn Crypto>,
    did_resolver: Arc<dyn DidResolver>,
    opts: InteractionOpts,
    http: HttpRequester,
    trace_id: Option<String>,
    issuer_metadata: Option<IssuerMetadata>,
    openid_config: Option<OpenIdConfig>,
    pending_authorization: Option<PendingAuthorization>,
    state: IssuanceState,
}

impl Interaction {
    /// Parse the initiation URI, fetching the offer if it is passed by
    /// reference.
    pub async fn new(args: InteractionArgs, opts: InteractionOpts) -> Result<Self> {
        if args.initiate_issuance_uri.trim().is_empty() {
            return Err(Error::msg(
                ErrorKind::InvalidArgument,
                "initiate issuance URI must not be empty",
            ));
        }

        let timer = Timer::start(NEW_INTERACTION_EVENT, "");

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

        let initiation = IssuanceInitiation::from_uri(&args.initiate_issuance_uri)
            .with_kind(ErrorKind::InvalidIssuanceUri)?;

        let offer = match initiation.offer_indirection {
            OfferIndirection::ByValue(offer) => CredentialOffer::from_json(offer.as_bytes())
                .with_kind(ErrorKind::InvalidCredentialOffer)?,
            OfferIndirection::ByReference(url) => {
                let bytes = http
                    .get(
                        url.as_str(),
                        &format!("Fetch credential offer via an HTTP GET request to {url}"),
                        NEW_INTERACTION_EVENT,
                    )
                    .await
                    .context("failed to fetch credential offer")
                    .with_kind(ErrorKind::CredentialOfferFetchFailed)?;
                CredentialOffer::from_json(&bytes).with_kind(ErrorKind::InvalidCredentialOffer)?
            }
        };

        tracing::debug!(
            "credential offer from {} for {} credential(s)",
            offer.credential_issuer,
            offer.credentials.len()
        );

        timer
            .finish(http.metrics())
            .with_kind(ErrorKind::LoggingFailed)?;

        Ok(Self {
            offer,
            crypto: args.crypto,
            did_resolver: args.did_resolver,
            opts,
            http,
            trace_id,
            issuer_metadata: None,
            openid_config: None,
            pending_authorization: None,
            state: IssuanceState::Created,
        })
    }

    pub fn state(&self) -> IssuanceState {
        self.state
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.state = IssuanceState::Failed(e.kind());
        }
        result
    }

    pub fn issuer_uri(&self) -> &str {
        &self.offer.credential_issuer
    }

    pub fn offered_credentials(&self) -> &[OfferedCredential] {
        &self.offer.credentials
    }

    /// The trace id sent in the `traceparent` header of every request, unless
    /// OpenTelemetry was disabled.
    pub fn otel_trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn pre_authorized_code_grant_type_supported(&self) -> bool {
        self.offer.grants.pre_authorized_code.is_some()
    }

    pub fn pre_authorized_code_grant_params(&self) -> Result<PreAuthorizedCodeGrantParams> {
        self.offer
            .grants
            .pre_authorized_code
            .as_ref()
            .map(Into::into)
            .ok_or_else(|| {
                Error::msg(
                    ErrorKind::UnsupportedGrantType,
                    "issuer does not support the pre-authorized code grant",
                )
            })
    }

    pub fn authorization_code_grant_type_supported(&self) -> bool {
        self.offer.grants.authorization_code.is_some()
    }

    pub fn authorization_code_grant_params(&self) -> Result<AuthorizationCodeGrantParams> {
        self.offer
            .grants
            .authorization_code
            .as_ref()
            .map(Into::into)
            .ok_or_else(|| {
                Error::msg(
                    ErrorKind::UnsupportedGrantType,
                    "issuer does not support the authorization code grant",
                )
            })
    }

    /// Whether the issuer's authorization server advertises a registration
    /// endpoint.
    pub async fn dynamic_client_registration_supported(&mut self) -> Result<bool> {
        let result = self
            .openid_config("")
            .await
            .map(|config| config.registration_endpoint.is_some());
        self.track(result)
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> Result<String> {
        let result = match self.openid_config("").await {
            Ok(config) => config.registration_endpoint.clone().ok_or_else(|| {
                Error::msg(
                    ErrorKind::InvalidSdkUsage,
                    "issuer does not support dynamic client registration",
                )
            }),
            Err(e) => Err(e),
        };
        self.track(result)
    }

    /// The issuer's metadata, fetched on first use.
    pub async fn issuer_metadata(&mut self) -> Result<&IssuerMetadata> {
        if let Err(e) = self.resolve_metadata("").await {
            self.state = IssuanceState::Failed(e.kind());
            return Err(e);
        }
        self.issuer_metadata
            .as_ref()
            .ok_or_else(|| Error::msg(ErrorKind::IssuerMetadataFetchFailed, "metadata missing"))
    }

    async fn resolve_metadata(&mut self, parent_event: &str) -> Result<IssuerMetadata> {
        if let Some(metadata) = &self.issuer_metadata {
            return Ok(metadata.clone());
        }

        let url = BaseUrl::try_from(self.offer.credential_issuer.clone())
            .and_then(|base| base.well_known(CREDENTIAL_ISSUER_WELL_KNOWN))
            .context("credential issuer is not a valid URL")
            .with_kind(ErrorKind::IssuerMetadataFetchFailed)?;

        let bytes = self
            .http
            .get(
                url.as_str(),
                &format!("Fetch issuer metadata via an HTTP GET request to {url}"),
                parent_event,
            )
            .await
            .context("failed to get issuer metadata")
            .with_kind(ErrorKind::IssuerMetadataFetchFailed)?;
        let metadata =
            IssuerMetadata::from_json(&bytes).with_kind(ErrorKind::IssuerMetadataFetchFailed)?;

        tracing::debug!("resolved metadata of {}", metadata.credential_issuer);

        self.issuer_metadata = Some(metadata.clone());
        if self.state == IssuanceState::Created {
            self.state = IssuanceState::MetadataResolved;
        }
        Ok(metadata)
    }

    async fn openid_config(&mut self, parent_event: &str) -> Result<&OpenIdConfig> {
        if self.openid_config.is_none() {
            let issuer = self
                .issuer_metadata
                .as_ref()
                .and_then(|metadata| metadata.authorization_server.clone())
                .unwrap_or_else(|| self.offer.credential_issuer.clone());

            let config = self
                .fetch_openid_config(issuer, parent_event)
                .await
                .context("failed to fetch issuer's OpenID configuration")
                .with_kind(ErrorKind::IssuerOpenIdConfigFetchFailed)?;
            self.openid_config = Some(config);
        }

        self.openid_config.as_ref().ok_or_else(|| {
            Error::msg(
                ErrorKind::IssuerOpenIdConfigFetchFailed,
                "OpenID configuration missing",
            )
        })
    }

    async fn fetch_openid_config(
        &self,
        issuer: String,
        parent_event: &str,
    ) -> anyhow::Result<OpenIdConfig> {
        let url = BaseUrl::try_from(issuer)?.well_known(OPENID_CONFIGURATION_WELL_KNOWN)?;
        let bytes = self
            .http
            .get(
                url.as_str(),
                &format!("Fetch issuer's OpenID configuration via an HTTP GET request to {url}"),
                parent_event,
            )
            .await
            .context("openid configuration endpoint")?;
        OpenIdConfig::from_json(&bytes)
    }

    async fn token_endpoint(&mut self, parent_event: &str) -> Result<String> {
        let metadata = self.resolve_metadata(parent_event).await?;
        if let Some(endpoint) = metadata.token_endpoint {
            return Ok(endpoint);
        }

        self.openid_config(parent_event)
            .await?
            .token_endpoint
            .clone()
            .ok_or_else(|| Error::msg(ErrorKind::TokenFetchFailed, "issuer has no token endpoint"))
    }

    async fn fetch_token(&self, endpoint: &str, request: TokenRequest) -> Result<TokenResponse> {
        let form = request.to_form().with_kind(ErrorKind::TokenFetchFailed)?;

        tracing::debug!("requesting token with grant type {}", request.grant_type());

        let bytes = self
            .http
            .post(
                endpoint,
                None,
                Body::Form(form),
                &format!("Fetch token via an HTTP POST request to {endpoint}"),
                REQUEST_CREDENTIAL_EVENT,
            )
            .await
            .context("failed to get token")
            .with_kind(ErrorKind::TokenFetchFailed)?;

        TokenResponse::from_json(&bytes).with_kind(ErrorKind::TokenFetchFailed)
    }

    fn check_algorithm(vm: &VerificationMethod) -> Result<()> {
        match vm.algorithm() {
            Some(_) => Ok(()),
            None => Err(Error::msg(
                ErrorKind::UnsupportedAlgorithm,
                format!("unsupported verification method type '{}'", vm.key_type),
            )),
        }
    }

    /// Build the authorization URL the user must visit for the authorization
    /// code grant.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        opts: CreateAuthorizationUrlOpts,
    ) -> Result<String> {
        let result = self
            .create_authorization_url_inner(client_id, redirect_uri, opts)
            .await;
        self.track(result)
    }

    async fn create_authorization_url_inner(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        opts: CreateAuthorizationUrlOpts,
    ) -> Result<String> {
        let Some(grant) = self.offer.grants.authorization_code.clone() else {
            return Err(Error::msg(
                ErrorKind::UnsupportedGrantType,
                "issuer does not support the authorization code grant type",
            ));
        };

        let offered = self.resolve_offered("").await?;

        let authorization_endpoint = self
            .openid_config("")
            .await?
            .authorization_endpoint
            .clone()
            .ok_or_else(|| {
                Error::msg(
                    ErrorKind::IssuerOpenIdConfigFetchFailed,
                    "issuer's OpenID configuration has no authorization endpoint",
                )
            })?;

        let pending = PendingAuthorization {
            pkce: Pkce::generate(),
            state: random_token(16),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        };

        let issuer_state = opts.issuer_state.or(grant.issuer_state);
        let url = authorization_url(
            &authorization_endpoint,
            &pending,
            &offered,
            &opts.scopes,
            issuer_state.as_deref(),
        )
        .with_kind(ErrorKind::InvalidArgument)?;

        self.pending_authorization = Some(pending);
        self.state = IssuanceState::AuthorizationUrlIssued;

        Ok(url)
    }

    /// Obtain the offered credentials through the pre-authorized code grant.
    pub async fn request_credential_with_pre_auth(
        &mut self,
        vm: &VerificationMethod,
        opts: RequestCredentialOpts,
    ) -> Result<Vec<Credential>> {
        let result = self.request_with_pre_auth(vm, opts).await;
        self.track(result)
    }

    async fn request_with_pre_auth(
        &mut self,
        vm: &VerificationMethod,
        opts: RequestCredentialOpts,
    ) -> Result<Vec<Credential>> {
        let timer = Timer::start(REQUEST_CREDENTIAL_EVENT, "");

        Self::check_algorithm(vm)?;

        let Some(grant) = self.offer.grants.pre_authorized_code.clone() else {
            return Err(Error::msg(
                ErrorKind::UnsupportedGrantType,
                "issuer does not support the pre-authorized code grant type",
            ));
        };

        let pin = opts.pin.filter(|pin| !pin.is_empty());
        if PreAuthorizedCodeGrantParams::from(&grant).pin_required() && pin.is_none() {
            return Err(Error::msg(
                ErrorKind::PinRequired,
                "PIN required (per grant parameters)",
            ));
        }

        let endpoint = self.token_endpoint(REQUEST_CREDENTIAL_EVENT).await?;
        let token = self
            .fetch_token(
                &endpoint,
                TokenRequest::pre_authorized(grant.pre_authorized_code, pin.as_deref()),
            )
            .await?;
        self.state = IssuanceState::TokenObtained;

        let credentials = self.request_credentials(vm, &token).await?;

        timer
            .finish(self.http.metrics())
            .with_kind(ErrorKind::LoggingFailed)?;

        Ok(credentials)
    }

    /// Obtain the offered credentials with the authorization code carried by
    /// `redirect_uri_with_code`. Requires [Self::create_authorization_url] to
    /// have been called first.
    pub async fn request_credential_with_auth(
        &mut self,
        vm: &VerificationMethod,
        redirect_uri_with_code: &str,
    ) -> Result<Vec<Credential>> {
        let result = self.request_with_auth(vm, redirect_uri_with_code).await;
        self.track(result)
    }

    async fn request_with_auth(
        &mut self,
        vm: &VerificationMethod,
        redirect_uri_with_code: &str,
    ) -> Result<Vec<Credential>> {
        let timer = Timer::start(REQUEST_CREDENTIAL_EVENT, "");

        let Some(pending) = self.pending_authorization.clone() else {
            return Err(Error::msg(
                ErrorKind::InvalidSdkUsage,
                "authorization URL must be created first",
            ));
        };

        Self::check_algorithm(vm)?;

        let code = authorization_code(redirect_uri_with_code, &pending.state)
            .with_kind(ErrorKind::InvalidRedirectUri)?;

        let endpoint = self.token_endpoint(REQUEST_CREDENTIAL_EVENT).await?;
        let token = self
            .fetch_token(
                &endpoint,
                TokenRequest::AuthorizationCode {
                    code,
                    redirect_uri: pending.redirect_uri,
                    client_id: pending.client_id,
                    code_verifier: pending.pkce.verifier,
                },
            )
            .await?;
        self.state = IssuanceState::TokenObtained;

        let credentials = self.request_credentials(vm, &token).await?;

        timer
            .finish(self.http.metrics())
            .with_kind(ErrorKind::LoggingFailed)?;

        Ok(credentials)
    }

    async fn resolve_offered(
        &mut self,
        parent_event: &str,
    ) -> Result<Vec<OfferedCredentialObject>> {
        let metadata = self.resolve_metadata(parent_event).await?;
        self.offer
            .credentials
            .iter()
            .map(|offered| metadata.resolve_offered(offered))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_kind(ErrorKind::InvalidCredentialOffer)
    }

    async fn request_credentials(
        &mut self,
        vm: &VerificationMethod,
        token: &TokenResponse,
    ) -> Result<Vec<Credential>> {
        let offered = self.resolve_offered(REQUEST_CREDENTIAL_EVENT).await?;
        let metadata = self.resolve_metadata(REQUEST_CREDENTIAL_EVENT).await?;

        let signer = JwsSigner::new(self.crypto.as_ref(), vm).ok_or_else(|| {
            Error::msg(
                ErrorKind::UnsupportedAlgorithm,
                format!("unsupported verification method type '{}'", vm.key_type),
            )
        })?;

        let mut nonce = token.c_nonce.clone();
        let mut credentials = Vec::new();

        for credential in &offered {
            let claims = ProofClaims {
                iss: self.opts.client_id.clone(),
                aud: self.offer.credential_issuer.clone(),
                iat: now(),
                nonce: nonce.clone(),
            };
            let jwt = signer
                .sign(PROOF_JWT_TYP, &claims)
                .await
                .with_kind(ErrorKind::JwtSigningFailed)?;

            let body = serde_json::to_vec(&CredentialRequest::new(credential, Proof::jwt(jwt)))
                .map_err(|e| Error::new(ErrorKind::CredentialFetchFailed, e))?;

            let endpoint = &metadata.credential_endpoint;
            let bytes = self
                .http
                .post(
                    endpoint,
                    Some(&token.access_token),
                    Body::Json(body),
                    &format!("Fetch credential via an HTTP POST request to {endpoint}"),
                    REQUEST_CREDENTIAL_EVENT,
                )
                .await
                .context("failed to get credential response")
                .with_kind(ErrorKind::CredentialFetchFailed)?;

            let response =
                CredentialResponse::from_json(&bytes).with_kind(ErrorKind::CredentialFetchFailed)?;
            if let Some(c_nonce) = &response.c_nonce {
                nonce = Some(c_nonce.clone());
            }

            for value in response
                .into_credentials()
                .with_kind(ErrorKind::CredentialParseFailed)?
            {
                let credential =
                    Credential::parse(&value).with_kind(ErrorKind::CredentialParseFailed)?;
                credentials.push(credential);
            }
        }

        if !self.opts.disable_vc_proof_checks {
            for credential in &credentials {
                credential
                    .verify_proof(self.did_resolver.as_ref())
                    .await
                    .with_kind(ErrorKind::CredentialProofCheckFailed)?;
            }
        }
        if let Some(loader) = &self.opts.document_loader {
            for credential in &credentials {
                credential
                    .check_contexts(loader.as_ref())
                    .await
                    .with_kind(ErrorKind::CredentialParseFailed)?;
            }
        }

        let subject_ids = credentials
            .iter()
            .filter_map(|credential| credential.subject_id().map(str::to_string))
            .collect();
        self.opts
            .activity_logger
            .log(
                &Activity::success(self.offer.credential_issuer.as_str(), ISSUANCE_OPERATION)
                    .set_param("subjectIDs", subject_ids),
            )
            .with_kind(ErrorKind::LoggingFailed)?;

        self.state = IssuanceState::CredentialsRequested;

        tracing::debug!(
            "received {} credential(s) from {}",
            credentials.len(),
            self.offer.credential_issuer
        );

        Ok(credentials)
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interaction")
            .field("issuer", &self.offer.credential_issuer)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
