use std::{sync::Arc, time::Duration};

use http::{HeaderName, HeaderValue};

use crate::{
    activity::{ActivityLogger, NoopActivityLogger},
    api::{Crypto, DidResolver, DocumentLoader},
    config::HttpOpts,
    core::util::SharedHttpClient,
    metrics::{MetricsLogger, NoopMetricsLogger},
};

/// Everything an issuance interaction cannot run without.
#[derive(Clone)]
pub struct InteractionArgs {
    pub(crate) initiate_issuance_uri: String,
    pub(crate) crypto: Arc<dyn Crypto>,
    pub(crate) did_resolver: Arc<dyn DidResolver>,
}

impl InteractionArgs {
    pub fn new(
        initiate_issuance_uri: impl Into<String>,
        crypto: Arc<dyn Crypto>,
        did_resolver: Arc<dyn DidResolver>,
    ) -> Self {
        Self {
            initiate_issuance_uri: initiate_issuance_uri.into(),
            crypto,
            did_resolver,
        }
    }
}

/// Optional settings of an issuance interaction.
#[derive(Clone)]
pub struct InteractionOpts {
    pub(crate) client_id: Option<String>,
    pub(crate) activity_logger: Arc<dyn ActivityLogger>,
    pub(crate) metrics_logger: Arc<dyn MetricsLogger>,
    pub(crate) document_loader: Option<Arc<dyn DocumentLoader>>,
    pub(crate) http_client: Option<SharedHttpClient>,
    pub(crate) http: HttpOpts,
    pub(crate) disable_vc_proof_checks: bool,
    pub(crate) disable_open_telemetry: bool,
}

impl Default for InteractionOpts {
    fn default() -> Self {
        Self {
            client_id: None,
            activity_logger: Arc::new(NoopActivityLogger),
            metrics_logger: Arc::new(NoopMetricsLogger),
            document_loader: None,
            http_client: None,
            http: HttpOpts::default(),
            disable_vc_proof_checks: false,
            disable_open_telemetry: false,
        }
    }
}

impl InteractionOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client id used as `iss` of key proofs.
    pub fn set_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn set_activity_logger(mut self, logger: Arc<dyn ActivityLogger>) -> Self {
        self.activity_logger = logger;
        self
    }

    pub fn set_metrics_logger(mut self, logger: Arc<dyn MetricsLogger>) -> Self {
        self.metrics_logger = logger;
        self
    }

    /// Loader for the JSON-LD contexts of received credentials. Without one,
    /// contexts are not loaded.
    pub fn set_document_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.document_loader = Some(loader);
        self
    }

    /// Replace the default HTTP client. The TLS switch has no effect on a
    /// client supplied here.
    pub fn set_http_client(mut self, client: SharedHttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn add_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.http = self.http.add_header(name, value);
        self
    }

    /// A zero duration disables the timeout.
    pub fn set_http_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.set_timeout(timeout);
        self
    }

    pub fn disable_tls_verify(mut self) -> Self {
        self.http = self.http.disable_tls_verify();
        self
    }

    /// Accept credentials without checking their issuer signature.
    pub fn disable_vc_proof_checks(mut self) -> Self {
        self.disable_vc_proof_checks = true;
        self
    }

    /// Do not send a `traceparent` header.
    pub fn disable_open_telemetry(mut self) -> Self {
        self.disable_open_telemetry = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestCredentialOpts {
    pub(crate) pin: Option<String>,
}

impl RequestCredentialOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateAuthorizationUrlOpts {
    pub(crate) scopes: Vec<String>,
    pub(crate) issuer_state: Option<String>,
}

impl CreateAuthorizationUrlOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Overrides the `issuer_state` of the offer's authorization code grant.
    pub fn set_issuer_state(mut self, issuer_state: impl Into<String>) -> Self {
        self.issuer_state = Some(issuer_state.into());
        self
    }
}
