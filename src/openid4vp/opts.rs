use std::{sync::Arc, time::Duration};

use http::{HeaderName, HeaderValue};

use crate::{
    activity::{ActivityLogger, NoopActivityLogger},
    api::DocumentLoader,
    config::HttpOpts,
    core::util::SharedHttpClient,
    metrics::{MetricsLogger, NoopMetricsLogger},
};

/// Which holder signs the ID token when credentials of several holders are
/// presented together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdTokenSignerPolicy {
    /// Uniformly at random among the presenting holders.
    #[default]
    Random,
    /// The holder of the first presentation.
    FirstHolder,
}

/// Optional settings of a presentation interaction.
#[derive(Clone)]
pub struct Opts {
    pub(crate) activity_logger: Arc<dyn ActivityLogger>,
    pub(crate) metrics_logger: Arc<dyn MetricsLogger>,
    pub(crate) document_loader: Option<Arc<dyn DocumentLoader>>,
    pub(crate) http_client: Option<SharedHttpClient>,
    pub(crate) http: HttpOpts,
    pub(crate) disable_open_telemetry: bool,
    pub(crate) id_token_signer: IdTokenSignerPolicy,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            activity_logger: Arc::new(NoopActivityLogger),
            metrics_logger: Arc::new(NoopMetricsLogger),
            document_loader: None,
            http_client: None,
            http: HttpOpts::default(),
            disable_open_telemetry: false,
            id_token_signer: IdTokenSignerPolicy::default(),
        }
    }
}

impl Opts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_activity_logger(mut self, logger: Arc<dyn ActivityLogger>) -> Self {
        self.activity_logger = logger;
        self
    }

    pub fn set_metrics_logger(mut self, logger: Arc<dyn MetricsLogger>) -> Self {
        self.metrics_logger = logger;
        self
    }

    /// Used to load the JSON-LD contexts of the presented credentials.
    pub fn set_document_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.document_loader = Some(loader);
        self
    }

    pub fn set_http_client(mut self, client: SharedHttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn add_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.http = self.http.add_header(name, value);
        self
    }

    pub fn set_http_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.set_timeout(timeout);
        self
    }

    pub fn disable_tls_verify(mut self) -> Self {
        self.http = self.http.disable_tls_verify();
        self
    }

    pub fn disable_open_telemetry(mut self) -> Self {
        self.disable_open_telemetry = true;
        self
    }

    pub fn set_id_token_signer(mut self, policy: IdTokenSignerPolicy) -> Self {
        self.id_token_signer = policy;
        self
    }
}
