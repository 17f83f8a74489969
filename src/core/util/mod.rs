use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use http::{header::CONTENT_TYPE, Method, Request, Response};

use crate::{
    config::HttpOpts,
    metrics::{MetricsLogger, Timer},
};

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header("Accept", "application/json")
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        Self::build(false)
    }

    /// A client that accepts any certificate presented by the server.
    pub fn without_tls_verify() -> Result<Self> {
        Self::build(true)
    }

    fn build(disable_tls_verify: bool) -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(disable_tls_verify)
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}

pub type SharedHttpClient = Arc<dyn AsyncHttpClient + Send + Sync>;

/// Builds the default client for `opts`.
pub(crate) fn default_client(opts: &HttpOpts) -> Result<SharedHttpClient> {
    let client = if opts.tls_verify_disabled() {
        ReqwestClient::without_tls_verify()?
    } else {
        ReqwestClient::new()?
    };
    Ok(Arc::new(client))
}

/// A W3C `traceparent` value for `trace_id` with a fresh span id.
pub(crate) fn traceparent(trace_id: &str) -> String {
    format!("00-{trace_id}-{:016x}-01", rand::random::<u64>())
}

pub(crate) fn new_trace_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Executes requests on behalf of one interaction: applies the configured
/// headers, trace header and timeout, rejects unsuccessful statuses and logs
/// one metrics event per call.
#[derive(Clone)]
pub(crate) struct HttpRequester {
    client: SharedHttpClient,
    opts: HttpOpts,
    trace_id: Option<String>,
    metrics: Arc<dyn MetricsLogger>,
}

pub(crate) enum Body {
    Empty,
    Form(String),
    Json(Vec<u8>),
}

impl HttpRequester {
    pub(crate) fn new(
        client: SharedHttpClient,
        opts: HttpOpts,
        trace_id: Option<String>,
        metrics: Arc<dyn MetricsLogger>,
    ) -> Self {
        Self {
            client,
            opts,
            trace_id,
            metrics,
        }
    }

    pub(crate) fn metrics(&self) -> &dyn MetricsLogger {
        self.metrics.as_ref()
    }

    pub(crate) async fn get(&self, url: &str, event: &str, parent_event: &str) -> Result<Vec<u8>> {
        self.send(Method::GET, url, None, Body::Empty, event, parent_event)
            .await
    }

    pub(crate) async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Body,
        event: &str,
        parent_event: &str,
    ) -> Result<Vec<u8>> {
        self.send(Method::POST, url, bearer, body, event, parent_event)
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Body,
        event: &str,
        parent_event: &str,
    ) -> Result<Vec<u8>> {
        let timer = Timer::start(event, parent_event);

        let mut builder = base_request().method(method.clone()).uri(url);
        for (name, value) in self.opts.headers() {
            builder = builder.header(name, value);
        }
        if let Some(trace_id) = &self.trace_id {
            builder = builder.header("traceparent", traceparent(trace_id));
        }
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Body::Empty => vec![],
            Body::Form(form) => {
                builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                form.into_bytes()
            }
            Body::Json(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                json
            }
        };
        let request = builder
            .body(body)
            .with_context(|| format!("failed to build {method} request to {url}"))?;

        tracing::debug!("{method} {url}");

        let response = match self.opts.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.client.execute(request))
                .await
                .map_err(|_| anyhow!("{method} {url} timed out after {timeout:?}"))?,
            None => self.client.execute(request).await,
        }
        .with_context(|| format!("failed to make {method} request to {url}"))?;

        let status = response.status();
        let body = response.into_body();

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            bail!("{method} request to {url} was unsuccessful (status: {status}): {text}")
        }

        timer.finish(self.metrics.as_ref())?;

        Ok(body)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn traceparent_format() {
        let trace_id = new_trace_id();
        assert_eq!(trace_id.len(), 32);

        let header = traceparent(&trace_id);
        let parts: Vec<&str> = header.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], trace_id);
        assert_eq!(parts[2].len(), 16);
    }
}
