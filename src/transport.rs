use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::Uri;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::HttpieResult;
use crate::body::{ReqBody, build_http_request, incoming_body_stream, req_body};
use crate::dispatcher::{DispatchRequest, Dispatcher, RawResponse};
use crate::error::{BoxError, HttpieError};
use crate::util::redact_uri_for_logs;

type RustlsHttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type RustlsHyperClient = Client<RustlsHttpsConnector, ReqBody>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

fn build_rustls_tls_config() -> HttpieResult<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|source| HttpieError::TlsInit {
            message: source.to_string(),
        })?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

fn build_rustls_ring_transport(
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
) -> HttpieResult<RustlsHyperClient> {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(Some(connect_timeout));
    let tls_config = build_rustls_tls_config()?;
    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(connector);
    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool_idle_timeout)
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .http2_only(http2_only)
        .build(https))
}

#[derive(Clone, Debug)]
pub struct HyperDispatcherBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
}

impl Default for HyperDispatcherBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
        }
    }
}

impl HyperDispatcherBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn build(self) -> HttpieResult<HyperDispatcher> {
        let client = build_rustls_ring_transport(
            self.connect_timeout,
            self.pool_idle_timeout,
            self.pool_max_idle_per_host,
            self.http2_only,
        )?;
        Ok(HyperDispatcher { client })
    }
}

/// Pooled HTTP/1.1 + HTTP/2 dispatcher over rustls.
#[derive(Clone)]
pub struct HyperDispatcher {
    client: RustlsHyperClient,
}

impl HyperDispatcher {
    pub fn builder() -> HyperDispatcherBuilder {
        HyperDispatcherBuilder::default()
    }

    pub fn new() -> HttpieResult<Self> {
        Self::builder().build()
    }
}

impl std::fmt::Debug for HyperDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HyperDispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher for HyperDispatcher {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<RawResponse, BoxError>> {
        async move {
            let DispatchRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let uri = Uri::try_from(url.as_str()).map_err(|source| HttpieError::RequestBuild {
                source: source.into(),
            })?;
            let http_request = build_http_request(method, uri, &headers, req_body(body))?;
            debug!(uri = %redact_uri_for_logs(url.as_str()), "dispatching over hyper");

            let response = self.client.request(http_request).await?;
            let (parts, body) = response.into_parts();
            Ok(RawResponse::new(
                parts.status,
                parts.headers,
                incoming_body_stream(body),
            ))
        }
        .boxed()
    }
}
