use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::{Instrument, debug, info_span};
use url::Url;

use crate::HttpieResult;
use crate::agents::{AgentRegistry, CustomAgent, RequestTarget, Resolver};
use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, TimedLruCache};
use crate::decode::ResponseDecoder;
use crate::dispatcher::{DispatchBody, DispatchRequest, Dispatcher, RawResponse};
use crate::error::{BoxError, HttpieError};
use crate::extensions::{Clock, SystemClock};
use crate::limiters::{ConcurrencyLimiter, LimiterPermit};
use crate::request::RequestOptions;
use crate::response::{RequestResponse, ResponseStream};
use crate::util::{
    append_query_pairs, parse_header_name, parse_header_value, redact_uri_for_logs, truncate_body,
};

const DEFAULT_CLIENT_NAME: &str = "httpie";

pub struct ClientBuilder {
    registry: Arc<AgentRegistry>,
    cache_capacity: usize,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    default_dispatcher: Option<Arc<dyn Dispatcher>>,
    default_headers: HeaderMap,
    decoder: ResponseDecoder,
    client_name: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            clock: Arc::new(SystemClock),
            default_dispatcher: None,
            default_headers: HeaderMap::new(),
            decoder: ResponseDecoder::new(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an agent registry with other clients.
    pub fn registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn agent(self, agent: CustomAgent) -> Self {
        self.registry.register(agent);
        self
    }

    pub fn resolution_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity.max(1);
        self.cache_ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Dispatcher for targets that no agent claims.
    pub fn default_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.default_dispatcher = Some(dispatcher);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> HttpieResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn user_agent(self, user_agent: &str) -> HttpieResult<Self> {
        self.try_default_header("user-agent", user_agent)
    }

    pub fn decoder(mut self, decoder: ResponseDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.decoder = self.decoder.max_body_bytes(max_body_bytes);
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn try_build(self) -> HttpieResult<Client> {
        let default_dispatcher = match self.default_dispatcher {
            Some(dispatcher) => Some(dispatcher),
            None => default_transport()?,
        };
        let cache = TimedLruCache::with_clock(self.cache_capacity, self.cache_ttl, self.clock);

        Ok(Client {
            resolver: Arc::new(Resolver::with_cache(self.registry, cache)),
            default_dispatcher,
            default_headers: self.default_headers,
            decoder: self.decoder,
            client_name: self.client_name,
        })
    }

    /// # Panics
    ///
    /// Panics when the default transport cannot be initialized.
    pub fn build(self) -> Client {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build httpie client: {error}"))
    }
}

#[cfg(feature = "transport-rustls-ring")]
fn default_transport() -> HttpieResult<Option<Arc<dyn Dispatcher>>> {
    let dispatcher = crate::transport::HyperDispatcher::new()?;
    Ok(Some(Arc::new(dispatcher)))
}

#[cfg(not(feature = "transport-rustls-ring"))]
fn default_transport() -> HttpieResult<Option<Arc<dyn Dispatcher>>> {
    Ok(None)
}

struct PreparedRequest {
    method: Method,
    url: Url,
    redacted_uri: String,
    headers: HeaderMap,
    body: DispatchBody,
    dispatcher: Arc<dyn Dispatcher>,
    limiter: Option<Arc<dyn ConcurrencyLimiter>>,
}

#[derive(Clone)]
pub struct Client {
    resolver: Arc<Resolver>,
    default_dispatcher: Option<Arc<dyn Dispatcher>>,
    default_headers: HeaderMap,
    decoder: ResponseDecoder,
    client_name: String,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.resolver.registry()
    }

    pub fn register_agent(&self, agent: CustomAgent) -> bool {
        self.resolver.registry().register(agent)
    }

    pub fn decoder(&self) -> &ResponseDecoder {
        &self.decoder
    }

    pub async fn request(
        &self,
        method: Method,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        let mode = options.mode;
        let throw_on_http_error = options.throw_on_http_error;
        let prepared = self.prepare(method, target.into(), options)?;
        let span = info_span!(
            "httpie.request",
            client = %self.client_name,
            method = %prepared.method,
            uri = %prepared.redacted_uri
        );

        async move {
            let (raw, permit) = self.send(prepared).await?;
            let response = self.decoder.decode_response(raw, mode).await;
            drop(permit);
            let response = response?;

            let status = response.status_code();
            if throw_on_http_error && status.as_u16() >= 400 {
                debug!(
                    status = status.as_u16(),
                    body = %response_preview(&response),
                    "request failed with http error status"
                );
                return Err(response.into_http_error());
            }
            debug!(status = status.as_u16(), "request completed");
            Ok(response)
        }
        .instrument(span)
        .await
    }

    pub async fn get(
        &self,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        self.request(Method::GET, target, options).await
    }

    pub async fn post(
        &self,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        self.request(Method::POST, target, options).await
    }

    pub async fn put(
        &self,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        self.request(Method::PUT, target, options).await
    }

    pub async fn patch(
        &self,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        self.request(Method::PATCH, target, options).await
    }

    pub async fn delete(
        &self,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<RequestResponse> {
        self.request(Method::DELETE, target, options).await
    }

    /// Sends the request and hands back the body undecoded, chunk by chunk.
    ///
    /// The limiter admission, if any, is held until the body is dropped.
    pub async fn stream(
        &self,
        method: Method,
        target: impl Into<RequestTarget>,
        options: RequestOptions,
    ) -> HttpieResult<ResponseStream> {
        let prepared = self.prepare(method, target.into(), options)?;
        let span = info_span!(
            "httpie.stream",
            client = %self.client_name,
            method = %prepared.method,
            uri = %prepared.redacted_uri
        );

        async move {
            let (raw, permit) = self.send(prepared).await?;
            let RawResponse {
                status,
                headers,
                body,
            } = raw;
            let body = body
                .map(move |chunk| {
                    let _held = &permit;
                    chunk
                })
                .boxed();
            Ok(ResponseStream::new(RawResponse::new(status, headers, body)))
        }
        .instrument(span)
        .await
    }

    fn prepare(
        &self,
        method: Method,
        target: RequestTarget,
        mut options: RequestOptions,
    ) -> HttpieResult<PreparedRequest> {
        let resolved = self.resolver.resolve(&method, target)?;
        let mut url = resolved.url.clone();
        append_query_pairs(&mut url, &options.query_pairs);
        let redacted_uri = redact_uri_for_logs(url.as_str());

        let headers = options.build_headers(&self.default_headers)?;
        let dispatcher = options
            .dispatcher
            .take()
            .or_else(|| resolved.dispatcher.clone())
            .or_else(|| self.default_dispatcher.clone())
            .ok_or_else(|| HttpieError::Transport {
                method: method.clone(),
                uri: redacted_uri.clone(),
                source: BoxError::from("no dispatcher available for this target"),
            })?;
        let limiter = options
            .limiter
            .take()
            .or_else(|| resolved.limiter.clone());
        let body = options
            .body
            .take()
            .map_or(DispatchBody::Empty, |body| body.into_dispatch_body());

        Ok(PreparedRequest {
            method,
            url,
            redacted_uri,
            headers,
            body,
            dispatcher,
            limiter,
        })
    }

    async fn send(&self, prepared: PreparedRequest) -> HttpieResult<(RawResponse, LimiterPermit)> {
        let PreparedRequest {
            method,
            url,
            redacted_uri,
            headers,
            body,
            dispatcher,
            limiter,
        } = prepared;

        let permit = match limiter {
            Some(limiter) => limiter.acquire().await?,
            None => LimiterPermit::unlimited(),
        };
        debug!("sending request");
        let raw = dispatcher
            .dispatch(DispatchRequest {
                method: method.clone(),
                url,
                headers,
                body,
            })
            .await
            .map_err(|source| HttpieError::Transport {
                method,
                uri: redacted_uri,
                source,
            })?;
        Ok((raw, permit))
    }
}

fn response_preview(response: &RequestResponse) -> String {
    use crate::decode::ResponseData;

    match response.data() {
        ResponseData::Bytes(bytes) => truncate_body(bytes),
        ResponseData::Text(text) => truncate_body(text.as_bytes()),
        ResponseData::Json(value) => truncate_body(value.to_string().as_bytes()),
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("client_name", &self.client_name)
            .field("resolver", &self.resolver)
            .field("default_dispatcher", &self.default_dispatcher.is_some())
            .field("default_headers", &self.default_headers)
            .field("decoder", &self.decoder)
            .finish()
    }
}
