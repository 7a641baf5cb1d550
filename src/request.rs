use std::error::Error as StdError;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::HeaderMap;
use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT,
};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::HttpieResult;
use crate::decode::DecodeMode;
use crate::dispatcher::{BodyStream, DispatchBody, Dispatcher};
use crate::error::{BoxError, HttpieError};
use crate::limiters::ConcurrencyLimiter;
use crate::util::{merge_headers, parse_header_name, parse_header_value};

pub const DEFAULT_USER_AGENT: &str = "httpie";

/// Outgoing payload and the headers it implies.
pub enum RequestBody {
    /// Serialized JSON document.
    Json(Bytes),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Bytes),
    Bytes(Bytes),
    /// Sent as it is produced, without a length.
    Stream(BodyStream),
}

impl RequestBody {
    pub fn json<T>(payload: &T) -> HttpieResult<Self>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(payload)
            .map(|body| Self::Json(Bytes::from(body)))
            .map_err(|source| HttpieError::SerializeJson { source })
    }

    pub fn form<T>(payload: &T) -> HttpieResult<Self>
    where
        T: Serialize + ?Sized,
    {
        serde_urlencoded::to_string(payload)
            .map(|body| Self::Form(Bytes::from(body)))
            .map_err(|source| HttpieError::SerializeForm { source })
    }

    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        Self::Stream(
            stream
                .map(|item| item.map_err(|error| Box::new(error) as BoxError))
                .boxed(),
        )
    }

    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::stream(ReaderStream::new(reader))
    }

    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Bytes(_) | Self::Stream(_) => None,
        }
    }

    fn content_length(&self) -> Option<usize> {
        match self {
            Self::Json(body) | Self::Form(body) | Self::Bytes(body) => Some(body.len()),
            Self::Stream(_) => None,
        }
    }

    /// Sets the headers this payload implies, overriding caller values.
    pub(crate) fn apply_headers(&self, headers: &mut HeaderMap) {
        if let Some(content_type) = self.content_type() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Some(length) = self.content_length() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
    }

    pub(crate) fn into_dispatch_body(self) -> DispatchBody {
        match self {
            Self::Json(body) | Self::Form(body) | Self::Bytes(body) => {
                DispatchBody::Buffered(body)
            }
            Self::Stream(stream) => DispatchBody::Streaming(stream),
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(body) => formatter.debug_tuple("Json").field(&body.len()).finish(),
            Self::Form(body) => formatter.debug_tuple("Form").field(&body.len()).finish(),
            Self::Bytes(body) => formatter.debug_tuple("Bytes").field(&body.len()).finish(),
            Self::Stream(_) => formatter.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for RequestBody {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

/// Turns a credential into an `authorization` value.
///
/// `user:password` becomes a Basic credential, anything else a Bearer token.
pub fn authorization_value(credential: &str) -> String {
    if credential.contains(':') {
        format!("Basic {}", general_purpose::STANDARD.encode(credential))
    } else {
        format!("Bearer {credential}")
    }
}

/// Per-call settings for [`Client::request`](crate::Client::request).
pub struct RequestOptions {
    pub(crate) headers: HeaderMap,
    pub(crate) authorization: Option<String>,
    pub(crate) body: Option<RequestBody>,
    pub(crate) query_pairs: Vec<(String, String)>,
    pub(crate) mode: DecodeMode,
    pub(crate) throw_on_http_error: bool,
    pub(crate) dispatcher: Option<Arc<dyn Dispatcher>>,
    pub(crate) limiter: Option<Arc<dyn ConcurrencyLimiter>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            authorization: None,
            body: None,
            query_pairs: Vec::new(),
            mode: DecodeMode::Parse,
            throw_on_http_error: true,
            dispatcher: None,
            limiter: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> HttpieResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(&self.headers, &headers);
        self
    }

    /// `user:password` or a bearer token.
    pub fn authorization(mut self, credential: impl Into<String>) -> Self {
        self.authorization = Some(credential.into());
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T>(self, payload: &T) -> HttpieResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.body(RequestBody::json(payload)?))
    }

    pub fn form<T>(self, payload: &T) -> HttpieResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.body(RequestBody::form(payload)?))
    }

    pub fn body_stream<S, E>(self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.body(RequestBody::stream(stream))
    }

    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        self.body(RequestBody::reader(reader))
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_pairs.push((name.into(), value.into()));
        self
    }

    pub fn query_pairs<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.query_pairs.extend(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
        self
    }

    pub fn query<T>(mut self, params: &T) -> HttpieResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|source| HttpieError::SerializeForm { source })?;
        self.query_pairs.extend(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned())),
        );
        Ok(self)
    }

    pub fn mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail with `OnHttpError` for statuses of 400 and above (on by default).
    pub fn throw_on_http_error(mut self, enabled: bool) -> Self {
        self.throw_on_http_error = enabled;
        self
    }

    /// Dispatcher used instead of the resolved or default one.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn limiter(mut self, limiter: Arc<dyn ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Final header set: client defaults, caller headers, credentials, then
    /// the headers implied by the body.
    pub(crate) fn build_headers(&self, default_headers: &HeaderMap) -> HttpieResult<HeaderMap> {
        let mut headers = merge_headers(default_headers, &self.headers);
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }
        if let Some(credential) = &self.authorization {
            let value =
                parse_header_value(AUTHORIZATION.as_str(), &authorization_value(credential))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(body) = &self.body {
            body.apply_headers(&mut headers);
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("authorization", &self.authorization.is_some())
            .field("body", &self.body)
            .field("query_pairs", &self.query_pairs)
            .field("mode", &self.mode)
            .field("throw_on_http_error", &self.throw_on_http_error)
            .field("dispatcher", &self.dispatcher.is_some())
            .field("limiter", &self.limiter.is_some())
            .finish()
    }
}
