use std::sync::Mutex;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::BoxError;
use crate::util::{lock_unpoisoned, parse_header_name, parse_header_value};

pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

pub enum DispatchBody {
    Empty,
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl std::fmt::Debug for DispatchBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Buffered(bytes) => formatter.debug_tuple("Buffered").field(bytes).finish(),
            Self::Streaming(_) => formatter.write_str("Streaming(..)"),
        }
    }
}

#[derive(Debug)]
pub struct DispatchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: DispatchBody,
}

/// Response head plus a body that has not been read yet.
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn buffered(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        let stream = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self::new(status, headers, stream)
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Something able to send a request over a (pooled) connection.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<RawResponse, BoxError>>;
}

#[derive(Clone, Debug)]
pub struct MockReply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    body_error: Option<String>,
}

impl MockReply {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            body_error: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (parse_header_name(name), parse_header_value(name, value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Make the body stream fail with `message` instead of yielding data.
    pub fn body_error(mut self, message: impl Into<String>) -> Self {
        self.body_error = Some(message.into());
        self
    }

    fn into_response(self) -> RawResponse {
        match self.body_error {
            Some(message) => {
                let failing = stream::once(async move { Err(BoxError::from(message)) }).boxed();
                RawResponse::new(self.status, self.headers, failing)
            }
            None => RawResponse::buffered(self.status, self.headers, self.body),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
struct Interceptor {
    method: Method,
    path: String,
    reply: MockReply,
    persist: bool,
}

impl Interceptor {
    fn matches(&self, method: &Method, url: &Url) -> bool {
        if self.method != *method {
            return false;
        }
        match (self.path.contains('?'), url.query()) {
            (true, Some(query)) => self.path == format!("{}?{query}", url.path()),
            (true, None) => false,
            (false, _) => self.path == url.path(),
        }
    }
}

/// In-memory dispatcher answering from an interception table.
#[derive(Debug, Default)]
pub struct MockDispatcher {
    interceptors: Mutex<Vec<Interceptor>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next matching request once.
    pub fn intercept(&self, method: Method, path: impl Into<String>, reply: MockReply) {
        self.push(method, path.into(), reply, false);
    }

    /// Answer every matching request.
    pub fn intercept_persistent(&self, method: Method, path: impl Into<String>, reply: MockReply) {
        self.push(method, path.into(), reply, true);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn pending_interceptors(&self) -> usize {
        lock_unpoisoned(&self.interceptors).len()
    }

    fn push(&self, method: Method, path: String, reply: MockReply, persist: bool) {
        lock_unpoisoned(&self.interceptors).push(Interceptor {
            method,
            path,
            reply,
            persist,
        });
    }

    fn take_reply(&self, method: &Method, url: &Url) -> Option<MockReply> {
        let mut interceptors = lock_unpoisoned(&self.interceptors);
        let index = interceptors
            .iter()
            .position(|interceptor| interceptor.matches(method, url))?;
        if interceptors[index].persist {
            return Some(interceptors[index].reply.clone());
        }
        Some(interceptors.remove(index).reply)
    }
}

impl Dispatcher for MockDispatcher {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<RawResponse, BoxError>> {
        async move {
            let DispatchRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let body = match body {
                DispatchBody::Empty => Bytes::new(),
                DispatchBody::Buffered(bytes) => bytes,
                DispatchBody::Streaming(mut stream) => {
                    let mut collected = Vec::new();
                    while let Some(chunk) = stream.next().await {
                        collected.extend_from_slice(&chunk?);
                    }
                    Bytes::from(collected)
                }
            };

            let reply = self.take_reply(&method, &url);
            lock_unpoisoned(&self.requests).push(RecordedRequest {
                method: method.clone(),
                url: url.clone(),
                headers,
                body,
            });

            match reply {
                Some(reply) => Ok(reply.into_response()),
                None => Err(BoxError::from(format!(
                    "no mock interceptor matched {method} {}",
                    url.path()
                ))),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use http::{HeaderMap, Method, StatusCode};

    use super::{DispatchBody, DispatchRequest, Dispatcher, MockDispatcher, MockReply};

    fn request(method: Method, url: &str) -> DispatchRequest {
        DispatchRequest {
            method,
            url: url.parse().expect("url should parse"),
            headers: HeaderMap::new(),
            body: DispatchBody::Empty,
        }
    }

    #[tokio::test]
    async fn one_shot_interceptor_is_consumed() {
        let mock = MockDispatcher::new();
        mock.intercept(
            Method::GET,
            "/ping",
            MockReply::new(StatusCode::OK).body("pong"),
        );

        let response = mock
            .dispatch(request(Method::GET, "http://mock.test/ping"))
            .await
            .expect("first call should be intercepted");
        assert_eq!(response.status, StatusCode::OK);
        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 1);

        let error = mock
            .dispatch(request(Method::GET, "http://mock.test/ping"))
            .await
            .expect_err("interceptor should be used up");
        assert!(error.to_string().contains("no mock interceptor matched"));
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn persistent_interceptor_matches_method_and_path() {
        let mock = MockDispatcher::new();
        mock.intercept_persistent(Method::POST, "/items", MockReply::new(StatusCode::CREATED));

        for _ in 0..3 {
            let response = mock
                .dispatch(request(Method::POST, "http://mock.test/items?x=1"))
                .await
                .expect("persistent interceptor should answer");
            assert_eq!(response.status, StatusCode::CREATED);
        }
        assert!(
            mock.dispatch(request(Method::GET, "http://mock.test/items"))
                .await
                .is_err()
        );
        assert_eq!(mock.pending_interceptors(), 1);
    }
}
