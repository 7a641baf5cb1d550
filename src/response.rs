use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::decode::ResponseData;
use crate::dispatcher::{BodyStream, RawResponse};
use crate::error::{BoxError, HttpieError};
use crate::policies::HttpOutcome;

pub(crate) fn status_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| status.as_str().to_owned())
}

/// A decoded response.
#[derive(Clone, Debug)]
pub struct RequestResponse {
    status: StatusCode,
    status_message: String,
    headers: HeaderMap,
    data: ResponseData,
}

impl RequestResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, data: ResponseData) -> Self {
        Self {
            status,
            status_message: status_message(status),
            headers,
            data,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn data(&self) -> &ResponseData {
        &self.data
    }

    pub fn into_data(self) -> ResponseData {
        self.data
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        self.data.json()
    }

    pub fn into_http_error(self) -> HttpieError {
        HttpieError::OnHttpError {
            status: self.status,
            status_message: self.status_message,
            headers: Box::new(self.headers),
            data: self.data,
        }
    }
}

impl HttpOutcome for RequestResponse {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn into_http_error(self) -> HttpieError {
        RequestResponse::into_http_error(self)
    }
}

/// Response whose body is consumed incrementally.
pub struct ResponseStream {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
}

impl ResponseStream {
    pub(crate) fn new(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, BoxError>> {
        self.body.next().await
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResponseStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
