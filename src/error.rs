use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::decode::ResponseData;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpieErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    SerializeForm,
    RequestBuild,
    Transport,
    TlsInit,
    ConcurrencyLimitClosed,
    ResponseBodyTooLarge,
    FetchBody,
    DecompressionNotSupported,
    Decompression,
    ResponseParsing,
    InvalidMediaType,
    OnHttpError,
}

impl HttpieErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::SerializeForm => "serialize_form",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::TlsInit => "tls_init",
            Self::ConcurrencyLimitClosed => "concurrency_limit_closed",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::FetchBody => "response_fetch_error",
            Self::DecompressionNotSupported => "decompression_not_supported",
            Self::Decompression => "unexpected_decompression_error",
            Self::ResponseParsing => "response_parsing_error",
            Self::InvalidMediaType => "invalid_media_type",
            Self::OnHttpError => "http_error",
        }
    }
}

impl std::fmt::Display for HttpieErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpieError {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request form: {source}")]
    SerializeForm {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error for {method} {uri}: {source}")]
    Transport {
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to initialize tls: {message}")]
    TlsInit { message: String },
    #[error("request concurrency limiter is closed")]
    ConcurrencyLimitClosed,
    #[error("response body too large ({actual_bytes} bytes > {limit_bytes} bytes)")]
    ResponseBodyTooLarge {
        status: StatusCode,
        headers: Box<HeaderMap>,
        limit_bytes: usize,
        actual_bytes: usize,
    },
    #[error(
        "An unexpected error occurred while trying to retrieve the response body (reason: '{reason}')."
    )]
    FetchBody {
        status: StatusCode,
        headers: Box<HeaderMap>,
        reason: String,
        #[source]
        source: BoxError,
    },
    #[error("Unsupported encoding '{encoding}'.")]
    DecompressionNotSupported {
        status: StatusCode,
        headers: Box<HeaderMap>,
        encoding: String,
        encodings: Vec<String>,
        buffer: Bytes,
    },
    #[error(
        "An unexpected error occurred when trying to decompress the response body (encoding: '{encoding}'): {source}"
    )]
    Decompression {
        status: StatusCode,
        headers: Box<HeaderMap>,
        encoding: String,
        encodings: Vec<String>,
        buffer: Bytes,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "An unexpected error occurred when trying to parse the response body (reason: '{source}')."
    )]
    ResponseParsing {
        status: StatusCode,
        headers: Box<HeaderMap>,
        text: String,
        buffer: Bytes,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid media type: {content_type}")]
    InvalidMediaType {
        status: StatusCode,
        headers: Box<HeaderMap>,
        content_type: String,
        buffer: Bytes,
    },
    #[error("{status_message}")]
    OnHttpError {
        status: StatusCode,
        status_message: String,
        headers: Box<HeaderMap>,
        data: ResponseData,
    },
}

impl HttpieError {
    pub const fn code(&self) -> HttpieErrorCode {
        match self {
            Self::InvalidUri { .. } => HttpieErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => HttpieErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => HttpieErrorCode::InvalidHeaderValue,
            Self::SerializeJson { .. } => HttpieErrorCode::SerializeJson,
            Self::SerializeForm { .. } => HttpieErrorCode::SerializeForm,
            Self::RequestBuild { .. } => HttpieErrorCode::RequestBuild,
            Self::Transport { .. } => HttpieErrorCode::Transport,
            Self::TlsInit { .. } => HttpieErrorCode::TlsInit,
            Self::ConcurrencyLimitClosed => HttpieErrorCode::ConcurrencyLimitClosed,
            Self::ResponseBodyTooLarge { .. } => HttpieErrorCode::ResponseBodyTooLarge,
            Self::FetchBody { .. } => HttpieErrorCode::FetchBody,
            Self::DecompressionNotSupported { .. } => HttpieErrorCode::DecompressionNotSupported,
            Self::Decompression { .. } => HttpieErrorCode::Decompression,
            Self::ResponseParsing { .. } => HttpieErrorCode::ResponseParsing,
            Self::InvalidMediaType { .. } => HttpieErrorCode::InvalidMediaType,
            Self::OnHttpError { .. } => HttpieErrorCode::OnHttpError,
        }
    }

    /// Status code of the response the error was raised for, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ResponseBodyTooLarge { status, .. }
            | Self::FetchBody { status, .. }
            | Self::DecompressionNotSupported { status, .. }
            | Self::Decompression { status, .. }
            | Self::ResponseParsing { status, .. }
            | Self::InvalidMediaType { status, .. }
            | Self::OnHttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::ResponseBodyTooLarge { headers, .. }
            | Self::FetchBody { headers, .. }
            | Self::DecompressionNotSupported { headers, .. }
            | Self::Decompression { headers, .. }
            | Self::ResponseParsing { headers, .. }
            | Self::InvalidMediaType { headers, .. }
            | Self::OnHttpError { headers, .. } => Some(&**headers),
            _ => None,
        }
    }

    /// Raw body bytes attached to decoding errors.
    pub fn buffer(&self) -> Option<&Bytes> {
        match self {
            Self::DecompressionNotSupported { buffer, .. }
            | Self::Decompression { buffer, .. }
            | Self::ResponseParsing { buffer, .. }
            | Self::InvalidMediaType { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn is_http_error(&self) -> bool {
        matches!(self, Self::OnHttpError { .. })
    }

    /// True for every error raised while handling a received response.
    pub fn is_response_error(&self) -> bool {
        matches!(
            self,
            Self::OnHttpError { .. }
                | Self::FetchBody { .. }
                | Self::DecompressionNotSupported { .. }
                | Self::Decompression { .. }
                | Self::ResponseParsing { .. }
                | Self::InvalidMediaType { .. }
        )
    }
}
