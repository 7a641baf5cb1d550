use bytes::Bytes;
use futures_util::StreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::HttpieResult;
use crate::charset::Charset;
use crate::content_encoding::{DecodeContentEncodingError, decode_content_encoded_body_limited};
use crate::dispatcher::RawResponse;
use crate::error::HttpieError;
use crate::response::RequestResponse;

pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// How far a response body is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    /// The body exactly as received.
    Raw,
    /// The body with every `content-encoding` removed.
    Decompress,
    /// Decompressed, then turned into text or JSON according to `content-type`.
    #[default]
    Parse,
}

/// Decoded response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl ResponseData {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Json(value) => T::deserialize(value),
            Self::Text(text) => serde_json::from_str(text),
            Self::Bytes(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// A fully read response: status, headers and the untouched body.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MediaType {
    essence: String,
    charset: Option<String>,
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|byte| {
            byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
        })
}

fn parse_media_type(value: &str) -> Option<MediaType> {
    let mut parts = value.split(';');
    let essence = parts.next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    if !is_token(kind) || !is_token(subtype) {
        return None;
    }

    let charset = parts.find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_owned())
    });

    Some(MediaType {
        essence: essence.to_ascii_lowercase(),
        charset,
    })
}

/// Turns raw responses into [`ResponseData`].
#[derive(Clone, Debug)]
pub struct ResponseDecoder {
    max_body_bytes: usize,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Upper bound for both the received and the decompressed body.
    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }

    pub fn body_limit(&self) -> usize {
        self.max_body_bytes
    }

    /// Collects the body stream of `raw`.
    pub async fn read(&self, raw: RawResponse) -> HttpieResult<ResponseEnvelope> {
        let RawResponse {
            status,
            headers,
            mut body,
        } = raw;
        let mut collected = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    return Err(HttpieError::FetchBody {
                        status,
                        headers: Box::new(headers),
                        reason: source.to_string(),
                        source,
                    });
                }
            };
            let next_size = collected.len().saturating_add(chunk.len());
            if next_size > self.max_body_bytes {
                return Err(HttpieError::ResponseBodyTooLarge {
                    status,
                    headers: Box::new(headers),
                    limit_bytes: self.max_body_bytes,
                    actual_bytes: next_size,
                });
            }
            collected.extend_from_slice(&chunk);
        }

        Ok(ResponseEnvelope::new(status, headers, collected))
    }

    pub fn decompress(&self, envelope: &ResponseEnvelope) -> HttpieResult<Bytes> {
        decode_content_encoded_body_limited(
            envelope.body.clone(),
            &envelope.headers,
            self.max_body_bytes,
        )
        .map_err(|error| match error {
            DecodeContentEncodingError::Unsupported {
                encoding,
                encodings,
            } => HttpieError::DecompressionNotSupported {
                status: envelope.status,
                headers: Box::new(envelope.headers.clone()),
                encoding,
                encodings,
                buffer: envelope.body.clone(),
            },
            DecodeContentEncodingError::Decode {
                encoding,
                encodings,
                source,
            } => HttpieError::Decompression {
                status: envelope.status,
                headers: Box::new(envelope.headers.clone()),
                encoding,
                encodings,
                buffer: envelope.body.clone(),
                source,
            },
            DecodeContentEncodingError::TooLarge { actual_bytes } => {
                HttpieError::ResponseBodyTooLarge {
                    status: envelope.status,
                    headers: Box::new(envelope.headers.clone()),
                    limit_bytes: self.max_body_bytes,
                    actual_bytes,
                }
            }
        })
    }

    pub fn decode(
        &self,
        envelope: &ResponseEnvelope,
        mode: DecodeMode,
    ) -> HttpieResult<ResponseData> {
        match mode {
            DecodeMode::Raw => Ok(ResponseData::Bytes(envelope.body.clone())),
            DecodeMode::Decompress => self.decompress(envelope).map(ResponseData::Bytes),
            DecodeMode::Parse => {
                let buffer = self.decompress(envelope)?;
                self.parse(envelope, buffer)
            }
        }
    }

    /// Reads and decodes `raw` in one go.
    pub async fn decode_response(
        &self,
        raw: RawResponse,
        mode: DecodeMode,
    ) -> HttpieResult<RequestResponse> {
        let envelope = self.read(raw).await?;
        let data = self.decode(&envelope, mode)?;
        Ok(RequestResponse::new(envelope.status, envelope.headers, data))
    }

    fn parse(&self, envelope: &ResponseEnvelope, buffer: Bytes) -> HttpieResult<ResponseData> {
        let content_type = envelope
            .headers
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .filter(|value| !value.trim().is_empty());
        let Some(content_type) = content_type else {
            return Ok(ResponseData::Bytes(buffer));
        };

        let Some(media_type) = parse_media_type(&content_type) else {
            return Err(HttpieError::InvalidMediaType {
                status: envelope.status,
                headers: Box::new(envelope.headers.clone()),
                content_type,
                buffer,
            });
        };
        let charset = Charset::from_label(media_type.charset.as_deref());

        if media_type.essence.starts_with("text/") {
            return Ok(ResponseData::Text(charset.decode(&buffer)));
        }
        if media_type.essence == "application/json" {
            let text = charset.decode(&buffer);
            return match serde_json::from_str(&text) {
                Ok(value) => Ok(ResponseData::Json(value)),
                Err(source) => Err(HttpieError::ResponseParsing {
                    status: envelope.status,
                    headers: Box::new(envelope.headers.clone()),
                    text,
                    buffer,
                    source,
                }),
            };
        }

        Ok(ResponseData::Bytes(buffer))
    }
}
