use std::io::{self, Read};

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_ENCODING;

#[derive(Debug)]
pub(crate) enum DecodeContentEncodingError {
    Unsupported {
        encoding: String,
        encodings: Vec<String>,
    },
    Decode {
        encoding: String,
        encodings: Vec<String>,
        source: io::Error,
    },
    TooLarge {
        actual_bytes: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coding {
    Gzip,
    Deflate,
    Brotli,
}

impl Coding {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            _ => None,
        }
    }
}

/// Every `content-encoding` token in header order, across repeated headers.
pub(crate) fn content_encodings(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .flat_map(|value| {
            String::from_utf8_lossy(value.as_bytes())
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn read_to_end_limited<R: Read>(
    reader: &mut R,
    encoding: &str,
    encodings: &[String],
    max_bytes: usize,
) -> Result<Vec<u8>, DecodeContentEncodingError> {
    let mut decoded = Vec::new();
    let mut chunk = [0_u8; 8 * 1024];

    loop {
        let read = reader.read(&mut chunk).map_err(|source: io::Error| {
            DecodeContentEncodingError::Decode {
                encoding: encoding.to_owned(),
                encodings: encodings.to_vec(),
                source,
            }
        })?;
        if read == 0 {
            break;
        }
        let next_size = decoded.len().saturating_add(read);
        if next_size > max_bytes {
            return Err(DecodeContentEncodingError::TooLarge {
                actual_bytes: next_size,
            });
        }
        decoded.extend_from_slice(&chunk[..read]);
    }

    Ok(decoded)
}

/// Undoes the codings listed in `content-encoding`, last applied first.
///
/// Every token is checked before any work starts, so an unknown coding
/// anywhere in the list leaves the body untouched.
pub(crate) fn decode_content_encoded_body_limited(
    mut body: Bytes,
    headers: &HeaderMap,
    max_bytes: usize,
) -> Result<Bytes, DecodeContentEncodingError> {
    let max_bytes = max_bytes.max(1);
    let encodings = content_encodings(headers);
    if encodings.is_empty() {
        return Ok(body);
    }

    let mut codings = Vec::with_capacity(encodings.len());
    for encoding in &encodings {
        let Some(coding) = Coding::from_token(encoding) else {
            return Err(DecodeContentEncodingError::Unsupported {
                encoding: encoding.clone(),
                encodings: encodings.clone(),
            });
        };
        codings.push((coding, encoding.as_str()));
    }
    if body.is_empty() {
        return Ok(body);
    }

    while let Some((coding, encoding)) = codings.pop() {
        let decoded = match coding {
            Coding::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
                read_to_end_limited(&mut decoder, encoding, &encodings, max_bytes)?
            }
            Coding::Deflate => {
                let mut decoder = flate2::read::ZlibDecoder::new(body.as_ref());
                read_to_end_limited(&mut decoder, encoding, &encodings, max_bytes)?
            }
            Coding::Brotli => {
                let mut decoder = brotli::Decompressor::new(body.as_ref(), 4096);
                read_to_end_limited(&mut decoder, encoding, &encodings, max_bytes)?
            }
        };
        body = Bytes::from(decoded);
    }

    Ok(body)
}
