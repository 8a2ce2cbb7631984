use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use http_body::Frame;
use http_body_util::{BodyExt, Full};
use pin_project_lite::pin_project;
use request_center_core::record::Body;

use crate::error::DecodeError;

/// Maximum body size captured per exchange (§7 bounded buffering).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Rebuilds a body from previously-collected bytes so the caller receives
/// the same payload it would have gotten directly (§4.4 transparency).
pub fn body_from_bytes(data: Vec<u8>) -> BoxBody {
    Full::new(Bytes::from(data))
        .map_err(|never: std::convert::Infallible| match never {})
        .boxed()
}

/// The non-pinned half of `CapturingBody`'s state. Kept as its own `Drop`
/// impl (rather than on `CapturingBody` itself) because `pin_project!`
/// doesn't allow the structurally-pinned outer type to implement `Drop`
/// directly; this field drops along with the rest of the struct's fields
/// the ordinary way, which is all that's needed here since `on_complete`
/// must fire exactly once whether the stream finishes or is abandoned.
struct Completion {
    buffer: Vec<u8>,
    max_bytes: usize,
    truncated: bool,
    on_complete: Option<Box<dyn FnOnce(Vec<u8>, bool) + Send>>,
}

impl Completion {
    fn absorb(&mut self, data: &Bytes) {
        if self.buffer.len() >= self.max_bytes {
            self.truncated = true;
            return;
        }
        let room = self.max_bytes - self.buffer.len();
        if data.len() > room {
            self.buffer.extend_from_slice(&data[..room]);
            self.truncated = true;
        } else {
            self.buffer.extend_from_slice(data);
        }
    }

    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.buffer), self.truncated);
        }
    }
}

impl Drop for Completion {
    /// A caller that stops polling before the stream ends (request
    /// cancellation, early `drop` of the response body) still gets a
    /// finalized record with whatever bytes were captured up to that
    /// point, rather than leaving `on_complete` never called.
    fn drop(&mut self) {
        self.finish();
    }
}

pin_project! {
    /// A body wrapper that forwards every frame to whoever is driving it
    /// while copying data frames into an internal buffer, up to
    /// `max_bytes`. The wrapped body is handed back to the caller
    /// immediately — nothing here waits for the stream to finish before the
    /// caller can start consuming it (§4.4 step 3, Design Notes "stream
    /// teeing"). `on_complete` fires exactly once,
    /// either when the inner stream ends or is dropped before ending,
    /// with whatever was captured so far and whether the cap was hit.
    pub struct CapturingBody<B> {
        #[pin]
        inner: B,
        completion: Completion,
    }
}

impl<B> CapturingBody<B> {
    pub fn new(inner: B, max_bytes: usize, on_complete: impl FnOnce(Vec<u8>, bool) + Send + 'static) -> Self {
        Self {
            inner,
            completion: Completion {
                buffer: Vec::new(),
                max_bytes,
                truncated: false,
                on_complete: Some(Box::new(on_complete)),
            },
        }
    }
}

impl<B> http_body::Body for CapturingBody<B>
where
    B: http_body::Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.project();
        let polled = this.inner.poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.completion.absorb(data);
                }
            }
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => {
                this.completion.finish();
            }
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// MIME types whose bodies are base64-encoded rather than decoded to text.
fn is_binary_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
        || mime_type.starts_with("video/")
        || mime_type.starts_with("audio/")
        || mime_type == "application/octet-stream"
}

/// Result of C6's decode pipeline.
pub struct DecodedBody {
    pub body: Body,
    pub base64_encoded: bool,
    pub decode_warning: bool,
    /// Decompressed byte length — §3's `dataLength`, distinct from the
    /// encoded/wire length the caller already knows. Not the length of
    /// `body` itself, since a base64-encoded `Text` variant would over-count
    /// due to base64 expansion (§8 scenario 3: 100 gzipped bytes decoding to
    /// 300 bytes must report `dataLength=300` even though the base64 body
    /// string is longer than 300 characters).
    pub decoded_len: usize,
}

/// Decompresses, then charset- or base64-decodes, `raw` per §4.6.
/// Never fails outright: any stage that errors degrades to a raw base64
/// payload with `decode_warning` set, per §7's DecodeError policy.
pub fn decode(raw: &[u8], content_encoding: Option<&str>, content_type: Option<&str>) -> DecodedBody {
    let decompressed = match decompress(raw, content_encoding) {
        Ok(bytes) => bytes,
        Err(_) => {
            return DecodedBody {
                body: Body::Text(B64.encode(raw)),
                base64_encoded: true,
                decode_warning: true,
                decoded_len: raw.len(),
            };
        }
    };
    let decoded_len = decompressed.len();

    let mime_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or("");

    if is_binary_mime(mime_type) {
        return DecodedBody {
            body: Body::Text(B64.encode(&decompressed)),
            base64_encoded: true,
            decode_warning: false,
            decoded_len,
        };
    }

    let charset = content_type
        .and_then(|ct| ct.split(';').nth(1))
        .and_then(|param| param.trim().strip_prefix("charset="))
        .unwrap_or("utf-8")
        .trim_matches('"');

    match decode_charset(&decompressed, charset) {
        Ok(text) => DecodedBody {
            body: Body::Text(text),
            base64_encoded: false,
            decode_warning: false,
            decoded_len,
        },
        Err(_) => DecodedBody {
            body: Body::Text(B64.encode(&decompressed)),
            base64_encoded: true,
            decode_warning: true,
            decoded_len,
        },
    }
}

fn decompress(raw: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, DecodeError> {
    // Chained encodings decode outer -> inner, e.g. "gzip, deflate".
    let mut current = raw.to_vec();
    let Some(encodings) = content_encoding else {
        return Ok(current);
    };
    for encoding in encodings.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        current = decompress_one(&current, encoding)?;
    }
    Ok(current)
}

fn decompress_one(data: &[u8], encoding: &str) -> Result<Vec<u8>, DecodeError> {
    match encoding.to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Decompress {
                    encoding: encoding.to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        "deflate" => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Decompress {
                    encoding: encoding.to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        "br" => {
            let mut out = Vec::new();
            brotli::Decompressor::new(data, 4096)
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Decompress {
                    encoding: encoding.to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        "identity" | "" => Ok(data.to_vec()),
        other => Err(DecodeError::Decompress {
            encoding: other.to_string(),
            message: "unsupported content-encoding".to_string(),
        }),
    }
}

fn decode_charset(data: &[u8], charset: &str) -> Result<String, DecodeError> {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes()).ok_or_else(|| {
        DecodeError::Charset {
            charset: charset.to_string(),
        }
    })?;
    let (decoded, _, had_errors) = encoding.decode(data);
    if had_errors {
        return Err(DecodeError::Charset {
            charset: charset.to_string(),
        });
    }
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn identity_roundtrip() {
        let decoded = decode(b"hello", None, Some("text/plain"));
        assert!(matches!(decoded.body, Body::Text(ref s) if s == "hello"));
        assert!(!decoded.base64_encoded);
    }

    #[test]
    fn gzip_roundtrip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"compressed payload").unwrap();
        let gzipped = encoder.finish().unwrap();

        let decoded = decode(&gzipped, Some("gzip"), Some("text/plain"));
        assert!(matches!(decoded.body, Body::Text(ref s) if s == "compressed payload"));
        assert_eq!(decoded.decoded_len, "compressed payload".len());
    }

    #[test]
    fn scenario_3_decoded_len_is_the_decompressed_size_not_the_base64_size() {
        let payload = vec![b'x'; 300];
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let gzipped = encoder.finish().unwrap();

        let decoded = decode(&gzipped, Some("gzip"), Some("image/png"));
        assert!(decoded.base64_encoded);
        // decoded_len tracks the decompressed size (300), not the gzipped
        // wire size or the base64-inflated body length.
        assert_eq!(decoded.decoded_len, 300);
        if let Body::Text(ref s) = decoded.body {
            assert!(s.len() > 300, "base64 encoding should expand the body past the raw decoded length");
        }
    }

    #[test]
    fn binary_mime_is_base64_encoded() {
        let decoded = decode(&[0xff, 0xd8, 0xff], None, Some("image/png"));
        assert!(decoded.base64_encoded);
    }

    #[test]
    fn unsupported_encoding_degrades_to_base64_with_warning() {
        let decoded = decode(b"raw", Some("zstd"), Some("text/plain"));
        assert!(decoded.base64_encoded);
        assert!(decoded.decode_warning);
    }

    #[test]
    fn default_charset_is_utf8() {
        let decoded = decode("héllo".as_bytes(), None, Some("text/plain"));
        assert!(matches!(decoded.body, Body::Text(ref s) if s == "héllo"));
    }
}
