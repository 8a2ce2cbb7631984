use thiserror::Error;

/// Interceptor-internal failure (§7). Always swallowed relative to the
/// caller: attached to the record as `{error: kind, message}` and logged,
/// never propagated into the host application's request path.
#[derive(Debug, Error, Clone)]
pub enum CaptureError {
    #[error("failed to read request body: {0}")]
    RequestBody(String),
    #[error("failed to read response body: {0}")]
    ResponseBody(String),
    #[error("underlying request failed: {0}")]
    Transport(String),
    #[error("request aborted by caller")]
    Aborted,
}

impl CaptureError {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::RequestBody(_) => "request_body",
            CaptureError::ResponseBody(_) => "response_body",
            CaptureError::Transport(_) => "transport",
            CaptureError::Aborted => "aborted",
        }
    }
}

/// C6 could not decompress/decode a response body (§7). The record is
/// still published, carrying the raw bytes re-encoded as base64 and a
/// decode-warning flag — this variant exists for logging, it never
/// aborts the pipeline.
#[derive(Debug, Error, Clone)]
pub enum DecodeError {
    #[error("decompression failed for encoding {encoding}: {message}")]
    Decompress { encoding: String, message: String },
    #[error("charset decoding failed for {charset}: falling back to utf-8")]
    Charset { charset: String },
}
