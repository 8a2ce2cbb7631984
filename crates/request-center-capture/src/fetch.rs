use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use request_center_core::header::HeaderPipe;
use request_center_core::initiator::InitiatorResolver;
use request_center_core::record::{Body, RequestRecord};

use crate::body::{self, DecodedBody};
use crate::error::CaptureError;
use crate::sink::RecordSink;
use crate::state;

/// The minimal request/response shape needed to model the global `fetch`
/// API from Rust (§4.5) — a caller builds one of these from a URL plus
/// options rather than a pre-built `http::Request`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Stack frames belonging to this wrapper's own plumbing, skipped before
/// attaching the initiator stack per §4.1.
const SKIP_FRAMES: usize = 2;

/// Wraps an async function playing the role of the global `fetch`,
/// producing a record equivalent to §4.4's via the Body Decoder. One-shot
/// body consumption (§4.5) is satisfied by reading `inner`'s response body
/// exactly once and handing the same bytes back to the caller — there is
/// no separate "clone" step to perform since nothing has been read twice.
pub async fn fetch<F, Fut>(
    req: FetchRequest,
    resolver: &dyn InitiatorResolver,
    sink: &Arc<dyn RecordSink>,
    inner: F,
) -> Result<FetchResponse, CaptureError>
where
    F: FnOnce(FetchRequest) -> Fut,
    Fut: Future<Output = Result<FetchResponse, CaptureError>>,
{
    if !state::is_fetch_installed() {
        return inner(req).await;
    }

    let mut record =
        RequestRecord::new(req.method.clone(), req.url.clone(), resolver, SKIP_FRAMES);
    record.mark_start(SystemTime::now());
    record.request_headers = req.headers.iter().cloned().collect::<HeaderPipe>();
    if let Some(body) = &req.body {
        record.request_body = classify_body(&req.headers, body);
    }

    match inner(req).await {
        Ok(resp) => {
            record.status_code = Some(resp.status);
            let response_headers: HeaderPipe = resp.headers.iter().cloned().collect();
            let content_encoding = response_headers.get("content-encoding").map(str::to_string);
            let content_type = response_headers.get("content-type").map(str::to_string);
            record.response_headers = response_headers;

            let encoded_data_length = resp.body.len() as u64;
            let DecodedBody { body, decoded_len, .. } =
                body::decode(&resp.body, content_encoding.as_deref(), content_type.as_deref());
            record.set_response_meta(decoded_len as u64, encoded_data_length);
            record.response_body = body;

            record.mark_end(SystemTime::now());
            sink.publish(record);
            Ok(resp)
        }
        Err(e) => {
            record.mark_aborted(e.kind(), e.to_string());
            record.mark_end(SystemTime::now());
            sink.publish(record);
            Err(e)
        }
    }
}

fn classify_body(headers: &[(String, String)], bytes: &Bytes) -> Body {
    let is_json = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.contains("json"));
    if is_json
        && let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes)
    {
        return Body::Json(value);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Body::Text(s.to_string()),
        Err(_) => Body::Bytes(bytes.to_vec()),
    }
}
