use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;

use http::{Request, Response};
use http_body_util::BodyExt;
use request_center_core::header::HeaderPipe;
use request_center_core::initiator::{BacktraceResolver, InitiatorResolver};
use request_center_core::record::{Body, RequestRecord};
use tower::Service;

use crate::body::{self, BoxBody, BoxError, CapturingBody, DEFAULT_MAX_BODY_BYTES};
use crate::sink::RecordSink;
use crate::state;

/// Stack frames belonging to the interceptor's own plumbing (this `call`
/// method and the async block it spawns), skipped before attaching the
/// initiator stack per §4.1.
const SKIP_FRAMES: usize = 2;

/// Wraps any `tower::Service` that plays the role of the platform's
/// low-level HTTP client, producing record lifecycle events per §4.4
/// without altering the returned response's observable shape: status,
/// headers, and body bytes are handed back exactly as collected.
///
/// When the interceptor is uninstalled (see [`crate::state`]), `call`
/// degrades to a bare passthrough with no collection overhead.
#[derive(Clone)]
pub struct InterceptedClient<S> {
    inner: S,
    sink: Arc<dyn RecordSink>,
    resolver: Arc<dyn InitiatorResolver>,
    max_body_bytes: usize,
}

impl<S> InterceptedClient<S> {
    pub fn new(inner: S, sink: Arc<dyn RecordSink>) -> Self {
        Self::with_resolver(inner, sink, Arc::new(BacktraceResolver))
    }

    pub fn with_resolver(
        inner: S,
        sink: Arc<dyn RecordSink>,
        resolver: Arc<dyn InitiatorResolver>,
    ) -> Self {
        Self {
            inner,
            sink,
            resolver,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

impl<S> Service<Request<BoxBody>> for InterceptedClient<S>
where
    S: Service<Request<BoxBody>, Response = Response<BoxBody>, Error = BoxError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<BoxBody>) -> Self::Future {
        if !state::is_installed() {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let sink = self.sink.clone();
        let resolver = self.resolver.clone();
        let max_body_bytes = self.max_body_bytes;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let url = req.uri().to_string();
            let mut record =
                RequestRecord::new(method, url.clone(), resolver.as_ref(), SKIP_FRAMES);
            record.mark_start(SystemTime::now());
            record.request_headers = header_pipe_from(req.headers());

            let (parts, body) = req.into_parts();
            let request_header_snapshot = parts.headers.clone();
            // Teed rather than buffered-then-forwarded: `inner` starts
            // reading the request body as it arrives instead of waiting for
            // this interceptor to collect it all first (§4.4 step 3).
            let captured_request = Arc::new(std::sync::Mutex::new(None));
            let captured_request_cb = captured_request.clone();
            let tapped_body = CapturingBody::new(body, max_body_bytes, move |bytes, truncated| {
                *captured_request_cb.lock().unwrap() = Some((bytes, truncated));
            });
            let rebuilt = Request::from_parts(parts, tapped_body.boxed());

            let call_result = inner.call(rebuilt).await;

            if let Some((req_bytes, truncated)) = captured_request.lock().unwrap().take() {
                if truncated {
                    tracing::warn!(url = %url, "request body truncated during capture");
                }
                if !req_bytes.is_empty() {
                    record.request_body = classify_request_body(&request_header_snapshot, &req_bytes);
                }
            }

            match call_result {
                Ok(resp) => Ok(finish_success(record, sink, resp, max_body_bytes, url)),
                Err(e) => {
                    record.mark_aborted("transport", e.to_string());
                    record.mark_end(SystemTime::now());
                    sink.publish(record);
                    Err(e)
                }
            }
        })
    }
}

/// Hands the caller the inner response immediately, wrapping its body in a
/// [`CapturingBody`] so capture happens as a side effect of the caller
/// streaming it rather than a precondition for returning at all (§4.4 step
/// 3, Design Notes "stream teeing"). The record is only finalized and
/// published once that streaming finishes.
fn finish_success(
    mut record: RequestRecord,
    sink: Arc<dyn RecordSink>,
    resp: Response<BoxBody>,
    max_body_bytes: usize,
    url: String,
) -> Response<BoxBody> {
    record.status_code = Some(resp.status().as_u16());
    let response_headers = header_pipe_from(resp.headers());
    let content_encoding = response_headers.get("content-encoding").map(str::to_string);
    let content_type = response_headers.get("content-type").map(str::to_string);
    record.response_headers = response_headers;

    let (parts, body) = resp.into_parts();
    let tapped_body = CapturingBody::new(body, max_body_bytes, move |resp_bytes, truncated| {
        finalize_response(record, sink, resp_bytes, truncated, content_encoding, content_type, url);
    });

    Response::from_parts(parts, tapped_body.boxed())
}

fn finalize_response(
    mut record: RequestRecord,
    sink: Arc<dyn RecordSink>,
    resp_bytes: Vec<u8>,
    truncated: bool,
    content_encoding: Option<String>,
    content_type: Option<String>,
    url: String,
) {
    let encoded_data_length = resp_bytes.len() as u64;
    let decoded = body::decode(&resp_bytes, content_encoding.as_deref(), content_type.as_deref());
    // `encodedDataLength` is the wire size of what was actually collected;
    // `dataLength` is the decompressed size `body::decode` produced — they
    // only coincide when no compression was applied (§3 invariant (iv)).
    record.set_response_meta(decoded.decoded_len as u64, encoded_data_length);
    record.response_body = decoded.body;
    if truncated {
        tracing::warn!(url = %url, "response body truncated during capture");
    }

    record.mark_end(SystemTime::now());
    sink.publish(record);
}

fn header_pipe_from(headers: &http::HeaderMap) -> HeaderPipe {
    let mut pipe = HeaderPipe::new();
    for (name, value) in headers {
        pipe.set(name.as_str(), value.to_str().unwrap_or("<binary>").to_string());
    }
    pipe
}

fn classify_request_body(headers: &http::HeaderMap, bytes: &[u8]) -> Body {
    let is_json = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
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
