use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::header::HeaderPipe;
use crate::initiator::{CallFrame, Initiator, InitiatorResolver};

/// A request or response body as it arrives at the capture boundary:
/// absent, decoded text, raw bytes, or a value that was already known to
/// be JSON (see Design Notes §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Body {
    None,
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Body {
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// Byte length as counted for `dataLength`.
    pub fn len(&self) -> usize {
        match self {
            Body::None => 0,
            Body::Text(s) => s.len(),
            Body::Bytes(b) => b.len(),
            Body::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
        }
    }

    /// Rendering used for CDP `postData` / response body fields: JSON
    /// bodies are serialised, everything else passed through as-is.
    pub fn as_wire_string(&self) -> Option<String> {
        match self {
            Body::None => None,
            Body::Text(s) => Some(s.clone()),
            Body::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Body::Json(v) => serde_json::to_string(v).ok(),
        }
    }
}

/// Response metadata recorded independently of the decoded body, per §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub encoded_data_length: u64,
    pub data_length: u64,
}

/// `{requestStartTime, requestEndTime}`, Unix seconds, fractional.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub request_start_time: f64,
    pub request_end_time: f64,
}

pub fn unix_seconds(ts: SystemTime) -> f64 {
    ts.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// An error observed during capture, attached to the record rather than
/// raised into the caller's path (§7 CaptureError policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub kind: String,
    pub message: String,
}

/// The normalised in-memory model of one HTTP exchange (§3).
///
/// Mutated only by the capture path that owns it, in the fixed order:
/// headers+url+method+initiator → body → status/response-headers →
/// response meta/body. Serialised to IPC exactly once, as `request-end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    pub request_headers: HeaderPipe,
    #[serde(default = "default_body")]
    pub request_body: Body,
    pub initiator: Option<Initiator>,

    pub status_code: Option<u16>,
    #[serde(default)]
    pub response_headers: HeaderPipe,
    #[serde(default = "default_body")]
    pub response_body: Body,
    #[serde(default)]
    pub response_meta: ResponseMeta,

    #[serde(default)]
    pub timings: Timings,

    #[serde(default)]
    pub aborted: bool,
    pub error: Option<RecordError>,
}

fn default_body() -> Body {
    Body::None
}

impl RequestRecord {
    /// Creates a record with a fresh id and a captured initiator. This is
    /// the only place an id is ever assigned — it is stable until the
    /// projector emits `loadingFinished` for it (invariant (i)).
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        resolver: &dyn InitiatorResolver,
        skip_frames: usize,
    ) -> Self {
        let call_frames: Vec<CallFrame> = resolver.capture(skip_frames);
        let initiator = if call_frames.is_empty() {
            None
        } else {
            Some(Initiator::new(call_frames))
        };

        Self {
            id: new_id(),
            url: url.into(),
            method: method.into(),
            request_headers: HeaderPipe::new(),
            request_body: Body::None,
            initiator,
            status_code: None,
            response_headers: HeaderPipe::new(),
            response_body: Body::None,
            response_meta: ResponseMeta::default(),
            timings: Timings::default(),
            aborted: false,
            error: None,
        }
    }

    pub fn mark_start(&mut self, at: SystemTime) {
        self.timings.request_start_time = unix_seconds(at);
    }

    /// Stamps `requestEndTime`, clamping it forward so invariant (iii)
    /// (`requestStartTime <= requestEndTime`) holds even if the wall
    /// clock is adjusted mid-request.
    pub fn mark_end(&mut self, at: SystemTime) {
        let end = unix_seconds(at);
        self.timings.request_end_time = end.max(self.timings.request_start_time);
    }

    pub fn set_response_meta(&mut self, data_length: u64, encoded_data_length: u64) {
        self.response_meta = ResponseMeta {
            data_length,
            // Invariant (iv): encoded <= data unless compression is absent.
            encoded_data_length: encoded_data_length.min(data_length),
        };
    }

    pub fn mark_aborted(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.aborted = true;
        self.error = Some(RecordError {
            kind: kind.into(),
            message: message.into(),
        });
    }
}

fn new_id() -> String {
    let mut bytes = [0u8; 16];
    for b in &mut bytes {
        *b = rand::random();
    }
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
