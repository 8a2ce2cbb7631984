use std::time::Instant;

use request_center_core::record::RequestRecord;
use serde_json::{Value, json};

/// One outbound CDP wire frame: a `Network.*` method name paired with its
/// params object, ready to be serialised and sent over the websocket by
/// whoever owns the live connection (the devtools server, not this type).
#[derive(Debug, Clone, PartialEq)]
pub struct CdpFrame {
    pub method: &'static str,
    pub params: Value,
}

/// Stable within a debugger process lifetime (§4.10).
const FRAME_ID: &str = "request-center-frame";
const LOADER_ID: &str = "request-center-loader";

/// Pure translation from a finished [`RequestRecord`] to the three-message
/// CDP sequence of §4.10. Holds no I/O — the devtools server serialises and
/// writes each frame in the order `project` returns them.
pub struct Projector {
    server_start: Instant,
}

impl Default for Projector {
    fn default() -> Self {
        Self::new()
    }
}

impl Projector {
    pub fn new() -> Self {
        Self {
            server_start: Instant::now(),
        }
    }

    fn timestamp(&self) -> f64 {
        self.server_start.elapsed().as_secs_f64()
    }

    /// Always 4 frames: `requestWillBeSent`, `responseReceived`,
    /// `dataReceived`, `loadingFinished`, with non-decreasing timestamps
    /// (P3) and a shared `requestId` (P2).
    pub fn project(&self, record: &RequestRecord) -> [CdpFrame; 4] {
        let request_id = record.id.clone();

        let headers_object = |pipe: &request_center_core::header::HeaderPipe| -> Value {
            Value::Object(
                pipe.iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect(),
            )
        };

        let post_data = record.request_body.as_wire_string();

        let mut request = json!({
            "url": record.url,
            "method": record.method,
            "headers": headers_object(&record.request_headers),
            "initialPriority": "High",
            "mixedContentType": "none",
        });
        if let Some(data) = &post_data
            && let Value::Object(map) = &mut request
        {
            map.insert("postData".to_string(), Value::String(data.clone()));
        }

        let will_be_sent = CdpFrame {
            method: "Network.requestWillBeSent",
            params: json!({
                "requestId": request_id,
                "frameId": FRAME_ID,
                "loaderId": LOADER_ID,
                "request": request,
                "timestamp": self.timestamp(),
                "wallTime": record.timings.request_start_time,
                "initiator": record.initiator,
                "type": "Fetch",
            }),
        };

        let content_type = record.response_headers.get("content-type").unwrap_or("");
        let mime_type = content_type.split(';').next().unwrap_or("").trim().to_string();
        let resource_type = classify_resource_type(&mime_type);
        let status = record.status_code.unwrap_or(0);
        let status_text = if status == 200 { "OK" } else { "" };

        let response_received = CdpFrame {
            method: "Network.responseReceived",
            params: json!({
                "requestId": request_id,
                "timestamp": self.timestamp(),
                "type": resource_type,
                "response": {
                    "url": record.url,
                    "status": status,
                    "statusText": status_text,
                    "headers": headers_object(&record.response_headers),
                    "connectionReused": false,
                    "encodedDataLength": record.response_meta.encoded_data_length,
                    "charset": "utf-8",
                    "mimeType": mime_type,
                },
            }),
        };

        let data_received = CdpFrame {
            method: "Network.dataReceived",
            params: json!({
                "requestId": request_id,
                "timestamp": self.timestamp(),
                "dataLength": record.response_meta.data_length,
                "encodedDataLength": record.response_meta.encoded_data_length,
            }),
        };

        let loading_finished = CdpFrame {
            method: "Network.loadingFinished",
            params: json!({
                "requestId": request_id,
                "timestamp": self.timestamp(),
                "encodedDataLength": record.response_meta.encoded_data_length,
            }),
        };

        [will_be_sent, response_received, data_received, loading_finished]
    }
}

/// `image/* → Image`, `*/javascript → Script`, `*/css → Stylesheet`,
/// `text/html → Document`, else `Other` (§4.10 step 2).
fn classify_resource_type(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") {
        "Image"
    } else if mime_type.ends_with("/javascript") {
        "Script"
    } else if mime_type.ends_with("/css") {
        "Stylesheet"
    } else if mime_type == "text/html" {
        "Document"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use request_center_core::initiator::BacktraceResolver;
    use request_center_core::record::Body;
    use std::time::SystemTime;

    fn text_record(status: u16, content_type: &str, body_len: u64) -> RequestRecord {
        let mut rec = RequestRecord::new("GET", "http://example.com/a", &BacktraceResolver, 0);
        rec.mark_start(SystemTime::now());
        rec.status_code = Some(status);
        rec.response_headers.set("content-type", content_type);
        rec.set_response_meta(body_len, body_len);
        rec.mark_end(SystemTime::now());
        rec
    }

    #[test]
    fn scenario_1_plain_text_200() {
        let rec = text_record(200, "text/plain", 5);
        let projector = Projector::new();
        let frames = projector.project(&rec);

        assert_eq!(frames[0].method, "Network.requestWillBeSent");
        assert_eq!(frames[1].method, "Network.responseReceived");
        assert_eq!(frames[1].params["type"], "Other");
        assert_eq!(frames[1].params["response"]["mimeType"], "text/plain");
        assert_eq!(frames[1].params["response"]["statusText"], "OK");
        assert_eq!(frames[2].params["dataLength"], 5);
        assert_eq!(frames[3].method, "Network.loadingFinished");

        let ids: Vec<_> = frames.iter().map(|f| f.params["requestId"].clone()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn scenario_2_json_post_data_is_serialized() {
        let mut rec = RequestRecord::new("POST", "http://x/y", &BacktraceResolver, 0);
        rec.request_body = Body::Json(serde_json::json!({"k": 1}));
        rec.status_code = Some(200);
        let projector = Projector::new();
        let frames = projector.project(&rec);
        assert_eq!(frames[0].params["request"]["postData"], "{\"k\":1}");
    }

    #[test]
    fn scenario_3_image_classification() {
        let rec = text_record(200, "image/png", 300);
        let projector = Projector::new();
        let frames = projector.project(&rec);
        assert_eq!(frames[1].params["type"], "Image");
        assert_eq!(frames[1].params["response"]["mimeType"], "image/png");
    }

    #[test]
    fn scenario_4_server_error_has_empty_status_text() {
        let rec = text_record(500, "text/plain", 0);
        let projector = Projector::new();
        let frames = projector.project(&rec);
        assert_eq!(frames[1].params["response"]["statusText"], "");
    }

    #[test]
    fn timestamps_are_non_decreasing_within_one_records_frames() {
        let rec = text_record(200, "text/html", 10);
        let projector = Projector::new();
        let frames = projector.project(&rec);
        let timestamps: Vec<f64> = frames.iter().map(|f| f.params["timestamp"].as_f64().unwrap()).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }
}
