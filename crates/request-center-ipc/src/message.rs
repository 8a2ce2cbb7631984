use request_center_core::record::RequestRecord;
use serde::{Deserialize, Serialize};

/// The wire protocol carried over the length-framed socket (§4.7). `RequestEnd`
/// is sent exactly once per finished [`RequestRecord`]; `Ready`/`Shutdown` are
/// the supervisor-facing handshake and teardown signals of §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IpcMessage {
    RequestEnd { record: RequestRecord },
    Ready,
    Shutdown,
}

impl IpcMessage {
    pub fn request_end(record: RequestRecord) -> Self {
        IpcMessage::RequestEnd { record }
    }
}
