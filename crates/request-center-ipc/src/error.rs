use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("ipc transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ipc frame was not valid json: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("ipc peer closed the connection")]
    Closed,
}
