pub mod channel;
pub mod error;
pub mod forward;
pub mod message;

pub use channel::{IpcConnection, IpcListener};
pub use error::IpcError;
pub use forward::{ForwardDropCounter, forward_records};
pub use message::IpcMessage;
