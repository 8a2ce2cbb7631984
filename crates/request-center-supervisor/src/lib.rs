pub mod error;
pub mod lock;
pub mod state;

pub use error::SupervisorError;
pub use lock::{AcquireOutcome, LockFile, LockPayload};
pub use state::{Role, SupervisorState, acquire_or_connect, lock_file_path, reconnect_with_backoff, socket_file_path};
