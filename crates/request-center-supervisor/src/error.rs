use thiserror::Error;

/// Cannot acquire the lock and cannot connect to whoever holds it — surfaced
/// to the host as an initialisation failure; per §7 the host keeps running
/// uninstrumented rather than aborting.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("lock file io error: {0}")]
    Lock(#[from] std::io::Error),

    #[error("lock payload was not valid json: {0}")]
    LockPayload(#[from] serde_json::Error),

    #[error("debugger process could not be spawned: {0}")]
    Spawn(std::io::Error),

    #[error("no debugger process is reachable and the lock is held by a live process")]
    Busy,
}
