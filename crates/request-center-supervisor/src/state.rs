use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use request_center_ipc::IpcConnection;
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::lock::{AcquireOutcome, LockFile, LockPayload, is_aged_out, pid_is_dead};

/// Mirrors §4.8's bullet list verbatim: a fresh process starts, an existing
/// one is reconnected to, a dropped connection triggers backoff, and a host
/// shutdown tears everything down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Connected,
    Reconnecting,
    ShuttingDown,
}

/// Whether this process ended up owning the debugger (holds the lock and
/// is responsible for running it) or merely connected to one someone else
/// is running.
pub enum Role {
    Owner(LockFile),
    Client,
}

/// How stale a lock may be before it's broken and retried (§4.8's
/// `startedAt` half of the staleness rule).
const DEFAULT_STALE_AGE: Duration = Duration::from_secs(30);

/// Runs §4.8's `start` step: acquire the lock, or — if busy — probe the
/// existing debugger's IPC endpoint and either become a client of it or,
/// if it turns out to be stale, break the lock and retry once.
pub async fn acquire_or_connect(
    lock_path: impl AsRef<Path>,
    socket_path: impl AsRef<Path>,
    port: u16,
    probe_timeout: Duration,
) -> Result<(Role, SupervisorState), SupervisorError> {
    let lock_path = lock_path.as_ref();
    let socket_path = socket_path.as_ref();
    let payload = LockPayload::now(port);

    match blocking_try_acquire(lock_path.to_path_buf(), payload).await? {
        AcquireOutcome::Acquired(lock) => {
            info!(pid = payload.pid, port, "acquired debugger lock, starting fresh");
            Ok((Role::Owner(lock), SupervisorState::Starting))
        }
        AcquireOutcome::HeldBy(existing) => {
            match probe_endpoint(socket_path, probe_timeout).await {
                Ok(()) => {
                    info!(pid = existing.pid, "connected to existing debugger process");
                    Ok((Role::Client, SupervisorState::Connected))
                }
                Err(_) if blocking_is_stale(existing).await => {
                    warn!(pid = existing.pid, "lock is stale, breaking it and restarting");
                    let _ = std::fs::remove_file(lock_path);
                    match blocking_try_acquire(lock_path.to_path_buf(), payload).await? {
                        AcquireOutcome::Acquired(lock) => {
                            Ok((Role::Owner(lock), SupervisorState::Starting))
                        }
                        AcquireOutcome::HeldBy(_) => Err(SupervisorError::Busy),
                    }
                }
                Err(_) => Err(SupervisorError::Busy),
            }
        }
    }
}

/// `flock`/file IO are blocking syscalls; run them on the blocking pool so
/// a contended lock never stalls the single-threaded reactor (§5).
async fn blocking_try_acquire(
    lock_path: PathBuf,
    payload: LockPayload,
) -> Result<AcquireOutcome, SupervisorError> {
    tokio::task::spawn_blocking(move || LockFile::try_acquire(&lock_path, payload))
        .await
        .expect("lock acquisition task panicked")
}

/// `kill(pid, 0)` is likewise a blocking syscall (§5).
async fn blocking_is_stale(payload: LockPayload) -> bool {
    tokio::task::spawn_blocking(move || {
        pid_is_dead(payload.pid) || is_aged_out(&payload, DEFAULT_STALE_AGE.as_secs())
    })
    .await
    .expect("staleness probe task panicked")
}

async fn probe_endpoint(socket_path: &Path, timeout: Duration) -> Result<(), SupervisorError> {
    tokio::time::timeout(timeout, IpcConnection::connect(socket_path))
        .await
        .map_err(|_| SupervisorError::Busy)?
        .map(|_conn| ())
        .map_err(|_| SupervisorError::Busy)
}

/// Reconnects with exponential backoff, 100ms to a 5s cap, retrying
/// indefinitely (§4.8, §5 Timeouts). `connect` is retried until it
/// succeeds; records enqueued meanwhile are retained by the caller's
/// bounded channel up to its buffer cap.
pub async fn reconnect_with_backoff<F, Fut>(mut connect: F) -> IpcConnection
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<IpcConnection, request_center_ipc::IpcError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(None)
        .build();

    retry(backoff, || async {
        connect().await.map_err(backoff::Error::transient)
    })
    .await
    .expect("retry with no max_elapsed_time only resolves Ok")
}

pub fn lock_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join("request-center.lock")
}

pub fn socket_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join("request-center.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use request_center_ipc::IpcListener;

    #[tokio::test]
    async fn first_caller_becomes_owner() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = lock_file_path(dir.path());
        let socket_path = socket_file_path(dir.path());

        let (role, state) = acquire_or_connect(&lock_path, &socket_path, 5271, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(role, Role::Owner(_)));
        assert_eq!(state, SupervisorState::Starting);
    }

    #[tokio::test]
    async fn second_caller_connects_to_a_live_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = lock_file_path(dir.path());
        let socket_path = socket_file_path(dir.path());

        let (owner_role, _) =
            acquire_or_connect(&lock_path, &socket_path, 5271, Duration::from_millis(50))
                .await
                .unwrap();
        let Role::Owner(_owner_lock) = owner_role else {
            panic!("first caller should own the lock");
        };

        let listener = IpcListener::bind(&socket_path).unwrap();
        let accept_task = tokio::spawn(async move { listener.accept().await });

        let (role, state) =
            acquire_or_connect(&lock_path, &socket_path, 5271, Duration::from_millis(500))
                .await
                .unwrap();
        assert!(matches!(role, Role::Client));
        assert_eq!(state, SupervisorState::Connected);
        accept_task.await.unwrap().unwrap();
    }
}
