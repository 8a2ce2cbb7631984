use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// `{pid, port, startedAt}`, written into the well-known lock file (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockPayload {
    pub pid: u32,
    pub port: u16,
    pub started_at: u64,
}

impl LockPayload {
    pub fn now(port: u16) -> Self {
        Self {
            pid: std::process::id(),
            port,
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// An advisory-locked handle to `request-center.lock`. Held for the
/// lifetime of the owning debugger process; dropped (and thus unlocked,
/// since `flock` is released on close) on shutdown.
pub struct LockFile {
    file: File,
    path: PathBuf,
}

pub enum AcquireOutcome {
    Acquired(LockFile),
    HeldBy(LockPayload),
}

impl LockFile {
    /// Attempts a non-blocking exclusive `flock` on `path` (§4.8). If
    /// another process holds it, reads and returns its payload instead of
    /// erroring, so the caller can decide whether it's stale.
    pub fn try_acquire(path: impl AsRef<Path>, payload: LockPayload) -> Result<AcquireOutcome, SupervisorError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(serde_json::to_string(&payload)?.as_bytes())?;
            file.flush()?;
            return Ok(AcquireOutcome::Acquired(LockFile { file, path }));
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EWOULDBLOCK) {
            return Err(SupervisorError::Lock(err));
        }

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let existing: LockPayload = serde_json::from_str(contents.trim())?;
        Ok(AcquireOutcome::HeldBy(existing))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// True when `pid` no longer refers to a live process, probed with a
/// zero-signal `kill` (§4.8's staleness rule, part one).
pub fn pid_is_dead(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc != 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

/// True when `started_at` is older than `max_age_secs` (§4.8's staleness
/// rule, part two — combined with an endpoint probe by the caller).
pub fn is_aged_out(payload: &LockPayload, max_age_secs: u64) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now.saturating_sub(payload.started_at) > max_age_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_sees_first_holders_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request-center.lock");

        let payload = LockPayload::now(5271);
        let first = LockFile::try_acquire(&path, payload).unwrap();
        let AcquireOutcome::Acquired(_lock) = first else {
            panic!("expected to acquire an uncontended lock");
        };

        let outcome = LockFile::try_acquire(&path, LockPayload::now(9999)).unwrap();
        match outcome {
            AcquireOutcome::HeldBy(existing) => assert_eq!(existing, payload),
            AcquireOutcome::Acquired(_) => panic!("lock should still be held"),
        }
    }

    #[test]
    fn dropping_the_lock_releases_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request-center.lock");

        let outcome = LockFile::try_acquire(&path, LockPayload::now(5271)).unwrap();
        drop(outcome);

        match LockFile::try_acquire(&path, LockPayload::now(5272)).unwrap() {
            AcquireOutcome::Acquired(_) => {}
            AcquireOutcome::HeldBy(_) => panic!("lock should have been released"),
        }
    }

    #[test]
    fn a_fictitious_pid_is_reported_dead() {
        // Very high pid, exceedingly unlikely to be assigned on any real system.
        assert!(pid_is_dead(999_999));
    }

    #[test]
    fn current_process_is_not_dead() {
        assert!(!pid_is_dead(std::process::id()));
    }

    #[test]
    fn fresh_payload_is_not_aged_out() {
        let payload = LockPayload::now(5271);
        assert!(!is_aged_out(&payload, 3600));
    }
}
