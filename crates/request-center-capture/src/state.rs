use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the HTTP client interceptor (C4) is currently wired in.
static HTTP_ACTIVE: AtomicBool = AtomicBool::new(false);
/// Whether the fetch interceptor (C5) is currently wired in.
static FETCH_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Installs the HTTP client interceptor. Idempotent — calling it twice is
/// harmless. Pairs with [`uninstall`].
pub fn install() {
    HTTP_ACTIVE.store(true, Ordering::SeqCst);
}

/// Reverts [`install`]. After this call, `InterceptedClient` instances are
/// pure passthroughs with no capture overhead.
pub fn uninstall() {
    HTTP_ACTIVE.store(false, Ordering::SeqCst);
}

pub fn is_installed() -> bool {
    HTTP_ACTIVE.load(Ordering::SeqCst)
}

pub fn install_fetch() {
    FETCH_ACTIVE.store(true, Ordering::SeqCst);
}

pub fn uninstall_fetch() {
    FETCH_ACTIVE.store(false, Ordering::SeqCst);
}

pub fn is_fetch_installed() -> bool {
    FETCH_ACTIVE.load(Ordering::SeqCst)
}
