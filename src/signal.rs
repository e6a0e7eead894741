//! Ctrl-C handling
//!
//! Step commands run in their own process group, so a terminal SIGINT only
//! reaches the provisioner. The first SIGINT or SIGTERM sets a flag that the
//! engine checks between steps; the step in flight is allowed to finish. A
//! second signal is forwarded to the running step's process group and the
//! provisioner exits with the default disposition.

use plankit::CancelToken;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Process group of the step command currently running (0 when none)
static CHILD_GROUP: AtomicI32 = AtomicI32::new(0);

/// Cancel token wired to SIGINT and SIGTERM
pub fn install() -> CancelToken {
    let flag = FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));
    register();
    CancelToken::from_flag(Arc::clone(flag))
}

/// Remember the step command a second signal should be forwarded to
///
/// Step children are process group leaders, so their pid is their group id.
pub fn track_child(pid: Option<u32>) {
    let group = pid.and_then(|p| i32::try_from(p).ok()).unwrap_or(0);
    CHILD_GROUP.store(group, Ordering::SeqCst);
}

/// Serializes tests that raise signals or touch the cancel flag
#[cfg(test)]
pub static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Clear the cancel flag so the next signal counts as the first
#[cfg(test)]
pub fn reset() {
    if let Some(flag) = FLAG.get() {
        flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(unix)]
extern "C" fn on_signal(signum: libc::c_int) {
    match FLAG.get() {
        Some(flag) if !flag.swap(true, Ordering::SeqCst) => {}
        _ => {
            let group = CHILD_GROUP.load(Ordering::SeqCst);
            // SAFETY: kill, signal and raise are async-signal-safe
            unsafe {
                if group > 0 {
                    libc::kill(-group, signum);
                }
                libc::signal(signum, libc::SIG_DFL);
                libc::raise(signum);
            }
        }
    }
}

#[cfg(unix)]
fn register() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches atomics and async-signal-safe calls
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
    log::debug!("Installed SIGINT/SIGTERM handler");
}

#[cfg(not(unix))]
fn register() {
    log::debug!("Signal handling not available on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_share_one_flag() {
        let _guard = TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let token = install();
        let again = install();
        token.cancel();
        assert!(again.is_cancelled());
        reset();
        assert!(!token.is_cancelled());
    }
}
