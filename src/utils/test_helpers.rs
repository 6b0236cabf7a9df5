use std::sync::Once;

static LOGGING_INIT: Once = Once::new();

/// Installs a test-writer tracing subscriber exactly once per test binary.
///
/// Meant for integration tests; unit tests inside the library capture logs
/// with `#[traced_test]`, which owns the global subscriber there.
///
/// Honors `RUST_LOG`, so `RUST_LOG=dumpcb=debug cargo test` shows the walker's
/// per-entry decisions.
pub fn setup_test_logging() {
    LOGGING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Returns true when the current process runs as root (UID 0), where
/// permission bits do not stop directory reads.
#[cfg(test)]
#[inline]
pub fn running_as_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
