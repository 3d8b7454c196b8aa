//! Per-Peer Log Splitting
//!
//! The `split-logs` option gives every peer its own log file,
//! `<base>.<peer id>`, so interleaved multi-process output stays
//! readable. Installation is best-effort: if a subscriber is already in
//! place (a test harness, an embedding application), the existing one
//! wins and we only note the fact.

use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Route this process's log output to `<base>.<suffix>`.
pub fn split_logs(base: &str, suffix: &str) {
    let path = format!("{}.{}", base, suffix);

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path, error = %e, "cannot open split log file");
            return;
        }
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(file)
        .with_ansi(false)
        .try_init();

    if result.is_err() {
        warn!(path = %path, "a subscriber is already installed, split-logs ignored");
    }
}
