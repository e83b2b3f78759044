use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use log::info;

/// Log filter used when `TAILPUSH_LOG` is unset: this crate may go up to
/// debug, dependencies only report warnings.
pub const DEFAULT_LOG_FILTER: &str = "warn,tailpush=debug";

/// Elapsed time below this is clamped so tiny files don't divide by zero.
const MIN_ELAPSED_SECS: f64 = 0.001;

/// Megabytes and MB/s for a finished transfer.
pub fn throughput(bytes: u64, elapsed: Duration) -> (f64, f64) {
    let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
    let mb = bytes as f64 / 1024.0 / 1024.0;
    (mb, mb / secs)
}

pub fn log_upload(local: &Path, target: &str, bytes: u64, elapsed: Duration) {
    let (mb, speed) = throughput(bytes, elapsed);
    let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
    info!(
        "[OK ] {} -> {} ({:.2} MB, {:.1}s, {:.2} MB/s)",
        local.display(),
        target,
        mb,
        secs,
        speed
    );
}

/// Debug output is only honoured when someone is watching the terminal.
pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}
