//! Bounded retry with exponential backoff for individual network calls.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::cancel::{CancelToken, Cancelled};

/// Attempts made for each wrapped WebDAV/SMB call.
pub const NETWORK_ATTEMPTS: usize = 3;

/// Run `op` up to `max_attempts` times, sleeping 1s, 2s, 4s, ... between attempts.
///
/// A failure observed after cancellation returns [`Cancelled`] instead of retrying.
/// The last error is returned once attempts are exhausted.
pub fn retry<T, E, F>(max_attempts: usize, cancel: &CancelToken, op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: From<Cancelled>,
{
    retry_with_sleep(max_attempts, cancel, thread::sleep, op)
}

/// [`retry`] with the backoff sleep supplied by the caller.
pub fn retry_with_sleep<T, E, F, S>(
    max_attempts: usize,
    cancel: &CancelToken,
    mut sleep: S,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
    E: From<Cancelled>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match op() {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        if attempt + 1 >= max_attempts {
            return Err(err);
        }
        let backoff = Duration::from_secs(1u64 << attempt.min(32));
        debug!("attempt {} failed, retrying in {:?}", attempt + 1, backoff);
        sleep(backoff);
        attempt += 1;
    }
}
