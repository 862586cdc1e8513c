//! Jittered retry helper for transient errors (spec §7, §9).
//!
//! `Transaction::commit` and `StoreRepository::update` can both fail with a
//! transient [`Error`] — lock contention from a concurrent transaction
//! touching an overlapping resource set, or an OCC conflict from one that
//! committed first. [`retry_transient`] is the caller-facing policy the
//! error taxonomy was built for: retry up to `max_attempts` times, sleeping
//! a jittered backoff between attempts so that two transactions racing
//! for the same lock don't just immediately collide again.

use rand::Rng;
use sop_core::config::GlobalConfig;
use sop_core::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// Run `f`, retrying while it returns a transient error (spec §7:
/// `LockContention`, `Conflict`, or a retryable `BackendIO`). Sleeps a
/// jittered backoff (1x-4x `config.jitter_base`) between attempts. Returns
/// the first non-transient error, or the last transient error once
/// `max_attempts` is exhausted.
pub fn retry_transient<T>(config: &GlobalConfig, max_attempts: usize, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_transient() => {
                thread::sleep(jittered_backoff(config.jitter_base));
            }
            Err(err) => return Err(err),
        }
    }
}

fn jittered_backoff(base: Duration) -> Duration {
    let factor: u32 = rand::thread_rng().gen_range(1..=4);
    base * factor
}
