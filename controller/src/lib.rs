use std::sync::OnceLock;
use std::time::Instant;

pub mod host;
pub mod pump;
pub mod topics;
pub mod transport;
pub mod unit;
pub mod values;

/// Milliseconds since process start. History timestamps and dwell-time
/// guards all compare against this monotonic clock, never wall time.
pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
