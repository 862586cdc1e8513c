//! Shared wall-clock helper so every module in this crate stamps
//! milliseconds-since-epoch the same way.

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
