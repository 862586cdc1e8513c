//! Process-wide structured logging setup, driven by `SOP_LOG_LEVEL`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the global `tracing` subscriber from the `SOP_LOG_LEVEL`
/// environment variable (`DEBUG`, `INFO`, `WARN`, `ERROR`; defaults to
/// `INFO` when unset or unrecognized). Idempotent — safe to call from
/// multiple independent stores sharing one process.
pub fn init_logging() {
    INIT.call_once(|| {
        let level = std::env::var("SOP_LOG_LEVEL")
            .ok()
            .map(|v| v.to_uppercase())
            .and_then(|v| match v.as_str() {
                "DEBUG" => Some(tracing::Level::DEBUG),
                "INFO" => Some(tracing::Level::INFO),
                "WARN" => Some(tracing::Level::WARN),
                "ERROR" => Some(tracing::Level::ERROR),
                _ => None,
            })
            .unwrap_or(tracing::Level::INFO);

        let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
        // Another crate in the same process may already have installed a
        // subscriber (e.g. the embedding application); that's fine.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
