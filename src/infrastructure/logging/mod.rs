//! Logging setup and the `success` log level

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`.
///
/// Calling it again is a no-op, so tests can call it freely.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

/// Log a completed step at info level, tagged `outcome = "success"`
pub fn success(component: &str, message: &str) {
    tracing::info!(component, outcome = "success", "{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        init("warn");
        success("logging", "initialized twice");
    }
}
