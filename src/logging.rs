//! # Process-wide `tracing` setup.
//!
//! [`LogWriter`](crate::LogWriter) turns bus events into `tracing` records;
//! something still has to install a subscriber that prints them. Embedding
//! processes with their own setup skip this module.

use tracing_subscriber::EnvFilter;

/// Error returned when the filter is invalid or a global subscriber is already set.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs a `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (e.g. `"nodevisor=info"`) is used.
pub fn init(default_filter: &str) -> Result<(), InitError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

/// Installs a subscriber writing through the test harness; repeated calls are no-ops.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nodevisor=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error_instead_of_panicking() {
        init_for_tests();
        init_for_tests();
        assert!(init("nodevisor=info").is_err());
    }
}
