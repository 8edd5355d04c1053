//! Tracing/logging setup shared by binaries, tests and benches.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init();
}

/// Tracing configuration (filters, layers, output format).
pub mod tracing;

pub use self::tracing::{LOG_FORMAT_VAR, LogFormat, init_for_tests, init_with};
