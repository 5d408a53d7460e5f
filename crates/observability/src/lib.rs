//! Shared tracing setup for the replenishment binaries and tests.

pub mod tracing;

/// Initialize process-wide logging.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable logs captured by the test harness.
pub fn init_test() {
    tracing::init_test();
}
