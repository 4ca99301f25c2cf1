//! Process-wide logging setup shared by binaries, tests and benchmarks.

/// Initialize process-wide tracing (JSON lines, `RUST_LOG` filter, default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::Json, tracing::DEFAULT_FILTER);
}

/// Human-readable output captured by the test harness.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_for_tests() {
    tracing::init(tracing::LogFormat::Test, "queuebatch_infra=debug,queuebatch_events=debug");
}

/// Tracing configuration (filters, formats).
pub mod tracing;
