//! Task and suite loading.

mod loader;

pub use loader::{BenchmarkLoader, DiscoveredBenchmark, SUITE_FILE_NAME};
