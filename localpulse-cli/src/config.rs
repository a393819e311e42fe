use std::time::Duration;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "localpulse=info";

/// How often `load` prints a progress report.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-probe timeout for `scan`, in milliseconds.
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 2000;

/// Some endpoint's error rate exceeded `--max-error-rate`.
pub const EXIT_THRESHOLD_EXCEEDED: u8 = 1;

/// Config, argument or client setup failed before any work was done.
pub const EXIT_SETUP_FAILURE: u8 = 3;
