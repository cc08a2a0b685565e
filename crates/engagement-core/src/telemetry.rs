use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber reading `RUST_LOG` (default `info`).
///
/// Ambient setup only — embedding binaries call this once at startup; the
/// core itself never initializes logging as a side effect of any operation.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
