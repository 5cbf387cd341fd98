use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber for hosts and test binaries.
///
/// Filter defaults to `info` for the crate's own target and can be
/// widened with `LARDER_LOG` (standard `EnvFilter` syntax). Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("LARDER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("larder=info,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
