use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for a binary or test run.
///
/// Default: info for our crates, warn for everything else. Can be overridden
/// with `RUST_LOG`. Safe to call more than once; later calls are no-ops.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,chatmail_core=info,chatmail_rpc=info,chatmail_bot=info,{service_name}=info"
        ))
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
