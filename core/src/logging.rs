use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "VKPROF_LOG";

/// Installs a stderr subscriber filtered by `VKPROF_LOG` (default `info`).
///
/// Does nothing if the host application already installed a global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
