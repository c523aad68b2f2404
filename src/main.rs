use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zerohttpd_core::{ServerConfig, ZhttpdError};
use zerohttpd_transport::{DispatchStats, ZeroServer};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match run() {
        Ok(stats) => {
            tracing::info!(
                "Served {} files and {} canned responses over {} connections",
                stats.files_served,
                stats.canned_responses,
                stats.accepted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<DispatchStats, ZhttpdError> {
    // Config path: first argument, then $ZHTTPD_CONFIG, then built-in defaults.
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("ZHTTPD_CONFIG"))
        .map(PathBuf::from);
    let config = ServerConfig::load(path.as_deref())?;
    ZeroServer::new(config).start()
}
