use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mcp_prompt_broker::catalog::{Catalog, ProfileWatcher};
use mcp_prompt_broker::config::{Cli, Config};
use mcp_prompt_broker::server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Bounded grace period given to in-flight requests after a stop signal
/// (spec §4.7 default: 2 seconds).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// `reload_profiles` debounce window for the background watcher.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

fn main() {
    let cli = Cli::parse();
    let config = Config::load(&cli);
    init_logging(&config.log_level);

    info!(
        profiles_dir = %config.profiles_dir.display(),
        watch_enabled = config.watch_enabled,
        "starting mcp-prompt-broker"
    );

    let catalog = match Catalog::load(&config.profiles_dir) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!(error = %e, dir = %config.profiles_dir.display(), "failed to load profiles directory");
            std::process::exit(2);
        }
    };

    let config = Arc::new(config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    let exit_code = rt.block_on(async move {
        let _watcher = if config.watch_enabled {
            match ProfileWatcher::spawn(catalog.clone(), tokio::runtime::Handle::current(), WATCH_DEBOUNCE) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "failed to start profile watcher, continuing without hot reload");
                    None
                }
            }
        } else {
            None
        };

        match server::serve_stdio(catalog, config, SHUTDOWN_GRACE).await {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "server exited with error");
                1
            }
        }
    });

    std::process::exit(exit_code);
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
