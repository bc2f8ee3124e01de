//! Process-wide configuration, read once at startup (spec §5, §6.3, §6.4).
//!
//! Precedence is CLI flag > environment variable > compiled-in default.
//! There is no runtime reconfiguration API: a [`Config`] is built once in
//! `main` and handed down by reference.

use std::env;
use std::path::PathBuf;

use clap::Parser;

/// `mcp-prompt-broker` — stdio JSON-RPC prompt-to-profile router.
#[derive(Parser, Debug)]
#[command(name = "mcp-prompt-broker", version, about)]
pub struct Cli {
    /// Directory containing `.md` profile files.
    #[arg(long)]
    pub profiles_dir: Option<PathBuf>,

    /// Log level: debug, info, warn, error.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Disable the background file-system watcher that auto-triggers
    /// reload on profile changes (explicit `reload_profiles` still works).
    #[arg(long)]
    pub no_watch: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub profiles_dir: PathBuf,
    pub log_level: String,
    pub watch_enabled: bool,
    pub complexity_routing_enabled: bool,
    pub complexity_word_high: usize,
    pub complexity_word_medium: usize,
    pub complexity_prefer_threshold: usize,
}

impl Config {
    /// Build the immutable startup configuration from CLI args, falling
    /// back to environment variables and then compiled-in defaults.
    pub fn load(cli: &Cli) -> Self {
        let profiles_dir = cli
            .profiles_dir
            .clone()
            .or_else(|| env::var("MCP_PROFILES_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(default_profiles_dir);

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| env::var("MCP_LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string());

        let complexity_routing_enabled = env::var("MCP_COMPLEXITY_ROUTING")
            .ok()
            .map(|v| v != "false")
            .unwrap_or(true);

        let complexity_word_high = env_usize("MCP_COMPLEXITY_WORD_HIGH", 80);
        let complexity_word_medium = env_usize("MCP_COMPLEXITY_WORD_MEDIUM", 40);
        let complexity_prefer_threshold = env_usize("MCP_COMPLEXITY_PREFER_THRESHOLD", 60);

        Self {
            profiles_dir,
            log_level,
            watch_enabled: !cli.no_watch,
            complexity_routing_enabled,
            complexity_word_high,
            complexity_word_medium,
            complexity_prefer_threshold,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default profile directory: `profiles/` next to the running executable,
/// falling back to `./profiles` when the executable path can't be resolved.
fn default_profiles_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join("profiles")))
        .unwrap_or_else(|| PathBuf::from("profiles"))
}
