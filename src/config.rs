use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Application name used for the default data directory
const APP_NAME: &str = "api-session";

/// Default session database file name
const DB_FILE_NAME: &str = "session.sqlite3";

/// API Session - bearer-token login and authorized requests
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API root, e.g. https://api.example.com
    #[arg(short = 'u', long, env = "API_BASE_URL")]
    pub base_url: Option<String>,

    /// Path of the token endpoint, relative to the API root
    #[arg(short = 'a', long, env = "AUTH_PATH", default_value = "/api/token/")]
    pub auth_path: String,

    /// Path to the session SQLite database
    #[arg(short = 'd', long, env = "SESSION_DB_FILE")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// HTTP max retries for authorized requests
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "2")]
    pub http_retries: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and store the session tokens
    Login {
        /// Username (prompted for when omitted)
        #[arg(short = 'n', long)]
        username: Option<String>,
    },

    /// Show whether a stored session exists
    Status,

    /// Forget the stored session
    Logout,

    /// Send an authorized request using the stored session
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the API root
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Remote API
    pub api_base_url: String,
    pub auth_path: String,

    // Persistence
    pub session_db_file: PathBuf,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,
    pub http_retry_base_delay_ms: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let session_db_file = match args.db_file {
            Some(path) => expand_tilde(&path),
            None => default_db_file()?,
        };

        Ok(Config {
            api_base_url: args
                .base_url
                .context("API_BASE_URL is required (use -u or set API_BASE_URL env var)")?,
            auth_path: args.auth_path,

            session_db_file,

            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 10),
            http_request_timeout: args.http_timeout,
            http_max_retries: args.http_retries,
            http_retry_base_delay_ms: env_or("HTTP_RETRY_BASE_DELAY_MS", 500),

            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            anyhow::bail!(
                "API_BASE_URL must start with http:// or https://: {}",
                self.api_base_url
            );
        }

        if !self.auth_path.starts_with('/') {
            anyhow::bail!("AUTH_PATH must start with '/': {}", self.auth_path);
        }

        Ok(())
    }

    /// Full URL of the token endpoint
    pub fn auth_url(&self) -> String {
        join_url(&self.api_base_url, &self.auth_path)
    }
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parse an optional env var, falling back to a default
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Default session database under the platform data directory
fn default_db_file() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not find data directory")?;
    Ok(data_dir.join(APP_NAME).join(DB_FILE_NAME))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
