use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use std::process::ExitCode;
use std::sync::Arc;

use api_session::auth::token_preview;
use api_session::config::{Command, Config};
use api_session::store::SqliteStore;
use api_session::transport::ReqwestTransport;
use api_session::{AuthError, ClientError, SessionManager};

/// Process exit codes
const EXIT_NOT_LOGGED_IN: u8 = 1;
const EXIT_UNAUTHORIZED: u8 = 2;
const EXIT_API_ERROR: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let (config, command) = load_config()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        base_url = %config.api_base_url,
        db_file = %config.session_db_file.display(),
        "Configuration loaded"
    );

    let store = SqliteStore::open(&config.session_db_file).with_context(|| {
        format!(
            "Failed to open session store: {}",
            config.session_db_file.display()
        )
    })?;
    let transport = ReqwestTransport::new(config.http_connect_timeout, config.http_request_timeout)?;
    let manager = SessionManager::new(&config, Arc::new(transport), Arc::new(store))?;

    match command {
        Command::Login { username } => login(&manager, username).await,
        Command::Status => status(&manager).await,
        Command::Logout => {
            manager.logout().await?;
            println!("Logged out");
            Ok(ExitCode::SUCCESS)
        }
        Command::Request { method, path, data } => {
            request(&manager, &method, &path, data.as_deref()).await
        }
    }
}

/// Load and validate configuration
fn load_config() -> Result<(Config, Command)> {
    let (config, command) = Config::load()?;
    config.validate()?;
    Ok((config, command))
}

/// Prompt for missing credentials and log in
async fn login(manager: &SessionManager, username: Option<String>) -> Result<ExitCode> {
    let username = match username {
        Some(username) => username,
        None => {
            let mut prompt = Input::<String>::new().with_prompt("Username");
            if let Some(last) = manager.stored_username().await? {
                prompt = prompt.default(last);
            }
            prompt.interact_text().context("Failed to read username")?
        }
    };

    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    match manager.login(&username, &password).await {
        Ok(session) => {
            println!("✅ Logged in as {}", session.username);
            Ok(ExitCode::SUCCESS)
        }
        Err(AuthError::Unauthorized) => {
            eprintln!("❌ Wrong username or password");
            Ok(ExitCode::from(EXIT_UNAUTHORIZED))
        }
        Err(e @ AuthError::Api(_)) => {
            eprintln!("❌ Service unavailable: {}", e);
            Ok(ExitCode::from(EXIT_API_ERROR))
        }
    }
}

/// Report the stored session
async fn status(manager: &SessionManager) -> Result<ExitCode> {
    match manager.restore().await? {
        Some(session) => {
            println!("Logged in as {}", session.username);
            println!("  Access token:  {}", token_preview(&session.access_token));
            println!("  Refresh token: {}", token_preview(&session.refresh_token));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("Not logged in");
            Ok(ExitCode::from(EXIT_NOT_LOGGED_IN))
        }
    }
}

/// Send one authorized request with the stored session
async fn request(
    manager: &SessionManager,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> Result<ExitCode> {
    let Some(session) = manager.restore().await? else {
        eprintln!("Not logged in. Run `api-session login` first.");
        return Ok(ExitCode::from(EXIT_NOT_LOGGED_IN));
    };

    let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let client = manager.authenticated_client(&session);
    let mut builder = client.request(method, path);
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(data).context("Request body is not valid JSON")?;
        builder = builder.json(&body);
    }

    match client.send(builder).await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            println!("{}", status);
            if !body.is_empty() {
                println!("{}", body);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(ClientError::Status { status: 401, .. }) => {
            eprintln!("❌ Stored token was rejected. Run `api-session login` again.");
            Ok(ExitCode::from(EXIT_UNAUTHORIZED))
        }
        Err(e) => {
            eprintln!("❌ Request failed: {}", e);
            Ok(ExitCode::from(EXIT_API_ERROR))
        }
    }
}
