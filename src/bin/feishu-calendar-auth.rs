//! Bootstrap a Feishu user refresh token through the local OAuth redirect.
//!
//! Reads `FEISHU_APP_ID` and `FEISHU_APP_SECRET` from the environment or a `.env`
//! file in the working directory, serves the authorization page on
//! `http://localhost:3456/`, and prints the refresh token once the user grants
//! access. An existing `.env` in the working directory gains a
//! `FEISHU_REFRESH_TOKEN` line if it has none.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use feishu_calendar_auth::types::env;
use feishu_calendar_auth::{
    get_user_message, AuthResult, CredentialConfig, FeishuAuthClient, OAuthExchangeSettings,
    OAuthTokens,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(code = error.error_code(), "{}", error);
            eprintln!("\nAuthorization failed: {}", get_user_message(&error));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AuthResult<()> {
    let config = load_config(Path::new(".env"))?;
    println!("\n=== Feishu Calendar Authorization ===\n");
    println!("Current mode: {}", config.auth_mode().describe());

    let client = FeishuAuthClient::new(config)?;
    let pending = client
        .oauth_exchange(OAuthExchangeSettings::default())
        .bind()
        .await?;

    println!("\nOpen this link in a browser to authorize:\n\n{}\n", pending.authorization_url());
    println!("Or visit: {}\n", pending.index_url());

    let tokens = pending
        .wait_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    report(&tokens);
    Ok(())
}

/// Configuration from the process environment, falling back to `env_file`.
///
/// Process variables win over file entries. A missing or unreadable file counts
/// as empty.
fn load_config(env_file: &Path) -> AuthResult<CredentialConfig> {
    let file_vars: HashMap<String, String> = dotenvy::from_path_iter(env_file)
        .map(|entries| entries.filter_map(Result::ok).collect())
        .unwrap_or_default();

    CredentialConfig::from_lookup(|name| {
        std::env::var(name)
            .ok()
            .or_else(|| file_vars.get(name).cloned())
    })
}

fn report(tokens: &OAuthTokens) {
    println!("\nAuthorization succeeded.");
    println!("\nYour refresh token:\n{}", tokens.refresh_token);
    println!("\nAdd this line to your .env file:\n");
    println!("{}={}\n", env::REFRESH_TOKEN, tokens.refresh_token);

    match append_refresh_token(Path::new(".env"), &tokens.refresh_token) {
        Ok(true) => println!("Updated .env with {}.\n", env::REFRESH_TOKEN),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "could not update .env"),
    }
}

/// Append the refresh token to an existing env file that lacks the key.
///
/// Returns whether the file was changed.
fn append_refresh_token(path: &Path, refresh_token: &str) -> std::io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let content = std::fs::read_to_string(path)?;
    if content.contains(env::REFRESH_TOKEN) {
        return Ok(false);
    }

    let mut file = OpenOptions::new().append(true).open(path)?;
    write!(file, "\n{}={}\n", env::REFRESH_TOKEN, refresh_token)?;
    Ok(true)
}
