#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use clap::{Parser, Subcommand};
use pantry_client::api::{ApiClient, ApiRequest};
use pantry_client::config::Config;
use pantry_client::domain::notice::{Notice, NoticeLevel};
use pantry_client::domain::token::AccessToken;
use pantry_client::{ClientBuilder, telemetry};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::Instrument;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// GET a resource
    Get {
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
    /// DELETE a resource
    Delete { path: String },
    /// POST a JSON body
    Post {
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    /// PUT a JSON body
    Put {
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    /// PATCH a JSON body
    Patch {
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    /// Refresh the access token now
    Refresh,
    /// Log in and store the access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PANTRY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session and forget the stored token
    Logout,
    /// Store an access token obtained elsewhere
    SetToken { token: String },
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn with_body(method: Method, path: String, data: Option<String>) -> anyhow::Result<ApiRequest> {
    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        request.body = Some(serde_json::from_str::<Value>(&data)?);
    }
    Ok(request)
}

async fn run(client: &ApiClient, command: Command) -> anyhow::Result<Option<Value>> {
    let request = match command {
        Command::Get { path, query } => {
            let mut request = ApiRequest::new(Method::GET, path);
            request.query = query;
            request
        }
        Command::Delete { path } => ApiRequest::new(Method::DELETE, path),
        Command::Post { path, data } => with_body(Method::POST, path, data)?,
        Command::Put { path, data } => with_body(Method::PUT, path, data)?,
        Command::Patch { path, data } => with_body(Method::PATCH, path, data)?,
        Command::Refresh => {
            client.manual_refresh_token().await?;
            return Ok(None);
        }
        Command::Login { email, password } => {
            client.login(&email, &password).await?;
            return Ok(None);
        }
        Command::Logout => {
            client.logout().await;
            return Ok(None);
        }
        Command::SetToken { token } => {
            client.set_access_token(AccessToken::new(token)?).await;
            return Ok(None);
        }
    };

    let response = client.send(request).await?;
    Ok(Some(response.json()?))
}

async fn log_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => match notice.level {
                NoticeLevel::Success => tracing::info!(text = %notice.message, "notice"),
                NoticeLevel::Warning => tracing::warn!(text = %notice.message, "notice"),
                NoticeLevel::Error => tracing::error!(text = %notice.message, "notice"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Notice listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry_guard = telemetry::init_telemetry(&cli.config.telemetry)?;

    let client = ClientBuilder::new(cli.config.clone()).build().await?;
    let listener = tokio::spawn(log_notices(client.subscribe_notices()).instrument(tracing::info_span!("notices")));

    let outcome = run(&client, cli.command).await;

    // Dropping the client closes the notice channel once queued notices are read.
    client.wait_for_redirect().await;
    drop(client);
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "Notice listener failed");
    }

    let result = match outcome {
        Ok(Some(value)) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            Err(e)
        }
    };

    telemetry_guard.shutdown();
    result
}
