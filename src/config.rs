use clap::{Args, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "auth/login";
pub const DEFAULT_LOGOUT_PATH: &str = "auth/logout";
pub const DEFAULT_LOGIN_REDIRECT: &str = "/login";
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("pantry-client/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_NOTICE_CAPACITY: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct Config {
    /// Base URL of the pantry API (e.g. https://api.example.com/v1/)
    #[arg(long, env = "PANTRY_API_BASE_URL")]
    pub base_url: String,

    /// File holding the persisted access token. Kept in memory only when unset.
    #[arg(long, env = "PANTRY_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub http: HttpConfig,

    #[command(flatten)]
    pub notices: NoticeConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct AuthConfig {
    /// Refresh endpoint, relative to the base URL (an absolute URL is also accepted)
    #[arg(long, env = "PANTRY_REFRESH_PATH", default_value = DEFAULT_REFRESH_PATH)]
    pub refresh_path: String,

    /// Login endpoint, relative to the base URL
    #[arg(long, env = "PANTRY_LOGIN_PATH", default_value = DEFAULT_LOGIN_PATH)]
    pub login_path: String,

    /// Logout endpoint, relative to the base URL
    #[arg(long, env = "PANTRY_LOGOUT_PATH", default_value = DEFAULT_LOGOUT_PATH)]
    pub logout_path: String,

    /// Where to send the user when the session ends
    #[arg(long, env = "PANTRY_LOGIN_REDIRECT", default_value = DEFAULT_LOGIN_REDIRECT)]
    pub login_redirect: String,

    /// Delay before the login redirect, so the notice is seen first
    #[arg(long, env = "PANTRY_REDIRECT_DELAY_MS", default_value_t = DEFAULT_REDIRECT_DELAY_MS)]
    pub redirect_delay_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct HttpConfig {
    /// Per-request timeout in seconds (0 disables)
    #[arg(long, env = "PANTRY_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "PANTRY_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct NoticeConfig {
    /// Capacity of the notice broadcast channel
    #[arg(long, env = "PANTRY_NOTICE_CAPACITY", default_value_t = DEFAULT_NOTICE_CAPACITY)]
    pub notice_capacity: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "PANTRY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; telemetry export is disabled when unset
    #[arg(long, env = "PANTRY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Configuration with every tunable at its default.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_file: None,
            auth: AuthConfig {
                refresh_path: DEFAULT_REFRESH_PATH.to_string(),
                login_path: DEFAULT_LOGIN_PATH.to_string(),
                logout_path: DEFAULT_LOGOUT_PATH.to_string(),
                login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
                redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            },
            http: HttpConfig {
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            notices: NoticeConfig { notice_capacity: DEFAULT_NOTICE_CAPACITY },
            telemetry: TelemetryConfig { log_format: LogFormat::Text, otlp_endpoint: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn test_programmatic_defaults_match_cli_defaults() {
        let parsed = Cli::try_parse_from(["pantry-client", "--base-url", "http://localhost:3000/api/"]).unwrap();
        assert_eq!(parsed.config, Config::with_base_url("http://localhost:3000/api/"));
    }
}
