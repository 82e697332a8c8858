//! Configuration types.
//!
//! Everything is read from the environment, after an optional `.env` file in
//! the working directory has been loaded.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Gmail system label every relabel removes.
pub const INBOX_LABEL: &str = "INBOX";

/// Filter run configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Authorized-user token file (access + refresh token).
    pub token_file: PathBuf,
    /// Maximum inbox messages fetched per run.
    pub max_emails: u32,
    /// Body characters included in the classification prompt.
    pub body_preview_length: usize,
    /// Label applied to unnecessary messages.
    pub label_name: String,
    pub ollama: OllamaConfig,
    pub retry: RetryPolicy,
    /// Where run summaries go. `None` means the working directory.
    pub results_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
}

/// Local model endpoint configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// API base, e.g. `http://localhost:11434/api`.
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Log filtering, destinations and retention.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `debug`, `inbox_sweep=trace`, ...).
    pub level: String,
    /// Log to stderr.
    pub console: bool,
    /// Log file path. The file name is used as the rolling prefix.
    pub file: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Rotated files kept on disk (0 keeps everything).
    pub max_files: usize,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutely" => Ok(LogRotation::Minutely),
            "hourly" => Ok(LogRotation::Hourly),
            "daily" => Ok(LogRotation::Daily),
            "never" => Ok(LogRotation::Never),
            other => Err(format!(
                "unknown rotation '{other}' (expected minutely, hourly, daily or never)"
            )),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api".to_string(),
            model: "llama3.2:latest".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: Some(PathBuf::from("logs/gmail_filter.log")),
            rotation: LogRotation::Daily,
            max_files: 7,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from("token.json"),
            max_emails: 100,
            body_preview_length: 1000,
            label_name: "potential-unnecessary".to_string(),
            ollama: OllamaConfig::default(),
            retry: RetryPolicy::default(),
            results_dir: Some(PathBuf::from("results")),
            logging: LoggingConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Load `.env` (if present) and build the config from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenv::dotenv()
            && !e.not_found()
        {
            return Err(ConfigError::ParseError(format!(".env: {e}")));
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = FilterConfig::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let retry_attempts: u32 = parse_or(&lookup, "RETRY_ATTEMPTS", defaults.retry.max_attempts)?;
        let retry_delay: u64 = parse_or(&lookup, "RETRY_DELAY", defaults.retry.delay.as_secs())?;
        if retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        let ollama_timeout: u64 =
            parse_or(&lookup, "OLLAMA_TIMEOUT", defaults.ollama.timeout.as_secs())?;

        let logging = LoggingConfig {
            level: get("RUST_LOG")
                .filter(|v| !v.is_empty())
                .or_else(|| get("LOG_LEVEL").filter(|v| !v.is_empty()))
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.logging.level),
            console: parse_or(&lookup, "LOG_CONSOLE", defaults.logging.console)?,
            file: match get("LOG_FILE") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(PathBuf::from(v)),
                None => defaults.logging.file,
            },
            rotation: parse_or(&lookup, "LOG_ROTATION", defaults.logging.rotation)?,
            max_files: parse_or(&lookup, "LOG_MAX_FILES", defaults.logging.max_files)?,
        };

        let config = Self {
            token_file: get("TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_file),
            max_emails: parse_or(&lookup, "MAX_EMAILS", defaults.max_emails)?,
            body_preview_length: parse_or(
                &lookup,
                "BODY_PREVIEW_LENGTH",
                defaults.body_preview_length,
            )?,
            label_name: get("LABEL_NAME").unwrap_or(defaults.label_name),
            ollama: OllamaConfig {
                api_url: get("OLLAMA_API_URL").unwrap_or(defaults.ollama.api_url),
                model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama.model),
                timeout: Duration::from_secs(ollama_timeout),
            },
            retry: RetryPolicy::new(retry_attempts, Duration::from_secs(retry_delay)),
            results_dir: match get("RESULTS_DIR") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(PathBuf::from(v)),
                None => defaults.results_dir,
            },
            logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the run cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.api_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "OLLAMA_API_URL".into(),
                hint: "Set it in your environment or .env file.".into(),
            });
        }
        if self.ollama.model.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "OLLAMA_MODEL".into(),
                hint: "Set it in your environment or .env file.".into(),
            });
        }
        if self.label_name.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "LABEL_NAME".into(),
                hint: "Name of the label unnecessary emails are moved to.".into(),
            });
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{v}': {e}"),
        }),
        _ => Ok(default),
    }
}
