//! OAuth2 access tokens from an authorized-user token file.
//!
//! The file is the JSON Google's client libraries write after the consent
//! flow (`token`, `refresh_token`, `token_uri`, `client_id`, `client_secret`,
//! `scopes`, `expiry`). The access token is cached in memory, refreshed with
//! the refresh-token grant when it is about to expire, and written back.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Error, GmailError};

/// Google's OAuth2 token endpoint, used when the file does not name one.
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// On-disk layout. Plain strings only live here, between read and write.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

struct Credentials {
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    token_uri: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    scopes: Vec<String>,
    expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    fn from_file(file: TokenFile) -> Self {
        Self {
            access_token: file.token.filter(|t| !t.is_empty()).map(SecretString::from),
            refresh_token: file.refresh_token.filter(|t| !t.is_empty()).map(SecretString::from),
            token_uri: file.token_uri.unwrap_or_else(|| TOKEN_ENDPOINT.to_string()),
            client_id: file.client_id,
            client_secret: file.client_secret.map(SecretString::from),
            scopes: file.scopes,
            expiry: file.expiry,
        }
    }

    fn to_file(&self) -> TokenFile {
        TokenFile {
            token: self.access_token.as_ref().map(|s| s.expose_secret().to_string()),
            refresh_token: self.refresh_token.as_ref().map(|s| s.expose_secret().to_string()),
            token_uri: Some(self.token_uri.clone()),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.as_ref().map(|s| s.expose_secret().to_string()),
            scopes: self.scopes.clone(),
            expiry: self.expiry,
        }
    }

    /// A token with no recorded expiry is trusted until the API rejects it.
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expiry) {
            (None, _) => true,
            (Some(_), Some(exp)) => now >= exp - ChronoDuration::seconds(EXPIRY_SKEW_SECS),
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Supplies bearer tokens for Gmail API calls.
pub struct TokenSource {
    path: PathBuf,
    credentials: Mutex<Credentials>,
    client: reqwest::Client,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    /// Read the token file. A missing file is a configuration problem.
    pub fn load(path: &Path, client: reqwest::Client) -> Result<Self, Error> {
        if !path.exists() {
            return Err(ConfigError::MissingRequired {
                key: "TOKEN_FILE".into(),
                hint: format!(
                    "{} not found. Authorize the Gmail API (scope gmail.modify) and save the \
                     authorized-user token JSON there.",
                    path.display()
                ),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| GmailError::Token {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file: TokenFile = serde_json::from_str(&content).map_err(|e| GmailError::Token {
            path: path.to_path_buf(),
            reason: format!("invalid JSON: {e}"),
        })?;

        let credentials = Credentials::from_file(file);
        if credentials.access_token.is_none() && credentials.refresh_token.is_none() {
            return Err(GmailError::Token {
                path: path.to_path_buf(),
                reason: "neither token nor refresh_token is present".into(),
            }
            .into());
        }

        debug!(path = %path.display(), expiry = ?credentials.expiry, "Loaded Gmail token");

        Ok(Self {
            path: path.to_path_buf(),
            credentials: Mutex::new(credentials),
            client,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A valid access token, refreshing first if needed.
    pub async fn access_token(&self) -> Result<SecretString, GmailError> {
        let mut creds = self.credentials.lock().await;

        if !creds.needs_refresh(Utc::now())
            && let Some(token) = &creds.access_token
        {
            return Ok(token.clone());
        }

        debug!("Gmail access token expired or missing, refreshing");
        self.refresh(&mut creds).await?;

        creds
            .access_token
            .clone()
            .ok_or_else(|| GmailError::TokenRefresh("refresh returned no access token".into()))
    }

    /// Forget the cached access token so the next call refreshes.
    pub async fn invalidate(&self) {
        let mut creds = self.credentials.lock().await;
        creds.expiry = Some(Utc::now());
    }

    async fn refresh(&self, creds: &mut Credentials) -> Result<(), GmailError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            creds.refresh_token.as_ref(),
            creds.client_id.as_deref(),
            creds.client_secret.as_ref(),
        ) else {
            return Err(GmailError::TokenRefresh(
                "token file lacks refresh_token, client_id or client_secret".into(),
            ));
        };

        let resp = self
            .client
            .post(&creds.token_uri)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "Gmail token refresh failed");
            return Err(GmailError::TokenRefresh(format!("status {status}: {body}")));
        }

        let body: RefreshResponse = resp.json().await?;
        let expires_in = body.expires_in.unwrap_or(3600);

        creds.access_token = Some(SecretString::from(body.access_token));
        creds.expiry = Some(Utc::now() + ChronoDuration::seconds(expires_in));
        if let Some(rotated) = body.refresh_token {
            creds.refresh_token = Some(SecretString::from(rotated));
        }

        info!(expires_in, "Refreshed Gmail access token");

        // The refreshed token is still usable for this run if the write fails.
        if let Err(e) = self.save(creds) {
            warn!(path = %self.path.display(), error = %e, "Failed to write refreshed token");
        }
        Ok(())
    }

    fn save(&self, creds: &Credentials) -> Result<(), GmailError> {
        let token_err = |reason: String| GmailError::Token {
            path: self.path.clone(),
            reason,
        };
        let content = serde_json::to_string_pretty(&creds.to_file())
            .map_err(|e| token_err(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| token_err(e.to_string()))?;
        restrict_permissions(&self.path).map_err(|e| token_err(e.to_string()))?;
        debug!(path = %self.path.display(), "Saved Gmail token");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
