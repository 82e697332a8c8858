//! Gmail REST client.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::INBOX_LABEL;
use crate::error::{Error, GmailError};
use crate::gmail::Mailbox;
use crate::gmail::auth::TokenSource;
use crate::gmail::types::{
    CreateLabelRequest, Label, LabelListResponse, MessageListResponse, MessageRef, ModifyRequest,
    RawMessage,
};
use crate::retry::RetryPolicy;

/// Gmail API v1 base for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated Gmail client. Every call runs under the client's retry policy.
#[derive(Debug)]
pub struct GmailClient {
    http: reqwest::Client,
    tokens: TokenSource,
    retry: RetryPolicy,
    base_url: String,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, tokens: TokenSource, retry: RetryPolicy) -> Self {
        Self {
            http,
            tokens,
            retry,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Load the token file and build a client with the default HTTP settings.
    pub fn from_token_file(path: &Path, retry: RetryPolicy) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GmailError::from)?;
        let tokens = TokenSource::load(path, http.clone())?;
        info!(token_file = %path.display(), "Connected to Gmail");
        Ok(Self::new(http, tokens, retry))
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// One attempt: attach the bearer token, send, map error statuses.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GmailError> {
        let token = self.tokens.access_token().await?;
        let resp = request.bearer_auth(token.expose_secret()).send().await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            // Next attempt goes through a refresh.
            self.tokens.invalidate().await;
            return Err(GmailError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GmailError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, GmailError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GmailError>>,
    {
        self.retry
            .run(operation, op)
            .await
            .into_result(|source, attempts| GmailError::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                source: Box::new(source),
            })
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>, GmailError> {
        let url = format!("{}/labels", self.base_url);
        let (this, url) = (self, url.as_str());

        self.retrying("list_labels", move || async move {
            let resp = this.execute(this.http.get(url)).await?;
            let list: LabelListResponse = resp.json().await?;
            Ok(list.labels)
        })
        .await
    }

    pub async fn create_label(&self, name: &str) -> Result<Label, GmailError> {
        let url = format!("{}/labels", self.base_url);
        let (this, url) = (self, url.as_str());
        let body = CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        };
        let body = &body;

        self.retrying("create_label", move || async move {
            let resp = this.execute(this.http.post(url).json(body)).await?;
            Ok(resp.json::<Label>().await?)
        })
        .await
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_inbox(&self, max_results: u32) -> Result<Vec<MessageRef>, GmailError> {
        let url = format!("{}/messages", self.base_url);
        let max = max_results.to_string();
        let (this, url, max) = (self, url.as_str(), max.as_str());

        let refs = self
            .retrying("list_inbox", move || async move {
                let request = this
                    .http
                    .get(url)
                    .query(&[("labelIds", INBOX_LABEL), ("maxResults", max)]);
                let list: MessageListResponse = this.execute(request).await?.json().await?;
                Ok(list.messages)
            })
            .await?;

        debug!(count = refs.len(), "Listed inbox messages");
        Ok(refs)
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, GmailError> {
        validate_message_id(id)?;
        let url = format!("{}/messages/{id}", self.base_url);
        let (this, url) = (self, url.as_str());

        self.retrying("get_message", move || async move {
            let request = this.http.get(url).query(&[("format", "full")]);
            Ok(this.execute(request).await?.json::<RawMessage>().await?)
        })
        .await
    }

    async fn ensure_label(&self, name: &str) -> Result<String, GmailError> {
        let labels = self.list_labels().await?;
        if let Some(label) = labels.into_iter().find(|l| l.name == name) {
            info!(label = name, id = %label.id, "Found existing label");
            return Ok(label.id);
        }

        let label = self.create_label(name).await?;
        info!(label = name, id = %label.id, "Created label");
        Ok(label.id)
    }

    async fn relabel(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<(), GmailError> {
        validate_message_id(id)?;
        let url = format!("{}/messages/{id}/modify", self.base_url);
        let (this, url) = (self, url.as_str());
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };
        let body = &body;

        self.retrying("relabel", move || async move {
            this.execute(this.http.post(url).json(body)).await?;
            Ok(())
        })
        .await?;

        debug!(id, ?add, ?remove, "Relabeled message");
        Ok(())
    }
}

/// Reject ids that could escape the `/messages/{id}` path.
fn validate_message_id(id: &str) -> Result<(), GmailError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(GmailError::InvalidMessageId(id.to_string()));
    }
    Ok(())
}
