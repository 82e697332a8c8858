//! Gmail mailbox access.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::TokenSource;
pub use client::{GMAIL_API_BASE, GmailClient};
pub use types::{Label, MessageRef, RawMessage};

use async_trait::async_trait;

use crate::error::GmailError;

/// The mailbox operations a filter run needs.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Up to `max_results` message references from the inbox, newest first.
    async fn list_inbox(&self, max_results: u32) -> Result<Vec<MessageRef>, GmailError>;

    /// The full message, payload tree included.
    async fn get_message(&self, id: &str) -> Result<RawMessage, GmailError>;

    /// Id of the user label called `name`, creating it if needed.
    async fn ensure_label(&self, name: &str) -> Result<String, GmailError>;

    /// Add and remove label ids on one message.
    async fn relabel(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<(), GmailError>;
}
