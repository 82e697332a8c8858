//! Gmail API v1 wire types.
//!
//! Only the fields the filter reads are modelled; everything else in the
//! provider's JSON is ignored on deserialization.

use serde::{Deserialize, Serialize};

// ── Messages ────────────────────────────────────────────────────────

/// A full message as returned by `messages.get?format=full`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    /// Root of the MIME tree. Its headers are the message headers.
    #[serde(default)]
    pub payload: Option<Part>,
}

impl RawMessage {
    /// Message headers in provider order (empty when there is no payload).
    pub fn headers(&self) -> &[Header] {
        self.payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or(&[])
    }
}

/// One node of a message's content tree.
///
/// A part may carry a payload, children, both, or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Part {
    /// The encoded payload attached directly to this part, if any.
    pub fn payload(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.data.as_deref())
    }
}

/// Body section of a part. `data` is base64url text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub data: Option<String>,
}

/// A single header as the provider reports it (name case is not normalized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reference returned by `messages.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageListResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    #[allow(dead_code)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModifyRequest<'a> {
    pub add_label_ids: &'a [&'a str],
    pub remove_label_ids: &'a [&'a str],
}

// ── Labels ──────────────────────────────────────────────────────────

/// A Gmail label (system or user).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub label_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelListResponse {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateLabelRequest<'a> {
    pub name: &'a str,
    pub label_list_visibility: &'a str,
    pub message_list_visibility: &'a str,
}
