//! Email content normalization.
//!
//! Turns a provider message (nested MIME parts, base64url payloads, mixed
//! charsets, HTML) into one flat record with a single-line plain-text body:
//!
//! 1. `headers`: case-insensitive lookup with placeholder defaults
//! 2. `body`: pre-order walk of the part tree into HTML/text accumulators
//! 3. `html`: HTML reduction when no plain text exists, then a final collapse
//!
//! Every step is total: malformed input degrades to an empty string or a
//! placeholder, never an error.

pub mod body;
pub mod headers;
pub mod html;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gmail::types::RawMessage;

pub use body::{BodyAccumulator, decode_payload, extract_body};
pub use headers::{DEFAULT_DATE, DEFAULT_SENDER, DEFAULT_SUBJECT, HeaderLookup};
pub use html::{collapse_whitespace, html_to_text};

/// A message reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    /// Single line, whitespace collapsed. May be empty.
    pub body: String,
    pub labels: BTreeSet<String>,
    pub snippet: String,
}

/// Stateless normalizer. Cheap to construct and safe to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, message: &RawMessage) -> NormalizedEmail {
        let headers = HeaderLookup::from_headers(message.headers());

        let extracted = message
            .payload
            .as_ref()
            .map(extract_body)
            .unwrap_or_default();

        let body = collapse_whitespace(&select_body(&extracted));

        debug!(
            id = %message.id,
            html_len = extracted.html.len(),
            text_len = extracted.text.len(),
            body_len = body.len(),
            "Normalized message"
        );

        NormalizedEmail {
            id: message.id.clone(),
            subject: headers.subject().to_string(),
            sender: headers.sender().to_string(),
            date: headers.date().to_string(),
            body,
            labels: message.label_ids.iter().cloned().collect(),
            snippet: message.snippet.clone(),
        }
    }
}

/// Plain text wins whenever there is any; otherwise reduce the HTML.
fn select_body(extracted: &BodyAccumulator) -> String {
    if !extracted.text.is_empty() {
        extracted.text.clone()
    } else {
        html_to_text(&extracted.html)
    }
}
