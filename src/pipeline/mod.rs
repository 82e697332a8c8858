//! Inbox filtering pipeline.
//!
//! Every inbox message flows through:
//! 1. `Mailbox::get_message()`: provider fetch
//! 2. `ContentNormalizer::normalize()`: flat record, plain-text body
//! 3. `EmailAnalyzer::check_necessity()`: LLM YES/NO verdict
//! 4. `Mailbox::relabel()`: unnecessary messages leave the inbox
//!
//! Nothing is deleted; moved messages stay under the review label.

pub mod analyzer;
pub mod filter;
pub mod results;

pub use analyzer::{EmailAnalyzer, Verdict, VerdictBasis};
pub use filter::{InboxFilter, RunOptions};
pub use results::{RunSummary, save_results};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome for one classified message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub is_necessary: bool,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every message that was fetched and classified.
    pub processed: Vec<ProcessedEmail>,
    /// Unnecessary messages that were actually moved.
    pub unnecessary: Vec<ProcessedEmail>,
    /// Where the summary was written, if anywhere.
    pub results_file: Option<PathBuf>,
}

impl RunReport {
    pub fn unnecessary_ids(&self) -> Vec<&str> {
        self.unnecessary.iter().map(|e| e.id.as_str()).collect()
    }
}
