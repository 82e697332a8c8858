//! One filter pass over the inbox.
//!
//! Flow:
//! 1. Model readiness check (abort if down)
//! 2. Ensure the target label exists (abort on failure)
//! 3. List inbox messages (abort on failure)
//! 4. Per message: fetch → normalize → classify → relabel if unnecessary
//! 5. Save the run summary
//!
//! Per-message failures are logged and skipped; they never end the run.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{FilterConfig, INBOX_LABEL};
use crate::error::Error;
use crate::gmail::{Mailbox, MessageRef};
use crate::normalizer::ContentNormalizer;
use crate::pipeline::analyzer::EmailAnalyzer;
use crate::pipeline::results::save_results;
use crate::pipeline::{ProcessedEmail, RunReport};

/// Subject characters shown in progress lines.
const SUBJECT_PREVIEW_CHARS: usize = 50;

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_emails: u32,
    pub label_name: String,
    pub results_dir: Option<PathBuf>,
}

impl From<&FilterConfig> for RunOptions {
    fn from(config: &FilterConfig) -> Self {
        Self {
            max_emails: config.max_emails,
            label_name: config.label_name.clone(),
            results_dir: config.results_dir.clone(),
        }
    }
}

/// Moves unnecessary inbox messages under a review label.
pub struct InboxFilter {
    mailbox: Arc<dyn Mailbox>,
    analyzer: EmailAnalyzer,
    normalizer: ContentNormalizer,
    options: RunOptions,
}

impl InboxFilter {
    pub fn new(mailbox: Arc<dyn Mailbox>, analyzer: EmailAnalyzer, options: RunOptions) -> Self {
        Self {
            mailbox,
            analyzer,
            normalizer: ContentNormalizer::new(),
            options,
        }
    }

    pub async fn run(&self) -> Result<RunReport, Error> {
        let label_name = self.options.label_name.as_str();

        info!("Step 1: Checking model availability");
        self.analyzer.ensure_ready().await?;

        info!(label = label_name, "Step 2: Ensuring label exists");
        let label_id = self.mailbox.ensure_label(label_name).await?;
        info!(label = label_name, id = %label_id, "Label ready");

        info!(max = self.options.max_emails, "Step 3: Fetching emails from inbox");
        let refs = self.mailbox.list_inbox(self.options.max_emails).await?;
        info!(count = refs.len(), "Found emails to process");

        info!("Step 4: Processing emails");
        let total = refs.len();
        let mut processed = Vec::with_capacity(total);
        let mut unnecessary = Vec::new();

        for (i, msg_ref) in refs.iter().enumerate() {
            let Some(record) = self.process_one(msg_ref, i + 1, total).await else {
                continue;
            };
            processed.push(record.clone());

            if record.is_necessary {
                info!(id = %record.id, "Determined to be necessary, keeping in inbox");
                continue;
            }

            match self
                .mailbox
                .relabel(&record.id, &[label_id.as_str()], &[INBOX_LABEL])
                .await
            {
                Ok(()) => {
                    info!(id = %record.id, label = label_name, "Marked as unnecessary and moved");
                    unnecessary.push(record);
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Determined to be unnecessary, but failed to move");
                }
            }
        }

        info!("Step 5: Saving results");
        let results_file = save_results(
            &processed,
            &unnecessary,
            self.options.results_dir.as_deref(),
        );

        let report = RunReport {
            processed,
            unnecessary,
            results_file,
        };
        info!(
            processed = report.processed.len(),
            unnecessary = report.unnecessary.len(),
            label = label_name,
            "Processing complete"
        );
        Ok(report)
    }

    /// Fetch, normalize and classify one message. `None` if the fetch fails.
    async fn process_one(&self, msg_ref: &MessageRef, n: usize, total: usize) -> Option<ProcessedEmail> {
        let raw = match self.mailbox.get_message(&msg_ref.id).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(id = %msg_ref.id, error = %e, "Error fetching email, skipping");
                return None;
            }
        };

        let email = self.normalizer.normalize(&raw);
        let subject_preview: String = email.subject.chars().take(SUBJECT_PREVIEW_CHARS).collect();
        info!(id = %msg_ref.id, "Processing email {n}/{total}: '{subject_preview}...'");

        let verdict = self.analyzer.check_necessity(&email).await;

        Some(ProcessedEmail {
            id: msg_ref.id.clone(),
            subject: email.subject,
            sender: email.sender,
            is_necessary: verdict.is_necessary,
        })
    }
}
