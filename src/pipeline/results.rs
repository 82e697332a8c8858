//! Run summary persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::ResultsError;
use crate::pipeline::ProcessedEmail;

/// A moved message as recorded in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnnecessaryEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
}

impl From<&ProcessedEmail> for UnnecessaryEmail {
    fn from(email: &ProcessedEmail) -> Self {
        Self {
            id: email.id.clone(),
            subject: email.subject.clone(),
            sender: email.sender.clone(),
        }
    }
}

/// The JSON document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    pub total_processed: usize,
    pub unnecessary_count: usize,
    pub unnecessary_emails: Vec<UnnecessaryEmail>,
}

impl RunSummary {
    pub fn new(processed: &[ProcessedEmail], unnecessary: &[ProcessedEmail], at: DateTime<Local>) -> Self {
        Self {
            timestamp: at.format("%Y-%m-%d %H:%M:%S").to_string(),
            total_processed: processed.len(),
            unnecessary_count: unnecessary.len(),
            unnecessary_emails: unnecessary.iter().map(UnnecessaryEmail::from).collect(),
        }
    }
}

/// `email_results_%Y%m%d_%H%M%S.json`
pub fn results_file_name(at: DateTime<Local>) -> String {
    format!("email_results_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write the summary under `results_dir` (or the working directory).
///
/// Falls back to the bare file name in the working directory if the first
/// write fails. Returns `None` only when both writes fail.
pub fn save_results(
    processed: &[ProcessedEmail],
    unnecessary: &[ProcessedEmail],
    results_dir: Option<&Path>,
) -> Option<PathBuf> {
    let now = Local::now();
    let summary = RunSummary::new(processed, unnecessary, now);
    let file_name = results_file_name(now);

    let primary = match results_dir {
        Some(dir) => dir.join(&file_name),
        None => PathBuf::from(&file_name),
    };

    match write_summary(&summary, &primary) {
        Ok(()) => {
            info!(path = %primary.display(), "Results saved");
            return Some(primary);
        }
        Err(e) => error!(path = %primary.display(), error = %e, "Error saving results"),
    }

    let fallback = PathBuf::from(&file_name);
    if fallback == primary {
        return None;
    }
    match write_summary(&summary, &fallback) {
        Ok(()) => {
            info!(path = %fallback.display(), "Results saved to fallback path");
            Some(fallback)
        }
        Err(e) => {
            error!(path = %fallback.display(), error = %e, "Error saving results to fallback path");
            None
        }
    }
}

/// Pretty-printed JSON; parent directories are created as needed.
pub fn write_summary(summary: &RunSummary, path: &Path) -> Result<(), ResultsError> {
    let write_err = |source| ResultsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
        debug!(dir = %parent.display(), "Ensured results directory");
    }

    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).map_err(write_err)?;
    Ok(())
}
