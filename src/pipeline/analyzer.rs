//! Necessity classification: asks the LLM whether a message belongs in the inbox.
//!
//! The model is told to open its answer with `YES` (keep) or `NO` (move).
//! Anything the parser cannot read as a clear answer keeps the message.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::normalizer::NormalizedEmail;

/// Default number of body characters sent to the model.
pub const DEFAULT_BODY_PREVIEW_LENGTH: usize = 1000;

const ANALYSIS_TEMPERATURE: f32 = 0.0;

/// Placeholder for a message with no provider snippet.
const NO_SNIPPET: &str = "(No Snippet)";

pub const SYSTEM_PROMPT: &str = "You are an AI assistant that analyzes emails to determine if \
they are necessary to keep in the inbox.\nYou should respond with ONLY \"YES\" or \"NO\" \
followed by a very brief explanation.";

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictBasis {
    /// The answer opened with `YES` or `NO`.
    FirstToken,
    /// Only one of `YES`/`NO` appeared as a word on the first line.
    FirstLine,
    /// Empty, ambiguous, or no answer at all. Always "necessary".
    FailSafe,
}

/// Classification outcome for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_necessary: bool,
    pub basis: VerdictBasis,
}

impl Verdict {
    pub const fn fail_safe() -> Self {
        Self {
            is_necessary: true,
            basis: VerdictBasis::FailSafe,
        }
    }
}

/// Classifies normalized emails with an LLM.
pub struct EmailAnalyzer {
    llm: Arc<dyn LlmProvider>,
    body_preview_length: usize,
}

impl EmailAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>, body_preview_length: usize) -> Self {
        debug!(body_preview_length, model = llm.model_name(), "Initialized email analyzer");
        Self {
            llm,
            body_preview_length,
        }
    }

    /// Fails when the model backend is not reachable.
    pub async fn ensure_ready(&self) -> Result<(), LlmError> {
        self.llm.health_check().await
    }

    /// Ask the model about one message. Never fails: errors keep the message.
    pub async fn check_necessity(&self, email: &NormalizedEmail) -> Verdict {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_analysis_prompt(email, self.body_preview_length)),
        ])
        .with_temperature(ANALYSIS_TEMPERATURE);

        debug!(id = %email.id, subject = %email.subject, "Analyzing email");

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(id = %email.id, error = %e, "Error analyzing email, keeping it");
                return Verdict::fail_safe();
            }
        };

        let verdict = parse_necessity_response(&response.content);
        match verdict.basis {
            VerdictBasis::FailSafe => warn!(
                id = %email.id,
                subject = %email.subject,
                raw_response = %response.content,
                "Ambiguous response, defaulting to necessary"
            ),
            basis => debug!(
                id = %email.id,
                is_necessary = verdict.is_necessary,
                ?basis,
                "Parsed necessity response"
            ),
        }
        verdict
    }
}

// ── Prompt construction ─────────────────────────────────────────────

const NECESSARY_CATEGORIES: &str = "\
NECESSARY EMAILS (YOU MUST ANSWER \"YES\" FOR THESE):

1. Order Confirmations and Shipping Updates:
   - Online purchase confirmations (Amazon, eBay, etc.)
   - Order shipment notifications with tracking numbers
   - Delivery confirmations
   - Return or refund confirmations

2. Financial Information:
   - Bank statements and transaction alerts for actual transactions
   - Credit card statements and alerts for actual charges
   - Bill payment confirmations
   - Tax documents and receipts
   - Receipts for purchases or donations

3. Personal Communications:
   - Emails from friends, family, or colleagues
   - Direct personal messages (not mass emails with personalization)
   - Responses to inquiries you've made

4. Work and Professional:
   - Job-related emails from colleagues and clients
   - Project updates requiring review
   - Meeting invitations and calendar updates
   - Emails from your boss or team members

5. Account and Security:
   - Password resets you requested
   - Security alerts for your accounts
   - Verification codes
   - Important account changes (not routine updates)

6. Travel and Events:
   - Flight/hotel/car rental confirmations
   - Boarding passes
   - Event tickets
   - Reservation confirmations
   - Appointment reminders

7. Educational:
   - Course communications from instructors
   - Assignment feedback
   - School announcements affecting you directly

8. Required Actions:
   - Emails that explicitly request your response or action
   - Legal notices requiring attention
   - Time-sensitive information";

const UNNECESSARY_CATEGORIES: &str = "\
UNNECESSARY EMAILS (YOU MUST ANSWER \"NO\" FOR THESE):

1. Marketing and Promotions:
   - Sales announcements
   - \"Limited time offers\"
   - Discount codes not related to recent purchases
   - Product recommendations
   - Newsletter digests
   - Daily/weekly deals

2. Automated Updates:
   - Social media notifications
   - News digests or alerts
   - App usage summaries
   - \"We miss you\" emails
   - Platform updates not requiring action

3. Bulk Emails:
   - Mass marketing emails
   - Emails sent to many people simultaneously
   - Promotional content with your name inserted

4. Banking Marketing:
   - Credit card offers
   - Loan offers
   - Insurance promotions
   - Investment opportunities (not actual investments you own)
   - \"Extend your banking privileges\" type offers

5. Subscriptions and Content:
   - Blog post notifications
   - Publication updates
   - RSS feed emails
   - YouTube channel updates

6. Low-Priority Notifications:
   - \"Someone viewed your profile\"
   - Forum/community digests
   - Like/comment notifications
   - \"See what's new\" emails

7. Repetitive Information:
   - Repeated reminders for the same thing
   - Duplicate notifications
   - Follow-up marketing emails";

const ANSWER_INSTRUCTIONS: &str = "\
Analyze the email content, sender, and subject carefully.
For senders, consider if they are a person, company, or automated system.
For subject, look for action words, personalization, or marketing language.
For content, examine if it contains specific information for me or is generic.

Answer with ONLY \"YES\" or \"NO\" first, followed by a very brief explanation, \
focusing on the most relevant category that applies.";

/// Build the per-message prompt. The body is cut to `body_preview_length` chars.
pub fn build_analysis_prompt(email: &NormalizedEmail, body_preview_length: usize) -> String {
    let body: String = email.body.chars().take(body_preview_length).collect();
    let snippet = if email.snippet.is_empty() {
        NO_SNIPPET
    } else {
        email.snippet.as_str()
    };

    let mut prompt = String::from(
        "I need to determine if this email is necessary to keep in my inbox. \
         Analyze it carefully.\n\n",
    );
    prompt.push_str(&format!("Subject: {}\n", email.subject));
    prompt.push_str(&format!("From: {}\n", email.sender));
    prompt.push_str(&format!("Date: {}\n\n", email.date));
    prompt.push_str(&format!("Email snippet: {snippet}\n\n"));
    prompt.push_str(&format!("Email content:\n{body}\n\n"));
    prompt.push_str(NECESSARY_CATEGORIES);
    prompt.push_str("\n\n");
    prompt.push_str(UNNECESSARY_CATEGORIES);
    prompt.push_str("\n\n");
    prompt.push_str(ANSWER_INSTRUCTIONS);
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Read a YES/NO verdict out of free-form model output.
///
/// 1. First whitespace token, upper-cased, trailing punctuation dropped:
///    `YES` keeps, `NO` moves.
/// 2. Otherwise the words of the first line: only `YES` words keeps, only
///    `NO` words moves. Matching is by whole word, so `NOTIFICATION` is not
///    a `NO`.
/// 3. Anything else keeps.
pub fn parse_necessity_response(raw: &str) -> Verdict {
    let text = raw.trim();
    let Some(first) = text.split_whitespace().next() else {
        return Verdict::fail_safe();
    };

    let first = first
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .to_uppercase();
    match first.as_str() {
        "YES" => {
            return Verdict {
                is_necessary: true,
                basis: VerdictBasis::FirstToken,
            };
        }
        "NO" => {
            return Verdict {
                is_necessary: false,
                basis: VerdictBasis::FirstToken,
            };
        }
        _ => {}
    }

    let first_line = text.lines().next().unwrap_or_default().to_uppercase();
    let (mut has_yes, mut has_no) = (false, false);
    for word in first_line.split(|c: char| !c.is_alphanumeric()) {
        match word {
            "YES" => has_yes = true,
            "NO" => has_no = true,
            _ => {}
        }
    }

    match (has_yes, has_no) {
        (true, false) => Verdict {
            is_necessary: true,
            basis: VerdictBasis::FirstLine,
        },
        (false, true) => Verdict {
            is_necessary: false,
            basis: VerdictBasis::FirstLine,
        },
        _ => Verdict::fail_safe(),
    }
}
