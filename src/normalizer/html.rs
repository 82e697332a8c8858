//! HTML-to-text reduction.
//!
//! A fixed sequence of regex rewrites, each applied to the output of the
//! previous one. This is not an HTML parser: it only has to produce text a
//! language model can read.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?</script>").expect("valid regex"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style.*?</style>").expect("valid regex"));
static HEAD_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head.*?</head>").expect("valid regex"));
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("valid regex"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]*\n\s*").expect("valid regex"));
static ANY_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Reduce HTML to readable text, keeping one newline per `<br>` / `</p>` run.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = SCRIPT_BLOCK.replace_all(html, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = HEAD_BLOCK.replace_all(&text, " ");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    let text = INLINE_WHITESPACE.replace_all(&text, " ");
    let text = NEWLINE_RUN.replace_all(&text, "\n");

    text.trim().to_string()
}

/// Collapse every whitespace run (newlines included) to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    ANY_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Replace named and numeric character references with their characters.
///
/// Covers the full HTML5 table, including legacy names written without the
/// trailing semicolon (`&amp`, `&copy`). Unknown names are left untouched.
pub fn decode_entities(text: &str) -> String {
    htmlize::unescape(text).into_owned()
}
