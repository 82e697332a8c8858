//! Body-tree traversal and payload decoding.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use tracing::{error, warn};

use crate::gmail::types::Part;

/// Parts nested deeper than this are skipped.
pub const MAX_PART_DEPTH: usize = 64;

/// Gmail emits base64url both with and without padding.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// HTML and plain-text content collected from a part tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyAccumulator {
    pub html: String,
    pub text: String,
}

impl BodyAccumulator {
    fn append(&mut self, other: BodyAccumulator) {
        self.html.push_str(&other.html);
        self.text.push_str(&other.text);
    }
}

/// Walk the tree depth-first, pre-order, collecting decoded content.
///
/// Fragments are concatenated without any separator, so the last word of one
/// part can run straight into the first word of the next.
pub fn extract_body(root: &Part) -> BodyAccumulator {
    extract_at_depth(root, 0)
}

fn extract_at_depth(part: &Part, depth: usize) -> BodyAccumulator {
    let mut acc = BodyAccumulator::default();

    if depth > MAX_PART_DEPTH {
        warn!(depth, "MIME tree exceeds maximum depth, skipping subtree");
        return acc;
    }

    if let Some(data) = part.payload() {
        let content = decode_payload(data);
        let mime_type = part.mime_type.as_deref().unwrap_or("");
        if mime_type.contains("text/html") {
            acc.html.push_str(&content);
        } else if mime_type.contains("text/plain") {
            acc.text.push_str(&content);
        }
    }

    for child in &part.parts {
        acc.append(extract_at_depth(child, depth + 1));
    }

    acc
}

/// Text encodings tried, in order, on a decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub const FALLBACK_ORDER: [TextEncoding; 3] =
        [TextEncoding::Utf8, TextEncoding::Latin1, TextEncoding::Ascii];

    /// Decode `bytes` strictly, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            // Every byte is a valid ISO-8859-1 code point.
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Decode a base64url payload into text.
///
/// Never fails: malformed base64 is logged and yields an empty string.
pub fn decode_payload(data: &str) -> String {
    let bytes = match BASE64URL.decode(data.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Error decoding payload");
            return String::new();
        }
    };

    TextEncoding::FALLBACK_ORDER
        .iter()
        .find_map(|encoding| encoding.decode(&bytes))
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned())
}
