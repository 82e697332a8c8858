//! Case-insensitive header lookup.

use std::collections::HashMap;

use crate::gmail::types::Header;

pub const DEFAULT_SUBJECT: &str = "(No Subject)";
pub const DEFAULT_SENDER: &str = "(No Sender)";
pub const DEFAULT_DATE: &str = "(No Date)";

/// Headers keyed by lowercased name. Later occurrences overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct HeaderLookup {
    values: HashMap<String, String>,
}

impl HeaderLookup {
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut values = HashMap::new();
        for (name, value) in pairs {
            values.insert(name.to_lowercase(), value.to_string());
        }
        Self { values }
    }

    pub fn from_headers(headers: &[Header]) -> Self {
        Self::from_pairs(headers.iter().map(|h| (h.name.as_str(), h.value.as_str())))
    }

    /// Look up a header by any casing of its name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn subject(&self) -> &str {
        self.get("subject").unwrap_or(DEFAULT_SUBJECT)
    }

    pub fn sender(&self) -> &str {
        self.get("from").unwrap_or(DEFAULT_SENDER)
    }

    pub fn date(&self) -> &str {
        self.get("date").unwrap_or(DEFAULT_DATE)
    }
}
