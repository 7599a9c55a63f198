//! Size-bounded structured metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Default upper bound on serialized metadata, in bytes.
pub const DEFAULT_METADATA_LIMIT: usize = 64 * 1024;

const TRUNCATED_KEY: &str = "_truncated";

/// Free-form JSON object attached to an audit record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditMetadata(Map<String, Value>);

impl AuditMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value.
    ///
    /// A value that cannot be represented as JSON is left out and logged at
    /// `warn`; the rest of the record is still written.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(json) => {
                self.0.insert(key, json);
            }
            Err(e) => {
                warn!(
                    event = "audit_metadata_skipped",
                    key = %key,
                    error = %e,
                    "Audit metadata value could not be serialized"
                );
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Canonical JSON encoding (keys sorted).
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Parse from a JSON object string.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Size of the canonical JSON encoding in bytes.
    pub fn serialized_len(&self) -> usize {
        self.to_json_string().len()
    }

    /// Whether this metadata is a truncation summary.
    pub fn is_truncated(&self) -> bool {
        matches!(self.0.get(TRUNCATED_KEY), Some(Value::Bool(true)))
    }

    /// Fit the metadata within `limit` bytes.
    ///
    /// Metadata that already fits is returned untouched. Anything larger is
    /// replaced by a summary carrying the original size, the top-level keys
    /// and a prefix of the original encoding, shrunk until it fits.
    pub fn bounded(self, limit: usize) -> Self {
        let encoded = self.to_json_string();
        if encoded.len() <= limit {
            return self;
        }

        let mut keys: Vec<String> = self.0.keys().cloned().collect();
        let mut preview_len = limit / 2;
        loop {
            let summary = Self::summary(encoded.len(), &keys, prefix(&encoded, preview_len));
            let exhausted = keys.is_empty() && preview_len == 0;
            if summary.serialized_len() <= limit || exhausted {
                return summary;
            }
            if preview_len > 0 {
                preview_len /= 2;
            } else {
                keys.truncate(keys.len() / 2);
            }
        }
    }

    fn summary(original_bytes: usize, keys: &[String], preview: &str) -> Self {
        Self::new()
            .with(TRUNCATED_KEY, true)
            .with("original_bytes", original_bytes)
            .with("keys", keys)
            .with("preview", preview)
    }
}

impl From<Map<String, Value>> for AuditMetadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<AuditMetadata> for Value {
    fn from(metadata: AuditMetadata) -> Self {
        Value::Object(metadata.0)
    }
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary.
fn prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
