// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single log record flowing through the pipeline.
///
/// - `body`: the decoded log record, as carved out by the splitter
/// - `attributes`: metadata attached by the producing stage (file name,
///   file path, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// When the record was observed by the agent
    pub timestamp: DateTime<Utc>,

    /// The log body
    pub body: String,

    /// Metadata attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
}

impl Entry {
    /// Create a new entry with the given body and the current timestamp
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute to the entry
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Get an attribute as a string, if present and a string
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}
