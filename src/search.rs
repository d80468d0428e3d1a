//! Search over list results: case-insensitive substring matching on a collection's
//! `search_fields`, using the joined display value for join fields.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::registry::CollectionDescriptor;
use crate::schema::JoinPipeline;

/// Shown for a field with no value
pub const MISSING: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    key: String,
    /// Where the display value lives: the record itself or the joined details
    details: Option<(String, String)>,
    needle: String,
}

/// Conjunction of per-field substring terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    terms: Vec<Term>,
}

impl RecordFilter {
    /// Build from query parameters; only non-empty values for declared search fields count.
    /// Join fields are matched on the display key of their resolved record.
    pub fn from_params(
        collection: &CollectionDescriptor,
        pipeline: &JoinPipeline,
        params: &HashMap<String, String>,
    ) -> Self {
        let terms = collection
            .search_fields
            .iter()
            .filter_map(|key| {
                let needle = params.get(key)?.trim();
                if needle.is_empty() {
                    return None;
                }
                let details = pipeline
                    .lookup(key)
                    .map(|lookup| (lookup.as_field.clone(), lookup.display_key.clone()));
                Some(Term {
                    key: key.clone(),
                    details,
                    needle: needle.to_lowercase(),
                })
            })
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.terms.iter().all(|term| {
            let value = match &term.details {
                Some((details_key, display_key)) => record.get(details_key).and_then(|d| d.get(display_key)),
                None => record.get(&term.key),
            };
            display_value(value).to_lowercase().contains(&term.needle)
        })
    }

    pub fn apply(&self, records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Text a value is searched (and shown) as
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING.to_string(),
        Some(Value::String(s)) if s.is_empty() => MISSING.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
