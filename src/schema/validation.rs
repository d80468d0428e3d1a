use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::registry::{CollectionDescriptor, FieldKind};
use crate::types::Operation;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleKind {
    NonEmptyString,
    Email,
    /// Must be present; `null` or a valid date
    NullableDate,
    OneOf(Vec<String>),
    Phone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub key: String,
    pub label: String,
    pub kind: RuleKind,
}

/// Failed validation: messages in field order plus the first message per key
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed: {}", .errors.join(", "))]
pub struct ValidationErrors {
    pub errors: Vec<String>,
    pub field_errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    fn push(&mut self, key: &str, message: String) {
        self.field_errors.entry(key.to_string()).or_insert_with(|| message.clone());
        self.errors.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Rules derived from a collection's required fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSchema {
    rules: Vec<Rule>,
}

impl ValidationSchema {
    pub fn for_collection(collection: &CollectionDescriptor) -> Self {
        let rules = collection
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| Rule {
                key: f.key.clone(),
                label: f.label.clone(),
                kind: match &f.kind {
                    FieldKind::Text | FieldKind::Join { .. } => RuleKind::NonEmptyString,
                    FieldKind::Email => RuleKind::Email,
                    FieldKind::Date => RuleKind::NullableDate,
                    FieldKind::Phone => RuleKind::Phone,
                    FieldKind::Dropdown { options } | FieldKind::Radio { options } => {
                        RuleKind::OneOf(options.clone())
                    }
                },
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Check a payload. Creates apply every rule; updates only the rules whose key is present.
    pub fn validate(&self, payload: &Map<String, Value>, op: Operation) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        for rule in &self.rules {
            let value = payload.get(&rule.key);
            if op == Operation::Update && value.is_none() {
                continue;
            }
            if let Some(message) = check(rule, value) {
                errors.push(&rule.key, message);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check(rule: &Rule, value: Option<&Value>) -> Option<String> {
    let required = || format!("{} is required", rule.label);

    match &rule.kind {
        RuleKind::NullableDate => match value {
            None => Some(required()),
            Some(Value::Null) => None,
            Some(v) if is_date(v) => None,
            Some(_) => Some(format!("{} must be a valid date", rule.label)),
        },
        kind => {
            let text = match value {
                None | Some(Value::Null) => return Some(required()),
                Some(Value::String(s)) => s.as_str(),
                Some(_) => return Some(format!("{} must be a text value", rule.label)),
            };
            if text.is_empty() {
                return Some(required());
            }
            match kind {
                RuleKind::Email if !EMAIL.is_match(text) => Some("Invalid email address".to_string()),
                RuleKind::Phone if !PHONE.is_match(text) => Some(format!("Invalid {}", rule.label.to_lowercase())),
                RuleKind::OneOf(options) if !options.iter().any(|o| o == text) => {
                    Some(format!("Invalid {}", rule.label.to_lowercase()))
                }
                _ => None,
            }
        }
    }
}

fn is_date(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
        }
        Value::Number(n) => n
            .as_i64()
            .map(|ms| DateTime::from_timestamp_millis(ms).is_some())
            .unwrap_or(false),
        _ => false,
    }
}
