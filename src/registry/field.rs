use serde::{Deserialize, Serialize};

use super::RegistryError;

/// Target of a `join` field: the foreign collection and the key shown in place of the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignRef {
    pub collection: String,
    pub display_key: String,
}

impl ForeignRef {
    /// Parse the `"<collection>;<display-key>"` form used in registry files
    pub fn parse(raw: &str) -> Option<Self> {
        let (collection, display_key) = raw.split_once(';')?;
        let collection = collection.trim();
        let display_key = display_key.trim();
        if collection.is_empty() || display_key.is_empty() || display_key.contains(';') {
            return None;
        }
        Some(Self {
            collection: collection.to_string(),
            display_key: display_key.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Date,
    Phone,
    /// Single choice from a fixed option list
    Dropdown { options: Vec<String> },
    /// Single choice rendered as a radio group
    Radio { options: Vec<String> },
    /// Reference to a record in another collection
    Join { target: ForeignRef },
}

impl FieldKind {
    pub fn tag(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Date => "date",
            FieldKind::Phone => "phone",
            FieldKind::Dropdown { .. } => "dropdown",
            FieldKind::Radio { .. } => "radio",
            FieldKind::Join { .. } => "join",
        }
    }

    pub fn options(&self) -> Option<&[String]> {
        match self {
            FieldKind::Dropdown { options } | FieldKind::Radio { options } => Some(options),
            _ => None,
        }
    }

    pub fn foreign_ref(&self) -> Option<&ForeignRef> {
        match self {
            FieldKind::Join { target } => Some(target),
            _ => None,
        }
    }
}

/// One form field of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub label: String,
    pub key: String,
    pub required: bool,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(label: impl Into<String>, key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            required: false,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, FieldKind::Join { .. })
    }

    /// Key under which the resolved foreign record is attached on reads
    pub fn details_key(&self) -> String {
        format!("{}Details", self.key)
    }
}

/// Field as written in a registry file, before the kind payload is checked
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawField {
    pub label: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub join: Option<String>,
}

impl RawField {
    pub(crate) fn into_descriptor(self, collection: &str) -> Result<FieldDescriptor, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidField {
            collection: collection.to_string(),
            key: self.key.clone(),
            reason,
        };

        if self.key.trim().is_empty() {
            return Err(invalid("field key must not be empty".to_string()));
        }
        if self.label.trim().is_empty() {
            return Err(invalid("field label must not be empty".to_string()));
        }

        let takes_options = matches!(self.kind.as_str(), "dropdown" | "radio");
        if self.options.is_some() && !takes_options {
            return Err(invalid(format!("'options' is not allowed for type '{}'", self.kind)));
        }
        if self.join.is_some() && self.kind != "join" {
            return Err(invalid(format!("'join' is not allowed for type '{}'", self.kind)));
        }

        let kind = match self.kind.as_str() {
            "text" => FieldKind::Text,
            "email" => FieldKind::Email,
            "date" => FieldKind::Date,
            "phone" => FieldKind::Phone,
            "dropdown" | "radio" => {
                let options = self
                    .options
                    .clone()
                    .filter(|o| !o.is_empty())
                    .ok_or_else(|| invalid(format!("type '{}' needs a non-empty 'options' list", self.kind)))?;
                if self.kind == "dropdown" {
                    FieldKind::Dropdown { options }
                } else {
                    FieldKind::Radio { options }
                }
            }
            "join" => {
                let raw = self
                    .join
                    .as_deref()
                    .ok_or_else(|| invalid("type 'join' needs a 'join: <collection>;<display-key>' entry".to_string()))?;
                let target = ForeignRef::parse(raw)
                    .ok_or_else(|| invalid(format!("malformed join target '{}'", raw)))?;
                FieldKind::Join { target }
            }
            other => return Err(invalid(format!("unknown field type '{}'", other))),
        };

        Ok(FieldDescriptor {
            label: self.label,
            key: self.key,
            required: self.required,
            kind,
        })
    }
}
