//! Parent-record contract
//!
//! An attachment never owns the record it belongs to. Every engine operation
//! receives the record explicitly and talks to it through [`Record`]: read and
//! write attribute values, run a named hook, and add an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Primary key type
pub type RecordId = i64;

/// Metadata columns an attachment slot keeps on its record.
///
/// Column names are `<slot>_<suffix>`, e.g. `avatar_file_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentField {
    FileName,
    ContentType,
    FileSize,
    UpdatedAt,
    Fingerprint,
}

impl AttachmentField {
    /// The four fields every attachment maintains.
    pub const METADATA: [AttachmentField; 4] = [
        AttachmentField::FileName,
        AttachmentField::ContentType,
        AttachmentField::FileSize,
        AttachmentField::UpdatedAt,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::FileName => "file_name",
            Self::ContentType => "content_type",
            Self::FileSize => "file_size",
            Self::UpdatedAt => "updated_at",
            Self::Fingerprint => "fingerprint",
        }
    }

    /// Column name for this field on the given slot
    pub fn column(&self, slot: &str) -> String {
        format!("{}_{}", slot, self.suffix())
    }
}

/// A value stored in a record attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::Integer(i) => Utc.timestamp_opt(*i, 0).single(),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    /// Seconds since the Unix epoch, for timestamps stored either way
    pub fn as_unix_timestamp(&self) -> Option<i64> {
        self.as_timestamp().map(|t| t.timestamp())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// The parent record an attachment slot belongs to
pub trait Record: Send + Sync {
    /// Primary key, if persisted
    fn id(&self) -> Option<RecordId>;

    /// Model name, e.g. `User`. Used by the `:class` interpolation.
    fn model_name(&self) -> &str;

    /// Whether the record exposes a readable/writable attribute
    fn has_attribute(&self, name: &str) -> bool;

    fn read_attribute(&self, name: &str) -> Option<AttributeValue>;

    /// Write an attribute; `None` nulls it
    fn write_attribute(&mut self, name: &str, value: Option<AttributeValue>);

    /// Run a named lifecycle hook. Returning `false` halts the operation.
    fn run_hook(&mut self, hook: &str, attachment: &str) -> bool;

    /// Add an error to the record's error collection
    fn add_error(&mut self, attribute: &str, message: &str);
}

type HookFn = Box<dyn FnMut(&str) -> bool + Send + Sync>;

/// In-memory record
///
/// Only declared columns are attributes; writes to undeclared names are
/// ignored, like a model without that column.
pub struct MemoryRecord {
    id: Option<RecordId>,
    model_name: String,
    attributes: BTreeMap<String, Option<AttributeValue>>,
    hooks: HashMap<String, HookFn>,
    hook_log: Vec<String>,
    errors: Vec<(String, String)>,
}

impl MemoryRecord {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            id: None,
            model_name: model_name.into(),
            attributes: BTreeMap::new(),
            hooks: HashMap::new(),
            hook_log: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Declare a column
    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        self.attributes.entry(name.into()).or_insert(None);
        self
    }

    /// Declare the four metadata columns for an attachment slot
    pub fn with_attachment_columns(mut self, slot: &str) -> Self {
        for field in AttachmentField::METADATA {
            self = self.with_column(field.column(slot));
        }
        self
    }

    /// Register a hook handler
    pub fn on_hook<F>(mut self, hook: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&str) -> bool + Send + Sync + 'static,
    {
        self.hooks.insert(hook.into(), Box::new(handler));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), Some(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).and_then(Option::as_ref)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Option<AttributeValue>> {
        &self.attributes
    }

    /// Hooks that ran, in order
    pub fn hook_log(&self) -> &[String] {
        &self.hook_log
    }

    pub fn errors(&self) -> &[(String, String)] {
        &self.errors
    }

    pub fn errors_on(&self, attribute: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|(a, _)| a == attribute)
            .map(|(_, m)| m.as_str())
            .collect()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

impl Record for MemoryRecord {
    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    fn read_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).cloned().flatten()
    }

    fn write_attribute(&mut self, name: &str, value: Option<AttributeValue>) {
        if let Some(slot) = self.attributes.get_mut(name) {
            *slot = value;
        }
    }

    fn run_hook(&mut self, hook: &str, attachment: &str) -> bool {
        self.hook_log.push(hook.to_string());
        match self.hooks.get_mut(hook) {
            Some(handler) => handler(attachment),
            None => true,
        }
    }

    fn add_error(&mut self, attribute: &str, message: &str) {
        self.errors.push((attribute.to_string(), message.to_string()));
    }
}

impl fmt::Debug for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRecord")
            .field("id", &self.id)
            .field("model_name", &self.model_name)
            .field("attributes", &self.attributes)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_columns() {
        assert_eq!(AttachmentField::FileName.column("avatar"), "avatar_file_name");
        assert_eq!(AttachmentField::UpdatedAt.column("logo"), "logo_updated_at");
        assert_eq!(AttachmentField::METADATA.len(), 4);
    }

    #[test]
    fn test_memory_record_ignores_undeclared_columns() {
        let mut record = MemoryRecord::new("User").with_attachment_columns("avatar");

        assert!(record.has_attribute("avatar_file_name"));
        assert!(!record.has_attribute("avatar_fingerprint"));

        record.write_attribute("avatar_file_name", Some("a.png".into()));
        record.write_attribute("avatar_fingerprint", Some("abc".into()));

        assert_eq!(
            record.read_attribute("avatar_file_name"),
            Some(AttributeValue::Text("a.png".to_string()))
        );
        assert_eq!(record.read_attribute("avatar_fingerprint"), None);
    }

    #[test]
    fn test_hooks_are_logged_and_can_halt() {
        let mut record = MemoryRecord::new("User").on_hook("before_post_process", |_| false);

        assert!(!record.run_hook("before_post_process", "avatar"));
        assert!(record.run_hook("after_post_process", "avatar"));
        assert_eq!(
            record.hook_log(),
            &["before_post_process".to_string(), "after_post_process".to_string()]
        );
    }

    #[test]
    fn test_attribute_value_conversions() {
        assert_eq!(AttributeValue::Integer(12345).as_unix_timestamp(), Some(12345));
        let ts = Utc.timestamp_opt(12345, 0).unwrap();
        assert_eq!(AttributeValue::Timestamp(ts).as_unix_timestamp(), Some(12345));
        assert_eq!(AttributeValue::Text("42".into()).as_integer(), Some(42));
        assert_eq!(AttributeValue::Text("x".into()).as_timestamp(), None);
    }

    #[test]
    fn test_attribute_value_json_roundtrip_keeps_variant() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let json = serde_json::to_string(&AttributeValue::Timestamp(ts)).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttributeValue::Timestamp(ts));

        let back: AttributeValue = serde_json::from_str("\"photo.png\"").unwrap();
        assert_eq!(back, AttributeValue::Text("photo.png".to_string()));
    }
}
