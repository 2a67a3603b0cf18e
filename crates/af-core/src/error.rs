//! Core error types for Affix

use std::collections::BTreeMap;
use thiserror::Error;

/// Validation errors collection, keyed by validation name
/// (`presence`, `size`, `content_type`, `processing`).
#[derive(Error, Debug, Default, Clone, PartialEq, Eq)]
#[error("Validation errors: {errors:?}")]
pub struct ValidationErrors {
    /// Validation name -> messages
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Check if there are errors for a specific key
    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Get errors for a specific key
    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// All messages in key order, without the key prefix.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.errors.values().flatten().map(String::as_str)
    }

    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for (field, field_messages) in &self.errors {
            for msg in field_messages {
                messages.push(format!("{} {}", field, msg));
            }
        }
        messages
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_query() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add("size", "file size must be between 0 and 10 bytes.");
        errors.add("size", "second");
        errors.add("presence", "must be set.");

        assert!(!errors.is_empty());
        assert_eq!(errors.len(), 3);
        assert!(errors.has_error("size"));
        assert!(!errors.has_error("content_type"));
        assert_eq!(errors.get("presence").unwrap(), &vec!["must be set.".to_string()]);
    }

    #[test]
    fn test_merge_and_messages() {
        let mut a = ValidationErrors::new();
        a.add("presence", "must be set.");
        let mut b = ValidationErrors::new();
        b.add("processing", "thumb: bad geometry");
        a.merge(b);

        let messages: Vec<&str> = a.messages().collect();
        assert_eq!(messages, vec!["must be set.", "thumb: bad geometry"]);
        assert_eq!(
            a.full_messages(),
            vec![
                "presence must be set.".to_string(),
                "processing thumb: bad geometry".to_string()
            ]
        );
    }
}
