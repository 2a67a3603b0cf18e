//! A record stored as a JSON document
//!
//! ```json
//! { "model": "User", "id": 42, "attributes": { "avatar_file_name": "5k.png" } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use af_core::{AttachmentField, AttributeValue, Record, RecordId};
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    model: String,
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default)]
    attributes: BTreeMap<String, Option<AttributeValue>>,
}

#[derive(Debug)]
pub struct JsonRecord {
    path: PathBuf,
    document: Document,
    errors: Vec<(String, String)>,
}

impl JsonRecord {
    /// Load the record at `path`, or start a new one for `model` when the
    /// file does not exist yet
    pub async fn open(path: impl AsRef<Path>, model: &str, id: Option<RecordId>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "Starting a new record");
            Document {
                model: model.to_string(),
                id,
                attributes: BTreeMap::new(),
            }
        };

        Ok(Self {
            path,
            document,
            errors: Vec::new(),
        })
    }

    /// Declare the metadata columns of `slot` that are not there yet
    pub fn ensure_attachment_columns(&mut self, slot: &str) {
        for field in AttachmentField::METADATA {
            self.document.attributes.entry(field.column(slot)).or_insert(None);
        }
    }

    pub async fn persist(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.document)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    pub fn attributes(&self) -> &BTreeMap<String, Option<AttributeValue>> {
        &self.document.attributes
    }

    pub fn errors(&self) -> &[(String, String)] {
        &self.errors
    }
}

impl Record for JsonRecord {
    fn id(&self) -> Option<RecordId> {
        self.document.id
    }

    fn model_name(&self) -> &str {
        &self.document.model
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.document.attributes.contains_key(name)
    }

    fn read_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.document.attributes.get(name).cloned().flatten()
    }

    fn write_attribute(&mut self, name: &str, value: Option<AttributeValue>) {
        if let Some(slot) = self.document.attributes.get_mut(name) {
            *slot = value;
        }
    }

    fn run_hook(&mut self, hook: &str, attachment: &str) -> bool {
        tracing::debug!(hook, attachment, "Hook");
        true
    }

    fn add_error(&mut self, attribute: &str, message: &str) {
        self.errors.push((attribute.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_record_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");

        let mut record = JsonRecord::open(&path, "User", Some(42)).await.unwrap();
        record.ensure_attachment_columns("avatar");
        assert!(record.has_attribute("avatar_updated_at"));
        record.write_attribute("avatar_file_name", Some("5k.png".into()));
        record.write_attribute("avatar_file_size", Some(AttributeValue::Integer(5120)));
        record.persist().await.unwrap();

        let reloaded = JsonRecord::open(&path, "Ignored", None).await.unwrap();
        assert_eq!(reloaded.model_name(), "User");
        assert_eq!(reloaded.id(), Some(42));
        assert_eq!(
            reloaded.read_attribute("avatar_file_name"),
            Some(AttributeValue::Text("5k.png".to_string()))
        );
        assert_eq!(
            reloaded.read_attribute("avatar_file_size"),
            Some(AttributeValue::Integer(5120))
        );
        assert!(reloaded.has_attribute("avatar_content_type"));
        assert_eq!(reloaded.read_attribute("avatar_content_type"), None);
    }

    #[tokio::test]
    async fn test_undeclared_attributes_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = JsonRecord::open(dir.path().join("r.json"), "User", None).await.unwrap();

        record.write_attribute("avatar_fingerprint", Some("abc".into()));
        assert!(!record.has_attribute("avatar_fingerprint"));
        assert!(record.run_hook("before_post_process", "avatar"));
    }
}
