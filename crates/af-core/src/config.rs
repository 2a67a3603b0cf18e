//! Configuration types and loading

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

pub use crate::error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AffixConfig {
    /// Storage backend configuration
    pub storage: StorageConfig,

    /// Value of the `:root` interpolation
    pub root: Option<String>,

    /// Value of the `:env` interpolation
    pub env: Option<String>,

    /// Attachment slots, keyed by slot name
    pub attachments: BTreeMap<String, AttachmentSettings>,
}

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
    Dual,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "filesystem" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            "dual" => Ok(StorageBackend::Dual),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "storage.backend".to_string(),
                message: format!("unknown storage backend: {}", s),
            }),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Dual => write!(f, "dual"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Visibility requested for stored objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    Private,
    #[default]
    PublicRead,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
        }
    }
}

/// What a dual backend reports when one side fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DualFailurePolicy {
    /// Return the first failure from either backend
    #[default]
    SurfaceFirst,
    /// Only primary failures are returned; secondary failures are logged
    PrimaryOnly,
}

impl FromStr for DualFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "surface_first" => Ok(Self::SurfaceFirst),
            "primary_only" => Ok(Self::PrimaryOnly),
            _ => Err(ConfigError::InvalidValue {
                key: "storage.dual.failure_policy".to_string(),
                message: format!("unknown failure policy: {}", s),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local: LocalStorageConfig,
    /// S3/MinIO configuration
    pub s3: Option<S3Config>,
    pub dual: DualConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Directory every stored key must resolve into
    pub root: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DualConfig {
    pub failure_policy: DualFailurePolicy,
}

/// Settings for one attachment slot, as read from configuration
///
/// Anything left unset falls back to the attachment defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AttachmentSettings {
    pub url: Option<String>,
    pub path: Option<String>,
    pub default_url: Option<String>,
    pub default_path: Option<String>,
    pub default_style: Option<String>,
    pub whiny: Option<bool>,
    pub access_policy: Option<AccessPolicy>,
    pub styles: BTreeMap<String, StyleSettings>,
    /// Default transform chain
    pub processors: Vec<String>,
    /// Extra convert options per style; the `all` key applies to every style
    pub convert_options: BTreeMap<String, String>,
    pub validations: ValidationSettings,
}

/// A style is either a bare geometry string or a full table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StyleSettings {
    Geometry(String),
    Full {
        #[serde(default)]
        geometry: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        processors: Option<Vec<String>>,
        #[serde(default)]
        convert_options: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub presence: bool,
    pub size: Option<SizeRange>,
    /// Allowed content types; entries wrapped in `/.../` are regular expressions
    pub content_types: Vec<String>,
}

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SizeRange {
    #[serde(default)]
    pub min: u64,
    pub max: u64,
}

impl AffixConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("AFFIX_STORAGE_BACKEND") {
            config.storage.backend = backend.parse()?;
        }
        if let Ok(root) = std::env::var("AFFIX_STORAGE_ROOT") {
            config.storage.local.root = root;
        }
        if let Ok(root) = std::env::var("AFFIX_ROOT") {
            config.root = Some(root);
        }
        if let Ok(env) = std::env::var("AFFIX_ENV") {
            config.env = Some(env);
        }

        // S3 storage
        if let Ok(bucket) = std::env::var("S3_BUCKET") {
            config.storage.s3 = Some(S3Config {
                bucket,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
            });
        }

        if let Ok(policy) = std::env::var("AFFIX_DUAL_FAILURE_POLICY") {
            config.storage.dual.failure_policy = policy.parse()?;
        }

        Ok(config)
    }

    /// Load configuration from an optional file, layered under
    /// `AFFIX__`-prefixed environment variables (e.g. `AFFIX__STORAGE__BACKEND`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix("AFFIX").separator("__"));

        let loaded = builder
            .build()
            .map_err(|e| ConfigError::FileError(e.to_string()))?;

        let config: Self = loaded
            .try_deserialize()
            .map_err(|e| ConfigError::FileError(e.to_string()))?;

        tracing::debug!(
            backend = %config.storage.backend,
            attachments = config.attachments.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Settings for a slot, or defaults when the slot is not configured
    pub fn attachment(&self, slot: &str) -> AttachmentSettings {
        self.attachments.get(slot).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AffixConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.local.root, "/");
        assert_eq!(config.storage.dual.failure_policy, DualFailurePolicy::SurfaceFirst);
        assert!(config.attachments.is_empty());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "filesystem".parse::<StorageBackend>().unwrap(),
            StorageBackend::Local
        );
        assert!("nfs".parse::<StorageBackend>().is_err());
        assert_eq!(StorageBackend::Dual.to_string(), "dual");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile_in_target("affix-config-test.toml");
        writeln!(
            file.1,
            r#"
root = "/srv/app"

[storage]
backend = "dual"

[storage.local]
root = "/srv/app/public"

[storage.s3]
bucket = "attachments"
region = "eu-west-1"

[attachments.avatar]
path = ":root/public/:attachment/:id/:style/:filename"
whiny = false
processors = ["thumbnail"]

[attachments.avatar.styles]
thumb = "100x100#"
large = {{ geometry = "800x600>", format = "jpg" }}

[attachments.avatar.convert_options]
all = "-strip"

[attachments.avatar.validations]
presence = true
content_types = ["image/png", "/^image\\/.*$/"]

[attachments.avatar.validations.size]
max = 1048576
"#
        )
        .unwrap();

        let config = AffixConfig::load(Some(&file.0)).unwrap();
        std::fs::remove_file(&file.0).ok();

        assert_eq!(config.storage.backend, StorageBackend::Dual);
        assert_eq!(config.storage.s3.as_ref().unwrap().bucket, "attachments");
        assert_eq!(config.root.as_deref(), Some("/srv/app"));

        let avatar = config.attachment("avatar");
        assert_eq!(avatar.whiny, Some(false));
        assert_eq!(
            avatar.styles.get("thumb"),
            Some(&StyleSettings::Geometry("100x100#".to_string()))
        );
        assert!(matches!(
            avatar.styles.get("large"),
            Some(StyleSettings::Full { format: Some(f), .. }) if f == "jpg"
        ));
        assert_eq!(avatar.validations.size, Some(SizeRange { min: 0, max: 1048576 }));
        assert_eq!(avatar.validations.content_types.len(), 2);

        let missing = config.attachment("logo");
        assert!(missing.styles.is_empty());
    }

    fn tempfile_in_target(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
