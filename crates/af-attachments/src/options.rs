//! Per-slot attachment options
//!
//! Built once per attachment from the defaults below plus caller overrides,
//! then frozen behind an `Arc`.

use std::collections::BTreeMap;

use af_core::{AccessPolicy, AffixConfig, AttachmentSettings, Record, StorageBackend, StorageConfig};
use af_processing::{ConvertOptionsSource, StyleSpec, StylesSource, ORIGINAL_STYLE};

use crate::error::{AttachmentError, AttachmentResult};
use crate::validation::{ContentTypeMatcher, Validation};

pub const DEFAULT_URL: &str = "/system/:attachment/:id/:style/:filename";
pub const DEFAULT_PATH: &str = ":root/public:url";
/// Default path when files live in a bucket
pub const DEFAULT_BUCKET_PATH: &str = ":attachment/:id/:style/:filename";
pub const DEFAULT_MISSING_URL: &str = "/:attachment/:style/missing.png";
pub const DEFAULT_MISSING_PATH: &str = ":root/public/:attachment/:style/missing.png";
pub const DEFAULT_PROCESSOR: &str = "thumbnail";

#[derive(Debug, Clone)]
pub struct AttachmentOptions {
    pub url: String,
    pub path: String,
    pub default_url: String,
    pub default_path: String,
    pub default_style: String,
    pub styles: StylesSource,
    /// Default transform chain for styles that do not name their own
    pub processors: Vec<String>,
    pub convert_options: ConvertOptionsSource,
    pub validations: Vec<Validation>,
    pub storage: StorageConfig,
    /// Processing errors block save
    pub whiny: bool,
    pub access_policy: AccessPolicy,
    /// Value of `:root`
    pub root: String,
    /// Value of `:env`
    pub env: String,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        let root = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|_| ".".to_string());

        Self {
            url: DEFAULT_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            default_url: DEFAULT_MISSING_URL.to_string(),
            default_path: DEFAULT_MISSING_PATH.to_string(),
            default_style: ORIGINAL_STYLE.to_string(),
            styles: StylesSource::default(),
            processors: vec![DEFAULT_PROCESSOR.to_string()],
            convert_options: ConvertOptionsSource::default(),
            validations: Vec::new(),
            storage: StorageConfig::default(),
            whiny: true,
            access_policy: AccessPolicy::default(),
            root,
            env: "development".to_string(),
        }
    }
}

impl AttachmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = url.into();
        self
    }

    pub fn default_path(mut self, path: impl Into<String>) -> Self {
        self.default_path = path.into();
        self
    }

    pub fn default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = style.into();
        self
    }

    /// Add one static style
    pub fn style(mut self, name: impl Into<String>, spec: StyleSpec) -> Self {
        match self.styles {
            StylesSource::Static(ref mut styles) => {
                styles.insert(name.into(), spec);
            }
            StylesSource::Computed(_) => {
                self.styles = StylesSource::Static(BTreeMap::from([(name.into(), spec)]));
            }
        }
        self
    }

    pub fn styles(mut self, styles: StylesSource) -> Self {
        self.styles = styles;
        self
    }

    pub fn computed_styles<F>(self, f: F) -> Self
    where
        F: Fn(&dyn Record) -> BTreeMap<String, StyleSpec> + Send + Sync + 'static,
    {
        self.styles(StylesSource::computed(f))
    }

    pub fn processors<I, S>(mut self, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processors = processors.into_iter().map(Into::into).collect();
        self
    }

    pub fn convert_options(mut self, options: ConvertOptionsSource) -> Self {
        self.convert_options = options;
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Select the backend. A bucket-backed store replaces the default path
    /// with a bucket-relative one; an explicit path is kept.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        let bucket = matches!(storage.backend, StorageBackend::S3 | StorageBackend::Dual);
        if bucket && self.path == DEFAULT_PATH {
            self.path = DEFAULT_BUCKET_PATH.to_string();
        } else if !bucket && self.path == DEFAULT_BUCKET_PATH {
            self.path = DEFAULT_PATH.to_string();
        }
        self.storage = storage;
        self
    }

    pub fn whiny(mut self, whiny: bool) -> Self {
        self.whiny = whiny;
        self
    }

    pub fn access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Options for `slot` as configured in `config`, over the defaults
    pub fn from_config(config: &AffixConfig, slot: &str) -> AttachmentResult<Self> {
        Self::from_settings(&config.attachment(slot), config)
    }

    pub fn from_settings(settings: &AttachmentSettings, config: &AffixConfig) -> AttachmentResult<Self> {
        let mut options = Self::default().storage(config.storage.clone());

        if let Some(ref root) = config.root {
            options.root = root.clone();
        }
        if let Some(ref env) = config.env {
            options.env = env.clone();
        }
        if let Some(ref url) = settings.url {
            options.url = url.clone();
        }
        if let Some(ref path) = settings.path {
            options.path = path.clone();
        }
        if let Some(ref url) = settings.default_url {
            options.default_url = url.clone();
        }
        if let Some(ref path) = settings.default_path {
            options.default_path = path.clone();
        }
        if let Some(ref style) = settings.default_style {
            options.default_style = style.clone();
        }
        if let Some(whiny) = settings.whiny {
            options.whiny = whiny;
        }
        if let Some(policy) = settings.access_policy {
            options.access_policy = policy;
        }
        if !settings.processors.is_empty() {
            options.processors = settings.processors.clone();
        }

        options.styles = StylesSource::Static(
            settings
                .styles
                .iter()
                .map(|(name, style)| (name.clone(), StyleSpec::from(style)))
                .collect(),
        );
        options.convert_options = ConvertOptionsSource::Static(settings.convert_options.clone());

        let validations = &settings.validations;
        if validations.presence {
            options.validations.push(Validation::presence());
        }
        if let Some(range) = validations.size {
            options.validations.push(Validation::size(range.min..=range.max));
        }
        if !validations.content_types.is_empty() {
            let matchers = validations
                .content_types
                .iter()
                .map(|ct| {
                    ContentTypeMatcher::parse(ct).map_err(|e| {
                        AttachmentError::Configuration(format!("invalid content type pattern {}: {}", ct, e))
                    })
                })
                .collect::<AttachmentResult<Vec<_>>>()?;
            options.validations.push(Validation::content_type(matchers));
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::{SizeRange, StyleSettings, ValidationSettings};

    #[test]
    fn test_defaults() {
        let options = AttachmentOptions::default();
        assert_eq!(options.url, "/system/:attachment/:id/:style/:filename");
        assert_eq!(options.path, ":root/public:url");
        assert_eq!(options.default_url, "/:attachment/:style/missing.png");
        assert_eq!(options.default_path, ":root/public/:attachment/:style/missing.png");
        assert_eq!(options.default_style, "original");
        assert_eq!(options.processors, vec!["thumbnail".to_string()]);
        assert!(options.whiny);
        assert_eq!(options.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_builder_overrides() {
        let options = AttachmentOptions::new()
            .path("/tmp/:attachment/:style/:basename.:extension")
            .style("thumb", StyleSpec::geometry("10x10"))
            .style("large", StyleSpec::geometry("100x100"))
            .whiny(false)
            .validate(Validation::presence());

        assert!(!options.whiny);
        assert_eq!(options.validations.len(), 1);
        match options.styles {
            StylesSource::Static(ref styles) => assert_eq!(styles.len(), 2),
            StylesSource::Computed(_) => panic!("expected static styles"),
        }
    }

    #[test]
    fn test_from_settings() {
        let config = AffixConfig {
            root: Some("/srv/app".to_string()),
            ..Default::default()
        };
        let settings = AttachmentSettings {
            path: Some(":root/files/:filename".to_string()),
            whiny: Some(false),
            styles: BTreeMap::from([("thumb".to_string(), StyleSettings::Geometry("50x50#".to_string()))]),
            validations: ValidationSettings {
                presence: true,
                size: Some(SizeRange { min: 1, max: 1024 }),
                content_types: vec!["/^image\\//".to_string()],
            },
            ..Default::default()
        };

        let options = AttachmentOptions::from_settings(&settings, &config).unwrap();
        assert_eq!(options.root, "/srv/app");
        assert_eq!(options.path, ":root/files/:filename");
        assert_eq!(options.url, DEFAULT_URL);
        assert!(!options.whiny);
        let names: Vec<&str> = options.validations.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["presence", "size", "content_type"]);
    }

    #[test]
    fn test_bucket_backends_default_to_relative_path() {
        for backend in [StorageBackend::S3, StorageBackend::Dual] {
            let config = AffixConfig {
                storage: StorageConfig {
                    backend,
                    ..Default::default()
                },
                ..Default::default()
            };
            let options = AttachmentOptions::from_settings(&AttachmentSettings::default(), &config).unwrap();
            assert_eq!(options.path, ":attachment/:id/:style/:filename");
        }

        let config = AffixConfig {
            storage: StorageConfig {
                backend: StorageBackend::S3,
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = AttachmentSettings {
            path: Some("uploads/:filename".to_string()),
            ..Default::default()
        };
        let options = AttachmentOptions::from_settings(&settings, &config).unwrap();
        assert_eq!(options.path, "uploads/:filename");

        let local = AttachmentOptions::new().storage(StorageConfig::default());
        assert_eq!(local.path, DEFAULT_PATH);
    }

    #[test]
    fn test_from_settings_rejects_bad_pattern() {
        let settings = AttachmentSettings {
            validations: ValidationSettings {
                content_types: vec!["/image[/".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let err = AttachmentOptions::from_settings(&settings, &AffixConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}
