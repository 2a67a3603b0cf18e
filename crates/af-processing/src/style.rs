//! Style declarations and the style registry

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use af_core::{Record, StyleSettings};

use crate::processor::TransformOptions;

/// Name of the synthetic style holding the uploaded file
pub const ORIGINAL_STYLE: &str = "original";

/// Declaration of one style
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSpec {
    pub geometry: Option<String>,
    pub format: Option<String>,
    /// Overrides the attachment's default processors
    pub processors: Option<Vec<String>>,
    pub convert_options: Option<String>,
}

impl StyleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(geometry: impl Into<String>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            ..Default::default()
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn processors<I, S>(mut self, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processors = Some(processors.into_iter().map(Into::into).collect());
        self
    }

    pub fn convert_options(mut self, options: impl Into<String>) -> Self {
        self.convert_options = Some(options.into());
        self
    }
}

impl From<&StyleSettings> for StyleSpec {
    fn from(settings: &StyleSettings) -> Self {
        match settings {
            StyleSettings::Geometry(geometry) => Self::geometry(geometry.clone()),
            StyleSettings::Full {
                geometry,
                format,
                processors,
                convert_options,
            } => Self {
                geometry: geometry.clone(),
                format: format.clone(),
                processors: processors.clone(),
                convert_options: convert_options.clone(),
            },
        }
    }
}

pub type StylesFn = Arc<dyn Fn(&dyn Record) -> BTreeMap<String, StyleSpec> + Send + Sync>;
pub type ConvertOptionsFn = Arc<dyn Fn(&dyn Record) -> BTreeMap<String, String> + Send + Sync>;

/// Where style declarations come from
#[derive(Clone)]
pub enum StylesSource {
    Static(BTreeMap<String, StyleSpec>),
    /// Computed from the parent record
    Computed(StylesFn),
}

impl StylesSource {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&dyn Record) -> BTreeMap<String, StyleSpec> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self, record: &dyn Record) -> BTreeMap<String, StyleSpec> {
        match self {
            Self::Static(styles) => styles.clone(),
            Self::Computed(f) => f(record),
        }
    }
}

impl Default for StylesSource {
    fn default() -> Self {
        Self::Static(BTreeMap::new())
    }
}

impl fmt::Debug for StylesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(styles) => f.debug_tuple("Static").field(styles).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Extra convert options, keyed by style name; `all` applies to every style
#[derive(Clone)]
pub enum ConvertOptionsSource {
    Static(BTreeMap<String, String>),
    Computed(ConvertOptionsFn),
}

impl ConvertOptionsSource {
    pub const ALL: &'static str = "all";

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&dyn Record) -> BTreeMap<String, String> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self, record: &dyn Record) -> BTreeMap<String, String> {
        match self {
            Self::Static(options) => options.clone(),
            Self::Computed(f) => f(record),
        }
    }
}

impl Default for ConvertOptionsSource {
    fn default() -> Self {
        Self::Static(BTreeMap::new())
    }
}

impl fmt::Debug for ConvertOptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(options) => f.debug_tuple("Static").field(options).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// One step of a style's transform chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStep {
    pub processor: String,
    pub options: TransformOptions,
}

/// A resolved style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub name: String,
    pub format: Option<String>,
    pub steps: Vec<TransformStep>,
}

/// Resolves style declarations into [`Style`]s and caches the result
///
/// The cache lives until [`StyleRegistry::invalidate`] is called; callers
/// receive a shared snapshot, so a pipeline run never sees a partial update.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    source: StylesSource,
    default_processors: Vec<String>,
    convert_options: ConvertOptionsSource,
    cache: OnceLock<Arc<[Style]>>,
}

impl StyleRegistry {
    pub fn new(
        source: StylesSource,
        default_processors: Vec<String>,
        convert_options: ConvertOptionsSource,
    ) -> Self {
        Self {
            source,
            default_processors,
            convert_options,
            cache: OnceLock::new(),
        }
    }

    /// Resolved styles, computing them on first use
    pub fn resolve(&self, record: &dyn Record) -> Arc<[Style]> {
        let styles = self.cache.get_or_init(|| {
            let styles: Arc<[Style]> = self.build(record).into();
            tracing::debug!(count = styles.len(), "Styles resolved");
            styles
        });
        Arc::clone(styles)
    }

    pub fn invalidate(&mut self) {
        self.cache = OnceLock::new();
    }

    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Style names, in resolution order
    pub fn names(&self, record: &dyn Record) -> Vec<String> {
        self.resolve(record).iter().map(|s| s.name.clone()).collect()
    }

    fn build(&self, record: &dyn Record) -> Vec<Style> {
        let declared = self.source.resolve(record);
        let convert_options = self.convert_options.resolve(record);
        let blanket = convert_options.get(ConvertOptionsSource::ALL);

        declared
            .into_iter()
            .map(|(name, spec)| {
                let extra: Vec<&str> = [
                    blanket.map(String::as_str),
                    convert_options.get(&name).map(String::as_str),
                    spec.convert_options.as_deref(),
                ]
                .into_iter()
                .flatten()
                .filter(|s| !s.trim().is_empty())
                .collect();

                let options = TransformOptions {
                    style: name.clone(),
                    geometry: spec.geometry.clone(),
                    format: spec.format.clone(),
                    convert_options: (!extra.is_empty()).then(|| extra.join(" ")),
                };

                let processors = spec
                    .processors
                    .clone()
                    .unwrap_or_else(|| self.default_processors.clone());

                let steps = processors
                    .into_iter()
                    .map(|processor| TransformStep {
                        processor,
                        options: options.clone(),
                    })
                    .collect();

                Style {
                    name,
                    format: spec.format,
                    steps,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::{AttributeValue, MemoryRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn styles() -> BTreeMap<String, StyleSpec> {
        BTreeMap::from([
            ("thumb".to_string(), StyleSpec::geometry("100x100#")),
            (
                "large".to_string(),
                StyleSpec::geometry("800x600>").format("jpg").convert_options("-quality 80"),
            ),
            ("raw".to_string(), StyleSpec::new().processors(Vec::<String>::new())),
        ])
    }

    #[test]
    fn test_resolves_steps_and_convert_options() {
        let registry = StyleRegistry::new(
            StylesSource::Static(styles()),
            vec!["thumbnail".to_string()],
            ConvertOptionsSource::Static(BTreeMap::from([
                ("all".to_string(), "-strip".to_string()),
                ("large".to_string(), "-flop".to_string()),
            ])),
        );
        let record = MemoryRecord::new("User");
        let resolved = registry.resolve(&record);

        let large = resolved.iter().find(|s| s.name == "large").unwrap();
        assert_eq!(large.format.as_deref(), Some("jpg"));
        assert_eq!(large.steps.len(), 1);
        assert_eq!(large.steps[0].processor, "thumbnail");
        assert_eq!(
            large.steps[0].options.convert_options.as_deref(),
            Some("-strip -flop -quality 80")
        );

        let thumb = resolved.iter().find(|s| s.name == "thumb").unwrap();
        assert_eq!(thumb.steps[0].options.convert_options.as_deref(), Some("-strip"));
        assert_eq!(thumb.steps[0].options.geometry.as_deref(), Some("100x100#"));

        let raw = resolved.iter().find(|s| s.name == "raw").unwrap();
        assert!(raw.steps.is_empty());
    }

    #[test]
    fn test_computed_styles_are_cached_until_invalidated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = StylesSource::computed(move |record: &dyn Record| {
            counter.fetch_add(1, Ordering::SeqCst);
            let size = record
                .read_attribute("thumb_size")
                .and_then(|v| v.as_integer())
                .unwrap_or(50);
            BTreeMap::from([(
                "thumb".to_string(),
                StyleSpec::geometry(format!("{}x{}", size, size)),
            )])
        });

        let mut registry = StyleRegistry::new(source, vec!["thumbnail".to_string()], Default::default());
        let mut record = MemoryRecord::new("User").with_column("thumb_size");
        record.set("thumb_size", AttributeValue::Integer(120));

        let first = registry.resolve(&record);
        let second = registry.resolve(&record);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first[0].steps[0].options.geometry.as_deref(), Some("120x120"));

        registry.invalidate();
        assert!(!registry.is_cached());
        registry.resolve(&record);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_style_spec_from_settings() {
        let spec = StyleSpec::from(&StyleSettings::Geometry("10x10".to_string()));
        assert_eq!(spec, StyleSpec::geometry("10x10"));

        let spec = StyleSpec::from(&StyleSettings::Full {
            geometry: None,
            format: Some("png".to_string()),
            processors: Some(vec!["thumbnail".to_string()]),
            convert_options: None,
        });
        assert_eq!(spec.format.as_deref(), Some("png"));
        assert_eq!(spec.processors, Some(vec!["thumbnail".to_string()]));
    }
}
