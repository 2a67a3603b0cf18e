//! Processor contract and registry

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::staged::StagedFile;
use crate::thumbnail::Thumbnail;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("unrecognized convert option: {0}")]
    UnknownOption(String),
    #[error("invalid value for {option}: {value}")]
    InvalidOptionValue { option: String, value: String },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("unknown processor: {0}")]
    UnknownProcessor(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options handed to every step of a style
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Name of the style being produced
    pub style: String,
    pub geometry: Option<String>,
    /// Output format (file extension); `None` keeps the source format
    pub format: Option<String>,
    /// Whitespace-separated convert options
    pub convert_options: Option<String>,
}

impl TransformOptions {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            ..Default::default()
        }
    }

    pub fn geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn convert_options(mut self, options: impl Into<String>) -> Self {
        self.convert_options = Some(options.into());
        self
    }
}

/// A single transform: given a source file and options, produce a derived file.
///
/// The source is borrowed and must be left untouched.
pub trait Processor: Send + Sync {
    fn make(&self, source: &StagedFile, options: &TransformOptions) -> Result<StagedFile, ProcessorError>;
}

impl<F> Processor for F
where
    F: Fn(&StagedFile, &TransformOptions) -> Result<StagedFile, ProcessorError> + Send + Sync,
{
    fn make(&self, source: &StagedFile, options: &TransformOptions) -> Result<StagedFile, ProcessorError> {
        self(source, options)
    }
}

/// Processors by name
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, processor: impl Processor + 'static) -> &mut Self {
        self.processors.insert(name.into(), Arc::new(processor));
        self
    }

    pub fn with(mut self, name: impl Into<String>, processor: impl Processor + 'static) -> Self {
        self.register(name, processor);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Processor>, ProcessorError> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessorError::UnknownProcessor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProcessorRegistry {
    /// Registry with the built-in `thumbnail` processor
    fn default() -> Self {
        Self::empty().with("thumbnail", Thumbnail)
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}
