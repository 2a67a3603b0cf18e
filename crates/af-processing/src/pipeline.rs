//! Transform pipeline
//!
//! Folds each style's steps over the original, one style at a time. A failing
//! style is recorded and skipped; its siblings still run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::processor::ProcessorRegistry;
use crate::staged::StagedFile;
use crate::style::Style;

/// A per-style failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingError {
    pub style: String,
    pub message: String,
}

impl ProcessingError {
    pub fn new(style: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.style, self.message)
    }
}

impl std::error::Error for ProcessingError {}

/// Result of one pipeline run
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// Derived file per successful style
    pub files: BTreeMap<String, StagedFile>,
    pub errors: Vec<ProcessingError>,
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    registry: Arc<ProcessorRegistry>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new(Arc::new(ProcessorRegistry::default()))
    }
}

impl TransformPipeline {
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn run(&self, original: &StagedFile, styles: &[Style]) -> PipelineOutput {
        let mut output = PipelineOutput::default();

        for style in styles {
            match self.run_style(original, style) {
                Ok(file) => {
                    debug!(style = %style.name, "Style processed");
                    output.files.insert(style.name.clone(), file);
                }
                Err(error) => {
                    warn!(style = %error.style, error = %error.message, "Style processing failed");
                    output.errors.push(error);
                }
            }
        }

        output
    }

    /// Fold one style's steps, starting from `original`
    pub fn run_style(&self, original: &StagedFile, style: &Style) -> Result<StagedFile, ProcessingError> {
        if style.steps.is_empty() {
            return Err(ProcessingError::new(
                &style.name,
                "no transform steps configured",
            ));
        }

        let mut current: Option<StagedFile> = None;

        for step in &style.steps {
            let processor = self
                .registry
                .get(&step.processor)
                .map_err(|e| ProcessingError::new(&style.name, e.to_string()))?;

            let input = current.as_ref().unwrap_or(original);
            let produced = processor.make(input, &step.options).map_err(|e| {
                ProcessingError::new(
                    &style.name,
                    format!("{} failed: {}", step.processor, e),
                )
            })?;

            // The previous intermediate is released here
            current = Some(produced);
        }

        current.ok_or_else(|| ProcessingError::new(&style.name, "no transform steps configured"))
    }
}
