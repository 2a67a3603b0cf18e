//! # af-processing
//!
//! Derivation of styles from an uploaded original.
//!
//! - [`StagedFile`]: temporary file holding an upload or a derived style
//! - [`StyleRegistry`]: resolves static or record-computed style declarations
//! - [`TransformPipeline`]: runs every style's transform chain, isolating failures
//! - [`Processor`]: a single transform; [`Thumbnail`] is built in

pub mod geometry;
pub mod pipeline;
pub mod processor;
pub mod staged;
pub mod style;
pub mod thumbnail;

pub use geometry::{Geometry, Modifier, ResizePlan};
pub use pipeline::{PipelineOutput, ProcessingError, TransformPipeline};
pub use processor::{Processor, ProcessorError, ProcessorRegistry, TransformOptions};
pub use staged::StagedFile;
pub use style::{
    ConvertOptionsSource, Style, StyleRegistry, StyleSpec, StylesSource, TransformStep,
    ORIGINAL_STYLE,
};
pub use thumbnail::{ConvertOptions, Thumbnail};
