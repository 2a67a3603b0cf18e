//! # af-attachments
//!
//! File attachments for records.
//!
//! An [`Attachment`] owns one file slot (`avatar`, `logo`, ...) of a parent
//! record. It keeps the slot's metadata in `<slot>_file_name`,
//! `<slot>_content_type`, `<slot>_file_size` and `<slot>_updated_at` on the
//! record, derives styles from each upload, and writes the original and the
//! styles to storage when saved.
//!
//! ## Example
//!
//! ```rust,ignore
//! use af_attachments::{Attachment, AttachmentOptions, UploadedFile};
//! use af_processing::StyleSpec;
//!
//! let options = AttachmentOptions::new()
//!     .path(":root/public/:attachment/:id/:style/:filename")
//!     .style("thumb", StyleSpec::geometry("100x100#"));
//! let mut avatar = Attachment::new("avatar", options)?;
//!
//! avatar.assign(&mut user, Some(UploadedFile::from_path("5k.png"))).await?;
//! if avatar.save(&mut user).await? {
//!     println!("{}", avatar.url(&user, Some("thumb"), true));
//! }
//! ```

pub mod attachment;
pub mod error;
pub mod interpolation;
pub mod options;
pub mod upload;
pub mod validation;

pub use attachment::{sanitize_filename, Attachment, PendingDelete, PROCESSING_ERROR_KEY};
pub use error::{AttachmentError, AttachmentResult};
pub use interpolation::{InterpolationContext, Interpolator, TokenInterpolator};
pub use options::AttachmentOptions;
pub use upload::UploadedFile;
pub use af_processing::{StyleSpec, ORIGINAL_STYLE};
pub use validation::{ContentTypeMatcher, Validation, ValidationKind, ValidationSubject};
