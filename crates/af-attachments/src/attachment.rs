//! The attachment engine
//!
//! An [`Attachment`] manages one file slot of a parent record. Assignment
//! writes metadata onto the record right away and stages the upload plus its
//! derived styles; nothing touches storage until [`Attachment::save`] (or
//! [`Attachment::destroy`]) flushes the queued deletes and writes.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, LazyLock};

use af_core::{AttachmentField, AttributeValue, Record, ValidationErrors};
use af_processing::{
    ProcessingError, ProcessorRegistry, StagedFile, Style, StyleRegistry, TransformPipeline,
    ORIGINAL_STYLE,
};
use af_storage::{calculate_digest, create_storage, PutOptions, Storage};
use chrono::Utc;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AttachmentError, AttachmentResult};
use crate::interpolation::{InterpolationContext, Interpolator, TokenInterpolator};
use crate::options::AttachmentOptions;
use crate::upload::UploadedFile;
use crate::validation::ValidationSubject;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z\d\.\-_]+").unwrap());

/// Validation key for processing failures in whiny mode
pub const PROCESSING_ERROR_KEY: &str = "processing";

/// Trim a client filename and replace unsafe runs with `_`
pub fn sanitize_filename(filename: &str) -> String {
    UNSAFE_FILENAME_CHARS
        .replace_all(filename.trim(), "_")
        .into_owned()
}

/// A storage key waiting to be deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub style: String,
    pub key: String,
}

pub struct Attachment {
    name: String,
    options: Arc<AttachmentOptions>,
    storage: Arc<dyn Storage>,
    pipeline: TransformPipeline,
    interpolator: Arc<dyn Interpolator>,
    styles: StyleRegistry,
    pending_writes: BTreeMap<String, StagedFile>,
    pending_deletes: VecDeque<PendingDelete>,
    validation_errors: Option<ValidationErrors>,
    processing_errors: Vec<ProcessingError>,
    dirty: bool,
    accessors_checked: bool,
}

impl Attachment {
    /// Attachment for slot `name`, storing through the backend its options select
    pub fn new(name: impl Into<String>, options: AttachmentOptions) -> AttachmentResult<Self> {
        let storage = create_storage(&options.storage)?;
        Ok(Self::with_storage(name, options, storage))
    }

    pub fn with_storage(
        name: impl Into<String>,
        options: AttachmentOptions,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let styles = StyleRegistry::new(
            options.styles.clone(),
            options.processors.clone(),
            options.convert_options.clone(),
        );

        Self {
            name: name.into(),
            options: Arc::new(options),
            storage,
            pipeline: TransformPipeline::default(),
            interpolator: Arc::new(TokenInterpolator),
            styles,
            pending_writes: BTreeMap::new(),
            pending_deletes: VecDeque::new(),
            validation_errors: None,
            processing_errors: Vec::new(),
            dirty: false,
            accessors_checked: false,
        }
    }

    /// Replace the processors styles may name
    pub fn with_processors(mut self, registry: ProcessorRegistry) -> Self {
        self.pipeline = TransformPipeline::new(Arc::new(registry));
        self
    }

    pub fn with_interpolator(mut self, interpolator: impl Interpolator + 'static) -> Self {
        self.interpolator = Arc::new(interpolator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn default_style(&self) -> &str {
        &self.options.default_style
    }

    // ---------------------------------------------------------------------
    // Assignment
    // ---------------------------------------------------------------------

    /// Assign an upload, or clear the slot with `None`.
    ///
    /// An upload without a filename or content type is ignored. Otherwise the
    /// current file is superseded, metadata is written to `record` and the
    /// original plus every style are staged for the next save.
    pub async fn assign(
        &mut self,
        record: &mut dyn Record,
        upload: Option<UploadedFile>,
    ) -> AttachmentResult<()> {
        self.ensure_required_accessors(&*record)?;

        let result = self.assign_upload(record, upload).await;

        self.validation_errors = None;
        self.is_valid(&*record);
        result
    }

    /// Assign the current original of another attachment
    pub async fn assign_from(
        &mut self,
        record: &mut dyn Record,
        source: &Attachment,
        source_record: &dyn Record,
    ) -> AttachmentResult<()> {
        let original = source.to_file(source_record, ORIGINAL_STYLE).await?;
        self.assign(record, original.map(UploadedFile::from_staged)).await
    }

    async fn assign_upload(
        &mut self,
        record: &mut dyn Record,
        upload: Option<UploadedFile>,
    ) -> AttachmentResult<()> {
        let Some(upload) = upload else {
            self.clear(record);
            return Ok(());
        };

        let (filename, content_type) = match (upload.original_filename(), upload.content_type()) {
            (Some(name), Some(content_type)) if !name.trim().is_empty() => {
                (sanitize_filename(name), content_type.trim().to_string())
            }
            _ => {
                debug!(attachment = %self.name, "Ignoring upload without filename or content type");
                return Ok(());
            }
        };

        // Nothing is superseded until the upload is safely staged
        let original = upload.stage(&filename, &content_type).await?;
        let size = original.size()?;
        let fingerprint = if record.has_attribute(&AttachmentField::Fingerprint.column(&self.name)) {
            Some(calculate_digest(&original.read_bytes().await?))
        } else {
            None
        };

        self.clear(record);

        self.write_field(record, AttachmentField::FileName, Some(filename.clone().into()));
        self.write_field(record, AttachmentField::ContentType, Some(content_type.into()));
        self.write_field(record, AttachmentField::FileSize, Some(AttributeValue::Integer(size as i64)));
        self.write_field(record, AttachmentField::UpdatedAt, Some(Utc::now().into()));
        if let Some(digest) = fingerprint {
            self.write_field(record, AttachmentField::Fingerprint, Some(digest.into()));
        }

        debug!(attachment = %self.name, filename = %filename, size_bytes = size, "Original queued for write");
        self.pending_writes.insert(ORIGINAL_STYLE.to_string(), original);
        self.dirty = true;
        self.validation_errors = None;

        if self.is_valid(&*record) {
            self.post_process(record);
        }

        // A processor may have replaced the original
        if let Some(original) = self.pending_writes.get(ORIGINAL_STYLE) {
            let size = original.size()?;
            self.write_field(record, AttachmentField::FileSize, Some(AttributeValue::Integer(size as i64)));
        }

        Ok(())
    }

    fn ensure_required_accessors(&mut self, record: &dyn Record) -> AttachmentResult<()> {
        if self.accessors_checked {
            return Ok(());
        }

        let column = AttachmentField::FileName.column(&self.name);
        if !record.has_attribute(&column) {
            return Err(AttachmentError::MissingAccessor {
                model: record.model_name().to_string(),
                attribute: column,
            });
        }

        self.accessors_checked = true;
        Ok(())
    }

    fn write_field(&self, record: &mut dyn Record, field: AttachmentField, value: Option<AttributeValue>) {
        let column = field.column(&self.name);
        if record.has_attribute(&column) {
            record.write_attribute(&column, value);
        }
    }

    fn read_field(&self, record: &dyn Record, field: AttachmentField) -> Option<AttributeValue> {
        record.read_attribute(&field.column(&self.name))
    }

    // ---------------------------------------------------------------------
    // Post-processing
    // ---------------------------------------------------------------------

    fn post_process(&mut self, record: &mut dyn Record) {
        if !self.pending_writes.contains_key(ORIGINAL_STYLE) {
            return;
        }

        if !self.fire_hooks(record, "before") {
            debug!(attachment = %self.name, "Post-processing halted by hook");
            return;
        }

        let styles = self.styles.resolve(&*record);
        let Some(original) = self.pending_writes.get(ORIGINAL_STYLE) else {
            return;
        };
        let output = self.pipeline.run(original, &styles);

        debug!(
            attachment = %self.name,
            processed = output.files.len(),
            failed = output.errors.len(),
            "Styles processed"
        );

        self.processing_errors = output.errors;
        self.pending_writes.extend(output.files);

        self.fire_hooks(record, "after");
    }

    /// `<phase>_post_process`, then `<phase>_<slot>_post_process`; false halts
    fn fire_hooks(&self, record: &mut dyn Record, phase: &str) -> bool {
        record.run_hook(&format!("{}_post_process", phase), &self.name)
            && record.run_hook(&format!("{}_{}_post_process", phase, self.name), &self.name)
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Whether the current state passes every applicable validation.
    /// Computed once per change of state.
    pub fn is_valid(&mut self, record: &dyn Record) -> bool {
        let errors = match self.validation_errors.take() {
            Some(errors) => errors,
            None => self.run_validations(record),
        };
        let valid = errors.is_empty();
        self.validation_errors = Some(errors);
        valid
    }

    fn run_validations(&self, record: &dyn Record) -> ValidationErrors {
        let content_type = self.content_type(record);
        let subject = ValidationSubject {
            file_assigned: self.file(record),
            size: self.size(record),
            content_type: content_type.as_deref(),
        };

        let mut errors = ValidationErrors::new();
        for validation in &self.options.validations {
            if !validation.applies_to(record) {
                continue;
            }
            if let Some(message) = validation.check(&subject) {
                errors.add(validation.name(), message);
            }
        }

        if self.options.whiny {
            for failure in &self.processing_errors {
                errors.add(PROCESSING_ERROR_KEY, failure.to_string());
            }
        }

        errors
    }

    /// Errors from the last validation, if it has run
    pub fn errors(&self) -> Option<&ValidationErrors> {
        self.validation_errors.as_ref()
    }

    pub fn processing_errors(&self) -> &[ProcessingError] {
        &self.processing_errors
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Flush queued deletes, then queued writes.
    ///
    /// Returns `Ok(false)` without touching storage when validation fails; the
    /// messages are added to the record under the slot name. On a storage
    /// failure the entries already flushed are gone from the queues and the
    /// rest stay queued.
    #[instrument(skip(self, record), fields(attachment = %self.name))]
    pub async fn save(&mut self, record: &mut dyn Record) -> AttachmentResult<bool> {
        if !self.is_valid(&*record) {
            let messages: Vec<String> = self
                .errors()
                .map(|errors| errors.messages().map(str::to_string).collect())
                .unwrap_or_default();
            for message in &messages {
                record.add_error(&self.name, message);
            }
            debug!(errors = messages.len(), "Save blocked by validation errors");
            return Ok(false);
        }

        self.flush(&*record).await?;
        Ok(true)
    }

    /// Clear the slot and delete every stored file now, without validating
    #[instrument(skip(self, record), fields(attachment = %self.name))]
    pub async fn destroy(&mut self, record: &mut dyn Record) -> AttachmentResult<()> {
        self.clear(record);
        self.flush(&*record).await
    }

    async fn flush(&mut self, record: &dyn Record) -> AttachmentResult<()> {
        let result = match self.flush_deletes().await {
            Ok(()) => self.flush_writes(record).await,
            Err(e) => Err(e),
        };
        self.update_dirty();
        result
    }

    async fn flush_deletes(&mut self) -> AttachmentResult<()> {
        while let Some(entry) = self.pending_deletes.front() {
            match self.storage.delete(&entry.key).await {
                Ok(()) => {
                    info!(attachment = %self.name, style = %entry.style, key = %entry.key, "File deleted");
                    self.pending_deletes.pop_front();
                }
                Err(e) => {
                    error!(
                        attachment = %self.name,
                        style = %entry.style,
                        key = %entry.key,
                        error = %e,
                        "Delete failed"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn flush_writes(&mut self, record: &dyn Record) -> AttachmentResult<()> {
        let styles: Vec<String> = self.pending_writes.keys().cloned().collect();
        let content_type = self.content_type(record);

        for style in styles {
            let key = self.path(record, Some(style.as_str()));
            let Some(file) = self.pending_writes.get(&style) else {
                continue;
            };

            let data = file.read_bytes().await?;
            let options = PutOptions::new(
                content_type
                    .clone()
                    .unwrap_or_else(|| file.content_type().to_string()),
            )
            .access_policy(self.options.access_policy);

            match self.storage.put(&key, data, &options).await {
                Ok(metadata) => {
                    info!(
                        attachment = %self.name,
                        style = %style,
                        key = %key,
                        size_bytes = metadata.size,
                        "File written"
                    );
                    if let Some(file) = self.pending_writes.remove(&style) {
                        if let Err(e) = file.close() {
                            warn!(style = %style, error = %e, "Failed to remove staged file");
                        }
                    }
                }
                Err(e) => {
                    error!(attachment = %self.name, style = %style, key = %key, error = %e, "Write failed");
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Queue every stored file for deletion and null the metadata. No I/O.
    pub fn clear(&mut self, record: &mut dyn Record) {
        self.pending_writes.clear();
        self.processing_errors.clear();

        if self.file(&*record) {
            let mut styles = vec![ORIGINAL_STYLE.to_string()];
            styles.extend(self.styles.names(&*record));

            for style in styles {
                let key = self.path(&*record, Some(style.as_str()));
                if self.pending_deletes.iter().any(|queued| queued.key == key) {
                    continue;
                }
                debug!(attachment = %self.name, style = %style, key = %key, "Queued for delete");
                self.pending_deletes.push_back(PendingDelete { style, key });
            }

            for field in AttachmentField::METADATA {
                self.write_field(record, field, None);
            }
            self.write_field(record, AttachmentField::Fingerprint, None);
        }

        self.validation_errors = None;
        self.update_dirty();
    }

    /// Re-derive every style from the stored original and save
    #[instrument(skip(self, record), fields(attachment = %self.name))]
    pub async fn reprocess(&mut self, record: &mut dyn Record) -> AttachmentResult<bool> {
        let Some(filename) = self.original_filename(&*record) else {
            return Ok(true);
        };

        let key = self.path(&*record, Some(ORIGINAL_STYLE));
        let Some(data) = self.storage.get(&key).await? else {
            debug!(key = %key, "No stored original to reprocess");
            return Ok(true);
        };

        let content_type = self
            .content_type(&*record)
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
        let original = StagedFile::from_bytes(filename, content_type, &data)?;

        self.pending_writes.clear();
        self.pending_writes.insert(ORIGINAL_STYLE.to_string(), original);
        self.processing_errors.clear();
        self.validation_errors = None;
        self.dirty = true;

        self.post_process(record);
        let result = self.save(record).await;

        // Nothing staged here outlives the call
        self.pending_writes.clear();
        self.update_dirty();
        result
    }

    fn update_dirty(&mut self) {
        self.dirty = !self.pending_writes.is_empty() || !self.pending_deletes.is_empty();
    }

    // ---------------------------------------------------------------------
    // Locations
    // ---------------------------------------------------------------------

    /// Public URL of `style` (the default style when `None`), with
    /// `?<updated_at>` appended when requested and known
    pub fn url(&self, record: &dyn Record, style: Option<&str>, include_timestamp: bool) -> String {
        let style = style.unwrap_or(self.options.default_style.as_str());
        let pattern = if self.file(record) {
            &self.options.url
        } else {
            &self.options.default_url
        };
        let url = self.interpolate(record, pattern, style);

        match self.updated_at(record).filter(|_| include_timestamp) {
            Some(timestamp) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{}{}{}", url, separator, timestamp)
            }
            None => url,
        }
    }

    /// Storage key of `style` (the default style when `None`)
    pub fn path(&self, record: &dyn Record, style: Option<&str>) -> String {
        let style = style.unwrap_or(self.options.default_style.as_str());
        let pattern = if self.file(record) {
            &self.options.path
        } else {
            &self.options.default_path
        };
        self.interpolate(record, pattern, style)
    }

    fn interpolate(&self, record: &dyn Record, pattern: &str, style: &str) -> String {
        let styles = self.styles.resolve(record);
        let style_format = styles
            .iter()
            .find(|s| s.name == style)
            .and_then(|s| s.format.as_deref());
        let url_pattern = if self.file(record) {
            &self.options.url
        } else {
            &self.options.default_url
        };

        let context = InterpolationContext {
            record,
            attachment: &self.name,
            style,
            style_format,
            root: &self.options.root,
            env: &self.options.env,
            url_pattern: Some(url_pattern),
        };
        self.interpolator.interpolate(pattern, &context)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Whether a file is assigned
    pub fn file(&self, record: &dyn Record) -> bool {
        self.original_filename(record).is_some()
    }

    pub fn original_filename(&self, record: &dyn Record) -> Option<String> {
        self.read_field(record, AttachmentField::FileName)
            .map(|v| v.to_string())
            .filter(|name| !name.is_empty())
    }

    pub fn content_type(&self, record: &dyn Record) -> Option<String> {
        self.read_field(record, AttachmentField::ContentType)
            .map(|v| v.to_string())
    }

    /// Size in bytes, from the record or else the staged original
    pub fn size(&self, record: &dyn Record) -> Option<u64> {
        self.read_field(record, AttachmentField::FileSize)
            .and_then(|v| v.as_integer())
            .and_then(|size| u64::try_from(size).ok())
            .or_else(|| {
                self.pending_writes
                    .get(ORIGINAL_STYLE)
                    .and_then(|file| file.size().ok())
            })
    }

    /// Last assignment time, in seconds since the Unix epoch
    pub fn updated_at(&self, record: &dyn Record) -> Option<i64> {
        self.read_field(record, AttachmentField::UpdatedAt)
            .and_then(|v| v.as_unix_timestamp())
    }

    pub fn fingerprint(&self, record: &dyn Record) -> Option<String> {
        self.read_field(record, AttachmentField::Fingerprint)
            .map(|v| v.to_string())
    }

    /// Whether `style` is present in storage
    pub async fn exists(&self, record: &dyn Record, style: &str) -> AttachmentResult<bool> {
        if !self.file(record) {
            return Ok(false);
        }
        Ok(self.storage.exists(&self.path(record, Some(style))).await?)
    }

    /// A temporary copy of `style`: the queued file if there is one, else the
    /// stored one. `None` when neither exists.
    pub async fn to_file(&self, record: &dyn Record, style: &str) -> AttachmentResult<Option<StagedFile>> {
        if let Some(file) = self.pending_writes.get(style) {
            return Ok(Some(file.duplicate()?));
        }

        let Some(filename) = self.original_filename(record) else {
            return Ok(None);
        };

        let key = self.path(record, Some(style));
        let Some(data) = self.storage.get(&key).await? else {
            return Ok(None);
        };

        let content_type = self
            .content_type(record)
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
        Ok(Some(StagedFile::from_bytes(filename, content_type, &data)?))
    }

    /// Resolved styles, excluding the original
    pub fn styles(&self, record: &dyn Record) -> Arc<[Style]> {
        self.styles.resolve(record)
    }

    /// Drop the resolved styles so the next use recomputes them
    pub fn invalidate_styles(&mut self) {
        self.styles.invalidate();
    }

    pub fn pending_writes(&self) -> &BTreeMap<String, StagedFile> {
        &self.pending_writes
    }

    pub fn pending_deletes(&self) -> &VecDeque<PendingDelete> {
        &self.pending_deletes
    }

    /// Whether anything is queued for the next save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("storage", &self.storage.name())
            .field("pending_writes", &self.pending_writes.keys().collect::<Vec<_>>())
            .field("pending_deletes", &self.pending_deletes)
            .field("validation_errors", &self.validation_errors)
            .field("processing_errors", &self.processing_errors)
            .field("dirty", &self.dirty)
            .finish()
    }
}
