//! Attachment validations

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use af_core::Record;
use regex::Regex;

pub const PRESENCE_MESSAGE: &str = "must be set.";
pub const SIZE_MESSAGE: &str = "file size must be between :min and :max bytes.";
pub const CONTENT_TYPE_MESSAGE: &str = "is not one of the allowed file types.";

pub type GuardFn = Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// Condition bound to the parent record
#[derive(Clone)]
pub enum Guard {
    If(GuardFn),
    Unless(GuardFn),
}

impl Guard {
    fn passes(&self, record: &dyn Record) -> bool {
        match self {
            Self::If(f) => f(record),
            Self::Unless(f) => !f(record),
        }
    }
}

/// An allowed content type
#[derive(Debug, Clone)]
pub enum ContentTypeMatcher {
    Exact(String),
    Pattern(Regex),
}

impl ContentTypeMatcher {
    /// `/.../` is a regular expression, anything else an exact type
    pub fn parse(value: &str) -> Result<Self, regex::Error> {
        let trimmed = value.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
            Ok(Self::Pattern(Regex::new(&trimmed[1..trimmed.len() - 1])?))
        } else {
            Ok(Self::Exact(trimmed.to_string()))
        }
    }

    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == content_type,
            Self::Pattern(pattern) => pattern.is_match(content_type),
        }
    }
}

impl From<&str> for ContentTypeMatcher {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<Regex> for ContentTypeMatcher {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

#[derive(Debug, Clone)]
pub enum ValidationKind {
    /// Fails unless a file is assigned
    Presence,
    /// Fails unless the size lies in the inclusive range; no size counts as 0
    Size { min: u64, max: u64 },
    /// Fails unless the content type matches; no content type passes
    ContentType(Vec<ContentTypeMatcher>),
}

/// What a validation looks at
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationSubject<'a> {
    pub file_assigned: bool,
    pub size: Option<u64>,
    pub content_type: Option<&'a str>,
}

#[derive(Clone)]
pub struct Validation {
    kind: ValidationKind,
    message: Option<String>,
    guard: Option<Guard>,
}

impl Validation {
    pub fn new(kind: ValidationKind) -> Self {
        Self {
            kind,
            message: None,
            guard: None,
        }
    }

    pub fn presence() -> Self {
        Self::new(ValidationKind::Presence)
    }

    pub fn size(range: RangeInclusive<u64>) -> Self {
        Self::new(ValidationKind::Size {
            min: *range.start(),
            max: *range.end(),
        })
    }

    pub fn content_type<I, M>(allowed: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ContentTypeMatcher>,
    {
        Self::new(ValidationKind::ContentType(
            allowed.into_iter().map(Into::into).collect(),
        ))
    }

    /// Replace the default message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Only run when `f` returns true for the parent record
    pub fn when<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Record) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::If(Arc::new(f)));
        self
    }

    /// Skip when `f` returns true for the parent record
    pub fn unless<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Record) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::Unless(Arc::new(f)));
        self
    }

    pub fn kind(&self) -> &ValidationKind {
        &self.kind
    }

    /// Key the failure is reported under
    pub fn name(&self) -> &'static str {
        match self.kind {
            ValidationKind::Presence => "presence",
            ValidationKind::Size { .. } => "size",
            ValidationKind::ContentType(_) => "content_type",
        }
    }

    pub fn applies_to(&self, record: &dyn Record) -> bool {
        self.guard.as_ref().map_or(true, |g| g.passes(record))
    }

    /// The failure message, or `None` when the subject passes
    pub fn check(&self, subject: &ValidationSubject<'_>) -> Option<String> {
        match &self.kind {
            ValidationKind::Presence => {
                (!subject.file_assigned).then(|| self.message_or(PRESENCE_MESSAGE))
            }
            ValidationKind::Size { min, max } => {
                let size = subject.size.unwrap_or(0);
                (!(*min..=*max).contains(&size)).then(|| {
                    self.message_or(SIZE_MESSAGE)
                        .replace(":min", &min.to_string())
                        .replace(":max", &max.to_string())
                })
            }
            ValidationKind::ContentType(allowed) => {
                let content_type = subject.content_type?;
                (!allowed.iter().any(|m| m.matches(content_type)))
                    .then(|| self.message_or(CONTENT_TYPE_MESSAGE))
            }
        }
    }

    fn message_or(&self, default: &str) -> String {
        self.message.clone().unwrap_or_else(|| default.to_string())
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::MemoryRecord;

    fn subject(size: Option<u64>, content_type: Option<&str>) -> ValidationSubject<'_> {
        ValidationSubject {
            file_assigned: size.is_some(),
            size,
            content_type,
        }
    }

    #[test]
    fn test_presence() {
        let v = Validation::presence();
        assert_eq!(v.check(&subject(None, None)).as_deref(), Some("must be set."));
        assert_eq!(v.check(&subject(Some(1), Some("image/png"))), None);
    }

    #[test]
    fn test_size_substitutes_bounds() {
        let v = Validation::size(10..=100);
        assert_eq!(
            v.check(&subject(Some(101), None)).as_deref(),
            Some("file size must be between 10 and 100 bytes.")
        );
        assert_eq!(v.check(&subject(Some(100), None)), None);
        assert_eq!(v.check(&subject(Some(10), None)), None);
        // no file counts as zero bytes
        assert!(v.check(&subject(None, None)).is_some());
        assert!(Validation::size(0..=5).check(&subject(None, None)).is_none());

        let v = Validation::size(0..=5).message("too big, max :max");
        assert_eq!(v.check(&subject(Some(6), None)).as_deref(), Some("too big, max 5"));
    }

    #[test]
    fn test_content_type_exact_and_pattern() {
        let v = Validation::content_type([
            ContentTypeMatcher::parse("image/png").unwrap(),
            ContentTypeMatcher::parse("/^text\\/.*$/").unwrap(),
        ]);
        assert_eq!(v.check(&subject(Some(1), Some("image/png"))), None);
        assert_eq!(v.check(&subject(Some(1), Some("text/csv"))), None);
        assert_eq!(
            v.check(&subject(Some(1), Some("image/gif"))).as_deref(),
            Some("is not one of the allowed file types.")
        );
        // nothing to check without a content type
        assert_eq!(v.check(&subject(None, None)), None);
        assert_eq!(v.name(), "content_type");
    }

    #[test]
    fn test_guards() {
        let record = MemoryRecord::new("User").with_id(7);

        let v = Validation::presence().when(|r: &dyn Record| r.id() == Some(7));
        assert!(v.applies_to(&record));

        let v = Validation::presence().unless(|r: &dyn Record| r.id().is_some());
        assert!(!v.applies_to(&record));

        assert!(Validation::presence().applies_to(&record));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ContentTypeMatcher::parse("/image[/").is_err());
        assert!(matches!(
            ContentTypeMatcher::parse("/").unwrap(),
            ContentTypeMatcher::Exact(_)
        ));
    }
}
