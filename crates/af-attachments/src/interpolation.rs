//! Path and URL interpolation
//!
//! Patterns contain `:token`s that are replaced from the attachment, the style
//! and the parent record. A token that is not recognised is left as written.
//! When a run of token characters starts with a known token, the longest known
//! prefix is replaced (`:id_partition` before `:id`).

use std::path::Path;
use std::sync::LazyLock;

use af_core::{AttachmentField, Record};
use regex::{Captures, Regex};

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":([a-z_]+)").unwrap());

/// Recognised tokens, longest first
pub const TOKENS: &[&str] = &[
    "id_partition",
    "attachment",
    "timestamp",
    "extension",
    "basename",
    "filename",
    "style",
    "class",
    "root",
    "url",
    "env",
    "id",
];

/// Everything a pattern may refer to
#[derive(Clone, Copy)]
pub struct InterpolationContext<'a> {
    pub record: &'a dyn Record,
    /// Slot name, e.g. `avatar`
    pub attachment: &'a str,
    pub style: &'a str,
    /// Output format of the style, if it converts
    pub style_format: Option<&'a str>,
    pub root: &'a str,
    pub env: &'a str,
    /// Pattern substituted for `:url`
    pub url_pattern: Option<&'a str>,
}

pub trait Interpolator: Send + Sync {
    fn interpolate(&self, pattern: &str, context: &InterpolationContext<'_>) -> String;
}

/// The built-in token interpolator
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenInterpolator;

impl TokenInterpolator {
    fn value(&self, token: &str, ctx: &InterpolationContext<'_>) -> Option<String> {
        let value = match token {
            "root" => ctx.root.to_string(),
            "env" => ctx.env.to_string(),
            "class" => pluralize(&underscore(ctx.record.model_name())),
            "attachment" => pluralize(ctx.attachment),
            "style" => ctx.style.to_string(),
            "id" => ctx.record.id().map(|id| id.to_string()).unwrap_or_default(),
            "id_partition" => ctx.record.id().map(id_partition).unwrap_or_default(),
            "filename" => filename(ctx),
            "basename" => basename(&filename(ctx)),
            "extension" => match ctx.style_format {
                Some(format) => format.to_string(),
                None => extension(&filename(ctx)),
            },
            "timestamp" => ctx
                .record
                .read_attribute(&AttachmentField::UpdatedAt.column(ctx.attachment))
                .map(|v| v.to_string())
                .unwrap_or_default(),
            "url" => {
                let pattern = ctx.url_pattern?;
                let nested = InterpolationContext {
                    url_pattern: None,
                    ..*ctx
                };
                self.interpolate(pattern, &nested)
            }
            _ => return None,
        };
        Some(value)
    }
}

impl Interpolator for TokenInterpolator {
    fn interpolate(&self, pattern: &str, context: &InterpolationContext<'_>) -> String {
        TOKEN_PATTERN
            .replace_all(pattern, |caps: &Captures<'_>| {
                let run = &caps[1];
                for token in TOKENS {
                    if let Some(rest) = run.strip_prefix(token) {
                        if let Some(value) = self.value(token, context) {
                            return format!("{}{}", value, rest);
                        }
                    }
                }
                caps[0].to_string()
            })
            .into_owned()
    }
}

fn filename(ctx: &InterpolationContext<'_>) -> String {
    ctx.record
        .read_attribute(&AttachmentField::FileName.column(ctx.attachment))
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// File name without its last extension
pub fn basename(filename: &str) -> String {
    match filename.rfind('.') {
        Some(0) | None => filename.to_string(),
        Some(i) => filename[..i].to_string(),
    }
}

/// Last extension without the dot
pub fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

/// `000/000/123` for 123
pub fn id_partition(id: i64) -> String {
    let padded = format!("{:09}", id);
    padded
        .as_bytes()
        .chunks(3)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `UserProfile` -> `user_profile`, `Admin::User` -> `admin/user`
pub fn underscore(name: &str) -> String {
    let name = name.replace("::", "/");
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    out
}

/// English plural of the last word
pub fn pluralize(word: &str) -> String {
    const IRREGULAR: &[(&str, &str)] = &[
        ("person", "people"),
        ("child", "children"),
        ("man", "men"),
        ("woman", "women"),
        ("mouse", "mice"),
    ];
    const UNCOUNTABLE: &[&str] = &["data", "equipment", "information", "media", "news", "series", "sheep"];

    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_ascii_lowercase();
    if UNCOUNTABLE.iter().any(|u| lower.ends_with(u)) {
        return word.to_string();
    }
    for (singular, plural) in IRREGULAR {
        if lower == *singular || lower.ends_with(&format!("_{}", singular)) {
            return format!("{}{}", &word[..word.len() - singular.len()], plural);
        }
    }

    let ends_with_consonant_y = lower.ends_with('y')
        && !lower[..lower.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);

    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}
