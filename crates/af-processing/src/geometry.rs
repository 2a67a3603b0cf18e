//! Geometry strings
//!
//! `W`, `xH` or `WxH`, optionally followed by one modifier:
//!
//! | modifier | meaning |
//! |----------|---------|
//! | (none)   | fit inside the box, keeping aspect ratio |
//! | `!`      | exact size, ignoring aspect ratio |
//! | `>`      | fit, but only shrink |
//! | `<`      | fit, but only enlarge |
//! | `^`      | cover the box, keeping aspect ratio |
//! | `#`      | cover the box, then crop to it from the centre |
//! | `%`      | scale by percentage |
//! | `@`      | limit the pixel area to `W` |

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::processor::ProcessorError;

static GEOMETRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)?(?:x(\d+(?:\.\d+)?))?([!<>^#%@])?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Exact,
    ShrinkOnly,
    EnlargeOnly,
    Fill,
    Crop,
    Percent,
    Area,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '!' => Some(Self::Exact),
            '>' => Some(Self::ShrinkOnly),
            '<' => Some(Self::EnlargeOnly),
            '^' => Some(Self::Fill),
            '#' => Some(Self::Crop),
            '%' => Some(Self::Percent),
            '@' => Some(Self::Area),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub modifier: Option<Modifier>,
}

/// What to do to an image of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    /// Centre crop applied after resizing
    pub crop: Option<(u32, u32)>,
}

impl FromStr for Geometry {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProcessorError::InvalidGeometry(s.to_string());
        let captures = GEOMETRY_PATTERN.captures(s.trim()).ok_or_else(invalid)?;

        let number = |i: usize| -> Result<Option<f64>, ProcessorError> {
            captures
                .get(i)
                .map(|m| m.as_str().parse::<f64>().map_err(|_| invalid()))
                .transpose()
        };

        let width = number(1)?;
        let height = number(2)?;
        let modifier = captures
            .get(3)
            .and_then(|m| m.as_str().chars().next())
            .and_then(Modifier::from_char);

        if width.is_none() && height.is_none() {
            return Err(invalid());
        }
        if matches!(width, Some(w) if w <= 0.0) || matches!(height, Some(h) if h <= 0.0) {
            return Err(invalid());
        }
        if modifier == Some(Modifier::Area) && width.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            width,
            height,
            modifier,
        })
    }
}

impl Geometry {
    pub fn parse(s: &str) -> Result<Self, ProcessorError> {
        s.parse()
    }

    /// Plan the resize of a `source_width` x `source_height` image.
    /// `None` means the image is left as it is.
    pub fn plan(&self, source_width: u32, source_height: u32) -> Option<ResizePlan> {
        let sw = f64::from(source_width.max(1));
        let sh = f64::from(source_height.max(1));

        let (width, height) = match self.modifier {
            Some(Modifier::Percent) => {
                let px = self.width.unwrap_or(100.0) / 100.0;
                let py = self.height.or(self.width).unwrap_or(100.0) / 100.0;
                (sw * px, sh * py)
            }
            Some(Modifier::Area) => {
                let limit = self.width.unwrap_or(f64::MAX);
                if sw * sh <= limit {
                    return None;
                }
                let scale = (limit / (sw * sh)).sqrt();
                (sw * scale, sh * scale)
            }
            Some(Modifier::Exact) => (self.width.unwrap_or(sw), self.height.unwrap_or(sh)),
            Some(Modifier::Fill) | Some(Modifier::Crop) => {
                let scale = self.cover_scale(sw, sh);
                (sw * scale, sh * scale)
            }
            Some(Modifier::ShrinkOnly) => {
                let scale = self.fit_scale(sw, sh);
                if scale >= 1.0 {
                    return None;
                }
                (sw * scale, sh * scale)
            }
            Some(Modifier::EnlargeOnly) => {
                let scale = self.fit_scale(sw, sh);
                if scale <= 1.0 {
                    return None;
                }
                (sw * scale, sh * scale)
            }
            None => {
                let scale = self.fit_scale(sw, sh);
                (sw * scale, sh * scale)
            }
        };

        let width = to_pixels(width);
        let height = to_pixels(height);

        let crop = match self.modifier {
            Some(Modifier::Crop) => {
                let cw = self.width.map(to_pixels).unwrap_or(width).min(width);
                let ch = self.height.map(to_pixels).unwrap_or(height).min(height);
                Some((cw, ch))
            }
            _ => None,
        };

        Some(ResizePlan {
            width,
            height,
            crop,
        })
    }

    fn fit_scale(&self, sw: f64, sh: f64) -> f64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w / sw).min(h / sh),
            (Some(w), None) => w / sw,
            (None, Some(h)) => h / sh,
            (None, None) => 1.0,
        }
    }

    fn cover_scale(&self, sw: f64, sh: f64) -> f64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w / sw).max(h / sh),
            (Some(w), None) => w / sw,
            (None, Some(h)) => h / sh,
            (None, None) => 1.0,
        }
    }
}

fn to_pixels(value: f64) -> u32 {
    value.round().clamp(1.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(geometry: &str, w: u32, h: u32) -> Option<ResizePlan> {
        Geometry::parse(geometry).unwrap().plan(w, h)
    }

    fn size(geometry: &str, w: u32, h: u32) -> Option<(u32, u32)> {
        plan(geometry, w, h).map(|p| (p.width, p.height))
    }

    #[test]
    fn test_parse() {
        let g = Geometry::parse("100x50#").unwrap();
        assert_eq!(g.width, Some(100.0));
        assert_eq!(g.height, Some(50.0));
        assert_eq!(g.modifier, Some(Modifier::Crop));

        let g = Geometry::parse("x40").unwrap();
        assert_eq!(g.width, None);
        assert_eq!(g.height, Some(40.0));
        assert_eq!(g.modifier, None);

        assert!(Geometry::parse("").is_err());
        assert!(Geometry::parse("x").is_err());
        assert!(Geometry::parse("100y100").is_err());
        assert!(Geometry::parse("0x10").is_err());
        assert!(Geometry::parse("x10@").is_err());
    }

    #[test]
    fn test_fit_keeps_aspect_ratio() {
        assert_eq!(size("100x100", 400, 200), Some((100, 50)));
        assert_eq!(size("100", 400, 200), Some((100, 50)));
        assert_eq!(size("x50", 400, 200), Some((100, 50)));
        // enlarges without a modifier
        assert_eq!(size("800x800", 400, 200), Some((800, 400)));
    }

    #[test]
    fn test_shrink_and_enlarge_only() {
        assert_eq!(size("100x100>", 400, 200), Some((100, 50)));
        assert_eq!(size("800x800>", 400, 200), None);
        assert_eq!(size("800x800<", 400, 200), Some((800, 400)));
        assert_eq!(size("100x100<", 400, 200), None);
    }

    #[test]
    fn test_exact_fill_and_crop() {
        assert_eq!(size("30x30!", 400, 200), Some((30, 30)));
        assert_eq!(size("100x100^", 400, 200), Some((200, 100)));

        let p = plan("100x100#", 400, 200).unwrap();
        assert_eq!((p.width, p.height), (200, 100));
        assert_eq!(p.crop, Some((100, 100)));
    }

    #[test]
    fn test_percent_and_area() {
        assert_eq!(size("50%", 400, 200), Some((200, 100)));
        assert_eq!(size("50x25%", 400, 200), Some((200, 50)));
        assert_eq!(size("20000@", 400, 200), Some((200, 100)));
        assert_eq!(size("100000@", 400, 200), None);
    }
}
