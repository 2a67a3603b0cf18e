//! Built-in `thumbnail` processor
//!
//! Resizes by geometry, applies convert options, and re-encodes to the
//! style's format (or the source format when none is set).

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};

use crate::geometry::Geometry;
use crate::processor::{Processor, ProcessorError, TransformOptions};
use crate::staged::StagedFile;

/// Parsed convert options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertOptions {
    /// Re-encoding never carries metadata over, so stripping is implicit
    pub strip: bool,
    pub quality: Option<u8>,
    pub grayscale: bool,
    /// Mirror top to bottom
    pub flip: bool,
    /// Mirror left to right
    pub flop: bool,
    pub rotate: Option<u16>,
    pub blur: Option<f32>,
    pub auto_orient: bool,
}

impl ConvertOptions {
    pub fn parse(options: &str) -> Result<Self, ProcessorError> {
        let mut parsed = Self::default();
        let mut tokens = options.split_whitespace();

        while let Some(token) = tokens.next() {
            match token {
                "-strip" => parsed.strip = true,
                "-auto-orient" => parsed.auto_orient = true,
                "-grayscale" => parsed.grayscale = true,
                "-flip" => parsed.flip = true,
                "-flop" => parsed.flop = true,
                "-colorspace" => {
                    let value = Self::value(token, tokens.next())?;
                    if !value.eq_ignore_ascii_case("gray") {
                        return Err(Self::invalid(token, value));
                    }
                    parsed.grayscale = true;
                }
                "-quality" => {
                    let value = Self::value(token, tokens.next())?;
                    let quality = value
                        .parse::<u8>()
                        .ok()
                        .filter(|q| (1..=100).contains(q))
                        .ok_or_else(|| Self::invalid(token, value))?;
                    parsed.quality = Some(quality);
                }
                "-rotate" => {
                    let value = Self::value(token, tokens.next())?;
                    let degrees = value
                        .parse::<u16>()
                        .ok()
                        .filter(|d| matches!(d, 0 | 90 | 180 | 270))
                        .ok_or_else(|| Self::invalid(token, value))?;
                    parsed.rotate = Some(degrees);
                }
                "-blur" => {
                    let value = Self::value(token, tokens.next())?;
                    // `0x2` style radius x sigma, or a bare sigma
                    let sigma = value.rsplit('x').next().unwrap_or(value);
                    let sigma = sigma
                        .parse::<f32>()
                        .ok()
                        .filter(|s| *s >= 0.0)
                        .ok_or_else(|| Self::invalid(token, value))?;
                    parsed.blur = Some(sigma);
                }
                other => return Err(ProcessorError::UnknownOption(other.to_string())),
            }
        }

        Ok(parsed)
    }

    fn value<'a>(option: &str, value: Option<&'a str>) -> Result<&'a str, ProcessorError> {
        value.ok_or_else(|| ProcessorError::InvalidOptionValue {
            option: option.to_string(),
            value: String::new(),
        })
    }

    fn invalid(option: &str, value: &str) -> ProcessorError {
        ProcessorError::InvalidOptionValue {
            option: option.to_string(),
            value: value.to_string(),
        }
    }

    /// Apply everything except `-quality` and `-auto-orient`, which belong to
    /// encoding and decoding.
    pub fn apply(&self, mut img: DynamicImage) -> DynamicImage {
        if let Some(degrees) = self.rotate {
            img = match degrees {
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                _ => img,
            };
        }
        if self.flip {
            img = img.flipv();
        }
        if self.flop {
            img = img.fliph();
        }
        if self.grayscale {
            img = img.grayscale();
        }
        if let Some(sigma) = self.blur {
            if sigma > 0.0 {
                img = img.blur(sigma);
            }
        }
        img
    }
}

/// Resize-and-convert processor backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Thumbnail;

impl Thumbnail {
    fn decode(data: &[u8], auto_orient: bool) -> Result<DynamicImage, ProcessorError> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        if !auto_orient {
            return Ok(reader.decode()?);
        }

        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut img = DynamicImage::from_decoder(decoder)?;
        img.apply_orientation(orientation);
        Ok(img)
    }

    fn resize(img: DynamicImage, geometry: &Geometry) -> DynamicImage {
        let (width, height) = img.dimensions();
        let Some(plan) = geometry.plan(width, height) else {
            return img;
        };

        let filter = image::imageops::FilterType::Lanczos3;
        let mut resized = if (plan.width, plan.height) == (width, height) {
            img
        } else {
            img.resize_exact(plan.width, plan.height, filter)
        };

        if let Some((cw, ch)) = plan.crop {
            let x = (plan.width - cw) / 2;
            let y = (plan.height - ch) / 2;
            resized = resized.crop_imm(x, y, cw, ch);
        }

        resized
    }

    /// Target extension: the style's format, else the source's extension
    fn target_extension(source: &StagedFile, options: &TransformOptions) -> Result<String, ProcessorError> {
        let extension = options
            .format
            .clone()
            .or_else(|| {
                Path::new(source.original_filename())
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| ProcessorError::UnsupportedFormat(source.original_filename().to_string()))?;
        Ok(extension.to_lowercase())
    }

    fn encode(img: &DynamicImage, format: ImageFormat, quality: Option<u8>) -> Result<Vec<u8>, ProcessorError> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut cursor, quality.unwrap_or(85));
                rgb.write_with_encoder(encoder)?;
            }
            _ => img.write_to(&mut cursor, format)?,
        }

        Ok(buffer)
    }
}

impl Processor for Thumbnail {
    fn make(&self, source: &StagedFile, options: &TransformOptions) -> Result<StagedFile, ProcessorError> {
        let convert = ConvertOptions::parse(options.convert_options.as_deref().unwrap_or(""))?;
        let geometry = options
            .geometry
            .as_deref()
            .map(Geometry::parse)
            .transpose()?;

        let extension = Self::target_extension(source, options)?;
        let format = ImageFormat::from_extension(&extension)
            .ok_or_else(|| ProcessorError::UnsupportedFormat(extension.clone()))?;

        let data = source.read_bytes_blocking()?;
        let mut img = Self::decode(&data, convert.auto_orient)?;

        if let Some(ref geometry) = geometry {
            img = Self::resize(img, geometry);
        }
        img = convert.apply(img);

        let encoded = Self::encode(&img, format, convert.quality)?;

        let basename = Path::new(source.original_filename())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let filename = format!("{}.{}", basename, extension);
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        let (width, height) = img.dimensions();
        tracing::debug!(
            style = %options.style,
            filename = %filename,
            width,
            height,
            size_bytes = encoded.len(),
            "Thumbnail generated"
        );

        Ok(StagedFile::from_bytes(filename, content_type, &encoded)?)
    }
}
