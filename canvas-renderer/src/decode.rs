//! Image decoding for uploads and initial designs.
//!
//! Accepts raw file bytes or a `data:` URL, decodes with the `image` crate,
//! downsamples oversized rasters and re-encodes them as PNG so the scene and
//! the exporter only ever deal with one format.

use std::io::Cursor;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tee_canvas_core::RasterHandle;

use crate::error::{RenderError, RenderResult};

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw encoded file contents (an uploaded file).
    Bytes(Vec<u8>),
    /// A URL. Only `data:` URLs are decoded; this crate performs no network I/O.
    Url(String),
}

impl ImageSource {
    /// Short description for logs, never the payload itself.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes(bytes) => format!(
                "{} bytes ({:?})",
                bytes.len(),
                ImageFormat::from_magic_bytes(bytes)
            ),
            Self::Url(url) if url.starts_with("data:") => {
                let meta = url.split(',').next().unwrap_or("data:");
                format!("{meta} URL ({} chars)", url.len())
            }
            Self::Url(url) => format!("URL {url}"),
        }
    }
}

/// Encoded image formats recognised by sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// GIF (first frame only).
    Gif,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/webp" => Self::WebP,
            "image/gif" => Self::Gif,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        // GIF: GIF8
        if data.starts_with(b"GIF8") {
            return Self::Gif;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }

        Self::Unknown
    }
}

/// Decode a source into a PNG-backed raster.
///
/// When `limit` is given, rasters larger than `(max_width, max_height)` are
/// downsampled (Lanczos3, aspect preserved) before re-encoding.
///
/// # Errors
///
/// Returns [`RenderError::UnsupportedSource`] for non-`data:` URLs and
/// [`RenderError::Decode`] for anything that fails to parse.
pub fn decode_source(source: &ImageSource, limit: Option<(u32, u32)>) -> RenderResult<RasterHandle> {
    let bytes = match source {
        ImageSource::Bytes(bytes) => std::borrow::Cow::Borrowed(bytes.as_slice()),
        ImageSource::Url(url) if url.starts_with("data:") => {
            std::borrow::Cow::Owned(bytes_from_data_url(url)?)
        }
        ImageSource::Url(url) => {
            return Err(RenderError::UnsupportedSource(format!(
                "remote URLs are not fetched: {url}"
            )))
        }
    };
    let img = image::load_from_memory(&bytes)
        .map_err(|e| RenderError::Decode(format!("{:?}: {e}", ImageFormat::from_magic_bytes(&bytes))))?;
    let img = match limit {
        Some((max_width, max_height)) => downsample(img, max_width, max_height),
        None => img,
    };
    encode_raster(&img)
}

/// Extract the payload of a `data:` URL.
///
/// Supports formats like: `data:image/png;base64,iVBORw0KGgo...`
///
/// # Errors
///
/// Returns an error if the data URL is malformed.
pub fn bytes_from_data_url(uri: &str) -> RenderResult<Vec<u8>> {
    let uri_data = uri
        .strip_prefix("data:")
        .ok_or_else(|| RenderError::Decode("Not a data URL".to_string()))?;

    let (metadata, encoded) = uri_data
        .split_once(',')
        .ok_or_else(|| RenderError::Decode("Invalid data URL: missing comma".to_string()))?;

    if let Some(mime) = metadata.split(';').next().filter(|m| !m.is_empty()) {
        if ImageFormat::from_mime(mime) == ImageFormat::Unknown {
            tracing::debug!("Data URL declares {}, sniffing payload instead", mime);
        }
    }

    if metadata.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RenderError::Decode(format!("Failed to decode base64: {e}")))
    } else {
        percent_decode(encoded)
    }
}

/// Percent-decoding for non-base64 data URLs.
fn percent_decode(input: &str) -> RenderResult<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| RenderError::Decode("Invalid URL encoding".to_string()))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    Ok(result)
}

/// Shrink to fit within the limits, preserving aspect ratio.
fn downsample(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img;
    }
    tracing::debug!(
        "Downsampling {}x{} raster to fit {}x{}",
        width,
        height,
        max_width,
        max_height
    );
    img.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3)
}

fn encode_raster(img: &DynamicImage) -> RenderResult<RasterHandle> {
    let (width, height) = img.dimensions();
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| RenderError::Decode(format!("PNG re-encoding failed: {e}")))?;
    Ok(RasterHandle::new(width, height, png))
}
