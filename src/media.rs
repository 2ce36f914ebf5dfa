use std::io::Cursor;

use anyhow::Context as _;
use image::ImageFormat;

use crate::formats::MediaType;

/// Capability: inspect and convert downloaded media.
pub trait MediaInspector: Send + Sync {
    /// Sniffs the type from the bytes themselves; headers are never consulted.
    fn detect_mime(&self, data: &[u8]) -> Option<MediaType>;
    fn dimensions(&self, data: &[u8]) -> Option<(u32, u32)>;
    fn transcode_webp_to_png(&self, data: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// `image`-backed inspector with a few extra magic numbers for non-image files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageInspector;

impl MediaInspector for ImageInspector {
    fn detect_mime(&self, data: &[u8]) -> Option<MediaType> {
        if let Ok(format) = image::guess_format(data) {
            let extension = match format {
                ImageFormat::Jpeg => "jpg",
                other => other.extensions_str().first().copied()?,
            };
            return Some(MediaType::new(format.to_mime_type(), extension));
        }

        if data.starts_with(b"%PDF-") {
            return Some(MediaType::new("application/pdf", "pdf"));
        }
        if data.starts_with(b"OggS") {
            return Some(MediaType::new("audio/ogg", "ogg"));
        }
        if data.starts_with(b"ID3") || data.starts_with(&[0xff, 0xfb]) {
            return Some(MediaType::new("audio/mpeg", "mp3"));
        }
        if data.starts_with(b"<?xml") {
            return Some(MediaType::new("application/xml", "xml"));
        }
        None
    }

    fn dimensions(&self, data: &[u8]) -> Option<(u32, u32)> {
        image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    fn transcode_webp_to_png(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        let decoded = image::load_from_memory_with_format(data, ImageFormat::WebP)
            .context("decode webp")?;
        let mut out = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .context("encode png")?;
        Ok(out)
    }
}

/// Binary sniffers do not know SVG; look for an `<svg` root near the start.
pub fn sniff_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(4096)];
    let Ok(text) = std::str::from_utf8(head) else {
        return String::from_utf8_lossy(head).contains("<svg");
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with('<') && text.contains("<svg")
}

/// Settles the type of downloaded bytes: sniff, fall back to SVG detection for
/// unknown or XML payloads, and turn WebP into PNG (then sniff again).
pub fn classify(inspector: &dyn MediaInspector, data: Vec<u8>) -> Option<(MediaType, Vec<u8>)> {
    let mut detected = inspector.detect_mime(&data);
    if detected
        .as_ref()
        .is_none_or(|media| media.mime.ends_with("xml"))
        && sniff_svg(&data)
    {
        detected = Some(MediaType::new("image/svg+xml", "svg"));
    }

    match detected {
        Some(media) if media.mime == "image/webp" => {
            let png = match inspector.transcode_webp_to_png(&data) {
                Ok(png) => png,
                Err(err) => {
                    tracing::warn!(?err, "webp transcode failed");
                    return None;
                }
            };
            let media = inspector.detect_mime(&png)?;
            Some((media, png))
        }
        Some(media) => Some((media, data)),
        None => None,
    }
}
