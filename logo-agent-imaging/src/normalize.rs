//! Square transparent PNG normalization.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use logo_agent::generation::{PostProcessError, PostProcessor};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Fits an image inside a `size` x `size` transparent canvas and encodes it as PNG.
///
/// The aspect ratio is preserved and the image is centred; the padding is
/// fully transparent. Decoding and encoding run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PngNormalizer {
    filter: FilterType,
}

impl PngNormalizer {
    /// Creates a normalizer using Lanczos resampling.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    /// Uses a different resampling filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for PngNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostProcessor for PngNormalizer {
    #[cfg_attr(feature = "telemetry", instrument(name = "png.normalize", skip_all, err, fields(size, input = raw.len())))]
    async fn normalize(&self, raw: &[u8], size: u32) -> Result<Vec<u8>, PostProcessError> {
        let raw = raw.to_vec();
        let filter = self.filter;
        tokio::task::spawn_blocking(move || contain_png(&raw, size, filter))
            .await
            .map_err(|e| PostProcessError::Task(e.to_string()))?
    }
}

fn contain_png(raw: &[u8], size: u32, filter: FilterType) -> Result<Vec<u8>, PostProcessError> {
    if size == 0 {
        return Err(PostProcessError::Encode("target size must be positive".to_owned()));
    }
    let source = image::load_from_memory(raw).map_err(|e| PostProcessError::Decode(e.to_string()))?;
    let fitted = source.resize(size, size, filter).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let x = (size - fitted.width()) / 2;
    let y = (size - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let mut out = Cursor::new(Vec::new());
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive)
        .write_image(canvas.as_raw(), size, size, ExtendedColorType::Rgba8)
        .map_err(|e| PostProcessError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}
