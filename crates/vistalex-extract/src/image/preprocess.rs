// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image preprocessor — content-aware binarization and contrast stretch that
// make rasters more legible to the recognition engine.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use tracing::{debug, instrument};
use vistalex_core::error::{ExtractError, Result};
use vistalex_core::types::{ContentType, PreprocessSpec};

/// Luminance cutoff for printed documents (midpoint of 0-255).
pub const DOCUMENT_THRESHOLD: u8 = 128;

/// Luminance cutoff for handwriting (~70% of range) so thin strokes survive.
pub const HANDWRITING_THRESHOLD: u8 = 179;

/// Contrast factor applied around the midpoint for photographs.
pub const PHOTO_CONTRAST: f32 = 1.2;

/// Preprocess `image` according to `spec`. Pure: output has the input's
/// dimensions and no state is shared between calls.
pub fn preprocess(image: DynamicImage, spec: &PreprocessSpec) -> DynamicImage {
    ImagePreprocessor::from_dynamic(image).apply(spec).into_dynamic()
}

/// Image preprocessing pipeline over a single in-memory image.
///
/// Each method consumes `self` and returns a new `ImagePreprocessor`, so
/// steps chain without shared mutable state.
pub struct ImagePreprocessor {
    image: DynamicImage,
}

impl ImagePreprocessor {
    // -- Construction ---------------------------------------------------------

    /// Decode raw image bytes (JPEG, PNG, WebP, GIF, BMP, TIFF).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).map_err(|err| {
            ExtractError::CorruptPayload(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Strategies (consume self, return new Self) ---------------------------

    /// Run the strategy selected by `spec`. `enhance = false` is a no-op.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn apply(self, spec: &PreprocessSpec) -> Self {
        if !spec.enhance {
            debug!("Enhancement disabled, passing image through");
            return self;
        }
        match spec.content_type {
            ContentType::Document => self.binarize(DOCUMENT_THRESHOLD),
            ContentType::Handwriting => self.binarize_perceptual(HANDWRITING_THRESHOLD),
            ContentType::Photo => self.stretch_contrast(PHOTO_CONTRAST),
        }
    }

    /// Global binarization on the luma channel: below `threshold` goes
    /// black, at or above goes white.
    pub fn binarize(self, threshold: u8) -> Self {
        let gray = self.image.to_luma8();
        let (width, height) = gray.dimensions();
        let mut output = GrayImage::new(width, height);

        for (x, y, pixel) in gray.enumerate_pixels() {
            let binary = if pixel.0[0] < threshold { 0u8 } else { 255u8 };
            output.put_pixel(x, y, Luma([binary]));
        }

        debug!(threshold, "Global binarization applied");
        Self {
            image: DynamicImage::ImageLuma8(output),
        }
    }

    /// Binarization on 0.30·R + 0.59·G + 0.11·B luminance.
    pub fn binarize_perceptual(self, threshold: u8) -> Self {
        let rgb = self.image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut output = GrayImage::new(width, height);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let luminance = 0.30 * f32::from(r) + 0.59 * f32::from(g) + 0.11 * f32::from(b);
            let binary = if luminance < f32::from(threshold) {
                0u8
            } else {
                255u8
            };
            output.put_pixel(x, y, Luma([binary]));
        }

        debug!(threshold, "Perceptual binarization applied");
        Self {
            image: DynamicImage::ImageLuma8(output),
        }
    }

    /// Linear contrast stretch around 128. Alpha is preserved.
    pub fn stretch_contrast(self, factor: f32) -> Self {
        let rgba = self.image.to_rgba8();

        let contrasted = image::ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
            let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let adjust = |channel: u8| -> u8 {
                let val = factor * (f32::from(channel) - 128.0) + 128.0;
                val.clamp(0.0, 255.0) as u8
            };
            image::Rgba([adjust(r), adjust(g), adjust(b), a])
        });

        debug!(factor, "Contrast stretch applied");
        Self {
            image: DynamicImage::ImageRgba8(contrasted),
        }
    }
}

/// Encode any image as PNG, the format sent to remote backends.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).map_err(|err| {
        ExtractError::CorruptPayload(format!("PNG encoding failed: {}", err))
    })?;
    Ok(buffer.into_inner())
}
