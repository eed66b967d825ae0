//! Image preprocessing: raw upload bytes to a model-ready tensor.
//!
//! The pipeline is deterministic: identical input bytes always produce a
//! bit-identical tensor. All failure modes surface before the model is
//! touched.

use image::imageops::FilterType;
use ndarray::Array4;

use crate::domain::ModelConfig;
use crate::{PneumoscanError, Result};

/// Largest accepted source dimension; X-rays beyond this are rejected
/// before any resampling work happens.
const MAX_SOURCE_DIMENSION: u32 = 4096;

/// A decoded and normalized image, ready for inference.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// Normalized pixels in `(1, height, width, channel)` layout, the
    /// channel-last ordering the trained model expects.
    pub tensor: Array4<f32>,
    /// Width and height of the source image before resizing.
    pub source_size: (u32, u32),
}

/// Converts arbitrary uploaded image bytes into the model input tensor.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: ModelConfig,
}

impl ImagePreprocessor {
    /// Create a preprocessor for the given model configuration.
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Decode, resize and normalize `bytes`.
    ///
    /// Any source color mode (grayscale, RGBA, palette) is forced to
    /// 3-channel RGB. Pixels are scaled to `[0, 1]` and then shifted by the
    /// configured per-channel `(x - mean) / std`.
    ///
    /// # Errors
    /// `Validation` if the bytes are not a decodable image; `Shape` if the
    /// resized buffer does not match the configured input dimension.
    pub fn prepare(&self, bytes: &[u8]) -> Result<PreprocessedImage> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PneumoscanError::Validation(format!("undecodable image: {e}")))?;
        let source_size = (decoded.width(), decoded.height());
        if source_size.0 > MAX_SOURCE_DIMENSION || source_size.1 > MAX_SOURCE_DIMENSION {
            return Err(PneumoscanError::Validation(format!(
                "image dimensions {}x{} exceed the {MAX_SOURCE_DIMENSION} pixel limit",
                source_size.0, source_size.1
            )));
        }

        let size = self.config.input_size;
        let rgb = decoded
            .resize_exact(size, size, FilterType::Lanczos3)
            .to_rgb8();

        if rgb.width() != size || rgb.height() != size {
            return Err(PneumoscanError::Shape {
                expected: format!("{size}x{size}"),
                actual: format!("{}x{}", rgb.width(), rgb.height()),
            });
        }

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for channel in 0..3 {
                let scaled = f32::from(pixel[channel]) / 255.0;
                tensor[[0, y as usize, x as usize, channel]] =
                    (scaled - self.config.mean[channel]) / self.config.std[channel];
            }
        }

        Ok(PreprocessedImage {
            tensor,
            source_size,
        })
    }
}
