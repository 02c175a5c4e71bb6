//! Texture feature extraction
//!
//! - **gray**: Luminance-style grayscale composite and its 0..=100 quantization
//! - **glcm**: Gray-Level Co-occurrence Matrix (Haralick) texture bands
//!
//! [`TextureExtractor`] chains the two: spectral stack in, four texture
//! bands (`gray_corr`, `gray_ent`, `gray_idm`, `gray_savg`) out.

mod glcm;
mod gray;

pub use glcm::{glcm_features, GlcmFeature};
pub use gray::{grayscale, quantize_gray, SpectralBands, GRAY_DOMAIN_MAX, GRAY_LEVELS};

use bakau_core::raster::RasterStack;
use bakau_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for texture extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureParams {
    /// Side of the square co-occurrence window, odd and >= 3 (default: 3)
    pub window: usize,
    /// Names of the bands feeding the grayscale composite
    pub bands: SpectralBands,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            window: 3,
            bands: SpectralBands::default(),
        }
    }
}

impl TextureParams {
    pub fn validate(&self) -> Result<()> {
        if self.window < 3 || self.window % 2 == 0 {
            return Err(Error::invalid_param("texture.window", self.window, "must be an odd integer >= 3"));
        }
        Ok(())
    }
}

/// Texture stage of the pipeline
#[derive(Debug, Clone, Default)]
pub struct TextureExtractor;

impl Algorithm for TextureExtractor {
    type Input = RasterStack;
    type Output = RasterStack;
    type Params = TextureParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "TextureExtractor"
    }

    fn description(&self) -> &'static str {
        "GLCM correlation, entropy, IDM and sum average of a grayscale composite"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        texture_features(&input, &params)
    }
}

/// Grayscale composite, quantization and GLCM texture in one call
pub fn texture_features(stack: &RasterStack, params: &TextureParams) -> Result<RasterStack> {
    params.validate()?;
    let gray = grayscale(stack, &params.bands)?;
    let levels = quantize_gray(&gray);
    debug!(window = params.window, valid = levels.valid_count(), "texture input quantized");
    glcm_features(&levels, params.window)
}
