//! Texture optimization
//!
//! Applies sampling state for a resolution tier and, when decoded pixels
//! are available, downsamples them to the tier's maximum dimension.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use model_optimizer_core::{
    FilterMode, MinFilter, OptimizationStage, OptimizerError, Result, Texture, Tier, WrapMode,
};
use tracing::debug;

/// Anisotropy level used for the high tier
pub const HIGH_TIER_ANISOTROPY: u16 = 16;

/// Largest texture edge allowed for a tier
pub fn max_dimension(tier: Tier) -> u32 {
    match tier {
        Tier::Low => 512,
        Tier::Medium => 1024,
        Tier::High => 2048,
    }
}

#[derive(Debug, Clone)]
pub struct TextureOptimizer {
    resample: bool,
}

impl Default for TextureOptimizer {
    fn default() -> Self {
        Self { resample: true }
    }
}

impl TextureOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure sampling only, never touch pixel data
    pub fn sampling_only() -> Self {
        Self { resample: false }
    }

    pub fn optimize(&self, texture: &mut Texture, tier: Tier) -> Result<()> {
        let sampler = &mut texture.sampler;
        sampler.generate_mipmaps = tier != Tier::Low;
        sampler.mag_filter = FilterMode::Linear;
        sampler.min_filter = if tier == Tier::Low {
            MinFilter::Linear
        } else {
            MinFilter::LinearMipmapLinear
        };
        sampler.anisotropy = (tier == Tier::High).then_some(HIGH_TIER_ANISOTROPY);
        sampler.wrap_s = WrapMode::Repeat;
        sampler.wrap_t = WrapMode::Repeat;

        if self.resample {
            downsample(texture, max_dimension(tier))?;
        }
        Ok(())
    }
}

fn downsample(texture: &mut Texture, max_dim: u32) -> Result<()> {
    let (Some((width, height)), Some(len)) = (texture.dimensions, texture.pixels.as_ref().map(Vec::len))
    else {
        return Ok(());
    };
    if width.max(height) <= max_dim {
        return Ok(());
    }

    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(OptimizerError::optimization(
            OptimizationStage::Texture,
            format!(
                "texture {:?} has {} bytes, expected {} for {}x{} RGBA",
                texture.name, len, expected, width, height
            ),
        ));
    }
    let pixels = texture.pixels.take().unwrap_or_default();
    let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        OptimizerError::optimization(OptimizationStage::Texture, "invalid RGBA buffer")
    })?;

    let scale = max_dim as f64 / width.max(height) as f64;
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    let resized = imageops::resize(&image, new_width, new_height, FilterType::Triangle);

    debug!(
        "Downsampled texture {:?} from {}x{} to {}x{}",
        texture.name, width, height, new_width, new_height
    );
    texture.dimensions = Some((new_width, new_height));
    texture.pixels = Some(resized.into_raw());
    Ok(())
}
