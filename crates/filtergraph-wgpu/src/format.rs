//! Output formats and sampler settings of wgpu filters

use serde::{Deserialize, Serialize};

/// Size and texel format of a filter output
///
/// Two filters can share a render target only if their formats compare equal, so the size is
/// part of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WgpuFormat {
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl WgpuFormat {
    pub fn new(format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        Self { format, width, height }
    }

    /// Returns the format of `texture`
    pub fn of(texture: &wgpu::Texture) -> Self {
        Self::new(texture.format(), texture.width(), texture.height())
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Bytes held by one texture of this format
    ///
    /// Compressed and depth-stencil formats have no single texel size and report 0.
    pub fn memory_footprint(&self) -> u64 {
        let texel = self.format.block_copy_size(None).unwrap_or(0);
        u64::from(self.width) * u64::from(self.height) * u64::from(texel)
    }
}

/// Texture sampler filter modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerFilterMode {
    /// Nearest neighbor filtering (pixelated)
    Nearest,
    /// Linear interpolation filtering (smooth)
    #[default]
    Linear,
}

impl SamplerFilterMode {
    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            Self::Nearest => wgpu::FilterMode::Nearest,
            Self::Linear => wgpu::FilterMode::Linear,
        }
    }
}
