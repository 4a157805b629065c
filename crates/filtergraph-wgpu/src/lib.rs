//! wgpu backend for filter graphs
//!
//! [`WgpuDevice`] implements [`filtergraph::Device`] on top of a `wgpu::Device`: every filter
//! is a WGSL compute shader described by a [`WgpuFilterDescriptor`], and render targets are
//! groups of storage textures sharing one [`WgpuFormat`]. Upload and readback helpers in
//! [`texture`] move images in and out of the GPU.

mod device;
mod error;
mod filter;
mod format;
mod target;
pub mod texture;

pub use device::WgpuDevice;
pub use error::WgpuError;
pub use filter::{COMPUTE_WORKGROUP_SIZE_X, COMPUTE_WORKGROUP_SIZE_Y, WgpuFilter, WgpuFilterDescriptor};
pub use format::{SamplerFilterMode, WgpuFormat};
pub use target::WgpuRenderTarget;

/// Pipeline layout whose filters run on [`WgpuDevice`]
pub type WgpuPipelineLayout = filtergraph::PipelineLayout<WgpuFilterDescriptor>;
/// Filter layout of a [`WgpuDevice`] filter
pub type WgpuFilterLayout = filtergraph::FilterLayout<WgpuFilterDescriptor>;
/// Pipeline compiled for a [`WgpuDevice`]
pub type WgpuPipeline = filtergraph::Pipeline<WgpuDevice>;
