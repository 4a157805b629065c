//! Errors raised by the wgpu backend

/// Failures of wgpu filters, render targets and texture helpers
#[derive(Debug, thiserror::Error)]
pub enum WgpuError {
    /// Shader or pipeline creation rejected by wgpu validation
    #[error("wgpu validation failed for '{label}': {message}")]
    Validation { label: String, message: String },
    #[error("input #{port} of filter '{filter}' is not bound")]
    UnboundInput { filter: String, port: usize },
    #[error("filter '{filter}' writes {expected} attachment(s) but the render target has {actual}")]
    MissingAttachments { filter: String, expected: usize, actual: usize },
    #[error("unsupported texture format for readback: {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),
    #[error("failed to map buffer for reading")]
    MapFailed,
    #[error("texel data does not fit a {width}x{height} image")]
    ImageSize { width: u32, height: u32 },
    #[error(transparent)]
    BufferAsync(#[from] wgpu::BufferAsyncError),
    #[error(transparent)]
    Poll(#[from] wgpu::PollError),
    #[error("failed to create GPU profiler: {0}")]
    Profiler(#[from] wgpu_profiler::CreationError),
    #[error("failed to end GPU profiler frame: {0}")]
    ProfilerFrame(#[from] wgpu_profiler::EndFrameError),
}
