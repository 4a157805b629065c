//! Render targets: groups of same-format storage textures

use crate::device::WgpuDevice;
use crate::error::WgpuError;
use crate::format::WgpuFormat;
use crate::texture::{TEXTURE_USAGE_STORAGE, create_texture};
use filtergraph::RenderTarget;

/// Storage textures written by the filters sharing this target
#[derive(Debug)]
pub struct WgpuRenderTarget {
    id: usize,
    format: WgpuFormat,
    attachments: Vec<wgpu::Texture>,
}

impl WgpuRenderTarget {
    /// Allocates a target with `attachments` textures of `format`
    pub fn new(device: &wgpu::Device, id: usize, format: WgpuFormat, attachments: usize) -> Self {
        let mut target = Self {
            id,
            format,
            attachments: Vec::with_capacity(attachments),
        };
        for _ in 0..attachments {
            target.push_attachment(device);
        }
        target
    }

    pub fn attachments(&self) -> &[wgpu::Texture] {
        &self.attachments
    }

    fn push_attachment(&mut self, device: &wgpu::Device) {
        let label = format!("Render Target {} Attachment {}", self.id, self.attachments.len());
        self.attachments.push(create_texture(device, &label, &self.format, TEXTURE_USAGE_STORAGE));
    }
}

impl RenderTarget<WgpuDevice> for WgpuRenderTarget {
    fn format(&self) -> &WgpuFormat {
        &self.format
    }

    fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    fn add_attachment(&mut self, device: &mut WgpuDevice) -> Result<(), WgpuError> {
        self.push_attachment(device.device());
        Ok(())
    }

    fn attachment(&self, index: usize) -> Option<&wgpu::Texture> {
        self.attachments.get(index)
    }

    fn memory_footprint(&self) -> u64 {
        self.format.memory_footprint() * self.attachments.len() as u64
    }
}
