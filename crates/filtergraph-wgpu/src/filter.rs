//! Compute shader filters
//!
//! Every filter is one WGSL compute shader. Its bind group 0 is laid out from the filter's
//! ports:
//! - bindings `0..N` are the `N` input ports as `texture_2d<f32>`
//! - bindings `N..N+M` are the `M` output ports as write-only storage textures
//! - binding `N+M` is the sampler, when the descriptor asks for one
//!
//! The shader is dispatched once per output texel with an 8x8 workgroup size.

use crate::device::WgpuDevice;
use crate::error::WgpuError;
use crate::format::{SamplerFilterMode, WgpuFormat};
use crate::target::WgpuRenderTarget;
use crate::texture::create_sampler;
use filtergraph::{Filter, FilterLayout};
use serde::{Deserialize, Serialize};

/// Compute shader workgroup size in X dimension
pub const COMPUTE_WORKGROUP_SIZE_X: u32 = 8;
/// Compute shader workgroup size in Y dimension
pub const COMPUTE_WORKGROUP_SIZE_Y: u32 = 8;

fn default_entry_point() -> String {
    "main".to_string()
}

/// Backend data of a wgpu filter layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WgpuFilterDescriptor {
    /// WGSL source code
    pub shader: String,
    /// Compute entry point
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Format of every output port
    pub output: WgpuFormat,
    /// Sampler bound after the outputs, if the shader samples its inputs
    #[serde(default)]
    pub sampler: Option<SamplerFilterMode>,
}

impl WgpuFilterDescriptor {
    pub fn new(shader: impl Into<String>, output: WgpuFormat) -> Self {
        Self {
            shader: shader.into(),
            entry_point: default_entry_point(),
            output,
            sampler: None,
        }
    }

    pub fn with_sampler(mut self, filter_mode: SamplerFilterMode) -> Self {
        self.sampler = Some(filter_mode);
        self
    }
}

/// A compiled compute shader with its currently bound inputs
#[derive(Debug)]
pub struct WgpuFilter {
    /// Filter type name, used as debug label
    name: String,
    output: WgpuFormat,
    outputs: usize,
    compute_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: Option<wgpu::Sampler>,
    inputs: Vec<Option<wgpu::Texture>>,
}

impl WgpuFilter {
    /// Compiles the shader of `layout` and builds its bind group layout
    ///
    /// # Arguments
    /// * `device` - The wgpu device
    /// * `layout` - Ports and descriptor of the filter
    ///
    /// # Returns
    /// The filter, or the validation error reported by wgpu
    pub fn new(device: &wgpu::Device, layout: &FilterLayout<WgpuFilterDescriptor>) -> Result<Self, WgpuError> {
        let name = layout.type_name();
        let descriptor = layout.descriptor();
        let inputs = layout.inputs().len();
        let outputs = layout.outputs().len();
        let filterable = descriptor.sampler == Some(SamplerFilterMode::Linear);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(descriptor.shader.as_str().into()),
        });

        let mut bind_group_layout_entries = Vec::with_capacity(inputs + outputs + 1);
        for binding in 0..inputs {
            bind_group_layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        for binding in inputs..inputs + outputs {
            bind_group_layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: descriptor.output.format,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            });
        }
        if let Some(filter_mode) = descriptor.sampler {
            let sampler_type = match filter_mode {
                SamplerFilterMode::Nearest => wgpu::SamplerBindingType::NonFiltering,
                SamplerFilterMode::Linear => wgpu::SamplerBindingType::Filtering,
            };
            bind_group_layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: (inputs + outputs) as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &bind_group_layout_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some(descriptor.entry_point.as_str()),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(WgpuError::Validation {
                label: name.to_string(),
                message: error.to_string(),
            });
        }

        tracing::debug!(filter = name, inputs, outputs, format = ?descriptor.output, "created compute filter");

        Ok(Self {
            name: name.to_string(),
            output: descriptor.output,
            outputs,
            compute_pipeline,
            bind_group_layout,
            sampler: descriptor.sampler.map(|filter_mode| create_sampler(device, filter_mode)),
            inputs: vec![None; inputs],
        })
    }

    /// Workgroup counts covering every output texel
    pub fn workgroups(&self) -> (u32, u32) {
        (
            self.output.width.div_ceil(COMPUTE_WORKGROUP_SIZE_X),
            self.output.height.div_ceil(COMPUTE_WORKGROUP_SIZE_Y),
        )
    }
}

impl Filter<WgpuDevice> for WgpuFilter {
    fn output_format(&self) -> &WgpuFormat {
        &self.output
    }

    /// Memory of the attachments this filter writes
    fn memory_footprint(&self) -> u64 {
        self.output.memory_footprint() * self.outputs as u64
    }

    fn set_input(&mut self, port: usize, texture: wgpu::Texture) {
        self.inputs[port] = Some(texture);
    }

    fn clear_inputs(&mut self) {
        self.inputs.fill(None);
    }

    fn render(&mut self, device: &mut WgpuDevice, target: &mut WgpuRenderTarget) -> Result<(), WgpuError> {
        if target.attachments().len() < self.outputs {
            return Err(WgpuError::MissingAttachments {
                filter: self.name.clone(),
                expected: self.outputs,
                actual: target.attachments().len(),
            });
        }

        let mut views = Vec::with_capacity(self.inputs.len() + self.outputs);
        for (port, input) in self.inputs.iter().enumerate() {
            let input = input.as_ref().ok_or_else(|| WgpuError::UnboundInput {
                filter: self.name.clone(),
                port,
            })?;
            views.push(input.create_view(&wgpu::TextureViewDescriptor::default()));
        }
        for attachment in &target.attachments()[..self.outputs] {
            views.push(attachment.create_view(&wgpu::TextureViewDescriptor::default()));
        }

        let mut bind_group_entries: Vec<wgpu::BindGroupEntry<'_>> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        if let Some(sampler) = &self.sampler {
            bind_group_entries.push(wgpu::BindGroupEntry {
                binding: views.len() as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let gpu = device.device();
        let bind_group = gpu.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.name.as_str()),
            layout: &self.bind_group_layout,
            entries: &bind_group_entries,
        });

        let mut encoder = gpu.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(self.name.as_str()) });
        let query = device.begin_query(&self.name, &mut encoder);
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.name.as_str()),
                timestamp_writes: query.as_ref().and_then(|query| query.compute_pass_timestamp_writes()),
            });
            compute_pass.set_pipeline(&self.compute_pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);

            let (workgroup_x, workgroup_y) = self.workgroups();
            compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);
        }
        if let Some(query) = query {
            device.end_query(&mut encoder, query);
        }
        device.queue().submit(std::iter::once(encoder.finish()));

        Ok(())
    }
}
