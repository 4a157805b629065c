//! Texture creation, upload and readback helpers

use crate::error::WgpuError;
use crate::format::{SamplerFilterMode, WgpuFormat};

/// Usage of render target attachments: written as storage, read by later filters, copied out
pub const TEXTURE_USAGE_STORAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::STORAGE_BINDING).union(wgpu::TextureUsages::COPY_SRC);

/// Usage of textures uploaded as pipeline inputs
pub const TEXTURE_USAGE_INPUT: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Creates a 2D texture without mipmaps or multisampling
///
/// # Arguments
/// * `device` - The wgpu device to create the texture on
/// * `label` - Debug label
/// * `format` - Size and texel format
/// * `usage` - Texture usage flags
pub fn create_texture(device: &wgpu::Device, label: &str, format: &WgpuFormat, usage: wgpu::TextureUsages) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: format.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: format.format,
        usage,
        view_formats: &[],
    })
}

/// Creates a clamp-to-edge sampler with the given filter mode
pub fn create_sampler(device: &wgpu::Device, filter_mode: SamplerFilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("Sampler {filter_mode:?}")),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode.to_wgpu(),
        min_filter: filter_mode.to_wgpu(),
        mipmap_filter: wgpu::FilterMode::Nearest,
        lod_min_clamp: 0.0,
        lod_max_clamp: 0.0,
        compare: None,
        anisotropy_clamp: 1,
        border_color: None,
    })
}

/// Uploads an image into a new `Rgba32Float` texture
///
/// # Arguments
/// * `device` - The wgpu device
/// * `queue` - The wgpu command queue
/// * `image` - The source image
///
/// # Returns
/// A texture usable as a pipeline input
pub fn texture_from_image(device: &wgpu::Device, queue: &wgpu::Queue, image: &image::DynamicImage) -> wgpu::Texture {
    let rgba_image = image.to_rgba32f();
    let (width, height) = rgba_image.dimensions();
    let format = WgpuFormat::new(wgpu::TextureFormat::Rgba32Float, width, height);
    let texture = create_texture(device, "Input Texture", &format, TEXTURE_USAGE_INPUT);

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(rgba_image.as_raw()),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4 * 4),
            rows_per_image: Some(height),
        },
        format.extent(),
    );

    texture
}

/// Reads a 32-bit float texture back into an RGBA image
///
/// Single and two channel textures are expanded: `R32Float` to gray, `Rg32Float` to red and
/// green with zero blue. Alpha is 1 unless the texture has its own.
///
/// # Arguments
/// * `device` - The wgpu device
/// * `queue` - The wgpu command queue
/// * `texture` - Texture with `COPY_SRC` usage
pub fn read_texture_rgba32f(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<image::Rgba32FImage, WgpuError> {
    let format = WgpuFormat::of(texture);
    let components: u32 = match format.format {
        wgpu::TextureFormat::R32Float => 1,
        wgpu::TextureFormat::Rg32Float => 2,
        wgpu::TextureFormat::Rgba32Float => 4,
        other => return Err(WgpuError::UnsupportedFormat(other)),
    };
    let (width, height) = (format.width, format.height);

    // Rows of a texture-to-buffer copy must be aligned
    let bytes_per_row = width * components * 4;
    let padded_bytes_per_row = bytes_per_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        format.extent(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    map_and_wait(device, &buffer_slice)?;

    let mut rgba_data = Vec::with_capacity((width * height * 4) as usize);
    {
        let data = buffer_slice.get_mapped_range();
        for row in data.chunks(padded_bytes_per_row as usize) {
            let texels: &[f32] = bytemuck::cast_slice(&row[..bytes_per_row as usize]);
            for texel in texels.chunks(components as usize) {
                match *texel {
                    [v] => rgba_data.extend_from_slice(&[v, v, v, 1.0]),
                    [r, g] => rgba_data.extend_from_slice(&[r, g, 0.0, 1.0]),
                    _ => rgba_data.extend_from_slice(texel),
                }
            }
        }
    }
    buffer.unmap();

    image::Rgba32FImage::from_raw(width, height, rgba_data).ok_or(WgpuError::ImageSize { width, height })
}

/// Maps `slice` for reading and blocks until the mapping is done
pub(crate) fn map_and_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<(), WgpuError> {
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device.poll(wgpu::PollType::Wait)?;
    pollster::block_on(receiver.receive()).ok_or(WgpuError::MapFailed)??;
    Ok(())
}
