//! Sampled 2D textures and the staging upload that creates them.
//!
//! Every texture is decoded on the host, expanded to four channels and pushed
//! through a host-visible staging buffer with a single blocking submission:
//! undefined → transfer-dst, copy, transfer-dst → shader-read.

use crate::device::{
    BufferInfo, CommandBuffer, GpuDevice, GpuError, ImageBarrier, ImageInfo, ImageKind,
    ImageLayout, MemoryUsage, QueueType, SamplerInfo, align_up, pad_rows,
};

/// Sampler state resolved from the document's sampler table.
pub type TextureSampler = SamplerInfo;

pub fn mag_filter(filter: Option<gltf::texture::MagFilter>) -> wgpu::FilterMode {
    match filter {
        Some(gltf::texture::MagFilter::Linear) => wgpu::FilterMode::Linear,
        Some(gltf::texture::MagFilter::Nearest) => wgpu::FilterMode::Nearest,
        None => {
            log::debug!("sampler has no mag filter, using nearest");
            wgpu::FilterMode::Nearest
        }
    }
}

/// Splits a glTF minification filter into its texel and mip filters.
pub fn min_filter(
    filter: Option<gltf::texture::MinFilter>,
) -> (wgpu::FilterMode, wgpu::FilterMode) {
    use gltf::texture::MinFilter;
    use wgpu::FilterMode::{Linear, Nearest};
    match filter {
        Some(MinFilter::Nearest) => (Nearest, Nearest),
        Some(MinFilter::Linear) => (Linear, Nearest),
        Some(MinFilter::NearestMipmapNearest) => (Nearest, Nearest),
        Some(MinFilter::LinearMipmapNearest) => (Linear, Nearest),
        Some(MinFilter::NearestMipmapLinear) => (Nearest, Linear),
        Some(MinFilter::LinearMipmapLinear) => (Linear, Linear),
        None => {
            log::debug!("sampler has no min filter, using nearest");
            (Nearest, Nearest)
        }
    }
}

pub fn address_mode(mode: gltf::texture::WrappingMode) -> wgpu::AddressMode {
    match mode {
        gltf::texture::WrappingMode::Repeat => wgpu::AddressMode::Repeat,
        gltf::texture::WrappingMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        gltf::texture::WrappingMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn sampler_from_gltf(sampler: &gltf::texture::Sampler<'_>) -> TextureSampler {
    let (min, mipmap) = min_filter(sampler.min_filter());
    let address_mode_v = address_mode(sampler.wrap_t());
    TextureSampler {
        mag_filter: mag_filter(sampler.mag_filter()),
        min_filter: min,
        mipmap_filter: mipmap,
        address_mode_u: address_mode(sampler.wrap_s()),
        address_mode_v,
        address_mode_w: address_mode_v,
        max_lod: 1.0,
    }
}

/// Converts decoded pixels of any glTF image format into tightly packed RGBA8.
///
/// Missing color channels stay 0 and a missing alpha is 255. 16-bit channels
/// keep their high byte and float channels are clamped to `[0, 1]`.
pub fn expand_to_rgba8(format: gltf::image::Format, pixels: &[u8]) -> Vec<u8> {
    use gltf::image::Format;
    let (channels, channel_size) = match format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => return pixels.to_vec(),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
    };
    log::trace!("expanding {:?} to rgba8", format);

    let channel = |bytes: &[u8]| -> u8 {
        match bytes {
            [v] => *v,
            [_, hi] => *hi,
            [a, b, c, d] => {
                let v = f32::from_le_bytes([*a, *b, *c, *d]);
                (v.clamp(0.0, 1.0) * 255.0).round() as u8
            }
            _ => 0,
        }
    };

    pixels
        .chunks_exact(channels * channel_size)
        .flat_map(|pixel| {
            let mut rgba = [0, 0, 0, 255];
            for (dst, src) in rgba.iter_mut().zip(pixel.chunks_exact(channel_size)) {
                *dst = channel(src);
            }
            rgba
        })
        .collect()
}

/// A sampled texture as referenced by materials.
pub struct Texture<D: GpuDevice> {
    pub name: Option<String>,
    pub image: D::Image,
    pub sampler: TextureSampler,
}

impl<D: GpuDevice> std::fmt::Debug for Texture<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}

impl<D: GpuDevice> Texture<D> {
    /// Uploads a decoded document image as a single-mip sampled texture.
    pub fn from_gltf_image(
        device: &D,
        data: &gltf::image::Data,
        name: Option<String>,
        sampler: TextureSampler,
    ) -> Result<Self, GpuError> {
        let rgba = expand_to_rgba8(data.format, &data.pixels);
        let (width, height) = (data.width, data.height);
        let label = name.clone().unwrap_or_else(|| "gltf texture".to_string());
        let image = upload_image(
            device,
            &ImageInfo {
                label,
                width,
                height,
                // Mip chains are not generated for scene textures.
                levels: 1,
                layers: 1,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                kind: ImageKind::D2,
            },
            4,
            &rgba,
            ImageLayout::ShaderRead,
        )?;
        Ok(Self {
            name,
            image,
            sampler,
        })
    }
}

/// Creates a 2D image from `info` and fills mip 0 with tightly packed `data`
/// through a staging buffer, leaving the image in `final_layout`.
pub fn upload_image<D: GpuDevice + ?Sized>(
    device: &D,
    info: &ImageInfo,
    bytes_per_pixel: u32,
    data: &[u8],
    final_layout: ImageLayout,
) -> Result<D::Image, GpuError> {
    let row_size = info.width as usize * bytes_per_pixel as usize;
    let expected = row_size * info.height as usize;
    if data.len() < expected {
        return Err(GpuError::InvalidUsage(format!(
            "{}: {} bytes of pixel data for a {}x{} image",
            info.label,
            data.len(),
            info.width,
            info.height
        )));
    }

    let properties = device.properties();
    let aligned_row = align_up(row_size as u64, properties.image_row_alignment) as usize;
    let padded = pad_rows(data, row_size, aligned_row, info.height as usize);
    let staging_size = align_up(padded.len() as u64, properties.image_alignment);

    let staging = device.create_buffer(&BufferInfo {
        label: format!("{} staging", info.label),
        size: staging_size,
        usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        memory: MemoryUsage::CpuToGpu,
    })?;
    device.write_buffer(&staging, 0, &padded)?;

    let image = device.create_image(info)?;

    let mut commands = CommandBuffer::<D>::new(format!("{} upload", info.label));
    commands.barrier(vec![ImageBarrier::<D>::new(
        &image,
        ImageLayout::Undefined,
        ImageLayout::TransferDst,
    )]);
    commands.copy_buffer_to_image(&staging, &image, aligned_row as u32, info.width, info.height);
    commands.barrier(vec![ImageBarrier::<D>::new(
        &image,
        ImageLayout::TransferDst,
        final_layout,
    )]);
    device.submit_and_wait(QueueType::Transfer, commands)?;
    drop(staging);

    Ok(image)
}
