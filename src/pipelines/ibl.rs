//! Image-based-lighting precomputation.
//!
//! Turns one equirectangular HDR image into the four maps the shading pass
//! samples: an environment cubemap with a full mip chain, a diffuse irradiance
//! cubemap, a roughness-prefiltered specular cubemap and a BRDF integration LUT.
//!
//! The source image is uploaded with its own blocking submission. Every compute
//! stage is then recorded into one command buffer that is submitted once:
//!
//! 1. equirect → cube, one dispatch per environment mip
//! 2. environment → shader-read
//! 3. irradiance convolution
//! 4. specular prefilter, one dispatch per mip with `roughness = mip / (mips - 1)`
//! 5. irradiance, specular → shader-read
//! 6. BRDF integration
//! 7. BRDF → shader-read
//!
//! All four destination images start with one undefined → general transition.

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::device::{
    Binding, BindingType, CommandBuffer, ComputePipelineInfo, GpuDevice, GpuError, GpuImage,
    ImageBarrier, ImageInfo, ImageKind, ImageLayout, QueueType, SamplerInfo, ViewKind,
};
use crate::data_structures::texture::upload_image;

const EQ_TO_CUBE_SHADER: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("eq_to_cube.wgsl")
);
const IRRADIANCE_SHADER: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("irradiance.wgsl")
);
const SPECULAR_SHADER: &str = concat!(include_str!("common.wgsl"), include_str!("specular.wgsl"));
const BRDF_SHADER: &str = concat!(include_str!("common.wgsl"), include_str!("brdf.wgsl"));

/// `@workgroup_size` shared by every IBL shader.
pub const WORKGROUP_SIZE: [u32; 3] = [8, 8, 1];

/// Format of every generated map.
pub const MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of the uploaded equirectangular source.
pub const SOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

#[derive(Debug, Error)]
pub enum IblError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode environment image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("environment image is empty")]
    EmptyImage,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Sizes and sample budgets of the generated maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IblConfig {
    pub brdf_size: u32,
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub specular_size: u32,
    /// Angular step in radians of the irradiance convolution.
    pub irradiance_sample_delta: f32,
    /// GGX samples per texel for the specular prefilter and the BRDF LUT.
    pub sample_count: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            brdf_size: 512,
            environment_size: 1024,
            irradiance_size: 64,
            specular_size: 512,
            irradiance_sample_delta: 0.025,
            sample_count: 1024,
        }
    }
}

/// The generated maps. Read-only once returned.
pub struct IblMaps<D: GpuDevice> {
    pub environment: D::Image,
    pub irradiance: D::Image,
    pub specular: D::Image,
    pub brdf_lut: D::Image,
}

impl<D: GpuDevice> std::fmt::Debug for IblMaps<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IblMaps")
            .field("environment", self.environment.info())
            .field("irradiance", self.irradiance.info())
            .field("specular", self.specular.info())
            .field("brdf_lut", self.brdf_lut.info())
            .finish()
    }
}

/// `floor(log2(size)) + 1`.
pub fn mip_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

/// Workgroups needed to cover mip `mip` of a `size`-texel image with `layers`
/// layers. Never zero on any axis.
pub fn dispatch_groups(size: u32, mip: u32, workgroup: [u32; 3], layers: u32) -> [u32; 3] {
    let texels = (size >> mip).max(1);
    let axis = |texels: u32, wg: u32| texels.div_ceil(wg.max(1)).max(1);
    [
        axis(texels, workgroup[0]),
        axis(texels, workgroup[1]),
        axis(layers, workgroup[2]),
    ]
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct EqToCubeParams {
    face_size: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct IrradianceParams {
    size: u32,
    source_lod: f32,
    sample_delta: f32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SpecularParams {
    roughness: f32,
    size: u32,
    sample_count: u32,
    environment_size: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BrdfParams {
    size: u32,
    sample_count: u32,
    _pad: [u32; 2],
}

const CUBE_SAMPLING_LAYOUT: [BindingType; 3] = [
    BindingType::SampledImage {
        view: ViewKind::Cube,
        filterable: true,
    },
    BindingType::Sampler,
    BindingType::StorageImage {
        format: MAP_FORMAT,
        kind: ImageKind::Cube,
    },
];

struct Pipelines<D: GpuDevice> {
    eq_to_cube: D::Pipeline,
    irradiance: D::Pipeline,
    specular: D::Pipeline,
    brdf: D::Pipeline,
}

impl<D: GpuDevice> Pipelines<D> {
    fn new(device: &D) -> Result<Self, GpuError> {
        let eq_to_cube = device.create_compute_pipeline(&ComputePipelineInfo {
            label: "ibl equirect to cube",
            source: EQ_TO_CUBE_SHADER,
            entry_point: "main",
            workgroup_size: WORKGROUP_SIZE,
            layout: &[
                BindingType::SampledImage {
                    view: ViewKind::D2,
                    filterable: false,
                },
                BindingType::StorageImage {
                    format: MAP_FORMAT,
                    kind: ImageKind::Cube,
                },
            ],
            params_size: std::mem::size_of::<EqToCubeParams>() as u32,
        })?;
        let irradiance = device.create_compute_pipeline(&ComputePipelineInfo {
            label: "ibl irradiance",
            source: IRRADIANCE_SHADER,
            entry_point: "main",
            workgroup_size: WORKGROUP_SIZE,
            layout: &CUBE_SAMPLING_LAYOUT,
            params_size: std::mem::size_of::<IrradianceParams>() as u32,
        })?;
        let specular = device.create_compute_pipeline(&ComputePipelineInfo {
            label: "ibl specular prefilter",
            source: SPECULAR_SHADER,
            entry_point: "main",
            workgroup_size: WORKGROUP_SIZE,
            layout: &CUBE_SAMPLING_LAYOUT,
            params_size: std::mem::size_of::<SpecularParams>() as u32,
        })?;
        let brdf = device.create_compute_pipeline(&ComputePipelineInfo {
            label: "ibl brdf lut",
            source: BRDF_SHADER,
            entry_point: "main",
            workgroup_size: WORKGROUP_SIZE,
            layout: &[BindingType::StorageImage {
                format: MAP_FORMAT,
                kind: ImageKind::D2,
            }],
            params_size: std::mem::size_of::<BrdfParams>() as u32,
        })?;
        Ok(Self {
            eq_to_cube,
            irradiance,
            specular,
            brdf,
        })
    }
}

fn map_info(label: &str, size: u32, levels: u32, kind: ImageKind) -> ImageInfo {
    ImageInfo {
        label: label.to_string(),
        width: size,
        height: size,
        levels,
        layers: if kind == ImageKind::Cube { 6 } else { 1 },
        format: MAP_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
        kind,
    }
}

/// Reads, decodes and processes the HDR image at `path`.
pub fn compute_ibl_maps<D: GpuDevice>(
    device: &D,
    path: impl AsRef<Path>,
    config: &IblConfig,
) -> Result<IblMaps<D>, IblError> {
    let path = path.as_ref();
    log::info!("computing IBL maps from {:?}", path);
    let bytes = std::fs::read(path).map_err(|source| IblError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_memory(device, &bytes, config)
}

/// Decodes an encoded HDR (or any float-capable) image and processes it.
pub fn from_memory<D: GpuDevice>(
    device: &D,
    bytes: &[u8],
    config: &IblConfig,
) -> Result<IblMaps<D>, IblError> {
    let source = image::load_from_memory(bytes)?.to_rgba32f();
    let (width, height) = source.dimensions();
    from_equirect(device, width, height, source.as_raw(), config)
}

/// Processes tightly packed RGBA32F equirectangular pixels.
pub fn from_equirect<D: GpuDevice>(
    device: &D,
    width: u32,
    height: u32,
    pixels: &[f32],
    config: &IblConfig,
) -> Result<IblMaps<D>, IblError> {
    if width == 0 || height == 0 || pixels.is_empty() {
        return Err(IblError::EmptyImage);
    }
    let equirect = upload_image(
        device,
        &ImageInfo {
            label: "ibl equirect source".to_string(),
            width,
            height,
            levels: 1,
            layers: 1,
            format: SOURCE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            kind: ImageKind::D2,
        },
        16,
        bytemuck::cast_slice(pixels),
        ImageLayout::ShaderRead,
    )?;

    let environment_mips = mip_count(config.environment_size);
    let specular_mips = mip_count(config.specular_size);
    let maps = IblMaps::<D> {
        environment: device.create_image(&map_info(
            "ibl environment",
            config.environment_size,
            environment_mips,
            ImageKind::Cube,
        ))?,
        irradiance: device.create_image(&map_info(
            "ibl irradiance",
            config.irradiance_size,
            1,
            ImageKind::Cube,
        ))?,
        specular: device.create_image(&map_info(
            "ibl specular",
            config.specular_size,
            specular_mips,
            ImageKind::Cube,
        ))?,
        brdf_lut: device.create_image(&map_info(
            "ibl brdf lut",
            config.brdf_size,
            1,
            ImageKind::D2,
        ))?,
    };
    let pipelines = Pipelines::new(device)?;
    let sampler = SamplerInfo {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        max_lod: environment_mips as f32,
        ..Default::default()
    };

    let mut commands = CommandBuffer::<D>::new("ibl precompute");
    commands.barrier(
        [&maps.environment, &maps.irradiance, &maps.specular, &maps.brdf_lut]
            .into_iter()
            .map(|image| {
                ImageBarrier::<D>::new(image, ImageLayout::Undefined, ImageLayout::General)
            })
            .collect(),
    );

    let workgroup = device.workgroup_size(&pipelines.eq_to_cube);
    for mip in 0..environment_mips {
        let params = EqToCubeParams {
            face_size: (config.environment_size >> mip).max(1),
            _pad: [0; 3],
        };
        commands.dispatch(
            &pipelines.eq_to_cube,
            vec![
                Binding::SampledImage {
                    image: &equirect,
                    view: ViewKind::D2,
                },
                Binding::StorageImage {
                    image: &maps.environment,
                    mip,
                },
            ],
            bytemuck::bytes_of(&params).to_vec(),
            dispatch_groups(config.environment_size, mip, workgroup, 6),
        );
    }
    commands.barrier(vec![ImageBarrier::<D>::new(
        &maps.environment,
        ImageLayout::General,
        ImageLayout::ShaderRead,
    )]);

    let workgroup = device.workgroup_size(&pipelines.irradiance);
    let params = IrradianceParams {
        size: config.irradiance_size,
        // Convolve a level close to the output resolution to avoid aliasing.
        source_lod: environment_mips.saturating_sub(mip_count(config.irradiance_size)) as f32,
        sample_delta: config.irradiance_sample_delta.max(0.001),
        _pad: 0,
    };
    commands.dispatch(
        &pipelines.irradiance,
        vec![
            Binding::SampledImage {
                image: &maps.environment,
                view: ViewKind::Cube,
            },
            Binding::<D>::Sampler(sampler),
            Binding::StorageImage {
                image: &maps.irradiance,
                mip: 0,
            },
        ],
        bytemuck::bytes_of(&params).to_vec(),
        dispatch_groups(config.irradiance_size, 0, workgroup, 6),
    );

    let workgroup = device.workgroup_size(&pipelines.specular);
    for mip in 0..specular_mips {
        let roughness = if specular_mips > 1 {
            mip as f32 / (specular_mips - 1) as f32
        } else {
            0.0
        };
        let params = SpecularParams {
            roughness,
            size: (config.specular_size >> mip).max(1),
            sample_count: config.sample_count.max(1),
            environment_size: config.environment_size as f32,
        };
        log::trace!("specular mip {} roughness {}", mip, roughness);
        commands.dispatch(
            &pipelines.specular,
            vec![
                Binding::SampledImage {
                    image: &maps.environment,
                    view: ViewKind::Cube,
                },
                Binding::<D>::Sampler(sampler),
                Binding::StorageImage {
                    image: &maps.specular,
                    mip,
                },
            ],
            bytemuck::bytes_of(&params).to_vec(),
            dispatch_groups(config.specular_size, mip, workgroup, 6),
        );
    }
    commands.barrier(vec![
        ImageBarrier::<D>::new(
            &maps.irradiance,
            ImageLayout::General,
            ImageLayout::ShaderRead,
        ),
        ImageBarrier::<D>::new(&maps.specular, ImageLayout::General, ImageLayout::ShaderRead),
    ]);

    let workgroup = device.workgroup_size(&pipelines.brdf);
    let params = BrdfParams {
        size: config.brdf_size,
        sample_count: config.sample_count.max(1),
        _pad: [0; 2],
    };
    commands.dispatch(
        &pipelines.brdf,
        vec![Binding::StorageImage {
            image: &maps.brdf_lut,
            mip: 0,
        }],
        bytemuck::bytes_of(&params).to_vec(),
        dispatch_groups(config.brdf_size, 0, workgroup, 1),
    );
    commands.barrier(vec![ImageBarrier::<D>::new(
        &maps.brdf_lut,
        ImageLayout::General,
        ImageLayout::ShaderRead,
    )]);

    log::debug!("submitting {} IBL commands", commands.commands().len());
    device.submit_and_wait(QueueType::Compute, commands)?;
    device.wait_idle()?;
    drop(pipelines);
    drop(equirect);

    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_is_floor_log2_plus_one() {
        assert_eq!(mip_count(1024), 11);
        assert_eq!(mip_count(512), 10);
        assert_eq!(mip_count(64), 7);
        assert_eq!(mip_count(1), 1);
        assert_eq!(mip_count(1000), 10);
    }

    #[test]
    fn dispatch_groups_follow_mip_size() {
        for mip in 0..mip_count(1024) {
            let groups = dispatch_groups(1024, mip, WORKGROUP_SIZE, 6);
            let expected = ((1024u32 >> mip) / 8).max(1);
            assert_eq!(groups, [expected, expected, 6]);
        }
    }

    #[test]
    fn partial_workgroups_are_covered() {
        assert_eq!(dispatch_groups(12, 0, [8, 8, 1], 1), [2, 2, 1]);
    }

    #[test]
    fn param_blocks_are_uniform_sized() {
        for size in [
            std::mem::size_of::<EqToCubeParams>(),
            std::mem::size_of::<IrradianceParams>(),
            std::mem::size_of::<SpecularParams>(),
            std::mem::size_of::<BrdfParams>(),
        ] {
            assert_eq!(size, 16);
        }
    }
}
