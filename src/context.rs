//! wgpu implementation of [`GpuDevice`].
//!
//! wgpu tracks resource states itself, so recorded barriers are only logged
//! and every dispatch gets its own compute pass. All queue types map onto the
//! one wgpu queue.

use std::{borrow::Cow, num::NonZeroU64};

use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::device::{
    Binding, BindingType, BufferInfo, Command, CommandBuffer, ComputePipelineInfo,
    DeviceProperties, GpuDevice, GpuError, GpuImage, ImageInfo, ImageKind, MemoryUsage,
    QueueType, SamplerInfo, ViewKind,
};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

#[derive(Debug)]
pub struct Image {
    pub texture: wgpu::Texture,
    info: ImageInfo,
}

impl GpuImage for Image {
    fn info(&self) -> &ImageInfo {
        &self.info
    }
}

impl Image {
    fn sampled_view(&self, view: ViewKind) -> wgpu::TextureView {
        let (dimension, layers) = match view {
            ViewKind::D2 => (wgpu::TextureViewDimension::D2, 1),
            ViewKind::Cube => (wgpu::TextureViewDimension::Cube, 6),
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.info.label),
            dimension: Some(dimension),
            array_layer_count: Some(layers),
            ..Default::default()
        })
    }

    /// Single-mip view for storage writes. Cubes are viewed as 2D arrays.
    fn storage_view(&self, mip: u32) -> wgpu::TextureView {
        let (dimension, layers) = match self.info.kind {
            ImageKind::D2 => (wgpu::TextureViewDimension::D2, 1),
            ImageKind::Cube => (wgpu::TextureViewDimension::D2Array, 6),
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.info.label),
            dimension: Some(dimension),
            base_mip_level: mip,
            mip_level_count: Some(1),
            array_layer_count: Some(layers),
            ..Default::default()
        })
    }
}

#[derive(Debug)]
pub struct ComputePipeline {
    pub pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: Vec<BindingType>,
    workgroup_size: [u32; 3],
    params_size: u32,
}

impl Context {
    /// Opens the default adapter without a surface.
    pub async fn headless() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("using adapter {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gltf-ibl device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;
        Ok(Self { device, queue })
    }

    pub fn headless_blocking() -> Result<Self, ContextError> {
        futures::executor::block_on(Self::headless())
    }

    fn pop_error(&self) -> Option<wgpu::Error> {
        futures::executor::block_on(self.device.pop_error_scope())
    }

    fn create_sampler(&self, info: &SamplerInfo) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: None,
            address_mode_u: info.address_mode_u,
            address_mode_v: info.address_mode_v,
            address_mode_w: info.address_mode_w,
            mag_filter: info.mag_filter,
            min_filter: info.min_filter,
            mipmap_filter: info.mipmap_filter,
            lod_min_clamp: 0.0,
            lod_max_clamp: info.max_lod,
            ..Default::default()
        })
    }

    fn bind_group(
        &self,
        pipeline: &ComputePipeline,
        bindings: &[Binding<'_, Self>],
        params: &[u8],
    ) -> Result<wgpu::BindGroup, GpuError> {
        if bindings.len() != pipeline.layout.len() {
            return Err(GpuError::InvalidUsage(format!(
                "pipeline expects {} bindings, got {}",
                pipeline.layout.len(),
                bindings.len()
            )));
        }
        if params.len() != pipeline.params_size as usize {
            return Err(GpuError::InvalidUsage(format!(
                "pipeline expects {} parameter bytes, got {}",
                pipeline.params_size,
                params.len()
            )));
        }

        enum Resource {
            Sampler(wgpu::Sampler),
            View(wgpu::TextureView),
        }
        let resources: Vec<Resource> = bindings
            .iter()
            .map(|binding| match binding {
                Binding::Sampler(info) => Resource::Sampler(self.create_sampler(info)),
                Binding::SampledImage { image, view } => Resource::View(image.sampled_view(*view)),
                Binding::StorageImage { image, mip } => Resource::View(image.storage_view(*mip)),
            })
            .collect();
        let params_buffer = (!params.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("dispatch params"),
                    contents: params,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: match resource {
                    Resource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                    Resource::View(view) => wgpu::BindingResource::TextureView(view),
                },
            })
            .collect();
        if let Some(buffer) = &params_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: resources.len() as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        }))
    }
}

fn layout_entry(binding: u32, ty: &BindingType) -> wgpu::BindGroupLayoutEntry {
    let ty = match *ty {
        BindingType::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        BindingType::SampledImage { view, filterable } => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: match view {
                ViewKind::D2 => wgpu::TextureViewDimension::D2,
                ViewKind::Cube => wgpu::TextureViewDimension::Cube,
            },
            multisampled: false,
        },
        BindingType::StorageImage { format, kind } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: match kind {
                ImageKind::D2 => wgpu::TextureViewDimension::D2,
                ImageKind::Cube => wgpu::TextureViewDimension::D2Array,
            },
        },
    };
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty,
        count: None,
    }
}

impl GpuDevice for Context {
    type Buffer = wgpu::Buffer;
    type Image = Image;
    type Pipeline = ComputePipeline;

    fn properties(&self) -> DeviceProperties {
        DeviceProperties {
            image_row_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            image_alignment: wgpu::COPY_BUFFER_ALIGNMENT,
        }
    }

    fn create_buffer(&self, info: &BufferInfo) -> Result<Self::Buffer, GpuError> {
        let usage = match info.memory {
            MemoryUsage::GpuOnly => info.usage,
            MemoryUsage::CpuToGpu => info.usage | wgpu::BufferUsages::COPY_DST,
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&info.label),
            size: info.size,
            usage,
            mapped_at_creation: false,
        });
        match self.pop_error() {
            Some(error) => Err(GpuError::BufferCreation {
                label: info.label.clone(),
                reason: error.to_string(),
            }),
            None => Ok(buffer),
        }
    }

    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GpuError::InvalidUsage(format!(
                "write of {} bytes is not {}-byte aligned",
                data.len(),
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }
        if offset + data.len() as u64 > buffer.size() {
            return Err(GpuError::InvalidUsage(format!(
                "write of {} bytes at {} overruns a {}-byte buffer",
                data.len(),
                offset,
                buffer.size()
            )));
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_image(&self, info: &ImageInfo) -> Result<Self::Image, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&info.label),
            size: wgpu::Extent3d {
                width: info.width,
                height: info.height,
                depth_or_array_layers: info.layers,
            },
            mip_level_count: info.levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: info.format,
            usage: info.usage,
            view_formats: &[],
        });
        match self.pop_error() {
            Some(error) => Err(GpuError::ImageCreation {
                label: info.label.clone(),
                reason: error.to_string(),
            }),
            None => Ok(Image {
                texture,
                info: info.clone(),
            }),
        }
    }

    fn create_compute_pipeline(
        &self,
        info: &ComputePipelineInfo<'_>,
    ) -> Result<Self::Pipeline, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(info.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(info.source)),
        });
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = info
            .layout
            .iter()
            .enumerate()
            .map(|(binding, ty)| layout_entry(binding as u32, ty))
            .collect();
        if info.params_size > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: info.layout.len() as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(info.params_size as u64),
                },
                count: None,
            });
        }
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(info.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(info.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(info.label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(info.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(error) = self.pop_error() {
            return Err(GpuError::PipelineCreation {
                label: info.label.to_string(),
                reason: error.to_string(),
            });
        }
        log::debug!("created compute pipeline {:?}", info.label);
        Ok(ComputePipeline {
            pipeline,
            bind_group_layout,
            layout: info.layout.to_vec(),
            workgroup_size: info.workgroup_size,
            params_size: info.params_size,
        })
    }

    fn workgroup_size(&self, pipeline: &Self::Pipeline) -> [u32; 3] {
        pipeline.workgroup_size
    }

    fn submit_and_wait(
        &self,
        queue: QueueType,
        commands: CommandBuffer<'_, Self>,
    ) -> Result<(), GpuError> {
        log::trace!("submitting {:?} on the {:?} queue", commands.label(), queue);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoder = match self.encode(&commands) {
            Ok(encoder) => encoder,
            Err(error) => {
                self.pop_error();
                return Err(error);
            }
        };
        self.queue.submit(Some(encoder.finish()));
        self.wait_idle()?;
        match self.pop_error() {
            Some(error) => Err(GpuError::Submission(error.to_string())),
            None => Ok(()),
        }
    }

    fn wait_idle(&self) -> Result<(), GpuError> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|error| GpuError::Submission(error.to_string()))
    }
}

impl Context {
    fn encode(&self, commands: &CommandBuffer<'_, Self>) -> Result<wgpu::CommandEncoder, GpuError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(commands.label()),
            });

        for command in commands.commands() {
            match command {
                Command::CopyBuffer { src, dst, size } => {
                    encoder.copy_buffer_to_buffer(src, 0, dst, 0, *size);
                }
                Command::CopyBufferToImage {
                    src,
                    dst,
                    bytes_per_row,
                    width,
                    height,
                } => {
                    encoder.copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: src,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: 0,
                                bytes_per_row: Some(*bytes_per_row),
                                rows_per_image: Some(*height),
                            },
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: &dst.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: *width,
                            height: *height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                Command::Barrier(barriers) => {
                    for barrier in barriers {
                        log::trace!(
                            "barrier {:?}: {:?} -> {:?} ({:?} -> {:?})",
                            barrier.image.info.label,
                            barrier.old_layout,
                            barrier.new_layout,
                            barrier.src_stage,
                            barrier.dst_stage
                        );
                    }
                }
                Command::Dispatch {
                    pipeline,
                    bindings,
                    params,
                    groups,
                } => {
                    let bind_group = self.bind_group(pipeline, bindings, params)?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(commands.label()),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&pipeline.pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
                }
            }
        }

        Ok(encoder)
    }
}
