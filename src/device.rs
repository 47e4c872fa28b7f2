//! The GPU capability the scene importer and the IBL pipeline are written against.
//!
//! Nothing in the core creates devices, swapchains or frames. It asks a
//! [`GpuDevice`] for buffers, images and compute pipelines, records copies,
//! barriers and dispatches into a [`CommandBuffer`] and hands that buffer back
//! for a blocking submission. [`crate::context::Context`] implements the trait
//! on top of wgpu; tests implement it with a recorder.
//!
//! Descriptor vocabulary (formats, usages, filters, address modes) reuses
//! wgpu's plain-data types so backends don't need a translation table.

use thiserror::Error;

/// Errors reported by a device backend. Any of these aborts the whole load.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create buffer {label:?}: {reason}")]
    BufferCreation { label: String, reason: String },
    #[error("failed to create image {label:?}: {reason}")]
    ImageCreation { label: String, reason: String },
    #[error("failed to create compute pipeline {label:?}: {reason}")]
    PipelineCreation { label: String, reason: String },
    #[error("queue submission failed: {0}")]
    Submission(String),
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
}

/// Where a buffer's memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Device-local, only reachable through copies.
    GpuOnly,
    /// Host-visible, written from the CPU with [`GpuDevice::write_buffer`].
    CpuToGpu,
}

#[derive(Clone, Debug)]
pub struct BufferInfo {
    pub label: String,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    pub memory: MemoryUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    D2,
    /// Six array layers addressed as cube faces.
    Cube,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub kind: ImageKind,
}

impl ImageInfo {
    /// Size in texels of one side of mip `level`, never smaller than one.
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// Access to the creation info of a backend image.
pub trait GpuImage {
    fn info(&self) -> &ImageInfo;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerInfo {
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub max_lod: f32,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            max_lod: 16.0,
        }
    }
}

/// How a sampled image is viewed by a shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    D2,
    Cube,
}

/// One entry of a compute pipeline's resource layout, in binding order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BindingType {
    Sampler,
    SampledImage { view: ViewKind, filterable: bool },
    /// Write-only storage image. Cube images are bound as 2D arrays.
    StorageImage { format: wgpu::TextureFormat, kind: ImageKind },
}

#[derive(Clone, Debug)]
pub struct ComputePipelineInfo<'a> {
    pub label: &'a str,
    /// WGSL source.
    pub source: &'a str,
    pub entry_point: &'a str,
    /// The `@workgroup_size` declared by `entry_point`.
    pub workgroup_size: [u32; 3],
    pub layout: &'a [BindingType],
    /// Size in bytes of the per-dispatch parameter block, 0 when unused.
    /// Backends bind it right after the declared layout.
    pub params_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueType {
    Compute,
    Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    General,
    ShaderRead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    Transfer,
    ComputeShader,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Alignment of a row of texels in a buffer-to-image copy.
    pub image_row_alignment: u64,
    /// Alignment of the whole staging region of a buffer-to-image copy.
    pub image_alignment: u64,
}

pub struct ImageBarrier<'a, D: GpuDevice + ?Sized> {
    pub image: &'a D::Image,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
}

impl<'a, D: GpuDevice + ?Sized> ImageBarrier<'a, D> {
    pub fn new(image: &'a D::Image, old_layout: ImageLayout, new_layout: ImageLayout) -> Self {
        let src_stage = match old_layout {
            ImageLayout::Undefined => PipelineStage::TopOfPipe,
            ImageLayout::TransferDst => PipelineStage::Transfer,
            ImageLayout::General | ImageLayout::ShaderRead => PipelineStage::ComputeShader,
        };
        let dst_stage = match new_layout {
            ImageLayout::TransferDst => PipelineStage::Transfer,
            _ => PipelineStage::ComputeShader,
        };
        Self {
            image,
            old_layout,
            new_layout,
            src_stage,
            dst_stage,
        }
    }
}

pub enum Binding<'a, D: GpuDevice + ?Sized> {
    Sampler(SamplerInfo),
    SampledImage { image: &'a D::Image, view: ViewKind },
    StorageImage { image: &'a D::Image, mip: u32 },
}

pub enum Command<'a, D: GpuDevice + ?Sized> {
    CopyBuffer {
        src: &'a D::Buffer,
        dst: &'a D::Buffer,
        size: u64,
    },
    CopyBufferToImage {
        src: &'a D::Buffer,
        dst: &'a D::Image,
        /// Padded row pitch in bytes.
        bytes_per_row: u32,
        width: u32,
        height: u32,
    },
    Barrier(Vec<ImageBarrier<'a, D>>),
    Dispatch {
        pipeline: &'a D::Pipeline,
        bindings: Vec<Binding<'a, D>>,
        params: Vec<u8>,
        groups: [u32; 3],
    },
}

/// An ordered list of commands for one submission.
///
/// The order of recorded commands is the only thing that orders work: every
/// producer/consumer pair needs an explicit [`CommandBuffer::barrier`].
pub struct CommandBuffer<'a, D: GpuDevice + ?Sized> {
    label: String,
    commands: Vec<Command<'a, D>>,
}

impl<'a, D: GpuDevice + ?Sized> CommandBuffer<'a, D> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[Command<'a, D>] {
        &self.commands
    }

    pub fn copy_buffer(&mut self, src: &'a D::Buffer, dst: &'a D::Buffer, size: u64) {
        self.commands.push(Command::CopyBuffer { src, dst, size });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: &'a D::Buffer,
        dst: &'a D::Image,
        bytes_per_row: u32,
        width: u32,
        height: u32,
    ) {
        self.commands.push(Command::CopyBufferToImage {
            src,
            dst,
            bytes_per_row,
            width,
            height,
        });
    }

    pub fn barrier(&mut self, barriers: Vec<ImageBarrier<'a, D>>) {
        if !barriers.is_empty() {
            self.commands.push(Command::Barrier(barriers));
        }
    }

    pub fn dispatch(
        &mut self,
        pipeline: &'a D::Pipeline,
        bindings: Vec<Binding<'a, D>>,
        params: Vec<u8>,
        groups: [u32; 3],
    ) {
        self.commands.push(Command::Dispatch {
            pipeline,
            bindings,
            params,
            groups,
        });
    }
}

/// The device capability consumed by the core.
pub trait GpuDevice {
    type Buffer;
    type Image: GpuImage;
    type Pipeline;

    fn properties(&self) -> DeviceProperties;

    fn create_buffer(&self, info: &BufferInfo) -> Result<Self::Buffer, GpuError>;

    /// Writes `data` into a host-visible buffer at `offset`.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn create_image(&self, info: &ImageInfo) -> Result<Self::Image, GpuError>;

    fn create_compute_pipeline(
        &self,
        info: &ComputePipelineInfo<'_>,
    ) -> Result<Self::Pipeline, GpuError>;

    fn workgroup_size(&self, pipeline: &Self::Pipeline) -> [u32; 3];

    /// Submits `commands` and blocks until `queue` is idle.
    fn submit_and_wait(
        &self,
        queue: QueueType,
        commands: CommandBuffer<'_, Self>,
    ) -> Result<(), GpuError>;

    fn wait_idle(&self) -> Result<(), GpuError>;
}

/// Rounds `value` up to a multiple of `alignment` (which must be non-zero).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Copies tightly packed rows into a buffer whose rows are `aligned_row` bytes apart.
pub fn pad_rows(data: &[u8], row_size: usize, aligned_row: usize, rows: usize) -> Vec<u8> {
    if row_size == aligned_row {
        return data[..row_size * rows].to_vec();
    }
    let mut padded = vec![0u8; aligned_row * rows];
    for (src, dst) in data
        .chunks_exact(row_size)
        .take(rows)
        .zip(padded.chunks_exact_mut(aligned_row))
    {
        dst[..row_size].copy_from_slice(src);
    }
    padded
}
