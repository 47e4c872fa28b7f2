use std::cell::RefCell;

use gltf_ibl::device::{
    Binding, BindingType, BufferInfo, Command, CommandBuffer, ComputePipelineInfo,
    DeviceProperties, GpuDevice, GpuError, GpuImage, ImageInfo, ImageLayout, QueueType,
};

/// Owned description of one recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    CopyBuffer {
        src: String,
        dst: String,
        size: u64,
    },
    CopyBufferToImage {
        src: String,
        dst: String,
        bytes_per_row: u32,
        width: u32,
        height: u32,
    },
    Barrier(Vec<(String, ImageLayout, ImageLayout)>),
    Dispatch {
        pipeline: String,
        /// `(image, mip)` of every storage binding.
        storage: Vec<(String, u32)>,
        sampled: Vec<String>,
        params: Vec<u8>,
        groups: [u32; 3],
    },
}

#[derive(Clone, Debug)]
pub struct Submission {
    pub queue: QueueType,
    pub label: String,
    pub commands: Vec<Recorded>,
}

#[derive(Debug)]
pub struct RecBuffer {
    pub id: usize,
    pub info: BufferInfo,
}

#[derive(Debug)]
pub struct RecImage {
    pub id: usize,
    pub info: ImageInfo,
}

impl GpuImage for RecImage {
    fn info(&self) -> &ImageInfo {
        &self.info
    }
}

#[derive(Debug)]
pub struct RecPipeline {
    pub label: String,
    pub layout: Vec<BindingType>,
    pub workgroup_size: [u32; 3],
    pub params_size: u32,
}

#[derive(Debug, Default)]
struct Log {
    buffers: Vec<BufferInfo>,
    contents: Vec<Vec<u8>>,
    images: Vec<ImageInfo>,
    pipelines: Vec<String>,
    submissions: Vec<Submission>,
    wait_idle_calls: usize,
}

/// A [`GpuDevice`] that executes nothing but records everything. Buffer
/// writes and buffer-to-buffer copies are applied to host shadows so tests
/// can read uploaded data back.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    log: RefCell<Log>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(&self) -> Vec<BufferInfo> {
        self.log.borrow().buffers.clone()
    }

    pub fn images(&self) -> Vec<ImageInfo> {
        self.log.borrow().images.clone()
    }

    pub fn pipelines(&self) -> Vec<String> {
        self.log.borrow().pipelines.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.log.borrow().submissions.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.log.borrow().wait_idle_calls
    }

    /// Current contents of the last buffer created with `label`.
    pub fn buffer_contents(&self, label: &str) -> Option<Vec<u8>> {
        let log = self.log.borrow();
        let id = log.buffers.iter().rposition(|info| info.label == label)?;
        Some(log.contents[id].clone())
    }
}

fn record(command: &Command<'_, RecordingDevice>) -> Recorded {
    match command {
        Command::CopyBuffer { src, dst, size } => Recorded::CopyBuffer {
            src: src.info.label.clone(),
            dst: dst.info.label.clone(),
            size: *size,
        },
        Command::CopyBufferToImage {
            src,
            dst,
            bytes_per_row,
            width,
            height,
        } => Recorded::CopyBufferToImage {
            src: src.info.label.clone(),
            dst: dst.info.label.clone(),
            bytes_per_row: *bytes_per_row,
            width: *width,
            height: *height,
        },
        Command::Barrier(barriers) => Recorded::Barrier(
            barriers
                .iter()
                .map(|b| (b.image.info.label.clone(), b.old_layout, b.new_layout))
                .collect(),
        ),
        Command::Dispatch {
            pipeline,
            bindings,
            params,
            groups,
        } => Recorded::Dispatch {
            pipeline: pipeline.label.clone(),
            storage: bindings
                .iter()
                .filter_map(|binding| match binding {
                    Binding::StorageImage { image, mip } => Some((image.info.label.clone(), *mip)),
                    _ => None,
                })
                .collect(),
            sampled: bindings
                .iter()
                .filter_map(|binding| match binding {
                    Binding::SampledImage { image, .. } => Some(image.info.label.clone()),
                    _ => None,
                })
                .collect(),
            params: params.clone(),
            groups: *groups,
        },
    }
}

impl GpuDevice for RecordingDevice {
    type Buffer = RecBuffer;
    type Image = RecImage;
    type Pipeline = RecPipeline;

    fn properties(&self) -> DeviceProperties {
        DeviceProperties {
            image_row_alignment: 256,
            image_alignment: 4,
        }
    }

    fn create_buffer(&self, info: &BufferInfo) -> Result<Self::Buffer, GpuError> {
        let mut log = self.log.borrow_mut();
        log.buffers.push(info.clone());
        log.contents.push(vec![0; info.size as usize]);
        Ok(RecBuffer {
            id: log.buffers.len() - 1,
            info: info.clone(),
        })
    }

    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let mut log = self.log.borrow_mut();
        let contents = &mut log.contents[buffer.id];
        let start = offset as usize;
        let Some(dst) = contents.get_mut(start..start + data.len()) else {
            return Err(GpuError::InvalidUsage(format!(
                "write past the end of {:?}",
                buffer.info.label
            )));
        };
        dst.copy_from_slice(data);
        Ok(())
    }

    fn create_image(&self, info: &ImageInfo) -> Result<Self::Image, GpuError> {
        let mut log = self.log.borrow_mut();
        log.images.push(info.clone());
        Ok(RecImage {
            id: log.images.len() - 1,
            info: info.clone(),
        })
    }

    fn create_compute_pipeline(
        &self,
        info: &ComputePipelineInfo<'_>,
    ) -> Result<Self::Pipeline, GpuError> {
        self.log.borrow_mut().pipelines.push(info.label.to_string());
        Ok(RecPipeline {
            label: info.label.to_string(),
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
        let mut log = self.log.borrow_mut();
        for command in commands.commands() {
            match command {
                Command::CopyBuffer { src, dst, size } => {
                    let size = *size as usize;
                    let data = log.contents[src.id][..size].to_vec();
                    log.contents[dst.id][..size].copy_from_slice(&data);
                }
                Command::Dispatch {
                    pipeline,
                    bindings,
                    params,
                    ..
                } => {
                    if bindings.len() != pipeline.layout.len()
                        || params.len() != pipeline.params_size as usize
                    {
                        return Err(GpuError::InvalidUsage(format!(
                            "dispatch of {:?} does not match its layout",
                            pipeline.label
                        )));
                    }
                }
                _ => {}
            }
        }
        log.submissions.push(Submission {
            queue,
            label: commands.label().to_string(),
            commands: commands.commands().iter().map(record).collect(),
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GpuError> {
        self.log.borrow_mut().wait_idle_calls += 1;
        Ok(())
    }
}

/// Assembles GLB containers with one embedded binary buffer.
#[derive(Debug, Default)]
pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<String>,
    accessors: Vec<String>,
}

fn json_floats(values: &[f32]) -> String {
    let values: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", values.join(","))
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` as a new buffer view and returns its index.
    pub fn buffer_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.buffer_views.push(format!(
            r#"{{"buffer":0,"byteOffset":{},"byteLength":{}}}"#,
            self.bin.len(),
            bytes.len()
        ));
        self.bin.extend_from_slice(bytes);
        self.buffer_views.len() - 1
    }

    fn accessor(
        &mut self,
        view: usize,
        component: u32,
        count: usize,
        ty: &str,
        bounds: &str,
    ) -> usize {
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":{component},"count":{count},"type":"{ty}"{bounds}}}"#
        ));
        self.accessors.len() - 1
    }

    pub fn positions(&mut self, positions: &[[f32; 3]]) -> usize {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        let view = self.buffer_view(bytemuck::cast_slice(positions));
        let bounds = format!(r#","min":{},"max":{}"#, json_floats(&min), json_floats(&max));
        self.accessor(view, 5126, positions.len(), "VEC3", &bounds)
    }

    pub fn vec3(&mut self, values: &[[f32; 3]]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(values));
        self.accessor(view, 5126, values.len(), "VEC3", "")
    }

    /// Keyframe times, with the bounds animation inputs require.
    pub fn times(&mut self, times: &[f32]) -> usize {
        let min = times.iter().copied().fold(f32::MAX, f32::min);
        let max = times.iter().copied().fold(f32::MIN, f32::max);
        let view = self.buffer_view(bytemuck::cast_slice(times));
        let bounds = format!(r#","min":[{min:?}],"max":[{max:?}]"#);
        self.accessor(view, 5126, times.len(), "SCALAR", &bounds)
    }

    pub fn indices_u16(&mut self, indices: &[u16]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(indices));
        self.accessor(view, 5123, indices.len(), "SCALAR", "")
    }

    /// FLOAT scalars, which glTF does not allow as indices.
    pub fn indices_f32(&mut self, indices: &[f32]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(indices));
        self.accessor(view, 5126, indices.len(), "SCALAR", "")
    }

    pub fn joints_u32(&mut self, joints: &[[u32; 4]]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(joints));
        self.accessor(view, 5125, joints.len(), "VEC4", "")
    }

    /// Column-major 4x4 matrices.
    pub fn mat4(&mut self, matrices: &[[[f32; 4]; 4]]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(matrices));
        self.accessor(view, 5126, matrices.len(), "MAT4", "")
    }

    pub fn joints_u8(&mut self, joints: &[[u8; 4]]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(joints));
        self.accessor(view, 5121, joints.len(), "VEC4", "")
    }

    pub fn weights(&mut self, weights: &[[f32; 4]]) -> usize {
        let view = self.buffer_view(bytemuck::cast_slice(weights));
        self.accessor(view, 5126, weights.len(), "VEC4", "")
    }

    /// Wraps the buffer, views and accessors together with `members`, the
    /// remaining top-level JSON members, into a GLB container.
    pub fn build(mut self, members: &str) -> Vec<u8> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let mut json = format!(
            r#"{{"asset":{{"version":"2.0"}},"buffers":[{{"byteLength":{}}}],"bufferViews":[{}],"accessors":[{}],{}}}"#,
            self.bin.len(),
            self.buffer_views.join(","),
            self.accessors.join(","),
            members
        )
        .into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let total = 12 + 8 + json.len() + 8 + self.bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(self.bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&self.bin);
        glb
    }
}

/// One triangle in the XY plane.
pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// Encodes an RGB float image as Radiance HDR.
pub fn hdr_bytes(width: u32, height: u32, pixel: [f32; 3]) -> Vec<u8> {
    let image = image::Rgb32FImage::from_pixel(width, height, image::Rgb(pixel));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb32F(image)
        .write_to(&mut bytes, image::ImageFormat::Hdr)
        .expect("failed to encode HDR fixture");
    bytes.into_inner()
}

/// Encodes an RGB8 image as PNG.
pub fn png_bytes(pixels: &[[u8; 3]], width: u32, height: u32) -> Vec<u8> {
    let raw: Vec<u8> = pixels.iter().flatten().copied().collect();
    let image = image::RgbImage::from_raw(width, height, raw).expect("pixel count mismatch");
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("failed to encode PNG fixture");
    bytes.into_inner()
}
