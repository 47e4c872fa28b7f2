//! Meshes, primitives and the GPU layouts they feed.

use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;

use crate::data_structures::bounding_box::BoundingBox;

/// Upper bound on joint matrices per skinned mesh. Joints past this are ignored.
pub const MAX_NUM_JOINTS: usize = 128;

/// Interleaved vertex as stored in the consolidated vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub joint0: [f32; 4],
    pub weight0: [f32; 4],
    pub color: [f32; 4],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x2,
            4 => Float32x4,
            5 => Float32x4,
            6 => Float32x4
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Per-mesh block in the shared matrix buffer, one slot per mesh-bearing node.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshUniform {
    pub matrix: [[f32; 4]; 4],
    pub joint_matrix: [[[f32; 4]; 4]; MAX_NUM_JOINTS],
    pub joint_count: f32,
    pub _pad: [f32; 3],
}

impl Default for MeshUniform {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Byte stride between consecutive [`MeshUniform`] slots.
///
/// The stride is not a multiple of wgpu's 256-byte
/// `min_uniform_buffer_offset_alignment`, so the mesh buffer is bound as a
/// storage array indexed by slot rather than as a dynamic-offset uniform.
pub const MESH_UNIFORM_STRIDE: u64 = std::mem::size_of::<MeshUniform>() as u64;

/// A draw range into the consolidated index buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    /// Offset of the primitive's first vertex in the shared vertex buffer.
    pub first_vertex: u32,
    pub vertex_count: u32,
    /// Index into the scene's material list (the synthetic default is last).
    pub material: usize,
    pub bb: BoundingBox,
}

impl Primitive {
    pub fn new(
        first_index: u32,
        index_count: u32,
        first_vertex: u32,
        vertex_count: u32,
        material: usize,
    ) -> Self {
        Self {
            first_index,
            index_count,
            first_vertex,
            vertex_count,
            material,
            bb: BoundingBox::default(),
        }
    }

    pub fn set_bounding_box(&mut self, min: Vector3<f32>, max: Vector3<f32>) {
        self.bb = BoundingBox::new(min, max);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    /// Slot in the shared [`MeshUniform`] buffer, fixed at import.
    pub uniform_slot: usize,
    /// Union of the primitives' boxes in mesh space.
    pub bb: BoundingBox,
}

impl Mesh {
    pub fn new(name: Option<String>, uniform_slot: usize) -> Self {
        Self {
            name,
            primitives: Vec::new(),
            uniform_slot,
            bb: BoundingBox::default(),
        }
    }

    pub fn compute_bounding_box(&mut self) {
        let mut bb = BoundingBox::default();
        for primitive in &self.primitives {
            bb.merge(&primitive.bb);
        }
        self.bb = bb;
    }
}
