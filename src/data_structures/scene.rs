//! A loaded glTF scene: the node arena plus every resource the renderer binds.

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{
        animation::{Animation, AnimationPlayer},
        bounding_box::BoundingBox,
        material::{AlphaMode, Material, MaterialRecord},
        scene_graph::{Node, NodeId, SceneGraph},
        texture::{Texture, TextureSampler},
    },
    device::{GpuDevice, GpuError},
};

/// One primitive to draw, in the order the render pass consumes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub node: NodeId,
    /// Slot in the mesh uniform buffer to bind for this draw.
    pub mesh_slot: usize,
    pub material: u32,
    pub first_index: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub double_sided: bool,
}

pub struct Scene<D: GpuDevice> {
    // GPU resources first so they are released before the host-side tree.
    pub vertex_buffer: D::Buffer,
    /// `None` when no primitive is indexed.
    pub index_buffer: Option<D::Buffer>,
    /// Host-visible, one [`crate::data_structures::mesh::MeshUniform`] per mesh slot.
    pub mesh_buffer: D::Buffer,
    pub textures: Vec<Texture<D>>,

    pub graph: SceneGraph,
    pub samplers: Vec<TextureSampler>,
    /// Document materials followed by the synthetic default material.
    pub materials: Vec<Material>,
    pub animations: Vec<Animation>,
    pub extensions: Vec<String>,
    pub vertex_count: u32,
    pub index_count: u32,
    /// Union of every node's bounding volume.
    pub dimensions: BoundingBox,
    /// Maps the unit cube onto [`Scene::dimensions`].
    pub aabb: Matrix4<f32>,
}

impl<D: GpuDevice> std::fmt::Debug for Scene<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.graph.nodes.len())
            .field("materials", &self.materials.len())
            .field("textures", &self.textures)
            .field("animations", &self.animations.len())
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl<D: GpuDevice> Scene<D> {
    /// Every node in creation order.
    pub fn linear_nodes(&self) -> &[Node] {
        &self.graph.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.graph.roots
    }

    pub fn node_from_index(&self, index: usize) -> Option<NodeId> {
        self.graph.node_from_index(index)
    }

    pub fn get_matrix(&self, node: NodeId) -> Matrix4<f32> {
        self.graph.get_matrix(node)
    }

    /// Re-evaluates the subtree of `node` after its local transform changed.
    pub fn update(&mut self, node: NodeId) {
        self.graph.update(node);
    }

    /// Evaluates animation `index` at `time` and, if any channel applied,
    /// refreshes the whole graph. Returns whether anything changed.
    pub fn update_animation(&mut self, index: usize, time: f32) -> bool {
        let Some(animation) = self.animations.get(index) else {
            log::warn!("no animation with index {}", index);
            return false;
        };
        let updated = animation.apply(&mut self.graph.nodes, time);
        if updated {
            self.graph.update_all();
        }
        updated
    }

    /// Flushes the host copy of the mesh uniforms if any node update touched it.
    pub fn write_to_buffer(&mut self, device: &D) -> Result<(), GpuError> {
        if !self.graph.take_dirty() {
            return Ok(());
        }
        device.write_buffer(
            &self.mesh_buffer,
            0,
            bytemuck::cast_slice(&self.graph.mesh_uniforms),
        )
    }

    /// Recomputes node volumes, [`Scene::dimensions`] and [`Scene::aabb`].
    pub fn calculate_dimensions(&mut self) {
        self.dimensions = self.graph.calculate_bounding_boxes();
        self.aabb = if self.dimensions.valid {
            let extent = self.dimensions.extent();
            Matrix4::from_translation(self.dimensions.min)
                * Matrix4::from_nonuniform_scale(extent.x, extent.y, extent.z)
        } else {
            Matrix4::identity()
        };
    }

    /// Primitives whose material uses `alpha_mode`, depth-first from each root.
    pub fn draw_calls(&self, alpha_mode: AlphaMode) -> Vec<DrawCall> {
        let mut calls = Vec::new();
        let mut stack: Vec<NodeId> = self.graph.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = self.graph.node(id);
            if let Some(mesh) = &node.mesh {
                for primitive in &mesh.primitives {
                    let Some(material) = self.materials.get(primitive.material) else {
                        continue;
                    };
                    if material.alpha_mode != alpha_mode {
                        continue;
                    }
                    calls.push(DrawCall {
                        node: id,
                        mesh_slot: mesh.uniform_slot,
                        material: material.index,
                        first_index: primitive.first_index,
                        index_count: primitive.index_count,
                        first_vertex: primitive.first_vertex,
                        vertex_count: primitive.vertex_count,
                        double_sided: material.double_sided,
                    });
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        calls
    }

    /// Packs every material for the material storage buffer, indexed by
    /// [`Material::index`].
    pub fn material_records(&self) -> Vec<MaterialRecord> {
        self.materials.iter().map(Material::to_record).collect()
    }
}

impl AnimationPlayer {
    /// Steps the timer, wrapping past the animation's end, and evaluates the
    /// animation on `scene`.
    pub fn advance<D: GpuDevice>(&mut self, scene: &mut Scene<D>, dt: f32) -> bool {
        match self.step(&scene.animations, dt) {
            Some(time) => scene.update_animation(self.index, time),
            None => false,
        }
    }
}
