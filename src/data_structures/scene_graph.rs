//! Scene graph and hierarchical transforms.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. A node owns its children
//! by id and points back at its parent by id, so the tree can be walked in both
//! directions without shared ownership. Skins reference their joints by id as
//! well and never own them.

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector3};

use crate::data_structures::{
    bounding_box::BoundingBox,
    mesh::{MAX_NUM_JOINTS, Mesh, MeshUniform},
};

/// Stable index of a node in [`SceneGraph::nodes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Index of the node in the source document.
    pub index: usize,
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
    /// Explicit local matrix, applied after TRS.
    pub matrix: Matrix4<f32>,
    pub mesh: Option<Mesh>,
    /// Index into [`SceneGraph::skins`].
    pub skin: Option<usize>,
    /// World-space box of this node's own mesh.
    pub aabb: BoundingBox,
    /// World-space box of the whole subtree rooted here.
    pub bvh: BoundingBox,
}

impl Node {
    pub fn new(index: usize, parent: Option<NodeId>) -> Self {
        Self {
            index,
            name: None,
            parent,
            children: Vec::new(),
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            matrix: Matrix4::identity(),
            mesh: None,
            skin: None,
            aabb: BoundingBox::default(),
            bvh: BoundingBox::default(),
        }
    }

    pub fn local_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
            * self.matrix
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub name: Option<String>,
    pub skeleton_root: Option<NodeId>,
    pub joints: Vec<NodeId>,
    /// Parallel to `joints`, capped at [`MAX_NUM_JOINTS`].
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

/// The node arena plus everything node updates write to.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    /// Every node, in creation order. This is the flattened view.
    pub nodes: Vec<Node>,
    /// Nodes without a parent, in document order.
    pub roots: Vec<NodeId>,
    pub skins: Vec<Skin>,
    /// Host copy of the per-mesh uniform buffer, indexed by `Mesh::uniform_slot`.
    pub mesh_uniforms: Vec<MeshUniform>,
    uniforms_dirty: bool,
}

impl SceneGraph {
    /// Creates an empty graph with `mesh_slots` uniform slots already allocated.
    pub fn with_mesh_slots(mesh_slots: usize) -> Self {
        Self {
            mesh_uniforms: vec![MeshUniform::default(); mesh_slots],
            ..Default::default()
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Appends `node` and links it under its parent (or as a root).
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        match node.parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    /// Finds the node created from document node `index`.
    pub fn node_from_index(&self, index: usize) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.index == index)
            .map(NodeId)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Number of parent links between `id` and its root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.0].parent;
        }
        depth
    }

    /// World transform of `id`: every ancestor's local matrix, root first,
    /// followed by the node's own.
    pub fn get_matrix(&self, id: NodeId) -> Matrix4<f32> {
        let mut node = &self.nodes[id.0];
        let mut m = node.local_matrix();
        while let Some(parent) = node.parent {
            node = &self.nodes[parent.0];
            m = node.local_matrix() * m;
        }
        m
    }

    /// Recomputes the mesh uniforms of `id` and its whole subtree.
    ///
    /// Must run after any change to a local transform, including animation.
    pub fn update(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            self.update_mesh_uniform(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
    }

    /// Runs [`SceneGraph::update`] from every root.
    pub fn update_all(&mut self) {
        for root in self.roots.clone() {
            self.update(root);
        }
    }

    fn update_mesh_uniform(&mut self, id: NodeId) {
        let node = &self.nodes[id.0];
        let Some(mesh) = &node.mesh else {
            return;
        };
        let slot = mesh.uniform_slot;
        let m = self.get_matrix(id);

        let joints = node.skin.and_then(|skin| self.skins.get(skin)).map(|skin| {
            let inverse_transform = m.invert().unwrap_or_else(Matrix4::identity);
            skin.joints
                .iter()
                .take(MAX_NUM_JOINTS)
                .enumerate()
                .map(|(i, &joint)| {
                    let inverse_bind = skin
                        .inverse_bind_matrices
                        .get(i)
                        .copied()
                        .unwrap_or_else(Matrix4::identity);
                    inverse_transform * self.get_matrix(joint) * inverse_bind
                })
                .collect::<Vec<_>>()
        });

        let Some(uniform) = self.mesh_uniforms.get_mut(slot) else {
            log::error!("mesh on node {} has no uniform slot {}", id.0, slot);
            return;
        };
        uniform.matrix = m.into();
        if let Some(joints) = joints {
            for (dst, joint) in uniform.joint_matrix.iter_mut().zip(&joints) {
                *dst = (*joint).into();
            }
            uniform.joint_count = joints.len() as f32;
        }
        self.uniforms_dirty = true;
    }

    /// Recomputes `aabb` for every mesh node and aggregates `bvh` bottom-up.
    /// Returns the union of the roots' volumes.
    pub fn calculate_bounding_boxes(&mut self) -> BoundingBox {
        let mut scene = BoundingBox::default();
        for root in self.roots.clone() {
            let bvh = self.calculate_bounding_box(root);
            scene.merge(&bvh);
        }
        scene
    }

    fn calculate_bounding_box(&mut self, id: NodeId) -> BoundingBox {
        let world = self.get_matrix(id);
        let mut bvh = BoundingBox::default();
        let aabb = match &self.nodes[id.0].mesh {
            Some(mesh) if mesh.bb.valid => mesh.bb.get_aabb(&world),
            _ => BoundingBox::default(),
        };
        bvh.merge(&aabb);
        for child in self.nodes[id.0].children.clone() {
            let child_bvh = self.calculate_bounding_box(child);
            bvh.merge(&child_bvh);
        }
        let node = &mut self.nodes[id.0];
        node.aabb = aabb;
        node.bvh = bvh;
        bvh
    }

    /// Whether the host uniforms changed since the last [`SceneGraph::take_dirty`].
    pub fn is_dirty(&self) -> bool {
        self.uniforms_dirty
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.uniforms_dirty, false)
    }
}
