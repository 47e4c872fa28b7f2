use cgmath::{InnerSpace, Matrix4, Quaternion, Vector3};
use gltf::{Semantic, accessor::DataType};

use crate::{
    data_structures::{
        bounding_box::{component_max, component_min},
        mesh::{Mesh, Primitive, Vertex},
        scene_graph::{Node, NodeId, SceneGraph},
    },
    device::{BufferInfo, CommandBuffer, GpuDevice, GpuError, MemoryUsage, QueueType},
    resources::ImportError,
};

/// Totals gathered by the sizing pre-pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometrySizes {
    pub mesh_nodes: usize,
    pub vertices: usize,
    pub indices: usize,
}

fn check_components(primitive: &gltf::Primitive<'_>, mesh: usize) -> Result<(), ImportError> {
    if let Some(indices) = primitive.indices() {
        let component = indices.data_type();
        if !matches!(component, DataType::U8 | DataType::U16 | DataType::U32) {
            return Err(ImportError::UnsupportedIndexComponent { mesh, component });
        }
    }
    if let Some(joints) = primitive.get(&Semantic::Joints(0)) {
        let component = joints.data_type();
        if !matches!(component, DataType::U8 | DataType::U16) {
            return Err(ImportError::UnsupportedJointComponent { mesh, component });
        }
    }
    Ok(())
}

/// Sums vertex and index counts over the scene's node tree and counts the
/// mesh-bearing nodes that will need a uniform slot.
///
/// Fails on a hierarchy cycle or on an unsupported component type, so node
/// construction can assume neither occurs.
pub fn count_geometry(scene: &gltf::Scene<'_>) -> Result<GeometrySizes, ImportError> {
    let mut sizes = GeometrySizes::default();
    // (node, leaving) pairs; `leaving` pops the node off the ancestor path.
    let mut stack: Vec<(gltf::Node<'_>, bool)> = scene.nodes().map(|n| (n, false)).collect();
    stack.reverse();
    let mut path: Vec<usize> = Vec::new();
    while let Some((node, leaving)) = stack.pop() {
        if leaving {
            path.pop();
            continue;
        }
        if path.contains(&node.index()) {
            return Err(ImportError::CyclicHierarchy { node: node.index() });
        }
        if let Some(mesh) = node.mesh() {
            sizes.mesh_nodes += 1;
            for primitive in mesh.primitives() {
                check_components(&primitive, mesh.index())?;
                if let Some(positions) = primitive.get(&Semantic::Positions) {
                    sizes.vertices += positions.count();
                }
                if let Some(indices) = primitive.indices() {
                    sizes.indices += indices.count();
                }
            }
        }
        path.push(node.index());
        let children: Vec<_> = node.children().collect();
        stack.push((node, true));
        stack.extend(children.into_iter().rev().map(|child| (child, false)));
    }
    Ok(sizes)
}

/// Local transform of a document node.
fn apply_transform(target: &mut Node, node: &gltf::Node<'_>) {
    match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => {
            target.matrix = Matrix4::from(matrix);
        }
        gltf::scene::Transform::Decomposed {
            translation,
            rotation: [x, y, z, w],
            scale,
        } => {
            target.translation = Vector3::from(translation);
            target.rotation = Quaternion::new(w, x, y, z);
            target.scale = Vector3::from(scale);
        }
    }
}

/// Builds the node arena while appending geometry into host arrays that were
/// sized by [`count_geometry`].
pub struct GeometryBuilder<'a> {
    buffers: &'a [gltf::buffer::Data],
    default_material: usize,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    next_slot: usize,
    capacity: usize,
}

impl<'a> GeometryBuilder<'a> {
    pub fn with_capacity(
        sizes: &GeometrySizes,
        buffers: &'a [gltf::buffer::Data],
        default_material: usize,
    ) -> Self {
        Self {
            buffers,
            default_material,
            vertices: Vec::with_capacity(sizes.vertices),
            indices: Vec::with_capacity(sizes.indices),
            next_slot: 0,
            capacity: sizes.mesh_nodes,
        }
    }

    /// Creates `node` and its subtree under `parent`. Root nodes get the
    /// global `scale` folded into their own.
    pub fn load_node(
        &mut self,
        graph: &mut SceneGraph,
        node: &gltf::Node<'_>,
        parent: Option<NodeId>,
        scale: f32,
    ) -> Result<NodeId, ImportError> {
        let mut new_node = Node::new(node.index(), parent);
        new_node.name = node.name().map(str::to_string);
        apply_transform(&mut new_node, node);
        if parent.is_none() {
            new_node.scale *= scale;
        }
        new_node.skin = node.skin().map(|skin| skin.index());

        if let Some(mesh) = node.mesh() {
            if self.next_slot >= self.capacity {
                return Err(ImportError::MeshSlotOverflow {
                    capacity: self.capacity,
                });
            }
            let mut new_mesh = Mesh::new(mesh.name().map(str::to_string), self.next_slot);
            self.next_slot += 1;
            for primitive in mesh.primitives() {
                if let Some(primitive) = self.load_primitive(&primitive, mesh.index())? {
                    new_mesh.primitives.push(primitive);
                }
            }
            new_mesh.compute_bounding_box();
            new_node.mesh = Some(new_mesh);
        }

        let id = graph.add_node(new_node);
        for child in node.children() {
            self.load_node(graph, &child, Some(id), scale)?;
        }
        Ok(id)
    }

    fn load_primitive(
        &mut self,
        primitive: &gltf::Primitive<'_>,
        mesh: usize,
    ) -> Result<Option<Primitive>, ImportError> {
        check_components(primitive, mesh)?;
        let buffers = self.buffers;
        let reader =
            primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

        let Some(positions) = reader.read_positions() else {
            log::warn!("mesh {}: primitive without POSITION skipped", mesh);
            return Ok(None);
        };
        let first_vertex = self.vertices.len();
        let first_index = self.indices.len() as u32;

        let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
        for pos in positions {
            let p = Vector3::from(pos);
            min = component_min(min, p);
            max = component_max(max, p);
            self.vertices.push(Vertex {
                pos,
                color: [1.0; 4],
                weight0: [1.0, 0.0, 0.0, 0.0],
                ..Default::default()
            });
        }
        let vertices = &mut self.vertices[first_vertex..];

        if let Some(normals) = reader.read_normals() {
            for (v, n) in vertices.iter_mut().zip(normals) {
                let n = Vector3::from(n);
                v.normal = if n.magnitude2() > 0.0 { n.normalize().into() } else { n.into() };
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (v, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
                v.uv0 = uv;
            }
        }
        if let Some(uvs) = reader.read_tex_coords(1) {
            for (v, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
                v.uv1 = uv;
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (v, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
                v.color = color;
            }
        }
        if let Some(joints) = reader.read_joints(0) {
            for (v, joint) in vertices.iter_mut().zip(joints.into_u16()) {
                v.joint0 = joint.map(f32::from);
            }
        }
        if let Some(weights) = reader.read_weights(0) {
            for (v, weight) in vertices.iter_mut().zip(weights.into_f32()) {
                // All-zero weights would collapse the skinned vertex.
                v.weight0 = if weight.iter().all(|w| *w == 0.0) {
                    [1.0, 0.0, 0.0, 0.0]
                } else {
                    weight
                };
            }
        }
        let vertex_count = vertices.len() as u32;

        if let Some(indices) = reader.read_indices() {
            let base = first_vertex as u32;
            self.indices.extend(indices.into_u32().map(|i| i + base));
        }
        let index_count = self.indices.len() as u32 - first_index;

        let material = primitive.material().index().unwrap_or(self.default_material);
        let mut new_primitive = Primitive::new(
            first_index,
            index_count,
            first_vertex as u32,
            vertex_count,
            material,
        );
        if vertex_count > 0 {
            new_primitive.set_bounding_box(min, max);
        }
        Ok(Some(new_primitive))
    }

    pub fn finish(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

/// Copies vertices and indices into device-local buffers with one submission.
pub fn upload_geometry<D: GpuDevice>(
    device: &D,
    vertices: &[Vertex],
    indices: &[u32],
) -> Result<(D::Buffer, Option<D::Buffer>), GpuError> {
    let staged = |label: &str, bytes: &[u8], usage: wgpu::BufferUsages| {
        let size = bytes.len() as u64;
        let staging = device.create_buffer(&BufferInfo {
            label: format!("{label} staging"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            memory: MemoryUsage::CpuToGpu,
        })?;
        device.write_buffer(&staging, 0, bytes)?;
        let buffer = device.create_buffer(&BufferInfo {
            label: label.to_string(),
            size,
            usage: usage | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            memory: MemoryUsage::GpuOnly,
        })?;
        Ok::<_, GpuError>((staging, buffer, size))
    };

    let (vertex_staging, vertex_buffer, vertex_size) = staged(
        "vertices",
        bytemuck::cast_slice(vertices),
        wgpu::BufferUsages::VERTEX,
    )?;
    let index = if indices.is_empty() {
        None
    } else {
        Some(staged(
            "indices",
            bytemuck::cast_slice(indices),
            wgpu::BufferUsages::INDEX,
        )?)
    };

    let mut commands = CommandBuffer::<D>::new("geometry upload");
    commands.copy_buffer(&vertex_staging, &vertex_buffer, vertex_size);
    if let Some((staging, buffer, size)) = &index {
        commands.copy_buffer(staging, buffer, *size);
    }
    device.submit_and_wait(QueueType::Transfer, commands)?;

    Ok((vertex_buffer, index.map(|(_, buffer, _)| buffer)))
}
