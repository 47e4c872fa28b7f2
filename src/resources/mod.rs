//! Loading of glTF/GLB documents into a [`Scene`].
//!
//! The import runs in a fixed order: samplers, textures, materials, a sizing
//! pre-pass over the default scene, node construction, animations, skins and
//! finally one rest-pose update. Vertex and index data are uploaded once at
//! the end through staging buffers.

use std::path::{Path, PathBuf};

use cgmath::{Matrix4, SquareMatrix};
use thiserror::Error;

use crate::{
    data_structures::{mesh::MESH_UNIFORM_STRIDE, scene::Scene, scene_graph::SceneGraph},
    device::{BufferInfo, GpuDevice, GpuError, MemoryUsage},
};

pub mod animation;
pub mod material;
pub mod mesh;
pub mod texture;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid glTF document: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] gltf::json::Error),
    #[error("failed to decode images: {0}")]
    ImageDecode(#[source] gltf::Error),
    #[error("texture {texture} references missing image {image}")]
    MissingImage { texture: usize, image: usize },
    #[error("document has no scene")]
    NoScene,
    #[error("mesh {mesh}: unsupported index component type {component:?}")]
    UnsupportedIndexComponent {
        mesh: usize,
        component: gltf::accessor::DataType,
    },
    #[error("mesh {mesh}: unsupported joint component type {component:?}")]
    UnsupportedJointComponent {
        mesh: usize,
        component: gltf::accessor::DataType,
    },
    #[error("node {node} is its own ancestor")]
    CyclicHierarchy { node: usize },
    #[error("mesh uniform buffer has {capacity} slots but more meshes were found")]
    MeshSlotOverflow { capacity: usize },
    #[error("scene contains no vertices")]
    EmptyScene,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Options that apply to a whole import.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportOptions {
    /// Directory external buffers and images are resolved against.
    /// Defaults to the directory of the loaded file.
    pub base_path: Option<PathBuf>,
    /// Uniform scale applied to every root node.
    pub scale: f32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            base_path: None,
            scale: 1.0,
        }
    }
}

pub fn load_binary(path: &Path) -> Result<Vec<u8>, ImportError> {
    std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether `path` names a binary container, judged by its extension.
pub fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"))
}

/// Reads and imports the document at `path`.
pub fn load_scene<D: GpuDevice>(
    device: &D,
    path: impl AsRef<Path>,
    options: &ImportOptions,
) -> Result<Scene<D>, ImportError> {
    let path = path.as_ref();
    log::info!("loading scene {:?}", path);
    let data = load_binary(path)?;
    let mut options = options.clone();
    if options.base_path.is_none() {
        options.base_path = path.parent().map(Path::to_path_buf);
    }
    load_scene_from_slice(device, &data, is_binary(path), &options)
}

/// Parses a document without touching any external resource.
pub fn parse_document(
    data: &[u8],
    binary: bool,
) -> Result<(gltf::Document, Option<Vec<u8>>), ImportError> {
    if binary {
        let glb = gltf::Glb::from_slice(data)?;
        let root = gltf::json::Root::from_slice(&glb.json)?;
        let document = gltf::Document::from_json(root)?;
        Ok((document, glb.bin.map(|bin| bin.into_owned())))
    } else {
        let root = gltf::json::Root::from_slice(data)?;
        Ok((gltf::Document::from_json(root)?, None))
    }
}

/// Imports an in-memory document. `binary` selects GLB over JSON parsing.
pub fn load_scene_from_slice<D: GpuDevice>(
    device: &D,
    data: &[u8],
    binary: bool,
    options: &ImportOptions,
) -> Result<Scene<D>, ImportError> {
    let (document, blob) = parse_document(data, binary)?;
    let base = options.base_path.as_deref();
    let buffers = gltf::import_buffers(&document, base, blob)?;

    let samplers = texture::load_samplers(&document);
    let textures = texture::load_textures(device, &document, base, &buffers, &samplers)?;
    let materials = material::load_materials(&document);

    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ImportError::NoScene)?;

    let sizes = mesh::count_geometry(&gltf_scene)?;
    log::debug!(
        "scene {:?}: {} mesh nodes, {} vertices, {} indices",
        gltf_scene.name(),
        sizes.mesh_nodes,
        sizes.vertices,
        sizes.indices
    );
    if sizes.vertices == 0 {
        return Err(ImportError::EmptyScene);
    }

    let mesh_buffer = device.create_buffer(&BufferInfo {
        label: "mesh uniforms".to_string(),
        size: MESH_UNIFORM_STRIDE * sizes.mesh_nodes.max(1) as u64,
        usage: wgpu::BufferUsages::UNIFORM
            | wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST,
        memory: MemoryUsage::CpuToGpu,
    })?;

    let mut graph = SceneGraph::with_mesh_slots(sizes.mesh_nodes);
    let default_material = materials.len() - 1;
    let mut geometry = mesh::GeometryBuilder::with_capacity(&sizes, &buffers, default_material);
    for node in gltf_scene.nodes() {
        geometry.load_node(&mut graph, &node, None, options.scale)?;
    }
    let (vertices, indices) = geometry.finish();

    let animations = animation::load_animations(&document, &buffers, &graph);
    graph.skins = animation::load_skins(&document, &buffers, &graph);

    graph.update_all();

    let (vertex_buffer, index_buffer) = mesh::upload_geometry(device, &vertices, &indices)?;

    let mut scene = Scene {
        vertex_buffer,
        index_buffer,
        mesh_buffer,
        textures,
        graph,
        samplers,
        materials,
        animations,
        extensions: document
            .extensions_used()
            .map(|ext| ext.to_string())
            .collect(),
        vertex_count: vertices.len() as u32,
        index_count: indices.len() as u32,
        dimensions: Default::default(),
        aabb: Matrix4::identity(),
    };
    scene.calculate_dimensions();
    scene.write_to_buffer(device)?;

    log::info!(
        "loaded {} nodes, {} materials, {} textures, {} animations, {} skins",
        scene.graph.nodes.len(),
        scene.materials.len(),
        scene.textures.len(),
        scene.animations.len(),
        scene.graph.skins.len()
    );
    Ok(scene)
}
