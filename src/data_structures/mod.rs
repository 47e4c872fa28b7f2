//! Scene data structures: the node arena, meshes, materials, textures and animations.
//!
//! - `scene_graph` holds the node arena, skins and the per-mesh uniform mirror
//! - `mesh` defines vertices, primitives and the GPU uniform layout per mesh
//! - `material` holds the two shading workflows and their packed GPU record
//! - `texture` wraps sampled images and the staging upload that creates them
//! - `animation` evaluates keyframe samplers into node transforms
//! - `bounding_box` is the axis-aligned volume used for node and scene bounds
//! - `scene` ties all of the above to the GPU buffers of one loaded document

pub mod animation;
pub mod bounding_box;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod scene_graph;
pub mod texture;
