//! gltf-ibl
//!
//! Loads glTF 2.0 scenes into a GPU-ready runtime representation and
//! precomputes image-based-lighting maps from an equirectangular HDR image.
//! Rendering itself is left to the embedding application: this crate hands
//! out buffers, images, per-mesh uniforms and draw ranges.
//!
//! High-level modules
//! - `device`: the GPU capability everything else is written against
//! - `context`: wgpu-backed implementation of that capability
//! - `data_structures`: scene graph, meshes, materials, textures, animation
//! - `resources`: the glTF importer
//! - `pipelines`: the IBL compute pipeline
//!

pub mod context;
pub mod data_structures;
pub mod device;
pub mod pipelines;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use data_structures::animation::AnimationPlayer;
pub use data_structures::scene::{DrawCall, Scene};
pub use pipelines::ibl::{IblConfig, IblError, IblMaps, compute_ibl_maps};
pub use resources::{ImportError, ImportOptions, load_scene};
pub use cgmath;
pub use wgpu;
