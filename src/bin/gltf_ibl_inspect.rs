//! Loads a glTF scene (and optionally an HDR environment) on the default
//! adapter and prints what was imported.
//!
//! ```text
//! gltf_ibl_inspect <scene.gltf|scene.glb> [environment.hdr]
//! ```

use anyhow::{Context as _, bail};
use gltf_ibl::{
    IblConfig, ImportOptions, compute_ibl_maps,
    context::Context,
    data_structures::material::AlphaMode,
    device::GpuImage,
    load_scene,
};

fn main() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        bail!("usage: gltf_ibl_inspect <scene.gltf|scene.glb> [environment.hdr]");
    };
    let environment_path = args.next();

    let ctx = Context::headless_blocking().context("failed to open a GPU device")?;

    let scene = load_scene(&ctx, &scene_path, &ImportOptions::default())
        .with_context(|| format!("failed to load {scene_path}"))?;
    println!("scene {scene_path}");
    println!("  nodes:      {}", scene.graph.nodes.len());
    println!("  vertices:   {}", scene.vertex_count);
    println!("  indices:    {}", scene.index_count);
    println!("  materials:  {}", scene.materials.len());
    println!("  textures:   {}", scene.textures.len());
    println!("  skins:      {}", scene.graph.skins.len());
    println!(
        "  bounds:     {:?} .. {:?}",
        scene.dimensions.min, scene.dimensions.max
    );
    for mode in [AlphaMode::Opaque, AlphaMode::Mask, AlphaMode::Blend] {
        println!("  {:?} draws: {}", mode, scene.draw_calls(mode).len());
    }
    for animation in &scene.animations {
        println!(
            "  animation {:?}: {} channels, {:.3}s..{:.3}s",
            animation.name,
            animation.channels.len(),
            animation.start,
            animation.end
        );
    }
    if !scene.extensions.is_empty() {
        println!("  extensions: {}", scene.extensions.join(", "));
    }

    if let Some(path) = environment_path {
        let maps = compute_ibl_maps(&ctx, &path, &IblConfig::default())
            .with_context(|| format!("failed to precompute lighting from {path}"))?;
        println!("environment {path}");
        for image in [&maps.environment, &maps.irradiance, &maps.specular, &maps.brdf_lut] {
            let info = image.info();
            println!(
                "  {}: {}x{}, {} mips, {} layers",
                info.label, info.width, info.height, info.levels, info.layers
            );
        }
    }
    Ok(())
}
