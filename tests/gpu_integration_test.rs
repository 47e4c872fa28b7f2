#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn scene_and_ibl_maps_build_on_a_real_adapter() -> anyhow::Result<()> {
    use crate::common::test_utils::{GlbBuilder, TRIANGLE, hdr_bytes};
    use gltf_ibl::{
        IblConfig, ImportOptions,
        context::Context,
        data_structures::material::AlphaMode,
        device::GpuImage,
        pipelines::ibl::from_memory,
        resources::load_scene_from_slice,
    };

    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = Context::headless_blocking()?;

    let mut glb = GlbBuilder::new();
    let positions = glb.positions(&TRIANGLE);
    let indices = glb.indices_u16(&[0, 1, 2]);
    let data = glb.build(&format!(
        r#""scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0}}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":{positions}}},"indices":{indices}}}]}}]"#
    ));
    let mut scene = load_scene_from_slice(&ctx, &data, true, &ImportOptions::default())?;
    assert_eq!(scene.draw_calls(AlphaMode::Opaque).len(), 1);
    scene.write_to_buffer(&ctx)?;

    let config = IblConfig {
        brdf_size: 32,
        environment_size: 64,
        irradiance_size: 16,
        specular_size: 32,
        sample_count: 64,
        ..Default::default()
    };
    let maps = from_memory(&ctx, &hdr_bytes(8, 4, [1.0, 0.8, 0.6]), &config)?;
    assert_eq!(maps.environment.info().levels, 7);
    assert_eq!(maps.brdf_lut.texture.width(), 32);
    Ok(())
}
