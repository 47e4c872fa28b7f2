mod common;

use common::test_utils::{RecordingDevice, Recorded, hdr_bytes};
use gltf_ibl::{
    IblConfig, IblError, compute_ibl_maps,
    device::{GpuImage, ImageLayout, QueueType},
    pipelines::ibl::{self, from_equirect, from_memory, mip_count},
};

fn bake(device: &RecordingDevice) -> ibl::IblMaps<RecordingDevice> {
    from_memory(device, &hdr_bytes(2, 1, [1.0, 0.5, 0.25]), &IblConfig::default())
        .expect("IBL precompute failed")
}

fn compute_commands(device: &RecordingDevice) -> Vec<Recorded> {
    let submissions = device.submissions();
    let compute: Vec<_> = submissions
        .iter()
        .filter(|s| s.queue == QueueType::Compute)
        .collect();
    assert_eq!(compute.len(), 1);
    compute[0].commands.clone()
}

fn f32_at(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[test]
fn tiny_equirect_produces_maps_of_fixed_size() {
    let device = RecordingDevice::new();
    let maps = bake(&device);

    let environment = maps.environment.info();
    assert_eq!((environment.width, environment.height), (1024, 1024));
    assert_eq!(environment.layers, 6);
    assert_eq!(environment.levels, 11);

    let irradiance = maps.irradiance.info();
    assert_eq!((irradiance.width, irradiance.height, irradiance.layers), (64, 64, 6));
    assert_eq!(irradiance.levels, 1);

    let specular = maps.specular.info();
    assert_eq!((specular.width, specular.height, specular.layers), (512, 512, 6));
    assert_eq!(specular.levels, mip_count(512));

    let brdf = maps.brdf_lut.info();
    assert_eq!((brdf.width, brdf.height, brdf.layers), (512, 512, 1));

    for info in [environment, irradiance, specular, brdf] {
        assert_eq!(info.format, ibl::MAP_FORMAT);
        assert!(info.usage.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(info.usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
    }
    assert_eq!(device.pipelines().len(), 4);
}

#[test]
fn source_is_uploaded_before_the_single_compute_submission() {
    let device = RecordingDevice::new();
    bake(&device);

    let submissions = device.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].queue, QueueType::Transfer);
    assert_eq!(submissions[1].queue, QueueType::Compute);
    assert_eq!(device.wait_idle_calls(), 1);

    let source = &device.images()[0];
    assert_eq!(source.format, ibl::SOURCE_FORMAT);
    assert_eq!((source.width, source.height), (2, 1));

    let staging = device
        .buffer_contents("ibl equirect source staging")
        .expect("no staging buffer");
    // One 32-byte row padded to the copy row alignment.
    assert_eq!(staging.len(), 256);
    let (r, g, b, a) = (
        f32_at(&staging, 0),
        f32_at(&staging, 4),
        f32_at(&staging, 8),
        f32_at(&staging, 12),
    );
    assert!(r > g && g > b && b > 0.0);
    assert_eq!(a, 1.0);
}

#[test]
fn stages_are_separated_by_barriers_in_order() {
    let device = RecordingDevice::new();
    bake(&device);
    let commands = compute_commands(&device);

    let Recorded::Barrier(first) = &commands[0] else {
        panic!("expected the initial transition, got {:?}", commands[0]);
    };
    assert_eq!(first.len(), 4);
    assert!(
        first
            .iter()
            .all(|(_, old, new)| *old == ImageLayout::Undefined && *new == ImageLayout::General)
    );

    let position = |predicate: &dyn Fn(&Recorded) -> bool| {
        commands.iter().position(|c| predicate(c)).expect("command not recorded")
    };
    let last_position = |predicate: &dyn Fn(&Recorded) -> bool| {
        commands.iter().rposition(|c| predicate(c)).expect("command not recorded")
    };
    let dispatch_of = |name: &'static str| {
        move |c: &Recorded| matches!(c, Recorded::Dispatch { pipeline, .. } if pipeline == name)
    };
    let barrier_to_read = |image: &'static str| {
        move |c: &Recorded| match c {
            Recorded::Barrier(barriers) => barriers
                .iter()
                .any(|(label, _, new)| label == image && *new == ImageLayout::ShaderRead),
            _ => false,
        }
    };

    let last_eq = last_position(&dispatch_of("ibl equirect to cube"));
    let environment_read = position(&barrier_to_read("ibl environment"));
    let irradiance = position(&dispatch_of("ibl irradiance"));
    let first_specular = position(&dispatch_of("ibl specular prefilter"));
    let last_specular = last_position(&dispatch_of("ibl specular prefilter"));
    let irradiance_read = position(&barrier_to_read("ibl irradiance"));
    let specular_read = position(&barrier_to_read("ibl specular"));
    let brdf = position(&dispatch_of("ibl brdf lut"));
    let brdf_read = position(&barrier_to_read("ibl brdf lut"));

    assert!(last_eq < environment_read);
    assert!(environment_read < irradiance);
    assert!(environment_read < first_specular);
    assert!(last_specular < irradiance_read);
    assert_eq!(irradiance_read, specular_read);
    assert!(specular_read < brdf);
    assert!(brdf < brdf_read);
    assert_eq!(brdf_read, commands.len() - 1);
}

#[test]
fn every_mip_gets_one_dispatch_with_matching_groups() {
    let device = RecordingDevice::new();
    bake(&device);
    let commands = compute_commands(&device);

    let dispatches = |name: &str| -> Vec<(Vec<(String, u32)>, Vec<u8>, [u32; 3])> {
        commands
            .iter()
            .filter_map(|c| match c {
                Recorded::Dispatch {
                    pipeline,
                    storage,
                    params,
                    groups,
                    ..
                } if pipeline == name => Some((storage.clone(), params.clone(), *groups)),
                _ => None,
            })
            .collect()
    };

    let environment = dispatches("ibl equirect to cube");
    assert_eq!(environment.len(), 11);
    for (mip, (storage, _, groups)) in environment.iter().enumerate() {
        let expected = ((1024u32 >> mip) / 8).max(1);
        assert_eq!(*groups, [expected, expected, 6]);
        assert_eq!(storage[0], ("ibl environment".to_string(), mip as u32));
    }

    let specular = dispatches("ibl specular prefilter");
    assert_eq!(specular.len(), 10);
    assert_eq!(f32_at(&specular[0].1, 0), 0.0);
    assert_eq!(f32_at(&specular[9].1, 0), 1.0);
    assert_eq!(specular[9].2, [1, 1, 6]);

    let irradiance = dispatches("ibl irradiance");
    assert_eq!(irradiance.len(), 1);
    assert_eq!(irradiance[0].2, [8, 8, 6]);

    let brdf = dispatches("ibl brdf lut");
    assert_eq!(brdf.len(), 1);
    assert_eq!(brdf[0].2, [64, 64, 1]);
}

#[test]
fn smaller_configuration_scales_every_map() {
    let device = RecordingDevice::new();
    let config = IblConfig {
        brdf_size: 32,
        environment_size: 64,
        irradiance_size: 16,
        specular_size: 32,
        ..Default::default()
    };
    let maps = from_equirect(&device, 1, 1, &[0.2, 0.3, 0.4, 1.0], &config).expect("bake failed");

    assert_eq!(maps.environment.info().levels, 7);
    assert_eq!(maps.specular.info().levels, 6);
    assert_eq!(maps.brdf_lut.info().width, 32);
}

#[test]
fn empty_and_corrupt_sources_are_rejected() {
    let device = RecordingDevice::new();
    let config = IblConfig::default();

    assert!(matches!(
        from_equirect(&device, 0, 0, &[], &config),
        Err(IblError::EmptyImage)
    ));
    assert!(matches!(
        from_memory(&device, b"not an image", &config),
        Err(IblError::Decode(_))
    ));
    assert!(matches!(
        compute_ibl_maps(&device, "does/not/exist.hdr", &config),
        Err(IblError::Io { .. })
    ));
    assert!(device.submissions().is_empty());
}

#[test]
fn environment_file_is_read_from_disk() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("gltf-ibl-{}.hdr", std::process::id()));
    std::fs::write(&path, hdr_bytes(4, 2, [0.1, 0.2, 0.3]))?;

    let device = RecordingDevice::new();
    let result = compute_ibl_maps(&device, &path, &IblConfig::default());
    std::fs::remove_file(&path)?;

    let maps = result?;
    assert_eq!(maps.irradiance.info().width, 64);
    assert_eq!(device.images()[0].width, 4);
    Ok(())
}
