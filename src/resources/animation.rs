use std::collections::HashMap;

use cgmath::{Matrix4, SquareMatrix, Vector4};
use gltf::animation::util::ReadOutputs;

use crate::data_structures::{
    animation::{Animation, AnimationChannel, AnimationSampler, Interpolation, Path, vec3_to_vec4},
    mesh::MAX_NUM_JOINTS,
    scene_graph::{SceneGraph, Skin},
};

fn interpolation(interpolation: gltf::animation::Interpolation) -> Interpolation {
    match interpolation {
        gltf::animation::Interpolation::Linear => Interpolation::Linear,
        gltf::animation::Interpolation::Step => Interpolation::Step,
        gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
    }
}

/// Loads every animation. Channels whose target node is not in `graph` and
/// morph-weight channels are dropped with a warning.
pub fn load_animations(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    graph: &SceneGraph,
) -> Vec<Animation> {
    let mut animations = Vec::new();
    for animation in document.animations() {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| animation.index().to_string());
        let mut new_animation = Animation {
            name,
            ..Default::default()
        };
        // Document sampler index -> index in `new_animation.samplers`.
        let mut sampler_slots: HashMap<usize, usize> = HashMap::new();

        for channel in animation.channels() {
            let target = channel.target();
            let Some(node) = graph.node_from_index(target.node().index()) else {
                log::warn!(
                    "animation {:?}: channel {} targets node {} outside the scene, skipped",
                    new_animation.name,
                    channel.index(),
                    target.node().index()
                );
                continue;
            };

            let sampler_index = channel.sampler().index();
            let slot = match sampler_slots.get(&sampler_index).copied() {
                Some(slot) => slot,
                None => {
                    let reader = channel.reader(|buffer| {
                        buffers.get(buffer.index()).map(|data| data.0.as_slice())
                    });
                    let inputs: Vec<f32> = match reader.read_inputs() {
                        Some(inputs) => inputs.collect(),
                        None => {
                            log::warn!(
                                "animation channel {} has no keyframe times",
                                channel.index()
                            );
                            Vec::new()
                        }
                    };
                    let outputs: Vec<Vector4<f32>> = match reader.read_outputs() {
                        Some(ReadOutputs::Translations(values)) => {
                            values.map(vec3_to_vec4).collect()
                        }
                        Some(ReadOutputs::Scales(values)) => values.map(vec3_to_vec4).collect(),
                        Some(ReadOutputs::Rotations(values)) => {
                            values.into_f32().map(Vector4::from).collect()
                        }
                        Some(ReadOutputs::MorphTargetWeights(_)) => {
                            log::warn!(
                                "animation channel {}: morph target weights are not supported",
                                channel.index()
                            );
                            continue;
                        }
                        None => {
                            log::warn!(
                                "animation channel {} has no keyframe values",
                                channel.index()
                            );
                            Vec::new()
                        }
                    };
                    new_animation.samplers.push(AnimationSampler {
                        interpolation: interpolation(channel.sampler().interpolation()),
                        inputs,
                        outputs,
                    });
                    let slot = new_animation.samplers.len() - 1;
                    sampler_slots.insert(sampler_index, slot);
                    slot
                }
            };

            let path = match target.property() {
                gltf::animation::Property::Translation => Path::Translation,
                gltf::animation::Property::Rotation => Path::Rotation,
                gltf::animation::Property::Scale => Path::Scale,
                gltf::animation::Property::MorphTargetWeights => {
                    log::warn!(
                        "animation channel {}: morph target weights are not supported",
                        channel.index()
                    );
                    continue;
                }
            };
            new_animation.channels.push(AnimationChannel {
                path,
                node,
                sampler: slot,
            });
        }

        new_animation.compute_bounds();
        log::debug!(
            "animation {:?}: {} channels, [{}, {}]",
            new_animation.name,
            new_animation.channels.len(),
            new_animation.start,
            new_animation.end
        );
        animations.push(new_animation);
    }
    animations
}

/// Loads every skin, resolving joints against the already built node arena.
///
/// Joints outside the imported scene are dropped together with their inverse
/// bind matrices.
pub fn load_skins(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    graph: &SceneGraph,
) -> Vec<Skin> {
    let mut skins = Vec::new();
    for skin in document.skins() {
        let reader =
            skin.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let mut matrices = reader
            .read_inverse_bind_matrices()
            .into_iter()
            .flatten()
            .map(Matrix4::from);

        let mut joints = Vec::new();
        let mut inverse_bind_matrices: Vec<Matrix4<f32>> = Vec::new();
        for joint in skin.joints() {
            let inverse_bind = matrices.next().unwrap_or_else(Matrix4::identity);
            let Some(id) = graph.node_from_index(joint.index()) else {
                log::warn!(
                    "skin {}: joint node {} is not part of the scene, skipped",
                    skin.index(),
                    joint.index()
                );
                continue;
            };
            joints.push(id);
            inverse_bind_matrices.push(inverse_bind);
        }
        if inverse_bind_matrices.len() > MAX_NUM_JOINTS {
            log::warn!(
                "skin {}: {} joints, only the first {} are used",
                skin.index(),
                joints.len(),
                MAX_NUM_JOINTS
            );
            inverse_bind_matrices.truncate(MAX_NUM_JOINTS);
        }

        skins.push(Skin {
            name: skin.name().map(str::to_string),
            skeleton_root: skin.skeleton().and_then(|root| graph.node_from_index(root.index())),
            joints,
            inverse_bind_matrices,
        });
    }
    skins
}
