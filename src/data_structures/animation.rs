//! Keyframe animation: samplers, channels and their evaluation.

use cgmath::{InnerSpace, Quaternion, Vector3, Vector4};

use crate::data_structures::scene_graph::{Node, NodeId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
    /// Hermite spline. Outputs hold `(in_tangent, value, out_tangent)` triples
    /// per keyframe.
    CubicSpline,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationSampler {
    pub interpolation: Interpolation,
    /// Keyframe times in seconds, ascending.
    pub inputs: Vec<f32>,
    /// Keyframe values. Translation and scale use `xyz`, rotation is a quaternion
    /// stored as `(x, y, z, w)`.
    pub outputs: Vec<Vector4<f32>>,
}

impl AnimationSampler {
    /// Value at keyframe `k`, skipping the tangents of cubic-spline samplers.
    fn value(&self, k: usize) -> Option<Vector4<f32>> {
        match self.interpolation {
            Interpolation::CubicSpline => self.outputs.get(3 * k + 1).copied(),
            _ => self.outputs.get(k).copied(),
        }
    }

    /// Finds the bracket `[t_i, t_{i+1}]` containing `time` and returns `i`
    /// together with the normalized position inside it.
    fn bracket(&self, time: f32) -> Option<(usize, f32)> {
        self.inputs.windows(2).enumerate().find_map(|(i, w)| {
            if time >= w[0] && time <= w[1] {
                let span = w[1] - w[0];
                let u = if span > 0.0 {
                    (time - w[0]).max(0.0).clamp(0.0, span) / span
                } else {
                    0.0
                };
                Some((i, u))
            } else {
                None
            }
        })
    }

    /// Evaluates the sampler at `time`. Returns `None` when `time` lies outside
    /// the keyframe range or the outputs are too short for the bracket.
    fn sample(&self, time: f32, path: Path) -> Option<Vector4<f32>> {
        let (i, u) = self.bracket(time)?;
        let a = self.value(i)?;
        let b = self.value(i + 1)?;
        let value = match self.interpolation {
            Interpolation::Step => {
                if u >= 1.0 {
                    b
                } else {
                    a
                }
            }
            Interpolation::Linear => match path {
                Path::Rotation => slerp(a, b, u),
                _ => mix(a, b, u),
            },
            Interpolation::CubicSpline => {
                let dt = self.inputs[i + 1] - self.inputs[i];
                let out_tangent = self.outputs.get(3 * i + 2).copied()?;
                let in_tangent = self.outputs.get(3 * (i + 1)).copied()?;
                let v = hermite(a, out_tangent * dt, b, in_tangent * dt, u);
                match path {
                    Path::Rotation => normalize(v),
                    _ => v,
                }
            }
        };
        Some(value)
    }
}

fn mix(a: Vector4<f32>, b: Vector4<f32>, u: f32) -> Vector4<f32> {
    a * (1.0 - u) + b * u
}

fn hermite(
    p0: Vector4<f32>,
    m0: Vector4<f32>,
    p1: Vector4<f32>,
    m1: Vector4<f32>,
    u: f32,
) -> Vector4<f32> {
    let u2 = u * u;
    let u3 = u2 * u;
    p0 * (2.0 * u3 - 3.0 * u2 + 1.0)
        + m0 * (u3 - 2.0 * u2 + u)
        + p1 * (-2.0 * u3 + 3.0 * u2)
        + m1 * (u3 - u2)
}

fn to_quaternion(v: Vector4<f32>) -> Quaternion<f32> {
    Quaternion::new(v.w, v.x, v.y, v.z)
}

fn normalize(v: Vector4<f32>) -> Vector4<f32> {
    if v.magnitude2() > 0.0 { v.normalize() } else { v }
}

fn slerp(a: Vector4<f32>, b: Vector4<f32>, u: f32) -> Vector4<f32> {
    if u <= 0.0 {
        return normalize(a);
    }
    if u >= 1.0 {
        return normalize(b);
    }
    let q = to_quaternion(a).slerp(to_quaternion(b), u).normalize();
    Vector4::new(q.v.x, q.v.y, q.v.z, q.s)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Path {
    Translation,
    Rotation,
    Scale,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationChannel {
    pub path: Path,
    pub node: NodeId,
    /// Index into [`Animation::samplers`].
    pub sampler: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Animation {
    pub name: String,
    pub samplers: Vec<AnimationSampler>,
    pub channels: Vec<AnimationChannel>,
    pub start: f32,
    pub end: f32,
}

impl Animation {
    /// Recomputes `start`/`end` from every sampler's keyframe times.
    pub fn compute_bounds(&mut self) {
        let mut times = self.samplers.iter().flat_map(|s| s.inputs.iter().copied());
        let Some(first) = times.next() else {
            self.start = 0.0;
            self.end = 0.0;
            return;
        };
        let (start, end) = times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        self.start = start;
        self.end = end;
    }

    /// Writes the sampled values at `time` into the targeted nodes' local
    /// transforms. Returns whether any node was touched.
    ///
    /// `time` is used as-is. Wrapping into `[start, end]` is up to the caller.
    pub fn apply(&self, nodes: &mut [Node], time: f32) -> bool {
        let mut updated = false;
        for channel in &self.channels {
            let Some(sampler) = self.samplers.get(channel.sampler) else {
                continue;
            };
            let Some(value) = sampler.sample(time, channel.path) else {
                continue;
            };
            let Some(node) = nodes.get_mut(channel.node.0) else {
                continue;
            };
            match channel.path {
                Path::Translation => node.translation = value.truncate(),
                Path::Scale => node.scale = value.truncate(),
                Path::Rotation => node.rotation = to_quaternion(value),
            }
            updated = true;
        }
        updated
    }
}

/// Caller-side playback state that loops one animation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnimationPlayer {
    pub index: usize,
    pub timer: f32,
}

impl AnimationPlayer {
    pub fn new(index: usize) -> Self {
        Self { index, timer: 0.0 }
    }

    /// Advances the timer by `dt`, wrapping past `end`, and returns the time to
    /// evaluate at. `None` when the animation does not exist.
    pub fn step(&mut self, animations: &[Animation], dt: f32) -> Option<f32> {
        let animation = animations.get(self.index)?;
        self.timer += dt;
        if self.timer > animation.end {
            self.timer -= animation.end;
        }
        Some(self.timer)
    }
}

pub(crate) fn vec3_to_vec4(v: [f32; 3]) -> Vector4<f32> {
    Vector3::from(v).extend(0.0)
}
