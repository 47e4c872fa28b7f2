//! Axis-aligned bounding boxes.

use cgmath::{Matrix4, Vector3};

/// An axis-aligned box. A box that was never seeded from geometry is `valid == false`
/// and must not take part in a running min/max.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
    pub valid: bool,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
            valid: false,
        }
    }
}

impl BoundingBox {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self {
            min,
            max,
            valid: true,
        }
    }

    /// Conservative box around this box transformed by `m`.
    ///
    /// Each basis column of `m` is scaled by the box extent along that axis and
    /// the per-axis minimum/maximum contributions are accumulated onto the
    /// translation column.
    pub fn get_aabb(&self, m: &Matrix4<f32>) -> BoundingBox {
        let mut min = m.w.truncate();
        let mut max = min;

        for (axis, (lo, hi)) in [
            (m.x.truncate(), (self.min.x, self.max.x)),
            (m.y.truncate(), (self.min.y, self.max.y)),
            (m.z.truncate(), (self.min.z, self.max.z)),
        ] {
            let v0 = axis * lo;
            let v1 = axis * hi;
            min += component_min(v0, v1);
            max += component_max(v0, v1);
        }

        BoundingBox::new(min, max)
    }

    /// Grows this box to contain `other`. Invalid boxes on either side are handled
    /// by seeding rather than merging.
    pub fn merge(&mut self, other: &BoundingBox) {
        if !other.valid {
            return;
        }
        if !self.valid {
            *self = *other;
            return;
        }
        self.min = component_min(self.min, other.min);
        self.max = component_max(self.max, other.max);
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

pub(crate) fn component_min(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

pub(crate) fn component_max(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, SquareMatrix};

    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Vector3::new(-1.0, -2.0, -3.0), Vector3::new(1.0, 2.0, 3.0))
    }

    #[test]
    fn identity_keeps_the_box() {
        let bb = unit_box();
        let out = bb.get_aabb(&Matrix4::identity());
        assert_eq!(out.min, bb.min);
        assert_eq!(out.max, bb.max);
        assert!(out.valid);
    }

    #[test]
    fn translation_shifts_both_corners() {
        let bb = unit_box();
        let offset = Vector3::new(5.0, -1.0, 2.5);
        let out = bb.get_aabb(&Matrix4::from_translation(offset));
        assert_eq!(out.min, bb.min + offset);
        assert_eq!(out.max, bb.max + offset);
    }

    #[test]
    fn rotation_swaps_extents() {
        let bb = unit_box();
        let out = bb.get_aabb(&Matrix4::from_angle_z(Deg(90.0)));
        assert!((out.min.x - -2.0).abs() < 1e-5);
        assert!((out.max.x - 2.0).abs() < 1e-5);
        assert!((out.min.y - -1.0).abs() < 1e-5);
        assert!((out.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn merge_seeds_from_first_valid_box() {
        let mut acc = BoundingBox::default();
        acc.merge(&BoundingBox::default());
        assert!(!acc.valid);

        let other = BoundingBox::new(Vector3::new(2.0, 2.0, 2.0), Vector3::new(3.0, 3.0, 3.0));
        acc.merge(&other);
        assert_eq!(acc, other);

        acc.merge(&unit_box());
        assert_eq!(acc.min, Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(acc.max, Vector3::new(3.0, 3.0, 3.0));
    }
}
