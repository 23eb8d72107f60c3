// src/rotation.rs - Bone rotations relative to the rest pose, as BVH ZXY Euler angles
use crate::calibration::{joint_positions, RestPose, MIN_BONE_LENGTH};
use crate::keypoints::Subject;
use crate::skeleton::SkeletonTopology;
use nalgebra::{Matrix3, Vector3};

// Below this `cos(x)` the ZXY decomposition is treated as gimbal locked.
const GIMBAL_EPSILON: f64 = 1e-6;

// One line of the BVH motion block: root position, then a Z/X/Y triple per joint.
#[derive(Debug, Clone, PartialEq)]
pub struct BvhMotionFrame {
    pub values: Vec<f64>,
}

impl BvhMotionFrame {
    pub fn rest(topology: &SkeletonTopology) -> Self {
        Self {
            values: vec![0.0; topology.channel_count()],
        }
    }

    pub fn root_position(&self) -> Vector3<f64> {
        Vector3::new(self.values[0], self.values[1], self.values[2])
    }

    // `[z, x, y]` in degrees for joint `index`.
    pub fn rotation(&self, index: usize) -> [f64; 3] {
        let start = 3 + 3 * index;
        [
            self.values[start],
            self.values[start + 1],
            self.values[start + 2],
        ]
    }
}

// Rotation taking the direction of `from` onto the direction of `to`.
// Zero-length inputs give the identity. Parallel vectors give the identity,
// anti-parallel ones its negation.
pub fn rotation_between(from: &Vector3<f64>, to: &Vector3<f64>) -> Matrix3<f64> {
    let (from_norm, to_norm) = (from.norm(), to.norm());
    if from_norm < MIN_BONE_LENGTH || to_norm < MIN_BONE_LENGTH {
        return Matrix3::identity();
    }

    let a = from / from_norm;
    let b = to / to_norm;
    let axis = a.cross(&b);
    let c = a.dot(&b);
    let s = axis.norm();

    if s < MIN_BONE_LENGTH {
        return if c > 0.0 {
            Matrix3::identity()
        } else {
            -Matrix3::identity()
        };
    }

    // Rodrigues: R = I + K + K^2 (1 - c) / s^2
    let k = axis.cross_matrix();
    Matrix3::identity() + k + k * k * ((1.0 - c) / (s * s))
}

// Decomposes `r = Rz * Rx * Ry` and returns `[z, x, y]` in degrees,
// the order of BVH `Zrotation Xrotation Yrotation` channels.
pub fn euler_zxy_degrees(r: &Matrix3<f64>) -> [f64; 3] {
    let x = r[(2, 1)].clamp(-1.0, 1.0).asin();

    let (z, y) = if x.cos() > GIMBAL_EPSILON {
        (
            f64::atan2(-r[(0, 1)], r[(1, 1)]),
            f64::atan2(-r[(2, 0)], r[(2, 2)]),
        )
    } else {
        // X pivot at +-90 degrees: Z and Y share an axis, fold everything into Y
        (0.0, f64::atan2(r[(0, 2)], r[(0, 0)]))
    };

    [z.to_degrees(), x.to_degrees(), y.to_degrees()]
}

pub fn extract_motion_frame(
    topology: &SkeletonTopology,
    rest: &RestPose,
    subject: &Subject,
) -> BvhMotionFrame {
    let positions = joint_positions(topology, subject);
    let mut values = Vec::with_capacity(topology.channel_count());

    for (i, joint) in topology.joints.iter().enumerate() {
        let (rest_dir, current) = match joint.parent {
            Some(p) => (rest.rest_directions[i], positions[i] - positions[p]),
            None => {
                values.extend_from_slice(positions[i].as_slice());
                match joint.children.first() {
                    Some(&child) => (rest.rest_directions[child], positions[child] - positions[i]),
                    None => (Vector3::y(), Vector3::y()),
                }
            }
        };

        let r = rotation_between(&rest_dir, &current);
        values.extend_from_slice(&euler_zxy_degrees(&r));
    }

    BvhMotionFrame { values }
}
