// src/calibration.rs - Rest pose measured from the first frame a subject appears in
use crate::error::{Error, Result};
use crate::keypoints::{KeypointFrame, Subject};
use crate::skeleton::SkeletonTopology;
use nalgebra::Vector3;
use tracing::debug;

// Bones shorter than this are treated as degenerate.
pub const MIN_BONE_LENGTH: f64 = 1e-6;

// Per-joint offsets and unit rest directions, indexed like `SkeletonTopology::joints`.
#[derive(Debug, Clone, PartialEq)]
pub struct RestPose {
    // Parent-relative offset; the root holds its absolute position.
    pub offsets: Vec<Vector3<f64>>,
    pub rest_directions: Vec<Vector3<f64>>,
    // Frame the pose was measured on.
    pub frame_index: usize,
}

pub fn joint_positions(topology: &SkeletonTopology, subject: &Subject) -> Vec<Vector3<f64>> {
    topology
        .joints
        .iter()
        .map(|joint| joint.source.position(subject))
        .collect()
}

// Unit vector along `offset`, or +Y for a degenerate bone.
pub fn rest_direction(offset: &Vector3<f64>) -> Vector3<f64> {
    let length = offset.norm();
    if length < MIN_BONE_LENGTH {
        Vector3::y()
    } else {
        offset / length
    }
}

impl RestPose {
    // Measures the rest pose from the first frame in which `subject_index`
    // has keypoints.
    pub fn calibrate(
        topology: &SkeletonTopology,
        frames: &[KeypointFrame],
        subject_index: usize,
    ) -> Result<Self> {
        let (frame_index, subject) = frames
            .iter()
            .find_map(|f| f.subject(subject_index).map(|s| (f.frame_index, s)))
            .ok_or(Error::NoReferencePose {
                subject: subject_index,
            })?;

        debug!(subject = subject_index, frame = frame_index, "calibrating rest pose");
        Ok(Self::from_subject(topology, subject, frame_index))
    }

    pub fn from_subject(
        topology: &SkeletonTopology,
        subject: &Subject,
        frame_index: usize,
    ) -> Self {
        let positions = joint_positions(topology, subject);

        let offsets: Vec<Vector3<f64>> = topology
            .joints
            .iter()
            .enumerate()
            .map(|(i, joint)| match joint.parent {
                Some(p) => positions[i] - positions[p],
                None => positions[i],
            })
            .collect();
        let rest_directions = offsets.iter().map(rest_direction).collect();

        Self {
            offsets,
            rest_directions,
            frame_index,
        }
    }

    pub fn offset(&self, topology: &SkeletonTopology, name: &str) -> Option<Vector3<f64>> {
        topology.index_of(name).map(|i| self.offsets[i])
    }

    pub fn direction(&self, topology: &SkeletonTopology, name: &str) -> Option<Vector3<f64>> {
        topology.index_of(name).map(|i| self.rest_directions[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::Keypoint;
    use crate::skeleton::ModelVariant;
    use approx::assert_relative_eq;

    fn standing_subject() -> Subject {
        let mut kps = vec![Keypoint::new(0.0, 0.0, 0.0); 19];
        kps[0] = Keypoint::new(0.0, 1.7, 0.1);
        kps[1] = Keypoint::new(0.0, 1.5, 0.0);
        kps[2] = Keypoint::new(-0.2, 1.45, 0.0);
        kps[3] = Keypoint::new(-0.45, 1.45, 0.0);
        kps[4] = Keypoint::new(-0.7, 1.45, 0.0);
        kps[5] = Keypoint::new(0.2, 1.45, 0.0);
        kps[6] = Keypoint::new(0.45, 1.45, 0.0);
        kps[7] = Keypoint::new(0.7, 1.45, 0.0);
        kps[8] = Keypoint::new(-0.1, 1.0, 0.0);
        kps[9] = Keypoint::new(-0.1, 0.5, 0.0);
        kps[10] = Keypoint::new(-0.1, 0.05, 0.0);
        kps[11] = Keypoint::new(0.1, 1.0, 0.0);
        kps[12] = Keypoint::new(0.1, 0.5, 0.0);
        kps[13] = Keypoint::new(0.1, 0.05, 0.0);
        Subject::new(kps)
    }

    #[test]
    fn test_root_offset_is_absolute() {
        let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
        let rest = RestPose::from_subject(topo, &standing_subject(), 0);
        assert_relative_eq!(rest.offsets[0], Vector3::new(0.0, 1.0, 0.0));
        let spine = rest.offset(topo, "Spine").unwrap();
        assert_relative_eq!(spine, Vector3::new(0.0, 0.25, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rest_directions_are_unit_or_fallback() {
        let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
        let rest = RestPose::from_subject(topo, &standing_subject(), 0);
        for (offset, dir) in rest.offsets.iter().zip(&rest.rest_directions) {
            if offset.norm() >= MIN_BONE_LENGTH {
                assert_relative_eq!(dir.norm(), 1.0, epsilon = 1e-6);
            } else {
                assert_eq!(*dir, Vector3::y());
            }
        }
    }

    #[test]
    fn test_calibrate_skips_frames_without_subject() {
        let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
        let frames = vec![
            KeypointFrame::empty(0),
            KeypointFrame::new(1, vec![Subject::default()]),
            KeypointFrame::new(2, vec![standing_subject()]),
        ];
        let rest = RestPose::calibrate(topo, &frames, 0).unwrap();
        assert_eq!(rest.frame_index, 2);
    }

    #[test]
    fn test_calibrate_without_any_subject_fails() {
        let topo = SkeletonTopology::get(ModelVariant::VideoPose17);
        let frames = vec![KeypointFrame::empty(0), KeypointFrame::empty(1)];
        let err = RestPose::calibrate(topo, &frames, 0).unwrap_err();
        assert!(matches!(err, Error::NoReferencePose { subject: 0 }));
    }

    #[test]
    fn test_degenerate_hips_do_not_panic() {
        let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
        let mut subject = standing_subject();
        subject.keypoints[8] = Keypoint::new(0.0, 0.0, 0.0);
        subject.keypoints[11] = Keypoint::new(0.0, 0.0, 0.0);
        let frames = vec![
            KeypointFrame::empty(0),
            KeypointFrame::new(1, vec![subject]),
            KeypointFrame::new(2, vec![standing_subject()]),
        ];
        let rest = RestPose::calibrate(topo, &frames, 0).unwrap();
        assert_eq!(rest.frame_index, 1);
        assert_eq!(rest.offset(topo, "Hips").unwrap(), Vector3::zeros());
        // LeftUpLeg sits at the midpoint of hip 11 (now origin) and knee 12
        assert_relative_eq!(
            rest.offset(topo, "LeftUpLeg").unwrap(),
            Vector3::new(0.05, 0.25, 0.0),
            epsilon = 1e-12
        );
    }
}
