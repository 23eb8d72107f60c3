// src/skeleton.rs - Static kinematic trees for the supported pose models
use crate::keypoints::Subject;
use nalgebra::Vector3;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    // Lightweight Human Pose Estimation 3D, 19 keypoints, 30 fps.
    #[serde(rename = "lightweight19")]
    Lightweight19,
    // VideoPose3D Human3.6M reduction, 17 keypoints, 50 fps.
    #[serde(rename = "videopose17")]
    VideoPose17,
}

impl ModelVariant {
    pub fn tag(self) -> &'static str {
        match self {
            ModelVariant::Lightweight19 => "lightweight19",
            ModelVariant::VideoPose17 => "videopose17",
        }
    }

    pub fn keypoint_count(self) -> usize {
        match self {
            ModelVariant::Lightweight19 => 19,
            ModelVariant::VideoPose17 => 17,
        }
    }

    // Seconds per frame of the model's output. Fixed, never probed from video.
    pub fn frame_time(self) -> f64 {
        match self {
            ModelVariant::Lightweight19 => 1.0 / 30.0,
            ModelVariant::VideoPose17 => 1.0 / 50.0,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightweight19" => Ok(ModelVariant::Lightweight19),
            "videopose17" => Ok(ModelVariant::VideoPose17),
            other => Err(format!(
                "unknown model variant '{other}' (expected lightweight19 or videopose17)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Xposition,
    Yposition,
    Zposition,
    Zrotation,
    Xrotation,
    Yrotation,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::Xposition => "Xposition",
            Channel::Yposition => "Yposition",
            Channel::Zposition => "Zposition",
            Channel::Zrotation => "Zrotation",
            Channel::Xrotation => "Xrotation",
            Channel::Yrotation => "Yrotation",
        }
    }
}

pub const ROOT_CHANNELS: &[Channel] = &[
    Channel::Xposition,
    Channel::Yposition,
    Channel::Zposition,
    Channel::Zrotation,
    Channel::Xrotation,
    Channel::Yrotation,
];

pub const JOINT_CHANNELS: &[Channel] =
    &[Channel::Zrotation, Channel::Xrotation, Channel::Yrotation];

// How a joint's 3D position is read from the raw keypoint array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointSource {
    Single(usize),
    Midpoint(usize, usize),
    // Halfway between the neck and the hip center.
    SpineMidpoint {
        neck: usize,
        left_hip: usize,
        right_hip: usize,
    },
}

impl KeypointSource {
    pub fn position(&self, subject: &Subject) -> Vector3<f64> {
        match *self {
            KeypointSource::Single(i) => subject.position(i),
            KeypointSource::Midpoint(a, b) => (subject.position(a) + subject.position(b)) / 2.0,
            KeypointSource::SpineMidpoint {
                neck,
                left_hip,
                right_hip,
            } => {
                let hip_center = (subject.position(left_hip) + subject.position(right_hip)) / 2.0;
                (subject.position(neck) + hip_center) / 2.0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: &'static str,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub channels: &'static [Channel],
    pub source: KeypointSource,
}

impl Joint {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// Kinematic tree with joints stored in depth-first order, root at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonTopology {
    pub variant: ModelVariant,
    pub joints: Vec<Joint>,
}

static LIGHTWEIGHT19: Lazy<SkeletonTopology> = Lazy::new(build_lightweight19);
static VIDEOPOSE17: Lazy<SkeletonTopology> = Lazy::new(build_videopose17);

impl SkeletonTopology {
    pub fn get(variant: ModelVariant) -> &'static SkeletonTopology {
        match variant {
            ModelVariant::Lightweight19 => &LIGHTWEIGHT19,
            ModelVariant::VideoPose17 => &VIDEOPOSE17,
        }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn root(&self) -> &Joint {
        &self.joints[0]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.joints.iter().map(|j| j.name).collect()
    }

    pub fn parents(&self) -> Vec<Option<usize>> {
        self.joints.iter().map(|j| j.parent).collect()
    }

    // Values per motion line: root position plus one rotation triple per joint.
    pub fn channel_count(&self) -> usize {
        self.joints.iter().map(|j| j.channels.len()).sum()
    }

    // Builds a topology from parallel name/parent/source tables, reordering
    // the joints depth-first so motion values line up with the hierarchy.
    fn from_tables(
        variant: ModelVariant,
        names: &[&'static str],
        parents: &[Option<usize>],
        sources: &[KeypointSource],
    ) -> Self {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (i, parent) in parents.iter().enumerate() {
            if let Some(p) = parent {
                children[*p].push(i);
            }
        }

        let root = parents
            .iter()
            .position(Option::is_none)
            .unwrap_or_default();
        let mut order = Vec::with_capacity(names.len());
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(children[i].iter().rev());
        }

        let mut remap = vec![0usize; names.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        let joints = order
            .iter()
            .map(|&old| Joint {
                name: names[old],
                parent: parents[old].map(|p| remap[p]),
                children: children[old].iter().map(|&c| remap[c]).collect(),
                channels: if parents[old].is_none() {
                    ROOT_CHANNELS
                } else {
                    JOINT_CHANNELS
                },
                source: sources[old],
            })
            .collect();

        Self { variant, joints }
    }
}

fn build_lightweight19() -> SkeletonTopology {
    use KeypointSource::*;

    // 0 nose, 1 neck, 2-4 right arm, 5-7 left arm, 8-10 right leg, 11-13 left leg
    const TABLE: &[(&str, Option<&str>, KeypointSource)] = &[
        ("Hips", None, Midpoint(8, 11)),
        (
            "Spine",
            Some("Hips"),
            SpineMidpoint {
                neck: 1,
                left_hip: 11,
                right_hip: 8,
            },
        ),
        ("Neck", Some("Spine"), Single(1)),
        ("Head", Some("Neck"), Single(0)),
        ("LeftShoulder", Some("Spine"), Single(5)),
        ("LeftArm", Some("LeftShoulder"), Midpoint(5, 6)),
        ("LeftForeArm", Some("LeftArm"), Midpoint(6, 7)),
        ("LeftHand", Some("LeftForeArm"), Single(7)),
        ("RightShoulder", Some("Spine"), Single(2)),
        ("RightArm", Some("RightShoulder"), Midpoint(2, 3)),
        ("RightForeArm", Some("RightArm"), Midpoint(3, 4)),
        ("RightHand", Some("RightForeArm"), Single(4)),
        ("LeftUpLeg", Some("Hips"), Midpoint(11, 12)),
        ("LeftLeg", Some("LeftUpLeg"), Midpoint(12, 13)),
        ("LeftFoot", Some("LeftLeg"), Single(13)),
        ("RightUpLeg", Some("Hips"), Midpoint(8, 9)),
        ("RightLeg", Some("RightUpLeg"), Midpoint(9, 10)),
        ("RightFoot", Some("RightLeg"), Single(10)),
    ];

    let names: Vec<&'static str> = TABLE.iter().map(|(name, _, _)| *name).collect();
    let parents: Vec<Option<usize>> = TABLE
        .iter()
        .map(|(_, parent, _)| parent.and_then(|p| names.iter().position(|n| *n == p)))
        .collect();
    let sources: Vec<KeypointSource> = TABLE.iter().map(|(_, _, source)| *source).collect();

    SkeletonTopology::from_tables(ModelVariant::Lightweight19, &names, &parents, &sources)
}

// Full 32-joint Human3.6M parent array.
pub const H36M_PARENTS: [i32; 32] = [
    -1, 0, 1, 2, 3, 4, 0, 6, 7, 8, 9, 0, 11, 12, 13, 14, 12, 16, 17, 18, 19, 20, 19, 22, 12, 24,
    25, 26, 27, 28, 27, 30,
];

pub const H36M_NAMES: [&str; 32] = [
    "Hips",
    "RightHip",
    "RightKnee",
    "RightFoot",
    "RightToeBase",
    "RightToeEnd",
    "LeftHip",
    "LeftKnee",
    "LeftFoot",
    "LeftToeBase",
    "LeftToeEnd",
    "SpineBase",
    "Spine",
    "Thorax",
    "Neck",
    "Head",
    "LeftCollar",
    "LeftShoulder",
    "LeftElbow",
    "LeftWrist",
    "LeftThumb",
    "LeftThumbEnd",
    "LeftHandTip",
    "LeftHandTipEnd",
    "RightCollar",
    "RightShoulder",
    "RightElbow",
    "RightWrist",
    "RightThumb",
    "RightThumbEnd",
    "RightHandTip",
    "RightHandTipEnd",
];

// Toe, collar, hand and thumb dummies dropped by VideoPose3D.
pub const H36M_REMOVED: [usize; 15] = [4, 5, 9, 10, 11, 16, 20, 21, 22, 23, 24, 28, 29, 30, 31];

// Indices in the reduced 17-joint space.
const THORAX: usize = 8;
const LEFT_SHOULDER: usize = 11;
const RIGHT_SHOULDER: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedSkeleton {
    pub names: Vec<&'static str>,
    pub parents: Vec<Option<usize>>,
}

// Prunes the 32-joint Human3.6M tree down to the 17 joints VideoPose3D predicts.
// Surviving joints whose parent was removed climb to the nearest surviving
// ancestor, indices are compacted, and both shoulders are re-parented to the
// thorax since their collar parents no longer exist.
pub fn reduce_h36m() -> ReducedSkeleton {
    let removed = |j: usize| H36M_REMOVED.contains(&j);

    let mut parents: Vec<Option<usize>> = H36M_PARENTS
        .iter()
        .map(|&p| usize::try_from(p).ok())
        .collect();
    for i in 0..parents.len() {
        while let Some(p) = parents[i] {
            if !removed(p) {
                break;
            }
            parents[i] = parents[p];
        }
    }

    let mut compact = vec![0usize; parents.len()];
    let mut next = 0;
    for (i, slot) in compact.iter_mut().enumerate() {
        *slot = next;
        if !removed(i) {
            next += 1;
        }
    }

    let mut reduced = ReducedSkeleton {
        names: Vec::with_capacity(next),
        parents: Vec::with_capacity(next),
    };
    for (i, parent) in parents.iter().enumerate() {
        if removed(i) {
            continue;
        }
        reduced.names.push(H36M_NAMES[i]);
        reduced.parents.push(parent.map(|p| compact[p]));
    }

    reduced.parents[LEFT_SHOULDER] = Some(THORAX);
    reduced.parents[RIGHT_SHOULDER] = Some(THORAX);
    reduced
}

fn build_videopose17() -> SkeletonTopology {
    let reduced = reduce_h36m();
    let sources: Vec<KeypointSource> = (0..reduced.names.len())
        .map(KeypointSource::Single)
        .collect();
    SkeletonTopology::from_tables(
        ModelVariant::VideoPose17,
        &reduced.names,
        &reduced.parents,
        &sources,
    )
}
