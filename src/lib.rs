// src/lib.rs - 3D pose keypoints to BVH skeletal animation
pub mod assignment;
pub mod bvh;
pub mod calibration;
pub mod config;
pub mod error;
pub mod export;
pub mod external;
pub mod keypoints;
pub mod pipeline;
pub mod rotation;
pub mod skeleton;
pub mod smoothing;
pub mod stitch;
pub mod tracking;

pub use bvh::BvhDocument;
pub use calibration::RestPose;
pub use error::{Error, Result};
pub use keypoints::{Keypoint, KeypointFrame, Subject};
pub use rotation::BvhMotionFrame;
pub use skeleton::{ModelVariant, SkeletonTopology};
pub use stitch::{stitch_chunks, StitchParams};
pub use tracking::{LineMatcher, TrackerState};
