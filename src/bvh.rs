// src/bvh.rs - Textual BVH writer
use crate::calibration::RestPose;
use crate::error::{Error, Result};
use crate::rotation::BvhMotionFrame;
use crate::skeleton::{ModelVariant, SkeletonTopology};
use nalgebra::Vector3;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

// Stem endings the model stages append to a video's base name.
pub const MODEL_SUFFIXES: &[&str] = &[
    "_vibe_smoothed_3d_keypoints",
    "_videopose3d_smoothed_3d_keypoints",
    "_mediapipe_smoothed_3d_keypoints",
    "_videopose3d_stitched_3d_keypoints",
];

// Video base name for a keypoint file stem, with any model suffix removed.
pub fn video_base(stem: &str) -> &str {
    MODEL_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(stem)
}

// `<base>_person<N>.bvh` (1-based) or `<base>_videopose3d.bvh`.
pub fn bvh_file_name(base: &str, variant: ModelVariant, subject: usize) -> String {
    match variant {
        ModelVariant::Lightweight19 => format!("{base}_person{}.bvh", subject + 1),
        ModelVariant::VideoPose17 => format!("{base}_videopose3d.bvh"),
    }
}

#[derive(Debug, Clone)]
pub struct BvhDocument<'a> {
    pub topology: &'a SkeletonTopology,
    pub offsets: Vec<Vector3<f64>>,
    pub frame_time: f64,
    pub frames: Vec<BvhMotionFrame>,
}

// Rounds to the six printed decimals first so values that would print as
// "-0.000000" become a positive zero.
pub(crate) fn fixed(value: f64) -> f64 {
    (value * 1e6).round() / 1e6 + 0.0
}

impl<'a> BvhDocument<'a> {
    pub fn new(
        topology: &'a SkeletonTopology,
        rest: &RestPose,
        frames: Vec<BvhMotionFrame>,
    ) -> Self {
        Self {
            topology,
            offsets: rest.offsets.clone(),
            frame_time: topology.variant.frame_time(),
            frames,
        }
    }

    fn write_joint(&self, out: &mut String, index: usize, depth: usize) -> fmt::Result {
        let joint = &self.topology.joints[index];
        let indent = "  ".repeat(depth);
        let keyword = if joint.is_root() { "ROOT" } else { "JOINT" };
        let offset = self.offsets[index];

        writeln!(out, "{indent}{keyword} {}", joint.name)?;
        writeln!(out, "{indent}{{")?;
        writeln!(
            out,
            "{indent}  OFFSET {:.6} {:.6} {:.6}",
            fixed(offset.x),
            fixed(offset.y),
            fixed(offset.z)
        )?;
        let channels: Vec<&str> = joint.channels.iter().map(|c| c.name()).collect();
        writeln!(
            out,
            "{indent}  CHANNELS {} {}",
            channels.len(),
            channels.join(" ")
        )?;

        for &child in &joint.children {
            self.write_joint(out, child, depth + 1)?;
        }

        if joint.is_leaf() {
            writeln!(out, "{indent}  End Site")?;
            writeln!(out, "{indent}  {{")?;
            writeln!(out, "{indent}    OFFSET 0.000000 0.000000 0.000000")?;
            writeln!(out, "{indent}  }}")?;
        }

        writeln!(out, "{indent}}}")
    }

    pub fn hierarchy(&self) -> String {
        let mut out = String::from("HIERARCHY\n");
        // writing into a String cannot fail
        let _ = self.write_joint(&mut out, 0, 0);
        out
    }

    pub fn motion(&self) -> String {
        let mut out = String::from("MOTION\n");
        let _ = writeln!(out, "Frames: {}", self.frames.len());
        let _ = writeln!(out, "Frame Time: {:.6}", self.frame_time);
        for frame in &self.frames {
            let line: Vec<String> = frame
                .values
                .iter()
                .map(|v| format!("{:.6}", fixed(*v)))
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(|e| Error::io(path, e))
    }
}

impl fmt::Display for BvhDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hierarchy())?;
        f.write_str(&self.motion())
    }
}
