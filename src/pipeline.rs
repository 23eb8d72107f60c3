// src/pipeline.rs - End-to-end conversion and chunk stitching
use crate::bvh::{bvh_file_name, video_base, BvhDocument};
use crate::calibration::RestPose;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::MotionExporter;
use crate::external::ExternalStage;
use crate::keypoints::{load_detections, load_frames, subject_count, write_json, KeypointFrame};
use crate::rotation::{extract_motion_frame, BvhMotionFrame};
use crate::skeleton::{ModelVariant, SkeletonTopology};
use crate::smoothing::{smooth_frames, Smoothing};
use crate::stitch::{
    combine_frames, discover_chunks, inferred_length, plan_chunks, stitch_chunks, StitchParams,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SMOOTHED_CHUNK_SUFFIX: &str = "_videopose3d_smoothed_3d_keypoints.json";
pub const RAW_CHUNK_SUFFIX: &str = "_videopose3d_3d_keypoints.json";
pub const DETECTION_CHUNK_SUFFIX: &str = "_2d_keypoints.json";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub variant: ModelVariant,
    pub output_dir: PathBuf,
    // Overrides the base name derived from the input file.
    pub video_filename_base: Option<String>,
    pub smoothing: Smoothing,
    pub write_csv: bool,
}

#[derive(Debug, Clone)]
pub struct StitchOptions {
    pub chunk_dir: PathBuf,
    pub video_filename_base: String,
    // Defaults to the highest predicted frame index plus one.
    pub video_length: Option<usize>,
    pub output_dir: PathBuf,
    pub params: StitchParams,
    pub write_csv: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchOutputs {
    pub stitched_json: PathBuf,
    pub combined_json: Option<PathBuf>,
    pub bvh_files: Vec<PathBuf>,
}

// Motion lines for one subject slot. Frames where the slot is empty get an
// all-zero line so the line count always matches the frame count.
pub fn motion_frames(
    topology: &SkeletonTopology,
    rest: &RestPose,
    frames: &[KeypointFrame],
    subject_index: usize,
) -> Vec<BvhMotionFrame> {
    frames
        .iter()
        .map(|frame| match frame.subject(subject_index) {
            Some(subject) => extract_motion_frame(topology, rest, subject),
            None => BvhMotionFrame::rest(topology),
        })
        .collect()
}

// Writes one BVH per subject (only the first for VideoPose17) and returns
// the written paths.
pub fn write_bvh_files(
    frames: &[KeypointFrame],
    variant: ModelVariant,
    base: &str,
    output_dir: &Path,
    write_csv: bool,
) -> Result<Vec<PathBuf>> {
    if frames.is_empty() {
        return Err(Error::EmptyInput);
    }

    let topology = SkeletonTopology::get(variant);
    let subjects = match variant {
        ModelVariant::Lightweight19 => subject_count(frames).max(1),
        ModelVariant::VideoPose17 => 1,
    };
    info!(frames = frames.len(), subjects, %variant, "converting keypoints");

    fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;
    let exporter = MotionExporter::new(output_dir);
    let mut written = Vec::new();

    for subject in 0..subjects {
        let rest = match RestPose::calibrate(topology, frames, subject) {
            Ok(rest) => rest,
            Err(Error::NoReferencePose { .. }) if subjects > 1 => {
                warn!(subject, "subject never detected, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };

        let motion = motion_frames(topology, &rest, frames, subject);
        let document = BvhDocument::new(topology, &rest, motion);
        let file_name = bvh_file_name(base, variant, subject);
        let path = output_dir.join(&file_name);
        document.write_to(&path)?;
        info!(
            path = %path.display(),
            frames = document.frames.len(),
            rest_frame = rest.frame_index,
            "BVH written"
        );

        if write_csv {
            let stem = file_name.trim_end_matches(".bvh");
            exporter.export_csv(stem, &document)?;
        }
        written.push(path);
    }

    if written.is_empty() {
        return Err(Error::NoReferencePose { subject: 0 });
    }
    Ok(written)
}

pub fn convert_file(input: &Path, options: &ConvertOptions) -> Result<Vec<PathBuf>> {
    let mut frames = load_frames(input)?;
    info!(path = %input.display(), frames = frames.len(), "keypoints loaded");

    smooth_frames(&mut frames, &options.smoothing);

    let base = match &options.video_filename_base {
        Some(base) => base.clone(),
        None => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            video_base(&stem).to_string()
        }
    };

    write_bvh_files(
        &frames,
        options.variant,
        &base,
        &options.output_dir,
        options.write_csv,
    )
}

// Stitches the per-chunk VideoPose3D predictions in `chunk_dir` and writes
// the stitched JSON, the combined 2D/3D overlay JSON and the BVH.
pub fn stitch_directory(options: &StitchOptions) -> Result<StitchOutputs> {
    let base = options.video_filename_base.as_str();
    let mut chunk_files = discover_chunks(&options.chunk_dir, base, SMOOTHED_CHUNK_SUFFIX)?;
    if chunk_files.is_empty() {
        chunk_files = discover_chunks(&options.chunk_dir, base, RAW_CHUNK_SUFFIX)?;
    }
    if chunk_files.is_empty() {
        return Err(Error::NoChunks {
            dir: options.chunk_dir.clone(),
            pattern: format!("{base}_chunk*{SMOOTHED_CHUNK_SUFFIX}"),
        });
    }

    let chunks = chunk_files
        .iter()
        .map(load_frames)
        .collect::<Result<Vec<_>>>()?;

    let video_length = options
        .video_length
        .unwrap_or_else(|| inferred_length(&chunks));
    if video_length == 0 {
        return Err(Error::EmptyInput);
    }

    let planned = plan_chunks(video_length, options.params);
    if planned.len() != chunks.len() {
        warn!(
            found = chunks.len(),
            expected = planned.len(),
            chunk_size = options.params.chunk_size,
            overlap_size = options.params.overlap_size,
            "chunk count does not match the window plan"
        );
    }

    let stitched = stitch_chunks(&chunks, video_length);

    fs::create_dir_all(&options.output_dir).map_err(|e| Error::io(&options.output_dir, e))?;
    let stitched_json = options
        .output_dir
        .join(format!("{base}_videopose3d_stitched_3d_keypoints.json"));
    write_json(&stitched_json, &stitched)?;
    info!(path = %stitched_json.display(), "stitched keypoints written");

    let detection_files = discover_chunks(&options.chunk_dir, base, DETECTION_CHUNK_SUFFIX)?;
    let combined_json = if detection_files.is_empty() {
        None
    } else {
        let detections = detection_files
            .iter()
            .map(load_detections)
            .collect::<Result<Vec<_>>>()?;
        let path = options
            .output_dir
            .join(format!("{base}_final_combined_keypoints.json"));
        write_json(&path, &combine_frames(&stitched, &detections))?;
        info!(path = %path.display(), "combined 2D/3D keypoints written");
        Some(path)
    };

    let bvh_files = write_bvh_files(
        &stitched,
        ModelVariant::VideoPose17,
        base,
        &options.output_dir,
        options.write_csv,
    )?;

    Ok(StitchOutputs {
        stitched_json,
        combined_json,
        bvh_files,
    })
}

// Runs every configured stage in order, stopping at the first failure.
pub fn run_stages(config: &Config, chunk_dir: &Path, video_filename_base: &str) -> Result<()> {
    let chunk_dir = chunk_dir.to_string_lossy();
    let vars = [
        ("chunk_dir", &*chunk_dir),
        ("video_filename_base", video_filename_base),
    ];
    for (i, stage) in config.stages.iter().enumerate() {
        info!(step = i + 1, total = config.stages.len(), "pipeline stage");
        ExternalStage::from_config(stage, &vars).run()?;
    }
    Ok(())
}
