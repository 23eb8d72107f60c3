// src/stitch.rs - Merging overlapping per-chunk predictions into one continuous track
use crate::error::{Error, Result};
use crate::keypoints::{DetectionFrame, KeypointFrame, Subject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchParams {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self {
            chunk_size: 243,
            overlap_size: 121,
        }
    }
}

impl StitchParams {
    // Distance between the starts of consecutive chunks, at least one frame.
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap_size).max(1)
    }
}

// `[start, end)` frame windows covering `video_length` frames.
pub fn plan_chunks(video_length: usize, params: StitchParams) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    if video_length == 0 || params.chunk_size == 0 {
        return windows;
    }
    let mut start = 0;
    loop {
        let end = (start + params.chunk_size).min(video_length);
        windows.push((start, end));
        if end == video_length {
            break;
        }
        start += params.stride();
    }
    windows
}

// Collapses chunk predictions into exactly `video_length` frames.
// Frame `i` of the result has `frame_index == i`. A frame predicted by several
// chunks keeps the earliest chunk's prediction; frames nobody predicted are
// empty placeholders, and predictions at or past `video_length` are ignored.
pub fn stitch_chunks(chunks: &[Vec<KeypointFrame>], video_length: usize) -> Vec<KeypointFrame> {
    let mut stitched: Vec<Option<&KeypointFrame>> = vec![None; video_length];
    let mut overlapping = 0usize;

    for frame in chunks.iter().flatten() {
        match stitched.get_mut(frame.frame_index) {
            Some(slot) if slot.is_none() => *slot = Some(frame),
            Some(_) => overlapping += 1,
            None => debug!(frame = frame.frame_index, "prediction beyond video length ignored"),
        }
    }

    let missing = stitched.iter().filter(|f| f.is_none()).count();
    info!(
        chunks = chunks.len(),
        frames = video_length,
        overlapping,
        missing,
        "stitched chunk predictions"
    );

    stitched
        .into_iter()
        .enumerate()
        .map(|(i, frame)| frame.cloned().unwrap_or_else(|| KeypointFrame::empty(i)))
        .collect()
}

// Length implied by the predictions themselves: highest frame index plus one.
pub fn inferred_length(chunks: &[Vec<KeypointFrame>]) -> usize {
    chunks
        .iter()
        .flatten()
        .map(|f| f.frame_index + 1)
        .max()
        .unwrap_or(0)
}

// Numeric chunk index in `<base>_chunk<k><suffix>`.
fn chunk_index(file_name: &str, base: &str, suffix: &str) -> Option<usize> {
    file_name
        .strip_prefix(base)?
        .strip_prefix("_chunk")?
        .strip_suffix(suffix)?
        .parse()
        .ok()
}

// Finds `<base>_chunk<k><suffix>` files in `dir`, ordered by `k`.
pub fn discover_chunks(dir: impl AsRef<Path>, base: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut found = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| chunk_index(n, base, suffix));
        if let Some(index) = index {
            found.push((index, path));
        }
    }

    found.sort_by_key(|(index, _)| *index);
    debug!(dir = %dir.display(), count = found.len(), suffix, "discovered chunk files");
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

// Overlay frame pairing stitched 3D subjects with the raw 2D detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedFrame {
    pub frame_idx: usize,
    pub keypoints_3d: Vec<Subject>,
    pub keypoints_2d: Vec<Vec<[f64; 3]>>,
}

// Joins stitched 3D frames with 2D detections by frame index. Where chunks
// overlap, the earliest chunk's detections are used, matching the 3D side.
pub fn combine_frames(
    stitched: &[KeypointFrame],
    detections: &[Vec<DetectionFrame>],
) -> Vec<CombinedFrame> {
    let mut by_frame: BTreeMap<usize, &DetectionFrame> = BTreeMap::new();
    for frame in detections.iter().flatten() {
        by_frame.entry(frame.frame_idx).or_insert(frame);
    }

    stitched
        .iter()
        .map(|frame| CombinedFrame {
            frame_idx: frame.frame_index,
            keypoints_3d: frame.subjects.clone(),
            keypoints_2d: by_frame
                .get(&frame.frame_index)
                .map(|d| d.persons.iter().map(|p| p.keypoints.clone()).collect())
                .unwrap_or_default(),
        })
        .collect()
}
