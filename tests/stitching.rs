use pose2bvh::keypoints::{load_frames, read_json, write_json, DetectionFrame, Person};
use pose2bvh::pipeline::{stitch_directory, StitchOptions};
use pose2bvh::stitch::CombinedFrame;
use pose2bvh::{Keypoint, KeypointFrame, StitchParams, Subject};
use std::fs;
use std::path::Path;

fn pose(chunk: usize, frame: usize) -> Subject {
    Subject::new(
        (0..17)
            .map(|j| {
                let t = frame as f64 * 0.01 + j as f64;
                let x = t.sin() + chunk as f64 * 0.001;
                Keypoint::with_confidence(x, j as f64 * 0.1, t.cos(), 1.0)
            })
            .collect(),
    )
}

fn assert_same_pose(actual: &Subject, expected: &Subject) {
    assert_eq!(actual.keypoints.len(), expected.keypoints.len());
    for (a, e) in actual.keypoints.iter().zip(&expected.keypoints) {
        assert!((a.position - e.position).norm() < 1e-9, "{a:?} != {e:?}");
    }
}

fn write_chunk(dir: &Path, base: &str, chunk: usize, frames: std::ops::Range<usize>, suffix: &str) {
    let frames: Vec<KeypointFrame> = frames
        .map(|i| KeypointFrame::new(i, vec![pose(chunk, i)]))
        .collect();
    write_json(dir.join(format!("{base}_chunk{chunk}{suffix}")), &frames).unwrap();
}

fn options(dir: &Path, base: &str) -> StitchOptions {
    StitchOptions {
        chunk_dir: dir.to_path_buf(),
        video_filename_base: base.to_string(),
        video_length: None,
        output_dir: dir.join("out"),
        params: StitchParams::default(),
        write_csv: false,
    }
}

#[test]
fn two_overlapping_chunks_cover_the_whole_video() {
    let dir = tempfile::tempdir().unwrap();
    let suffix = "_videopose3d_smoothed_3d_keypoints.json";
    write_chunk(dir.path(), "clip", 0, 0..243, suffix);
    write_chunk(dir.path(), "clip", 1, 122..365, suffix);

    let outputs = stitch_directory(&options(dir.path(), "clip")).unwrap();
    let out = dir.path().join("out");
    assert_eq!(
        outputs.stitched_json,
        out.join("clip_videopose3d_stitched_3d_keypoints.json")
    );
    assert_eq!(outputs.combined_json, None);
    assert_eq!(outputs.bvh_files, vec![out.join("clip_videopose3d.bvh")]);

    let stitched = load_frames(&outputs.stitched_json).unwrap();
    assert_eq!(stitched.len(), 365);
    assert!(stitched.iter().enumerate().all(|(i, f)| f.frame_index == i));
    assert_same_pose(&stitched[200].subjects[0], &pose(0, 200));
    assert_same_pose(&stitched[300].subjects[0], &pose(1, 300));

    let bvh = fs::read_to_string(&outputs.bvh_files[0]).unwrap();
    assert!(bvh.contains("Frames: 365\nFrame Time: 0.020000\n"));
}

#[test]
fn explicit_length_pads_with_empty_frames() {
    let dir = tempfile::tempdir().unwrap();
    write_chunk(dir.path(), "run", 0, 0..5, "_videopose3d_3d_keypoints.json");

    let mut opts = options(dir.path(), "run");
    opts.video_length = Some(8);
    opts.output_dir = dir.path().to_path_buf();
    let outputs = stitch_directory(&opts).unwrap();

    let stitched = load_frames(&outputs.stitched_json).unwrap();
    assert_eq!(stitched.len(), 8);
    assert_eq!(stitched[6], KeypointFrame::empty(6));

    let bvh = fs::read_to_string(&outputs.bvh_files[0]).unwrap();
    let last = bvh.lines().last().unwrap();
    assert!(last.split(' ').all(|v| v == "0.000000"));
}

#[test]
fn detections_are_combined_with_stitched_frames() {
    let dir = tempfile::tempdir().unwrap();
    write_chunk(dir.path(), "walk", 0, 0..3, "_videopose3d_smoothed_3d_keypoints.json");
    let detections: Vec<DetectionFrame> = (0..3)
        .map(|i| DetectionFrame {
            frame_idx: i,
            persons: vec![Person {
                keypoints: vec![[i as f64, 2.0, 0.5]; 17],
            }],
        })
        .collect();
    write_json(dir.path().join("walk_chunk0_2d_keypoints.json"), &detections).unwrap();

    let outputs = stitch_directory(&options(dir.path(), "walk")).unwrap();
    let combined_path = outputs.combined_json.expect("combined file");
    assert_eq!(
        combined_path.file_name().unwrap(),
        "walk_final_combined_keypoints.json"
    );

    let combined: Vec<CombinedFrame> = read_json(&combined_path).unwrap();
    assert_eq!(combined.len(), 3);
    assert_eq!(combined[2].keypoints_2d[0][0], [2.0, 2.0, 0.5]);
    assert_same_pose(&combined[2].keypoints_3d[0], &pose(0, 2));
}
