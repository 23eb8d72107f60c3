use pose2bvh::keypoints::write_json;
use pose2bvh::pipeline::{convert_file, ConvertOptions};
use pose2bvh::smoothing::{OneEuroParams, Smoothing};
use pose2bvh::{Keypoint, KeypointFrame, ModelVariant, SkeletonTopology, Subject};
use std::fs;
use std::path::Path;

fn lightweight_subject(sway: f64, dx: f64) -> Subject {
    let mut kps = vec![Keypoint::with_confidence(0.0, 0.0, 0.0, 0.0); 19];
    let mut set =
        |i: usize, x: f64, y: f64| kps[i] = Keypoint::with_confidence(x + dx, y, 0.0, 0.9);
    set(0, sway, 1.7);
    set(1, 0.0, 1.5);
    set(2, -0.2, 1.45);
    set(3, -0.45, 1.45 - sway);
    set(4, -0.7, 1.45 - 2.0 * sway);
    set(5, 0.2, 1.45);
    set(6, 0.45, 1.45 + sway);
    set(7, 0.7, 1.45 + 2.0 * sway);
    set(8, -0.1, 1.0);
    set(9, -0.1 + sway, 0.5);
    set(10, -0.1, 0.05);
    set(11, 0.1, 1.0);
    set(12, 0.1, 0.5);
    set(13, 0.1, 0.05);
    Subject::new(kps)
}

fn motion_rows(bvh: &str) -> Vec<Vec<f64>> {
    let motion = bvh.split("Frame Time: ").nth(1).unwrap();
    motion
        .lines()
        .skip(1)
        .map(|line| line.split(' ').map(|v| v.parse().unwrap()).collect())
        .collect()
}

fn options(dir: &Path, variant: ModelVariant) -> ConvertOptions {
    ConvertOptions {
        variant,
        output_dir: dir.join("bvh"),
        video_filename_base: None,
        smoothing: Smoothing::None,
        write_csv: false,
    }
}

#[test]
fn converts_each_lightweight_subject_to_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let frames: Vec<KeypointFrame> = (0..6)
        .map(|i| {
            let sway = 0.02 * i as f64;
            let mut subjects = vec![lightweight_subject(sway, 0.0)];
            if i >= 2 {
                subjects.push(lightweight_subject(-sway, 2.0));
            }
            KeypointFrame::new(i, subjects)
        })
        .collect();
    let input = dir.path().join("dance_vibe_smoothed_3d_keypoints.json");
    write_json(&input, &frames).unwrap();

    let mut opts = options(dir.path(), ModelVariant::Lightweight19);
    opts.write_csv = true;
    let written = convert_file(&input, &opts).unwrap();

    let out = dir.path().join("bvh");
    assert_eq!(
        written,
        vec![out.join("dance_person1.bvh"), out.join("dance_person2.bvh")]
    );
    assert!(out.join("dance_person1_motion.csv").exists());
    assert!(out.join("dance_person2_motion.csv").exists());

    let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
    let first = fs::read_to_string(&written[0]).unwrap();
    assert!(first.starts_with("HIERARCHY\nROOT Hips\n"));
    assert!(first.contains("Frames: 6\nFrame Time: 0.033333\n"));

    let rows = motion_rows(&first);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.len() == topo.channel_count()));
    // calibration frame reproduces the rest pose
    assert!(rows[0][3..].iter().all(|v| v.abs() < 1e-6));
    assert!(rows[5][3..].iter().any(|v| v.abs() > 0.1));

    // second subject is absent in the first two frames
    let second = motion_rows(&fs::read_to_string(&written[1]).unwrap());
    assert_eq!(second.len(), 6);
    assert!(second[0].iter().all(|v| *v == 0.0));
    assert!(second[2][3..].iter().all(|v| v.abs() < 1e-6));
    assert!((second[2][0] - 2.0).abs() < 1e-6);
}

#[test]
fn videopose_writes_only_the_first_subject() {
    let dir = tempfile::tempdir().unwrap();
    let subject = |t: f64| {
        Subject::new(
            (0..17)
                .map(|i| {
                    Keypoint::new((i as f64 * 0.7).sin() + t, i as f64 * 0.1, (i as f64).cos())
                })
                .collect(),
        )
    };
    let frames: Vec<KeypointFrame> = (0..4)
        .map(|i| KeypointFrame::new(i, vec![subject(0.1 * i as f64), subject(5.0)]))
        .collect();
    let input = dir.path().join("jump_videopose3d_stitched_3d_keypoints.json");
    write_json(&input, &frames).unwrap();

    let written = convert_file(&input, &options(dir.path(), ModelVariant::VideoPose17)).unwrap();
    assert_eq!(written, vec![dir.path().join("bvh").join("jump_videopose3d.bvh")]);

    let text = fs::read_to_string(&written[0]).unwrap();
    assert!(text.contains("Frame Time: 0.020000"));
    assert!(text.contains("JOINT Thorax"));
    assert_eq!(motion_rows(&text).len(), 4);
}

#[test]
fn degenerate_hips_and_empty_frames_still_convert() {
    let dir = tempfile::tempdir().unwrap();
    let mut collapsed = lightweight_subject(0.0, 0.0);
    collapsed.keypoints[8] = Keypoint::new(0.0, 0.0, 0.0);
    collapsed.keypoints[11] = Keypoint::new(0.0, 0.0, 0.0);
    let frames = vec![
        KeypointFrame::empty(0),
        KeypointFrame::new(1, vec![collapsed]),
        KeypointFrame::new(2, vec![lightweight_subject(0.05, 0.0)]),
    ];
    let input = dir.path().join("fall.json");
    write_json(&input, &frames).unwrap();

    let mut opts = options(dir.path(), ModelVariant::Lightweight19);
    opts.video_filename_base = Some("custom".to_string());
    let written = convert_file(&input, &opts).unwrap();
    assert_eq!(written[0].file_name().unwrap(), "custom_person1.bvh");

    let text = fs::read_to_string(&written[0]).unwrap();
    assert!(!text.contains("NaN"));
    let rows = motion_rows(&text);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().flatten().all(|v| v.is_finite()));
}

#[test]
fn smoothing_preserves_frame_count() {
    let dir = tempfile::tempdir().unwrap();
    let frames: Vec<KeypointFrame> = (0..10)
        .map(|i| KeypointFrame::new(i, vec![lightweight_subject(0.03 * (i % 3) as f64, 0.0)]))
        .collect();
    let input = dir.path().join("wave.json");
    write_json(&input, &frames).unwrap();

    for smoothing in [
        Smoothing::MovingAverage { window: 5 },
        Smoothing::OneEuro(OneEuroParams::default()),
    ] {
        let mut opts = options(dir.path(), ModelVariant::Lightweight19);
        opts.smoothing = smoothing;
        let written = convert_file(&input, &opts).unwrap();
        let rows = motion_rows(&fs::read_to_string(&written[0]).unwrap());
        assert_eq!(rows.len(), 10);
    }
}

#[test]
fn malformed_input_reports_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.json");
    fs::write(&input, "[{\"frame_idx\": 0, \"keypoints\": [[[1, 2]]]}]").unwrap();
    let err = convert_file(&input, &options(dir.path(), ModelVariant::Lightweight19)).unwrap_err();
    assert!(matches!(err, pose2bvh::Error::Json { .. }));
}
