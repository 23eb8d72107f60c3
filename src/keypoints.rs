// src/keypoints.rs - Per-frame keypoint model and the JSON formats it is read from
use crate::error::{Error, Result};
use nalgebra::Vector3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

// One detected joint. Serialized as `[x, y, z]` or `[x, y, z, confidence]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Keypoint {
    pub position: Vector3<f64>,
    pub confidence: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            confidence: None,
        }
    }

    pub fn with_confidence(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            confidence: Some(confidence),
        }
    }
}

impl TryFrom<Vec<f64>> for Keypoint {
    type Error = String;

    fn try_from(values: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match values.as_slice() {
            [x, y, z] => Ok(Keypoint::new(*x, *y, *z)),
            [x, y, z, c] => Ok(Keypoint::with_confidence(*x, *y, *z, *c)),
            other => Err(format!(
                "keypoint must have 3 or 4 components, got {}",
                other.len()
            )),
        }
    }
}

impl From<Keypoint> for Vec<f64> {
    fn from(kp: Keypoint) -> Self {
        let mut values = vec![kp.position.x, kp.position.y, kp.position.z];
        if let Some(c) = kp.confidence {
            values.push(c);
        }
        values
    }
}

// Keypoints of one person in one frame, ordered by the model's index convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject {
    pub keypoints: Vec<Keypoint>,
}

impl Subject {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    // Position of keypoint `index`, or the origin when the model did not emit it.
    pub fn position(&self, index: usize) -> Vector3<f64> {
        self.keypoints
            .get(index)
            .map(|kp| kp.position)
            .unwrap_or_else(Vector3::zeros)
    }
}

// All subjects detected in one video frame (3D uplift format).
// Array position of a subject carries no identity across frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeypointFrame {
    #[serde(rename = "frame_idx")]
    pub frame_index: usize,
    #[serde(rename = "keypoints", default)]
    pub subjects: Vec<Subject>,
}

impl KeypointFrame {
    pub fn new(frame_index: usize, subjects: Vec<Subject>) -> Self {
        Self {
            frame_index,
            subjects,
        }
    }

    pub fn empty(frame_index: usize) -> Self {
        Self::new(frame_index, Vec::new())
    }

    pub fn subject(&self, index: usize) -> Option<&Subject> {
        self.subjects.get(index).filter(|s| !s.is_empty())
    }
}

// A person as written by the 2D detector: `[x, y, confidence]` per keypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub keypoints: Vec<[f64; 3]>,
}

// One frame of 2D detector output: `{frame_idx, persons: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_idx: usize,
    #[serde(default)]
    pub persons: Vec<Person>,
}

impl From<DetectionFrame> for KeypointFrame {
    fn from(frame: DetectionFrame) -> Self {
        let subjects = frame
            .persons
            .into_iter()
            .map(|person| {
                Subject::new(
                    person
                        .keypoints
                        .iter()
                        .map(|[x, y, c]| Keypoint::with_confidence(*x, *y, 0.0, *c))
                        .collect(),
                )
            })
            .collect();
        KeypointFrame::new(frame.frame_idx, subjects)
    }
}

// Largest number of subjects present in any single frame.
pub fn subject_count(frames: &[KeypointFrame]) -> usize {
    frames.iter().map(|f| f.subjects.len()).max().unwrap_or(0)
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| Error::io(path, e))
}

// Loads a 3D keypoint sequence (`[{frame_idx, keypoints: [[[x,y,z,v],...]]}]`).
pub fn load_frames(path: impl AsRef<Path>) -> Result<Vec<KeypointFrame>> {
    read_json(path)
}

// Loads 2D detector output (`[{frame_idx, persons: [{keypoints}]}]`).
pub fn load_detections(path: impl AsRef<Path>) -> Result<Vec<DetectionFrame>> {
    read_json(path)
}
