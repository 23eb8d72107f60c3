// src/tracking.rs - Frame-to-frame line identity via optical flow and Hungarian matching
use crate::assignment::linear_sum_assignment;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, Point2, Point3, Vector2};
use tracing::debug;

// Dense per-pixel motion between two consecutive frames, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: usize,
    height: usize,
    vectors: Vec<Vector2<f32>>,
}

impl FlowField {
    pub fn new(width: usize, height: usize, vectors: Vec<Vector2<f32>>) -> Result<Self> {
        let expected = width * height;
        if vectors.len() != expected {
            return Err(Error::FlowFieldSize {
                width,
                height,
                expected,
                actual: vectors.len(),
            });
        }
        Ok(Self {
            width,
            height,
            vectors,
        })
    }

    pub fn uniform(width: usize, height: usize, displacement: Vector2<f32>) -> Self {
        Self {
            width,
            height,
            vectors: vec![displacement; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    // Displacement at pixel `(x, y)`, `None` outside the field.
    pub fn sample(&self, x: usize, y: usize) -> Option<Vector2<f32>> {
        if x < self.width && y < self.height {
            Some(self.vectors[y * self.width + x])
        } else {
            None
        }
    }

    // Moves `point` by the flow at the pixel containing it.
    pub fn advect(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        if point.x < 0.0 || point.y < 0.0 || !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        let flow = self.sample(point.x as usize, point.y as usize)?;
        Some(Point2::new(
            point.x + f64::from(flow.x),
            point.y + f64::from(flow.y),
        ))
    }
}

// A line found in the current frame, before identity is known.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDetection {
    // Image-space footprint used for matching.
    pub points_2d: Vec<Point2<f64>>,
    pub layer: String,
    pub points_3d: Vec<Point3<f64>>,
    pub pressure: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedLine3D {
    pub id: usize,
    pub layer: String,
    pub points_3d: Vec<Point3<f64>>,
    pub pressure: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    pub line: TrackedLine3D,
    // Last observed 2D footprint, advected by the next frame's flow.
    pub footprint: Vec<Point2<f64>>,
}

impl TrackedEntry {
    fn from_detection(id: usize, detection: LineDetection) -> Self {
        Self {
            line: TrackedLine3D {
                id,
                layer: detection.layer,
                points_3d: detection.points_3d,
                pressure: detection.pressure,
            },
            footprint: detection.points_2d,
        }
    }
}

// Live line registry. A line's id is its slot index; dropped slots stay
// empty so ids are never handed out twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    slots: Vec<Option<TrackedEntry>>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: usize) -> Option<&TrackedEntry> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn live(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.slots.iter().flatten()
    }

    pub fn live_ids(&self) -> Vec<usize> {
        self.live().map(|e| e.line.id).collect()
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn next_id(&self) -> usize {
        self.slots.len()
    }

    fn insert(&mut self, detection: LineDetection) -> usize {
        let id = self.slots.len();
        self.slots.push(Some(TrackedEntry::from_detection(id, detection)));
        id
    }

    fn replace(&mut self, id: usize, detection: LineDetection) {
        self.slots[id] = Some(TrackedEntry::from_detection(id, detection));
    }

    fn remove(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }
}

// Outcome of one frame, detections referenced by their input index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMatches {
    pub continued: Vec<(usize, usize)>,
    pub created: Vec<(usize, usize)>,
    pub dropped: Vec<usize>,
}

// Largest distance from a point of `from` to its nearest point in `to`.
// `None` when either set is empty.
pub fn directed_hausdorff(from: &[Point2<f64>], to: &[Point2<f64>]) -> Option<f64> {
    if from.is_empty() || to.is_empty() {
        return None;
    }
    let worst = from
        .iter()
        .map(|a| {
            to.iter()
                .map(|b| nalgebra::distance(a, b))
                .fold(f64::INFINITY, f64::min)
        })
        .fold(0.0, f64::max);
    Some(worst)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMatcher {
    // Pixel distance at or above which a pair is never a continuation.
    pub matching_threshold: f64,
}

impl Default for LineMatcher {
    fn default() -> Self {
        Self {
            matching_threshold: 25.0,
        }
    }
}

impl LineMatcher {
    pub fn new(matching_threshold: f64) -> Self {
        Self { matching_threshold }
    }

    // Resolves identities for `detections` against the registry and returns
    // the updated registry.
    pub fn match_frame(
        &self,
        mut state: TrackerState,
        detections: Vec<LineDetection>,
        flow: Option<&FlowField>,
    ) -> (TrackerState, FrameMatches) {
        let mut matches = FrameMatches::default();
        let previous = state.live_ids();

        let flow = match flow {
            Some(flow) if !previous.is_empty() => flow,
            _ => {
                for id in previous {
                    state.remove(id);
                    matches.dropped.push(id);
                }
                for (i, detection) in detections.into_iter().enumerate() {
                    let id = state.insert(detection);
                    matches.created.push((i, id));
                }
                debug!(
                    created = matches.created.len(),
                    dropped = matches.dropped.len(),
                    "no flow or empty registry, all lines new"
                );
                return (state, matches);
            }
        };

        let predictions: Vec<Vec<Point2<f64>>> = previous
            .iter()
            .map(|&id| {
                state
                    .get(id)
                    .map(|e| e.footprint.iter().filter_map(|p| flow.advect(p)).collect())
                    .unwrap_or_default()
            })
            .collect();

        let cost = self.cost_matrix(&detections, &predictions);
        let mut matched_to: Vec<Option<usize>> = vec![None; detections.len()];
        let mut kept = vec![false; previous.len()];
        for (i, j) in linear_sum_assignment(&cost) {
            if cost[(i, j)] < self.matching_threshold {
                matched_to[i] = Some(previous[j]);
                kept[j] = true;
            }
        }

        for (j, &id) in previous.iter().enumerate() {
            if !kept[j] {
                state.remove(id);
                matches.dropped.push(id);
            }
        }

        for (i, detection) in detections.into_iter().enumerate() {
            match matched_to[i] {
                Some(id) => {
                    state.replace(id, detection);
                    matches.continued.push((i, id));
                }
                None => {
                    let id = state.insert(detection);
                    matches.created.push((i, id));
                }
            }
        }

        debug!(
            continued = matches.continued.len(),
            created = matches.created.len(),
            dropped = matches.dropped.len(),
            "matched frame"
        );
        (state, matches)
    }

    // `cost[(detection, prediction)]`, clamped to the threshold.
    pub fn cost_matrix(
        &self,
        detections: &[LineDetection],
        predictions: &[Vec<Point2<f64>>],
    ) -> DMatrix<f64> {
        DMatrix::from_fn(detections.len(), predictions.len(), |i, j| {
            directed_hausdorff(&detections[i].points_2d, &predictions[j])
                .map_or(self.matching_threshold, |d| d.min(self.matching_threshold))
        })
    }
}
