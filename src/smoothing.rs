// src/smoothing.rs - Temporal filtering of keypoint trajectories before calibration
use crate::config::SmoothingConfig;
use crate::keypoints::{subject_count, KeypointFrame};
use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    #[default]
    None,
    MovingAverage,
    Savgol,
    OneEuro,
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SmoothingMethod::None => "none",
            SmoothingMethod::MovingAverage => "moving_average",
            SmoothingMethod::Savgol => "savgol",
            SmoothingMethod::OneEuro => "one_euro",
        })
    }
}

impl FromStr for SmoothingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SmoothingMethod::None),
            "moving_average" => Ok(SmoothingMethod::MovingAverage),
            "savgol" => Ok(SmoothingMethod::Savgol),
            "one_euro" => Ok(SmoothingMethod::OneEuro),
            other => Err(format!(
                "unknown smoothing method '{other}' \
                 (expected none, moving_average, savgol or one_euro)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneEuroParams {
    // Sampling rate in Hz.
    pub frequency: f64,
    pub min_cutoff: f64,
    pub beta: f64,
    pub d_cutoff: f64,
}

impl Default for OneEuroParams {
    fn default() -> Self {
        Self {
            frequency: 30.0,
            min_cutoff: 1.0,
            beta: 0.01,
            d_cutoff: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    None,
    // Centred average over `window` frames.
    MovingAverage { window: usize },
    // Savitzky-Golay: least-squares polynomial of degree `polyorder` over
    // `window` samples, evaluated at each sample
    Savgol { window: usize, polyorder: usize },
    OneEuro(OneEuroParams),
}

impl Smoothing {
    pub fn from_config(config: &SmoothingConfig) -> Self {
        match config.method {
            SmoothingMethod::None => Smoothing::None,
            SmoothingMethod::MovingAverage => Smoothing::MovingAverage {
                window: config.window_size,
            },
            SmoothingMethod::Savgol => Smoothing::Savgol {
                window: config.window_length,
                polyorder: config.polyorder,
            },
            SmoothingMethod::OneEuro => Smoothing::OneEuro(OneEuroParams {
                frequency: config.frequency,
                min_cutoff: config.min_cutoff,
                beta: config.beta,
                d_cutoff: config.d_cutoff,
            }),
        }
    }
}

struct LowPassFilter {
    prev: Option<f64>,
}

impl LowPassFilter {
    fn new() -> Self {
        Self { prev: None }
    }

    fn filter(&mut self, value: f64, alpha: f64) -> f64 {
        let result = match self.prev {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.prev = Some(result);
        result
    }
}

// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f64, cutoff: f64) -> f64 {
    let r = 2.0 * std::f64::consts::PI * cutoff * te;
    r / (r + 1.0)
}

struct ScalarFilter {
    params: OneEuroParams,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f64>,
}

impl ScalarFilter {
    fn new(params: OneEuroParams) -> Self {
        Self {
            params,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            prev_value: None,
        }
    }

    fn filter(&mut self, value: f64, dt: f64) -> f64 {
        let dx = match self.prev_value {
            Some(prev) if dt > 0.0 => (value - prev) / dt,
            _ => 0.0,
        };
        self.prev_value = Some(value);

        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(dt, self.params.d_cutoff));
        let cutoff = self.params.min_cutoff + self.params.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(dt, cutoff))
    }
}

// One present sample of a keypoint trajectory.
struct Sample {
    slot: usize,
    frame_index: usize,
    position: Vector3<f64>,
}

fn moving_average(samples: &[Sample], window: usize) -> Vec<Vector3<f64>> {
    // even windows reach one frame further back than forward
    let back = window / 2;
    let ahead = window.saturating_sub(1) / 2;
    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let lo = sample.frame_index.saturating_sub(back);
            let hi = sample.frame_index + ahead;
            let before = samples[..i]
                .iter()
                .rev()
                .take_while(|s| s.frame_index >= lo);
            let after = samples[i..].iter().take_while(|s| s.frame_index <= hi);

            let (sum, count) = before.chain(after).fold(
                (Vector3::<f64>::zeros(), 0usize),
                |(sum, n), s| (sum + s.position, n + 1),
            );
            sum / count as f64
        })
        .collect()
}

fn one_euro(samples: &[Sample], params: OneEuroParams) -> Vec<Vector3<f64>> {
    let period = 1.0 / params.frequency;
    let mut axes: [ScalarFilter; 3] = std::array::from_fn(|_| ScalarFilter::new(params));
    let mut last_frame: Option<usize> = None;

    samples
        .iter()
        .map(|sample| {
            let frames =
                last_frame.map_or(1, |prev| sample.frame_index.saturating_sub(prev).max(1));
            last_frame = Some(sample.frame_index);
            let dt = frames as f64 * period;
            Vector3::new(
                axes[0].filter(sample.position.x, dt),
                axes[1].filter(sample.position.y, dt),
                axes[2].filter(sample.position.z, dt),
            )
        })
        .collect()
}

// Windows are shifted inward at the ends of the track so every fit uses a
// full window, and abscissae are frame indices so gaps keep their spacing.
fn savgol(samples: &[Sample], window: usize, polyorder: usize) -> Vec<Vector3<f64>> {
    let n = samples.len();
    let len = window.clamp(1, n.max(1));
    let degree = polyorder.min(len - 1);

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(len / 2).min(n - len);
            let span = &samples[start..start + len];
            let origin = samples[i].frame_index as f64;

            let vandermonde = DMatrix::from_fn(len, degree + 1, |r, c| {
                (span[r].frame_index as f64 - origin).powi(c as i32)
            });
            let targets = DMatrix::from_fn(len, 3, |r, c| span[r].position[c]);

            // the fitted polynomial's value at the sample is its constant term
            let normal = vandermonde.transpose() * &vandermonde;
            match normal.cholesky() {
                Some(cholesky) => {
                    let coeffs = cholesky.solve(&(vandermonde.transpose() * targets));
                    Vector3::new(coeffs[(0, 0)], coeffs[(0, 1)], coeffs[(0, 2)])
                }
                None => samples[i].position,
            }
        })
        .collect()
}

// Smooths every keypoint trajectory in place, per subject slot.
// Frames where the subject or keypoint is missing are skipped rather than
// treated as zeros. Confidences are left untouched.
pub fn smooth_frames(frames: &mut [KeypointFrame], smoothing: &Smoothing) {
    match smoothing {
        Smoothing::None => return,
        Smoothing::MovingAverage { window } if *window < 2 => return,
        Smoothing::Savgol { window, polyorder } if *polyorder + 1 >= *window => return,
        _ => {}
    }

    let subjects = subject_count(frames);
    for subject in 0..subjects {
        let width = frames
            .iter()
            .filter_map(|f| f.subject(subject))
            .map(|s| s.keypoints.len())
            .max()
            .unwrap_or(0);

        for keypoint in 0..width {
            let samples: Vec<Sample> = frames
                .iter()
                .enumerate()
                .filter_map(|(slot, frame)| {
                    let kp = frame.subject(subject)?.keypoints.get(keypoint)?;
                    Some(Sample {
                        slot,
                        frame_index: frame.frame_index,
                        position: kp.position,
                    })
                })
                .collect();

            let smoothed = match *smoothing {
                Smoothing::MovingAverage { window } => moving_average(&samples, window),
                Smoothing::Savgol { window, polyorder } => savgol(&samples, window, polyorder),
                Smoothing::OneEuro(params) => one_euro(&samples, params),
                Smoothing::None => continue,
            };

            for (sample, position) in samples.iter().zip(smoothed) {
                frames[sample.slot].subjects[subject].keypoints[keypoint].position = position;
            }
        }
    }

    debug!(?smoothing, subjects, frames = frames.len(), "smoothed keypoints");
}
