// src/config.rs - Optional TOML configuration, every field defaulted
use crate::error::{Error, Result};
use crate::smoothing::SmoothingMethod;
use crate::stitch::StitchParams;
use crate::tracking::LineMatcher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "pose2bvh.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stitch: StitchConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    // External model stages for `run`, executed in order.
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    // Frames per model window
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    // Frames shared by consecutive windows
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    // Hausdorff distance in pixels below which a line keeps its id
    #[serde(default = "default_matching_threshold")]
    pub matching_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default)]
    pub method: SmoothingMethod,
    // Moving-average window in frames
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    // Savitzky-Golay window in frames and polynomial degree
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    #[serde(default = "default_polyorder")]
    pub polyorder: usize,
    // One-Euro sampling rate in Hz
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f64,
}

// One external command. `{chunk_dir}` and `{video_filename_base}` in
// `args` are substituted before running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_chunk_size() -> usize { 243 }
fn default_overlap_size() -> usize { 121 }
fn default_matching_threshold() -> f64 { 25.0 }
fn default_window_size() -> usize { 5 }
fn default_window_length() -> usize { 11 }
fn default_polyorder() -> usize { 2 }
fn default_frequency() -> f64 { 30.0 }
fn default_min_cutoff() -> f64 { 1.0 }
fn default_beta() -> f64 { 0.01 }
fn default_d_cutoff() -> f64 { 1.0 }

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            matching_threshold: default_matching_threshold(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::default(),
            window_size: default_window_size(),
            window_length: default_window_length(),
            polyorder: default_polyorder(),
            frequency: default_frequency(),
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            d_cutoff: default_d_cutoff(),
        }
    }
}

impl StitchConfig {
    pub fn params(&self) -> StitchParams {
        StitchParams {
            chunk_size: self.chunk_size,
            overlap_size: self.overlap_size,
        }
    }
}

impl TrackingConfig {
    pub fn matcher(&self) -> LineMatcher {
        LineMatcher::new(self.matching_threshold)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    // Like `load`, but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
