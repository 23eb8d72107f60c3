// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid keypoint JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write motion CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("input contains no frames")]
    EmptyInput,

    // No frame carries keypoints for the requested subject, so there is
    // nothing to measure rotations against.
    #[error("subject {subject} is not detected in any frame; cannot build a reference pose")]
    NoReferencePose { subject: usize },

    #[error("no chunk files matching {pattern} found in {dir}")]
    NoChunks { dir: PathBuf, pattern: String },

    #[error("{description} failed (exit code {code:?})\n{stderr}")]
    StageFailed {
        description: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("flow field of {width}x{height} needs {expected} vectors, got {actual}")]
    FlowFieldSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
