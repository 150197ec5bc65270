// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;

/// Result alias used across the data pipeline.
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised while loading, slicing or batching ocean fields.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse subdomains file {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("zarr store {path:?}: {message}")]
    Zarr { path: PathBuf, message: String },
    #[error("invalid bounding box {index}: {reason}")]
    InvalidBoundingBox { index: usize, reason: String },
    #[error("variable '{name}' is missing from the dataset")]
    MissingVariable { name: String },
    #[error("variable '{name}' has shape {got:?} but the grid is {expected:?}")]
    VariableShape {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("bounding box selects no grid points along {axis}")]
    EmptySelection { axis: &'static str },
    #[error("split fraction {label} = {value} must lie in [0, 1]")]
    SplitFraction { label: &'static str, value: f64 },
    #[error("test split starts at {test_start} before the train split ends at {train_end}")]
    OverlappingSplits { train_end: f64, test_start: f64 },
    #[error("target crop {requested:?} exceeds the subdomain grid {available:?}")]
    CropTooLarge {
        requested: (usize, usize),
        available: (usize, usize),
    },
    #[error("channel {channel} has unusable scale {value}")]
    InvalidScale { channel: usize, value: f32 },
    #[error("sample index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("datasets disagree on {what}: {left} vs {right}")]
    Incompatible {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("prefetch worker stopped unexpectedly")]
    WorkerDisconnected,
}
