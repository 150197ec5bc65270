// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ocean_data::DataError;
use std::path::PathBuf;

/// Result alias used across models, losses and the trainer.
pub type NnResult<T> = Result<T, NnError>;

#[derive(Debug, thiserror::Error)]
pub enum NnError {
    #[error("unknown padding '{0}', expected 'none' or 'same'")]
    InvalidPadding(String),
    #[error("{what} expects {expected} channels, got {got}")]
    ChannelMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{what}: shape {left:?} does not match {right:?}")]
    ShapeMismatch {
        what: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("input {height}x{width} is too small for the network")]
    InputTooSmall { height: usize, width: usize },
    #[error("epoch milestones list is not strictly increasing")]
    InvalidMilestones { milestones: Vec<usize> },
    #[error("unsupported device '{0}', only 'cpu' is available")]
    UnsupportedDevice(String),
    #[error("{what} must not be empty")]
    Empty { what: &'static str },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to save or load model record {path:?}: {message}")]
    Record { path: PathBuf, message: String },
}
