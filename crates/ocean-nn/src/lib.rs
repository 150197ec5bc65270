// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Convolutional subgrid momentum models and their training loop.
//!
//! Tensors, autodiff, convolution kernels and the Adam optimiser come from
//! `burn`; everything above them (architectures, heteroskedastic losses,
//! metrics, learning-rate milestones, early stopping and persistence) lives
//! here.

pub mod batch;
pub mod error;
pub mod io;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod schedule;
pub mod session;
pub mod trainer;

pub use batch::FieldBatch;
pub use error::{NnError, NnResult};
pub use io::{
    load_transforms, load_weights, save_weights, write_architecture, write_transforms,
    ARCHITECTURE_FILE, TRANSFORMS_FILE, WEIGHTS_EXTENSION,
};
pub use loss::{
    FieldLoss, HeteroskedasticGaussianLoss, HeteroskedasticGaussianLossV2, MeanSquaredLoss,
};
pub use metrics::{Metric, MetricKind, MetricRegistry};
pub use model::{
    Divergence2d, FieldNet, FinalTransform, FullyCnn, FullyCnnConfig, LocallyConnected2d,
    MixedModel, Padding,
};
pub use optim::{clip_grad_norm, AdamSettings};
pub use schedule::{milestones_strictly_increasing, MultiStepLr};
pub use session::{EpochRecord, SessionReport, SessionState, TrainingSession};
pub use trainer::{EarlyStopping, EpochOutcome, EpochStats, RunningAverage, TestReport, Trainer};

/// Autodiff CPU backend used for training.
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
/// Inner backend used for evaluation.
pub type EvalBackend = burn::backend::NdArray<f32>;

/// Resolves a device name. Only the CPU backend is compiled in.
pub fn parse_device(name: &str) -> NnResult<burn::backend::ndarray::NdArrayDevice> {
    match name.trim().to_ascii_lowercase().as_str() {
        "cpu" => Ok(burn::backend::ndarray::NdArrayDevice::Cpu),
        _ => Err(NnError::UnsupportedDevice(name.to_string())),
    }
}
