// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{ArgAction, Parser, ValueHint};
use ocean_config::{load_config_file, ConfigError};
use ocean_nn::milestones_strictly_increasing;
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_DEVICE: &str = "cpu";
const DEFAULT_PRINTEVERY: usize = 20;
const DEFAULT_NUM_WORKERS: usize = 4;
const DEFAULT_PATIENCE: usize = 4;
const DEFAULT_CLIP: f64 = 1.0;
const DEFAULT_PADDING: &str = "none";

#[derive(Parser, Debug)]
#[command(
    name = "gz21-train",
    version,
    about = "Train the FullyCNN subgrid momentum forcing model on zarr ocean data"
)]
pub struct Cli {
    /// TOML, JSON or YAML file whose keys are the long option names below
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config_file: Option<PathBuf>,

    /// Zarr store with usurf, vsurf, S_x and S_y
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub in_train_data_dir: Option<PathBuf>,

    /// YAML list of lat_min/lat_max/long_min/long_max bounding boxes
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub subdomains_file: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub epochs: Option<usize>,

    /// Destination of the trained weights
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub out_model: Option<PathBuf>,

    #[arg(long)]
    pub initial_learning_rate: Option<f64>,

    /// Multiplier applied to the learning rate at every milestone
    #[arg(long)]
    pub decay_factor: Option<f64>,

    /// Epochs at which the learning rate decays, strictly increasing
    #[arg(long, num_args = 1.., action = ArgAction::Append)]
    pub decay_at_epoch_milestones: Option<Vec<usize>>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Fraction of each subdomain's time axis used for training
    #[arg(long)]
    pub train_split_end: Option<f64>,

    /// Fraction of each subdomain's time axis where the test window starts
    #[arg(long)]
    pub test_split_start: Option<f64>,

    /// Batches between training-loss log lines
    #[arg(long)]
    pub printevery: Option<usize>,

    /// Prefetch depth of the loaders, 0 assembles batches inline
    #[arg(long)]
    pub num_workers: Option<usize>,

    #[arg(long)]
    pub early_stopping_patience: Option<usize>,

    /// Gradient norm clip, values <= 0 disable clipping
    #[arg(long, allow_negative_numbers = true)]
    pub clip: Option<f64>,

    /// Zero padding of the convolutions: none or same
    #[arg(long)]
    pub padding: Option<String>,

    #[arg(long, action = ArgAction::SetTrue)]
    pub batch_norm: bool,

    /// Base seed, defaults to OCEAN_SEED or 42
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

/// Options read from `--config-file`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub in_train_data_dir: Option<PathBuf>,
    pub subdomains_file: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub epochs: Option<usize>,
    pub out_model: Option<PathBuf>,
    pub initial_learning_rate: Option<f64>,
    pub decay_factor: Option<f64>,
    pub decay_at_epoch_milestones: Option<Vec<usize>>,
    pub device: Option<String>,
    pub weight_decay: Option<f64>,
    pub train_split_end: Option<f64>,
    pub test_split_start: Option<f64>,
    pub printevery: Option<usize>,
    pub num_workers: Option<usize>,
    pub early_stopping_patience: Option<usize>,
    pub clip: Option<f64>,
    pub padding: Option<String>,
    pub batch_norm: Option<bool>,
    pub seed: Option<u64>,
}

/// Problems with the options themselves, reported before any data is read.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UsageError {
    #[error("missing required option --{0}")]
    Missing(&'static str),
    #[error("epoch milestones list is not strictly increasing")]
    Milestones(Vec<usize>),
    #[error("--batch-size must be at least 1")]
    ZeroBatchSize,
}

/// Fully resolved run options.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub in_train_data_dir: PathBuf,
    pub subdomains_file: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    pub out_model: PathBuf,
    pub initial_learning_rate: f64,
    pub decay_factor: f64,
    pub decay_at_epoch_milestones: Vec<usize>,
    pub device: String,
    pub weight_decay: f64,
    pub train_split_end: f64,
    pub test_split_start: f64,
    pub printevery: usize,
    pub num_workers: usize,
    pub early_stopping_patience: usize,
    pub clip: f64,
    pub padding: String,
    pub batch_norm: bool,
    pub seed: Option<u64>,
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, UsageError> {
    value.ok_or(UsageError::Missing(name))
}

impl Cli {
    /// Reads `--config-file`, or an empty config when none was given.
    pub fn file_config(&self) -> Result<FileConfig, ConfigError> {
        match &self.config_file {
            Some(path) => load_config_file(path),
            None => Ok(FileConfig::default()),
        }
    }

    /// Merges command-line values over `file` and validates the result.
    pub fn resolve(self, file: FileConfig) -> Result<TrainConfig, UsageError> {
        let milestones = required(
            self.decay_at_epoch_milestones.or(file.decay_at_epoch_milestones),
            "decay-at-epoch-milestones",
        )?;
        if !milestones_strictly_increasing(&milestones) {
            return Err(UsageError::Milestones(milestones));
        }
        let batch_size = required(self.batch_size.or(file.batch_size), "batch-size")?;
        if batch_size == 0 {
            return Err(UsageError::ZeroBatchSize);
        }

        Ok(TrainConfig {
            in_train_data_dir: required(
                self.in_train_data_dir.or(file.in_train_data_dir),
                "in-train-data-dir",
            )?,
            subdomains_file: required(
                self.subdomains_file.or(file.subdomains_file),
                "subdomains-file",
            )?,
            batch_size,
            epochs: required(self.epochs.or(file.epochs), "epochs")?,
            out_model: required(self.out_model.or(file.out_model), "out-model")?,
            initial_learning_rate: required(
                self.initial_learning_rate.or(file.initial_learning_rate),
                "initial-learning-rate",
            )?,
            decay_factor: required(self.decay_factor.or(file.decay_factor), "decay-factor")?,
            decay_at_epoch_milestones: milestones,
            device: self
                .device
                .or(file.device)
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            weight_decay: self.weight_decay.or(file.weight_decay).unwrap_or(0.0),
            train_split_end: required(
                self.train_split_end.or(file.train_split_end),
                "train-split-end",
            )?,
            test_split_start: required(
                self.test_split_start.or(file.test_split_start),
                "test-split-start",
            )?,
            printevery: self
                .printevery
                .or(file.printevery)
                .unwrap_or(DEFAULT_PRINTEVERY),
            num_workers: self
                .num_workers
                .or(file.num_workers)
                .unwrap_or(DEFAULT_NUM_WORKERS),
            early_stopping_patience: self
                .early_stopping_patience
                .or(file.early_stopping_patience)
                .unwrap_or(DEFAULT_PATIENCE),
            clip: self.clip.or(file.clip).unwrap_or(DEFAULT_CLIP),
            padding: self
                .padding
                .or(file.padding)
                .unwrap_or_else(|| DEFAULT_PADDING.to_string()),
            batch_norm: self.batch_norm || file.batch_norm.unwrap_or(false),
            seed: self.seed.or(file.seed),
        })
    }
}
