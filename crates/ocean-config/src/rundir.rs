// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const FIGURES_DIRECTORY: &str = "figures";
pub const MODELS_DIRECTORY: &str = "models";
pub const MODEL_OUTPUT_DIRECTORY: &str = "model_output";

/// Scratch directories of a training run.
///
/// The root is created once per process and intentionally left behind when
/// the run finishes; nothing removes it.
#[derive(Clone, Debug)]
pub struct RunDirectories {
    root: PathBuf,
}

impl RunDirectories {
    /// Creates a fresh directory under the system temp dir.
    pub fn create_temp() -> io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("gz21-train-")
            .tempdir()?
            .into_path();
        info!(path = %root.display(), "created temporary run directory");
        Self::create_in(root)
    }

    /// Uses `root` (created if missing) and makes the standard sub-directories.
    pub fn create_in(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        for sub in [FIGURES_DIRECTORY, MODELS_DIRECTORY, MODEL_OUTPUT_DIRECTORY] {
            let dir = root.join(sub);
            if !dir.exists() {
                fs::create_dir(&dir)?;
            }
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn figures(&self) -> PathBuf {
        self.root.join(FIGURES_DIRECTORY)
    }

    pub fn models(&self) -> PathBuf {
        self.root.join(MODELS_DIRECTORY)
    }

    pub fn model_output(&self) -> PathBuf {
        self.root.join(MODEL_OUTPUT_DIRECTORY)
    }
}
