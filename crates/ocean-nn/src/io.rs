// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Persistence of trained weights, architecture text and fitted scalings.

use crate::error::{NnError, NnResult};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use ocean_data::FittedTransform;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// File name of the plaintext layer listing inside the models directory.
pub const ARCHITECTURE_FILE: &str = "nn_architecture.txt";
/// File name of the per-subdomain scalings inside the models directory.
pub const TRANSFORMS_FILE: &str = "transforms.json";
/// Extension the record files get regardless of the requested one.
pub const WEIGHTS_EXTENSION: &str = "mpk";

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> NnError + '_ {
    move |source| NnError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn record_error(path: &Path) -> impl FnOnce(burn::record::RecorderError) -> NnError + '_ {
    move |err| NnError::Record {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn ensure_parent(path: &Path) -> NnResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

/// Writes the parameters of `model` as a named MessagePack record and
/// returns the path actually written, whose extension is always `.mpk`.
pub fn save_weights<B: Backend, M: Module<B>>(model: &M, path: &Path) -> NnResult<PathBuf> {
    ensure_parent(path)?;
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(record_error(path))?;
    Ok(path.with_extension(WEIGHTS_EXTENSION))
}

/// Loads parameters saved by [`save_weights`] into a model of the same
/// architecture.
pub fn load_weights<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> NnResult<M> {
    model
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(record_error(path))
}

pub fn write_architecture(dir: &Path, description: &str) -> NnResult<PathBuf> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(ARCHITECTURE_FILE);
    fs::write(&path, description).map_err(io_error(&path))?;
    Ok(path)
}

/// Stores the scalings fitted on every training subdomain, in region order.
pub fn write_transforms(dir: &Path, transforms: &[FittedTransform]) -> NnResult<PathBuf> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(TRANSFORMS_FILE);
    let file = File::create(&path).map_err(io_error(&path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), transforms).map_err(|source| {
        NnError::Json {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}

pub fn load_transforms(path: &Path) -> NnResult<Vec<FittedTransform>> {
    let file = File::open(path).map_err(io_error(path))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| NnError::Json {
        path: path.to_path_buf(),
        source,
    })
}
