// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-level configuration shared by the gz21 ocean crates: tracing
//! setup, deterministic seeding, config-file loading and the scratch
//! directories a training run writes into.

pub mod determinism;
pub mod file;
pub mod rundir;
pub mod tracing;

pub use file::{load_config_file, ConfigError, ConfigFormat};
pub use rundir::RunDirectories;
