// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Environment variable holding the base seed of a run.
pub const SEED_ENV: &str = "OCEAN_SEED";

const DEFAULT_SEED: u64 = 42;

/// Seeds shared by every stochastic component of a training run
/// (weight initialisation, loader shuffling).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedConfig {
    pub base_seed: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            base_seed: DEFAULT_SEED,
        }
    }
}

impl SeedConfig {
    /// Reads the base seed from [`SEED_ENV`], ignoring unparsable values.
    pub fn from_env() -> Self {
        let base_seed = std::env::var(SEED_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SEED);
        Self { base_seed }
    }

    /// Uses `seed` when provided, otherwise the environment.
    pub fn resolve(seed: Option<u64>) -> Self {
        match seed {
            Some(base_seed) => Self { base_seed },
            None => Self::from_env(),
        }
    }

    /// Derives a stable seed for a named component.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<SeedConfig> = OnceLock::new();

/// Returns the process-wide seed configuration, reading the environment once.
pub fn config() -> &'static SeedConfig {
    CONFIG.get_or_init(SeedConfig::from_env)
}

/// Pins the process-wide seed configuration. The first caller wins.
pub fn configure(cfg: SeedConfig) -> &'static SeedConfig {
    CONFIG.get_or_init(|| cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    fn with_seed_env(value: Option<&str>, test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD.get_or_init(|| Mutex::new(())).lock().unwrap();

        let previous = std::env::var(SEED_ENV).ok();
        match value {
            Some(val) => std::env::set_var(SEED_ENV, val),
            None => std::env::remove_var(SEED_ENV),
        }

        let result = catch_unwind(AssertUnwindSafe(test));

        match previous {
            Some(val) => std::env::set_var(SEED_ENV, val),
            None => std::env::remove_var(SEED_ENV),
        }
        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn missing_env_uses_default_seed() {
        with_seed_env(None, || {
            assert_eq!(SeedConfig::from_env().base_seed, 42);
        });
    }

    #[test]
    fn env_seed_is_parsed_and_garbage_ignored() {
        with_seed_env(Some(" 1337 "), || {
            assert_eq!(SeedConfig::from_env().base_seed, 1337);
        });
        with_seed_env(Some("not-a-seed"), || {
            assert_eq!(SeedConfig::from_env().base_seed, 42);
        });
    }

    #[test]
    fn explicit_seed_beats_environment() {
        with_seed_env(Some("5"), || {
            assert_eq!(SeedConfig::resolve(Some(9)).base_seed, 9);
            assert_eq!(SeedConfig::resolve(None).base_seed, 5);
        });
    }

    #[test]
    fn derived_seeds_are_stable_per_label() {
        let cfg = SeedConfig { base_seed: 99 };
        assert_eq!(cfg.seed_for("loader"), cfg.seed_for("loader"));
        assert_ne!(cfg.seed_for("loader"), cfg.seed_for("weights"));
    }
}
