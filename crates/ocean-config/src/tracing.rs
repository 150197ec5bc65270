// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable naming a file that receives a Chrome trace of the run.
pub const CHROME_TRACE_ENV: &str = "OCEAN_TRACE_CHROME";

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Knobs for the global subscriber.
#[derive(Clone, Debug)]
pub struct TracingOptions {
    /// Directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Print the event target next to each line.
    pub with_target: bool,
    /// Explicit Chrome trace destination. Falls back to [`CHROME_TRACE_ENV`].
    pub chrome_trace: Option<PathBuf>,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: false,
            chrome_trace: None,
        }
    }
}

impl TracingOptions {
    /// Raises the default level to `debug` when `verbose` is set.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.default_directive = "debug".to_string();
        }
        self
    }

    /// Overrides the Chrome trace destination.
    pub fn with_chrome_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_trace = Some(path.into());
        self
    }
}

/// Installs the global tracing subscriber. Fails when called twice.
pub fn init_tracing(options: &TracingOptions) -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let ansi = std::io::stderr().is_terminal();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive.as_str()));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(options.with_target)
        .with_ansi(ansi);

    let chrome_path = match options.chrome_trace.clone() {
        Some(path) => Some(path),
        None => chrome_trace_path()?,
    };

    match chrome_path {
        Some(path) => {
            let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            let cell = CHROME_GUARD.get_or_init(|| Mutex::new(None));
            if let Ok(mut slot) = cell.lock() {
                *slot = Some(guard);
            }
            Registry::default()
                .with(filter)
                .with(fmt_layer)
                .with(chrome_layer)
                .init();
        }
        None => {
            Registry::default().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}

/// Flushes and drops the Chrome trace writer, if one was installed.
pub fn flush_chrome_trace() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(CHROME_TRACE_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw))),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read {CHROME_TRACE_ENV}: {0}")]
    Env(std::env::VarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_switches_default_directive() {
        let options = TracingOptions::default().verbose(true);
        assert_eq!(options.default_directive, "debug");
        let quiet = TracingOptions::default().verbose(false);
        assert_eq!(quiet.default_directive, "info");
    }

    #[test]
    fn explicit_chrome_trace_is_kept() {
        let options = TracingOptions::default().with_chrome_trace("/tmp/trace.json");
        assert_eq!(options.chrome_trace, Some(PathBuf::from("/tmp/trace.json")));
    }
}
