// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod config;
mod pipeline;

use clap::Parser;
use config::Cli;
use ocean_config::tracing::{flush_chrome_trace, init_tracing, TracingOptions};
use std::process::ExitCode;
use tracing::info;

/// Exit code for invalid options, matching clap's own usage errors.
const USAGE_EXIT: u8 = 2;
const FAILURE_EXIT: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(&TracingOptions::default().verbose(cli.verbose)) {
        eprintln!("warning: {err}");
    }

    let file = match cli.file_config() {
        Ok(file) => file,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(FAILURE_EXIT);
        }
    };
    let config = match cli.resolve(file) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(USAGE_EXIT);
        }
    };

    let code = match pipeline::train_on(&config) {
        Ok(summary) => {
            info!(
                weights = %summary.weights.display(),
                run_dir = %summary.run_dir.display(),
                epochs = summary.report.epochs_run(),
                "training finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(FAILURE_EXIT)
        }
    };
    flush_chrome_trace();
    code
}
