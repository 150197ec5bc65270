// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::NnResult;
use crate::loss::FieldLoss;
use crate::model::FieldNet;
use crate::trainer::{EpochOutcome, EpochStats, TestReport, Trainer};
use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use ocean_data::{DataLoader, FieldDataset};
use std::fmt;
use tracing::{info, warn};

/// Where a [`TrainingSession`] is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    EpochLoop { epoch: usize },
    EarlyStop { epoch: usize, reason: String },
    Done { epochs: usize },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::EarlyStop { .. } | SessionState::Done { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Init => f.write_str("init"),
            SessionState::EpochLoop { epoch } => write!(f, "epoch {epoch}"),
            SessionState::EarlyStop { epoch, reason } => {
                write!(f, "stopped early after epoch {epoch}: {reason}")
            }
            SessionState::Done { epochs } => write!(f, "done after {epochs} epochs"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpochRecord {
    pub stats: EpochStats,
    pub test: TestReport,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub state: SessionState,
    pub history: Vec<EpochRecord>,
}

impl SessionReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    pub fn stopped_early(&self) -> bool {
        matches!(self.state, SessionState::EarlyStop { .. })
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.history.last()
    }
}

/// Drives a [`Trainer`] through the epoch loop until the epoch budget is
/// spent or early stopping fires.
pub struct TrainingSession<B, L, O>
where
    B: AutodiffBackend,
{
    trainer: Trainer<B, L, O>,
    epochs: usize,
    state: SessionState,
}

impl<B, L, O> TrainingSession<B, L, O>
where
    B: AutodiffBackend,
    L: FieldLoss,
{
    pub fn new(trainer: Trainer<B, L, O>, epochs: usize) -> Self {
        Self {
            trainer,
            epochs,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn trainer(&self) -> &Trainer<B, L, O> {
        &self.trainer
    }

    pub fn run<M, D, T>(
        &mut self,
        model: M,
        train: &DataLoader<D>,
        test: &DataLoader<T>,
    ) -> NnResult<(M, SessionReport)>
    where
        M: AutodiffModule<B> + FieldNet<B>,
        M::InnerModule: FieldNet<B::InnerBackend>,
        O: Optimizer<M, B>,
        D: FieldDataset + 'static,
        T: FieldDataset + 'static,
    {
        let mut model = model;
        let mut history = Vec::with_capacity(self.epochs);
        self.state = if self.epochs == 0 {
            SessionState::Done { epochs: 0 }
        } else {
            SessionState::EpochLoop { epoch: 0 }
        };
        info!(
            epochs = self.epochs,
            train_batches = train.num_batches(),
            test_batches = test.num_batches(),
            "training session started"
        );

        while let SessionState::EpochLoop { epoch } = self.state {
            let (next, stats, outcome) = self.trainer.run_epoch(model, train, test, epoch)?;
            model = next;
            history.push(EpochRecord {
                stats,
                test: outcome.report().clone(),
            });
            self.state = match outcome {
                EpochOutcome::StopEarly { reason, .. } => {
                    warn!(epoch, %reason, "early stopping");
                    SessionState::EarlyStop { epoch, reason }
                }
                EpochOutcome::Continue(_) if epoch + 1 >= self.epochs => SessionState::Done {
                    epochs: epoch + 1,
                },
                EpochOutcome::Continue(_) => SessionState::EpochLoop { epoch: epoch + 1 },
            };
        }

        info!(state = %self.state, "training session finished");
        let report = SessionReport {
            state: self.state.clone(),
            history,
        };
        Ok((model, report))
    }
}
