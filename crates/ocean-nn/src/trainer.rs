// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! One epoch of training followed by an evaluation pass.
//!
//! The trainer owns the loss, the optimiser state and the learning-rate
//! schedule. Models move through it by value because burn optimisers return
//! the updated module from every step.

use crate::batch::FieldBatch;
use crate::error::{NnError, NnResult};
use crate::loss::FieldLoss;
use crate::metrics::MetricRegistry;
use crate::model::FieldNet;
use crate::optim::clip_grad_norm;
use crate::schedule::MultiStepLr;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use ocean_data::{ChannelScaling, DataLoader, FieldDataset};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sample-weighted mean of per-batch values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    weight: usize,
}

impl RunningAverage {
    pub fn update(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.weight += weight;
    }

    /// Mean so far, `0` before the first update.
    pub fn value(&self) -> f64 {
        if self.weight == 0 {
            0.0
        } else {
            self.sum / self.weight as f64
        }
    }

    pub fn weight(&self) -> usize {
        self.weight
    }
}

/// Stops training once the test loss has not improved for `patience`
/// consecutive evaluations. A patience of zero never stops.
#[derive(Clone, Debug, PartialEq)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f64>,
    stale: usize,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(4)
    }
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            stale: 0,
        }
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn stale_epochs(&self) -> usize {
        self.stale
    }

    /// Records a test loss and returns the stop reason once patience runs out.
    pub fn observe(&mut self, loss: f64) -> Option<String> {
        match self.best {
            Some(best) if loss >= best || loss.is_nan() => self.stale += 1,
            _ => {
                self.best = Some(loss);
                self.stale = 0;
            }
        }
        if self.patience == 0 || self.stale < self.patience {
            return None;
        }
        let best = self.best.unwrap_or(loss);
        Some(format!(
            "test loss has not improved on {best:.6} for {} epochs",
            self.stale
        ))
    }
}

/// Summary of a training pass.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub learning_rate: f64,
    pub train_loss: f64,
    pub batches: usize,
    pub samples: usize,
}

/// Summary of an evaluation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct TestReport {
    pub loss: f64,
    pub metrics: BTreeMap<String, f64>,
    pub batches: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EpochOutcome {
    Continue(TestReport),
    StopEarly { report: TestReport, reason: String },
}

impl EpochOutcome {
    pub fn report(&self) -> &TestReport {
        match self {
            EpochOutcome::Continue(report) => report,
            EpochOutcome::StopEarly { report, .. } => report,
        }
    }

    pub fn should_stop(&self) -> bool {
        matches!(self, EpochOutcome::StopEarly { .. })
    }
}

fn scalar<B: burn::tensor::backend::Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.into_scalar().elem::<f64>()
}

pub struct Trainer<B, L, O>
where
    B: AutodiffBackend,
{
    loss: L,
    optimizer: O,
    scheduler: MultiStepLr,
    early_stopping: EarlyStopping,
    metrics: MetricRegistry,
    device: B::Device,
    printevery: usize,
    max_grad_norm: Option<f64>,
}

impl<B, L, O> Trainer<B, L, O>
where
    B: AutodiffBackend,
    L: FieldLoss,
{
    pub fn new(loss: L, optimizer: O, scheduler: MultiStepLr, device: B::Device) -> Self {
        Self {
            loss,
            optimizer,
            scheduler,
            early_stopping: EarlyStopping::default(),
            metrics: MetricRegistry::default(),
            device,
            printevery: 20,
            max_grad_norm: Some(1.0),
        }
    }

    /// Overrides how many batches pass between progress logs, `0` silences them.
    pub fn with_printevery(mut self, printevery: usize) -> Self {
        self.printevery = printevery;
        self
    }

    /// Overrides the bound on the joint gradient norm, `None` disables clipping.
    pub fn with_grad_clip(mut self, max_norm: Option<f64>) -> Self {
        self.max_grad_norm = max_norm;
        self
    }

    /// Overrides the early-stopping policy.
    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    /// Overrides the target scaling undone before metrics are computed.
    pub fn with_metric_transform(mut self, scaling: Option<ChannelScaling>) -> Self {
        self.metrics.set_inverse_transform(scaling);
        self
    }

    pub fn loss(&self) -> &L {
        &self.loss
    }

    pub fn scheduler(&self) -> &MultiStepLr {
        &self.scheduler
    }

    pub fn max_grad_norm(&self) -> Option<f64> {
        self.max_grad_norm
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Runs one shuffled pass over `loader`, stepping the optimiser after
    /// every batch, then advances the learning-rate schedule.
    pub fn train_epoch<M, D>(
        &mut self,
        model: M,
        loader: &DataLoader<D>,
        epoch: usize,
    ) -> NnResult<(M, EpochStats)>
    where
        M: AutodiffModule<B> + FieldNet<B>,
        O: Optimizer<M, B>,
        D: FieldDataset + 'static,
    {
        let learning_rate = self.scheduler.current_lr();
        let mut model = model;
        let mut running = RunningAverage::default();
        let mut batches = 0usize;

        for (index, batch) in loader.epoch(epoch).enumerate() {
            let batch = FieldBatch::<B>::from_host(&batch?, &self.device);
            let samples = batch.len();
            let output = model.forward(batch.features)?;
            let loss = self.loss.forward(output, batch.targets)?;
            let value = scalar(loss.clone());

            let mut grads = GradientsParams::from_grads(loss.backward(), &model);
            if let Some(max_norm) = self.max_grad_norm {
                clip_grad_norm::<B, M>(&model, &mut grads, max_norm);
            }
            model = self.optimizer.step(learning_rate, model, grads);

            running.update(value, samples);
            batches += 1;
            if self.printevery > 0 && (index + 1) % self.printevery == 0 {
                info!(
                    epoch,
                    batch = index + 1,
                    loss = running.value(),
                    "training"
                );
            }
        }
        if batches == 0 {
            return Err(NnError::Empty {
                what: "training batches",
            });
        }

        let next_lr = self.scheduler.step();
        debug!(epoch, learning_rate = next_lr, "scheduler advanced");
        let stats = EpochStats {
            epoch,
            learning_rate,
            train_loss: running.value(),
            batches,
            samples: running.weight(),
        };
        Ok((model, stats))
    }

    /// Evaluates `model` on the inner backend, without gradients and with
    /// batch norm using its running statistics.
    pub fn test<M, D>(&mut self, model: &M, loader: &DataLoader<D>) -> NnResult<TestReport>
    where
        M: AutodiffModule<B>,
        M::InnerModule: FieldNet<B::InnerBackend>,
        D: FieldDataset + 'static,
    {
        let model = model.valid();
        self.metrics.reset();
        let mut running = RunningAverage::default();
        let mut batches = 0usize;

        for batch in loader.epoch(0) {
            let batch = FieldBatch::<B::InnerBackend>::from_host(&batch?, &self.device);
            let samples = batch.len();
            let output = model.forward(batch.features)?;
            let loss = self.loss.forward(output.clone(), batch.targets.clone())?;
            running.update(scalar(loss), samples);
            self.metrics
                .update(self.loss.predict(output), batch.targets)?;
            batches += 1;
        }
        if batches == 0 {
            return Err(NnError::Empty {
                what: "test batches",
            });
        }

        Ok(TestReport {
            loss: running.value(),
            metrics: self.metrics.values(),
            batches,
        })
    }

    /// Trains, evaluates, and checks early stopping for one epoch.
    pub fn run_epoch<M, D, T>(
        &mut self,
        model: M,
        train: &DataLoader<D>,
        test: &DataLoader<T>,
        epoch: usize,
    ) -> NnResult<(M, EpochStats, EpochOutcome)>
    where
        M: AutodiffModule<B> + FieldNet<B>,
        M::InnerModule: FieldNet<B::InnerBackend>,
        O: Optimizer<M, B>,
        D: FieldDataset + 'static,
        T: FieldDataset + 'static,
    {
        let (model, stats) = self.train_epoch(model, train, epoch)?;
        let report = self.test(&model, test)?;
        info!(
            epoch,
            train_loss = stats.train_loss,
            test_loss = report.loss,
            mse = report.metrics.get("mse").copied().unwrap_or(f64::NAN),
            inf_norm = report.metrics.get("inf_norm").copied().unwrap_or(f64::NAN),
            "epoch finished"
        );
        let outcome = match self.early_stopping.observe(report.loss) {
            Some(reason) => EpochOutcome::StopEarly { report, reason },
            None => EpochOutcome::Continue(report),
        };
        Ok((model, stats, outcome))
    }
}
