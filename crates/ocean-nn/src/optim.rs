// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use burn::module::{AutodiffModule, Module, ModuleVisitor, ParamId};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Adam hyper-parameters exposed to the training driver.
///
/// The learning rate is not part of the optimiser; it is supplied at every
/// step by [`crate::MultiStepLr`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamSettings {
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    /// L2 penalty added to the gradients, `0` disables it.
    pub weight_decay: f64,
    /// Maximum gradient norm, values `<= 0` disable clipping.
    pub clip: f64,
}

impl Default for AdamSettings {
    fn default() -> Self {
        Self {
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            clip: 1.0,
        }
    }
}

impl AdamSettings {
    /// Overrides the L2 penalty.
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Overrides the gradient-norm clip.
    pub fn with_clip(mut self, clip: f64) -> Self {
        self.clip = clip;
        self
    }

    /// Gradient-norm bound handed to the trainer, `None` when disabled.
    pub fn clipping(&self) -> Option<f64> {
        (self.clip > 0.0).then_some(self.clip)
    }

    pub fn config(&self) -> AdamConfig {
        let weight_decay =
            (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay as f32));
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
            .with_weight_decay(weight_decay)
    }

    pub fn init<B, M>(&self) -> impl Optimizer<M, B>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        self.config().init::<B, M>()
    }
}

struct SquaredNorm<'a, B> {
    grads: &'a GradientsParams,
    total: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    factor: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            let scaled = grad.mul_scalar(self.factor);
            self.grads.register::<B::InnerBackend, D>(id, scaled);
        }
    }
}

/// Rescales every gradient of `model` by one common factor so that their
/// joint L2 norm does not exceed `max_norm`. Returns the norm measured
/// before clipping.
pub fn clip_grad_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut norm = SquaredNorm::<B> {
        grads,
        total: 0.0,
        backend: PhantomData,
    };
    model.visit(&mut norm);
    let total = norm.total.sqrt();

    let factor = max_norm / (total + 1e-6);
    if factor < 1.0 {
        model.visit(&mut Rescale { grads, factor });
    }
    total
}
