// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::{check_shapes, FieldLoss};
use crate::error::NnResult;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

fn split_mean_precision<B: Backend>(
    prediction: Tensor<B, 4>,
    n_targets: usize,
) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let [n, _, h, w] = prediction.dims();
    let mean = prediction
        .clone()
        .slice([0..n, 0..n_targets, 0..h, 0..w]);
    let precision = prediction.slice([0..n, n_targets..2 * n_targets, 0..h, 0..w]);
    (mean, precision)
}

/// Gaussian negative log-likelihood parameterised by the standard-deviation
/// precision `s = 1 / sigma`.
///
/// Channels are `[mean (n_targets), precision (n_targets)]`. Per point the
/// loss is `-log(s) + 0.5 * (target - (mean + bias))^2 * s^2`, summed over
/// channels and averaged over batch and space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeteroskedasticGaussianLossV2 {
    n_targets: usize,
    bias: f32,
}

impl HeteroskedasticGaussianLossV2 {
    pub fn new(n_targets: usize) -> Self {
        Self { n_targets, bias: 0.0 }
    }

    /// Overrides the constant offset added to the predicted mean.
    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }
}

impl FieldLoss for HeteroskedasticGaussianLossV2 {
    fn n_targets(&self) -> usize {
        self.n_targets
    }

    fn n_required_channels(&self) -> usize {
        2 * self.n_targets
    }

    fn precision_indices(&self) -> Vec<usize> {
        (self.n_targets..2 * self.n_targets).collect()
    }

    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<Tensor<B, 1>> {
        check_shapes(
            "heteroskedastic loss",
            &prediction,
            &target,
            self.n_required_channels(),
            self.n_targets,
        )?;
        let (mean, precision) = split_mean_precision(prediction, self.n_targets);
        let residual = target - mean.add_scalar(self.bias);
        let squared = residual.clone() * residual;
        let scaled = squared * precision.clone() * precision.clone();
        let term = precision.log().neg() + scaled.mul_scalar(0.5);
        Ok(term.sum_dim(1).mean())
    }

    fn predict<B: Backend>(&self, prediction: Tensor<B, 4>) -> Tensor<B, 4> {
        split_mean_precision(prediction, self.n_targets).0
    }
}

/// Earlier variant on the variance precision `p = 1 / sigma^2`:
/// `-0.5 * log(p) + 0.5 * (target - mean)^2 * p`, averaged over every
/// element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeteroskedasticGaussianLoss {
    n_targets: usize,
}

impl HeteroskedasticGaussianLoss {
    pub fn new(n_targets: usize) -> Self {
        Self { n_targets }
    }
}

impl FieldLoss for HeteroskedasticGaussianLoss {
    fn n_targets(&self) -> usize {
        self.n_targets
    }

    fn n_required_channels(&self) -> usize {
        2 * self.n_targets
    }

    fn precision_indices(&self) -> Vec<usize> {
        (self.n_targets..2 * self.n_targets).collect()
    }

    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<Tensor<B, 1>> {
        check_shapes(
            "heteroskedastic loss",
            &prediction,
            &target,
            self.n_required_channels(),
            self.n_targets,
        )?;
        let (mean, precision) = split_mean_precision(prediction, self.n_targets);
        let residual = target - mean;
        let squared = residual.clone() * residual;
        let term = (precision.clone().log().neg() + squared * precision).mul_scalar(0.5);
        Ok(term.mean())
    }

    fn predict<B: Backend>(&self, prediction: Tensor<B, 4>) -> Tensor<B, 4> {
        split_mean_precision(prediction, self.n_targets).0
    }
}
