// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::{check_shapes, FieldLoss};
use crate::error::NnResult;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Mean squared error; the network output is the prediction itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeanSquaredLoss {
    n_targets: usize,
}

impl MeanSquaredLoss {
    pub fn new(n_targets: usize) -> Self {
        Self { n_targets }
    }
}

impl FieldLoss for MeanSquaredLoss {
    fn n_targets(&self) -> usize {
        self.n_targets
    }

    fn n_required_channels(&self) -> usize {
        self.n_targets
    }

    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<Tensor<B, 1>> {
        check_shapes("mse loss", &prediction, &target, self.n_targets, self.n_targets)?;
        let diff = prediction - target;
        Ok((diff.clone() * diff).mean())
    }

    fn predict<B: Backend>(&self, prediction: Tensor<B, 4>) -> Tensor<B, 4> {
        prediction
    }
}
