// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod heteroskedastic;
mod mse;

use crate::error::{NnError, NnResult};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub use heteroskedastic::{HeteroskedasticGaussianLoss, HeteroskedasticGaussianLossV2};
pub use mse::MeanSquaredLoss;

/// Loss over `(batch, channel, lat, lon)` network outputs and targets.
pub trait FieldLoss {
    /// Number of physical target channels.
    fn n_targets(&self) -> usize;

    /// Output channels the network must produce for this loss.
    fn n_required_channels(&self) -> usize;

    /// Output channels holding precisions, which must stay positive.
    fn precision_indices(&self) -> Vec<usize> {
        Vec::new()
    }

    /// Scalar loss value.
    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<Tensor<B, 1>>;

    /// Point prediction in target space extracted from the network output.
    fn predict<B: Backend>(&self, prediction: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Checks channel counts and that batch and spatial axes agree.
pub(crate) fn check_shapes<B: Backend>(
    what: &'static str,
    prediction: &Tensor<B, 4>,
    target: &Tensor<B, 4>,
    prediction_channels: usize,
    target_channels: usize,
) -> NnResult<()> {
    let [pn, pc, ph, pw] = prediction.dims();
    let [tn, tc, th, tw] = target.dims();
    if pc != prediction_channels {
        return Err(NnError::ChannelMismatch {
            what,
            expected: prediction_channels,
            got: pc,
        });
    }
    if tc != target_channels {
        return Err(NnError::ChannelMismatch {
            what,
            expected: target_channels,
            got: tc,
        });
    }
    if (pn, ph, pw) != (tn, th, tw) {
        return Err(NnError::ShapeMismatch {
            what,
            left: vec![pn, ph, pw],
            right: vec![tn, th, tw],
        });
    }
    Ok(())
}
