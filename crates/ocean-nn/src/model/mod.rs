// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod divergence;
mod fully_cnn;
mod locally_connected;
mod mixed;
mod transform;

use crate::error::NnResult;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub use divergence::Divergence2d;
pub use fully_cnn::{ConvBlock, FullyCnn, FullyCnnConfig, Padding};
pub use locally_connected::LocallyConnected2d;
pub use mixed::{crop_like, MixedModel};
pub use transform::{softplus, FinalTransform};

/// Members a field network exposes to the training driver and to wrappers
/// such as [`MixedModel`] that forward them to an inner network.
pub trait FieldNet<B: Backend> {
    fn n_in_channels(&self) -> usize;

    fn n_out_channels(&self) -> usize;

    fn padding(&self) -> Padding;

    /// Changes the zero padding applied before every convolution.
    fn set_padding(&mut self, padding: Padding);

    fn batch_norm(&self) -> bool;

    /// Adds fresh batch-norm layers or removes the existing ones.
    fn set_batch_norm(&mut self, enabled: bool);

    fn final_transform(&self) -> &FinalTransform;

    fn set_final_transform(&mut self, transform: FinalTransform);

    /// Spatial output size for an `h x w` input, `None` if it is too small.
    fn output_size(&self, h: usize, w: usize) -> Option<(usize, usize)>;

    /// Plaintext, one layer per line.
    fn describe(&self) -> String;

    /// Forward pass with channel and size checks.
    fn forward(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>>;
}
