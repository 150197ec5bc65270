// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fmt;

/// Output transformation applied to the raw output of a network.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FinalTransform {
    #[default]
    Identity,
    /// Replaces the listed channels by `softplus(x) + min_value`, keeping
    /// precision outputs strictly positive.
    SoftPlusPrecision { indices: Vec<usize>, min_value: f32 },
}

impl FinalTransform {
    pub const DEFAULT_MIN_VALUE: f32 = 0.1;

    pub fn softplus_precision(indices: Vec<usize>) -> Self {
        Self::SoftPlusPrecision {
            indices,
            min_value: Self::DEFAULT_MIN_VALUE,
        }
    }

    /// Largest channel index the transform touches, if any.
    pub fn max_index(&self) -> Option<usize> {
        match self {
            FinalTransform::Identity => None,
            FinalTransform::SoftPlusPrecision { indices, .. } => indices.iter().copied().max(),
        }
    }

    pub fn apply<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let FinalTransform::SoftPlusPrecision { indices, min_value } = self else {
            return x;
        };
        if indices.is_empty() {
            return x;
        }
        let [n, c, h, w] = x.dims();
        let channels: Vec<Tensor<B, 4>> = (0..c)
            .map(|i| {
                let channel = x.clone().slice([0..n, i..i + 1, 0..h, 0..w]);
                if indices.contains(&i) {
                    softplus(channel).add_scalar(*min_value)
                } else {
                    channel
                }
            })
            .collect();
        Tensor::cat(channels, 1)
    }
}

/// `log(1 + e^x)` written as `relu(x) + log1p(e^-|x|)` so large inputs do not
/// overflow.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let tail = x.clone().abs().neg().exp().log1p();
    relu(x) + tail
}

impl fmt::Display for FinalTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalTransform::Identity => write!(f, "Identity"),
            FinalTransform::SoftPlusPrecision { indices, min_value } => {
                write!(f, "SoftPlusPrecision(indices={indices:?}, min_value={min_value})")
            }
        }
    }
}
