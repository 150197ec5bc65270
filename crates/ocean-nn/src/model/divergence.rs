// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{NnError, NnResult};
use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData};

/// Central difference along x, flattened row-major.
const X_DERIVATIVE: [f32; 9] = [0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
/// Central difference along y, flattened row-major.
const Y_DERIVATIVE: [f32; 9] = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0];

/// Fixed finite-difference divergence of four stacked channel groups.
///
/// Output channel 0 is `lambda * dx(group 0) + dy(group 1)` and channel 1 is
/// `dx(group 2) + dy(group 3)`. Convolutions use padding 2, so the output is
/// two pixels larger than the input on each spatial axis.
#[derive(Module, Debug)]
pub struct Divergence2d<B: Backend> {
    /// Per-channel scale of the first x derivative, `(1, in / 4, 1, 1)`.
    lambdas: Param<Tensor<B, 4>>,
    n_in_channels: usize,
    n_out_channels: usize,
}

impl<B: Backend> Divergence2d<B> {
    pub fn new(n_in_channels: usize, n_out_channels: usize, device: &B::Device) -> NnResult<Self> {
        if n_in_channels == 0 || n_in_channels % 4 != 0 {
            return Err(NnError::ChannelMismatch {
                what: "Divergence2d input (multiple of 4)",
                expected: 4 * (n_in_channels / 4).max(1),
                got: n_in_channels,
            });
        }
        if n_out_channels == 0 || n_out_channels > n_in_channels {
            return Err(NnError::ChannelMismatch {
                what: "Divergence2d output",
                expected: 2,
                got: n_out_channels,
            });
        }
        let factor = n_in_channels / n_out_channels;
        let lambda = 1.0 / (2.0 * factor as f32);
        let lambdas = Tensor::<B, 4>::ones([1, n_in_channels / 4, 1, 1], device).mul_scalar(lambda);
        Ok(Self {
            lambdas: Param::from_tensor(lambdas),
            n_in_channels,
            n_out_channels,
        })
    }

    pub fn n_in_channels(&self) -> usize {
        self.n_in_channels
    }

    pub fn n_out_channels(&self) -> usize {
        self.n_out_channels
    }

    fn kernel(stencil: &[f32; 9], groups: usize, device: &B::Device) -> Tensor<B, 4> {
        let data: Vec<f32> = (0..groups).flat_map(|_| stencil.iter().copied()).collect();
        Tensor::from_data(TensorData::new(data, [1, groups, 3, 3]), device)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        let [n, c, h, w] = x.dims();
        if c != self.n_in_channels {
            return Err(NnError::ChannelMismatch {
                what: "Divergence2d input",
                expected: self.n_in_channels,
                got: c,
            });
        }
        let q = c / 4;
        let device = x.device();
        let dx = Self::kernel(&X_DERIVATIVE, q, &device);
        let dy = Self::kernel(&Y_DERIVATIVE, q, &device);
        let scaled_dx = dx.clone() * self.lambdas.val();
        let options = || ConvOptions::new([1, 1], [2, 2], [1, 1], 1);
        let group = |k: usize| x.clone().slice([0..n, k * q..(k + 1) * q, 0..h, 0..w]);

        let first = conv2d(group(0), scaled_dx, None, options())
            + conv2d(group(1), dy.clone(), None, options());
        let second =
            conv2d(group(2), dx, None, options()) + conv2d(group(3), dy, None, options());
        Ok(Tensor::cat(vec![first, second], 1))
    }
}
