// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{NnError, NnResult};
use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::module::unfold4d;
use burn::tensor::ops::UnfoldOptions;
use burn::tensor::{Distribution, Tensor};

/// Convolution whose weights differ at every output location.
///
/// Weights have shape `(1, out, in, oh, ow, kh * kw)` and are drawn from a
/// standard normal scaled by `1 / sqrt(in * kh * kw)`.
///
/// Stride is recorded but not applied: outputs are always computed with
/// stride 1.
#[derive(Module, Debug)]
pub struct LocallyConnected2d<B: Backend> {
    weight: Param<Tensor<B, 6>>,
    bias: Option<Param<Tensor<B, 4>>>,
    kernel_size: Ignored<[usize; 2]>,
    padding: Ignored<[usize; 2]>,
    stride: Ignored<[usize; 2]>,
}

impl<B: Backend> LocallyConnected2d<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_h: usize,
        input_w: usize,
        in_channels: usize,
        out_channels: usize,
        kernel_size: [usize; 2],
        padding: [usize; 2],
        stride: [usize; 2],
        bias: bool,
        device: &B::Device,
    ) -> NnResult<Self> {
        let (oh, ow) = Self::calculate_output_size(input_h, input_w, kernel_size, padding, stride)
            .ok_or(NnError::InputTooSmall {
                height: input_h,
                width: input_w,
            })?;
        let [kh, kw] = kernel_size;
        let fan_in = (in_channels * kh * kw).max(1) as f64;
        let weight = Tensor::random(
            [1, out_channels, in_channels, oh, ow, kh * kw],
            Distribution::Normal(0.0, 1.0),
            device,
        )
        .div_scalar(fan_in.sqrt());
        let bias = bias.then(|| {
            Param::from_tensor(Tensor::random(
                [1, out_channels, oh, ow],
                Distribution::Normal(0.0, 1.0),
                device,
            ))
        });
        Ok(Self {
            weight: Param::from_tensor(weight),
            bias,
            kernel_size: Ignored(kernel_size),
            padding: Ignored(padding),
            stride: Ignored(stride),
        })
    }

    /// Output size for an `input_h x input_w` input with stride-1 arithmetic
    /// `h + 2p - k + 1`; `stride` does not participate.
    pub fn calculate_output_size(
        input_h: usize,
        input_w: usize,
        kernel_size: [usize; 2],
        padding: [usize; 2],
        _stride: [usize; 2],
    ) -> Option<(usize, usize)> {
        let oh = (input_h + 2 * padding[0] + 1).checked_sub(kernel_size[0])?;
        let ow = (input_w + 2 * padding[1] + 1).checked_sub(kernel_size[1])?;
        (oh > 0 && ow > 0).then_some((oh, ow))
    }

    pub fn stride(&self) -> [usize; 2] {
        self.stride.0
    }

    pub fn output_shape(&self) -> [usize; 2] {
        let dims = self.weight.val().dims();
        [dims[3], dims[4]]
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        let [n, c, _, _] = x.dims();
        let weight = self.weight.val();
        let [_, out, in_channels, oh, ow, kk] = weight.dims();
        if c != in_channels {
            return Err(NnError::ChannelMismatch {
                what: "LocallyConnected2d input",
                expected: in_channels,
                got: c,
            });
        }
        let [kh, kw] = self.kernel_size.0;
        let patches = unfold4d(
            x,
            [kh, kw],
            UnfoldOptions::new([1, 1], self.padding.0, [1, 1]),
        );
        let locations = patches.dims()[2];
        if locations != oh * ow {
            return Err(NnError::ShapeMismatch {
                what: "LocallyConnected2d patches",
                left: vec![locations],
                right: vec![oh * ow],
            });
        }
        // [n, c * kk, oh * ow] -> [n, 1, c, oh, ow, kk]
        let patches = patches
            .reshape([n, c, kk, oh, ow])
            .permute([0, 1, 3, 4, 2])
            .unsqueeze_dim::<6>(1);
        let out_tensor = (patches * weight)
            .sum_dim(5)
            .sum_dim(2)
            .reshape([n, out, oh, ow]);
        Ok(match &self.bias {
            Some(bias) => out_tensor + bias.val(),
            None => out_tensor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn output_size_ignores_stride() {
        let a = LocallyConnected2d::<B>::calculate_output_size(10, 12, [3, 3], [1, 1], [1, 1]);
        let b = LocallyConnected2d::<B>::calculate_output_size(10, 12, [3, 3], [1, 1], [2, 3]);
        assert_eq!(a, Some((10, 12)));
        assert_eq!(a, b);
        assert_eq!(
            LocallyConnected2d::<B>::calculate_output_size(8, 8, [5, 3], [0, 0], [1, 1]),
            Some((4, 6))
        );
        assert_eq!(
            LocallyConnected2d::<B>::calculate_output_size(2, 2, [5, 5], [0, 0], [1, 1]),
            None
        );
    }

    #[test]
    fn forward_shape_and_bias() {
        let device = Default::default();
        let layer =
            LocallyConnected2d::<B>::new(7, 9, 3, 5, [3, 3], [0, 0], [1, 1], true, &device)
                .unwrap();
        assert_eq!(layer.output_shape(), [5, 7]);
        let x = Tensor::<B, 4>::random([2, 3, 7, 9], Distribution::Normal(0.0, 1.0), &device);
        let y = layer.forward(x).unwrap();
        assert_eq!(y.dims(), [2, 5, 5, 7]);
    }

    #[test]
    fn uniform_weights_reduce_to_a_box_filter() {
        let device = Default::default();
        let mut layer =
            LocallyConnected2d::<B>::new(5, 5, 1, 1, [3, 3], [1, 1], [1, 1], false, &device)
                .unwrap();
        layer.weight = Param::from_tensor(Tensor::ones([1, 1, 1, 5, 5, 9], &device));
        let y = layer.forward(Tensor::<B, 4>::ones([1, 1, 5, 5], &device)).unwrap();
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 4.0);
        assert_eq!(values[2], 6.0);
        assert_eq!(values[12], 9.0);
    }

    #[test]
    fn channel_mismatch_is_reported() {
        let device = Default::default();
        let layer =
            LocallyConnected2d::<B>::new(4, 4, 2, 1, [3, 3], [0, 0], [1, 1], false, &device)
                .unwrap();
        let x = Tensor::<B, 4>::zeros([1, 3, 4, 4], &device);
        assert!(matches!(
            layer.forward(x),
            Err(NnError::ChannelMismatch { expected: 2, got: 3, .. })
        ));
    }
}
