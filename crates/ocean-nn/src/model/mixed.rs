// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::{FieldNet, FinalTransform, FullyCnn, FullyCnnConfig, Padding};
use crate::error::{NnError, NnResult};
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Number of equation channels appended after the velocity channels.
const EQUATION_CHANNELS: usize = 2;

/// Centre-crops the spatial axes of `x` to `h x w`.
pub fn crop_like<B: Backend>(x: Tensor<B, 4>, h: usize, w: usize) -> NnResult<Tensor<B, 4>> {
    let [n, c, xh, xw] = x.dims();
    if h > xh || w > xw {
        return Err(NnError::ShapeMismatch {
            what: "crop target larger than field",
            left: vec![xh, xw],
            right: vec![h, w],
        });
    }
    let top = (xh - h) / 2;
    let left = (xw - w) / 2;
    Ok(x.slice([0..n, 0..c, top..top + h, left..left + w]))
}

/// [`FullyCnn`] whose first two outputs are multiplied by two extra
/// "equation" input channels.
///
/// Inputs carry the velocity channels of the wrapped net followed by the two
/// equation channels. Everything except the wrapped net and the input channel
/// count is delegated to the net through [`FieldNet`].
#[derive(Module, Debug)]
pub struct MixedModel<B: Backend> {
    net: FullyCnn<B>,
    n_in_channels: usize,
}

impl<B: Backend> MixedModel<B> {
    pub fn new(net: FullyCnn<B>) -> NnResult<Self> {
        if net.n_out_channels() < EQUATION_CHANNELS {
            return Err(NnError::ChannelMismatch {
                what: "MixedModel wrapped net output",
                expected: EQUATION_CHANNELS,
                got: net.n_out_channels(),
            });
        }
        let n_in_channels = net.n_in_channels() + EQUATION_CHANNELS;
        Ok(Self { net, n_in_channels })
    }

    /// Builds the wrapped net from a config whose `n_in_channels` counts the
    /// equation channels too.
    pub fn init(config: &FullyCnnConfig, device: &B::Device) -> NnResult<Self> {
        if config.n_in_channels <= EQUATION_CHANNELS {
            return Err(NnError::ChannelMismatch {
                what: "MixedModel input",
                expected: EQUATION_CHANNELS + 1,
                got: config.n_in_channels,
            });
        }
        let mut inner = config.clone();
        inner.n_in_channels -= EQUATION_CHANNELS;
        Self::new(inner.init(device)?)
    }

    pub fn net(&self) -> &FullyCnn<B> {
        &self.net
    }

    pub fn forward_checked(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        let [n, c, h, w] = x.dims();
        if c != self.n_in_channels {
            return Err(NnError::ChannelMismatch {
                what: "MixedModel input",
                expected: self.n_in_channels,
                got: c,
            });
        }
        let velocity_channels = self.net.n_in_channels();
        let velocity = x.clone().slice([0..n, 0..velocity_channels, 0..h, 0..w]);
        let equations = x.slice([0..n, velocity_channels..c, 0..h, 0..w]);

        let out = self.net.forward_checked(velocity)?;
        let [_, oc, oh, ow] = out.dims();
        let equations = crop_like(equations, oh, ow)?;
        let scaled = out.clone().slice([0..n, 0..EQUATION_CHANNELS, 0..oh, 0..ow]) * equations;
        if oc == EQUATION_CHANNELS {
            return Ok(scaled);
        }
        let rest = out.slice([0..n, EQUATION_CHANNELS..oc, 0..oh, 0..ow]);
        Ok(Tensor::cat(vec![scaled, rest], 1))
    }
}

impl<B: Backend> FieldNet<B> for MixedModel<B> {
    fn n_in_channels(&self) -> usize {
        self.n_in_channels
    }

    fn n_out_channels(&self) -> usize {
        self.net.n_out_channels()
    }

    fn padding(&self) -> Padding {
        self.net.padding()
    }

    fn set_padding(&mut self, padding: Padding) {
        self.net.set_padding(padding);
    }

    fn batch_norm(&self) -> bool {
        self.net.batch_norm()
    }

    fn set_batch_norm(&mut self, enabled: bool) {
        self.net.set_batch_norm(enabled);
    }

    fn final_transform(&self) -> &FinalTransform {
        self.net.final_transform()
    }

    fn set_final_transform(&mut self, transform: FinalTransform) {
        self.net.set_final_transform(transform);
    }

    fn output_size(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        self.net.output_size(h, w)
    }

    fn describe(&self) -> String {
        self.net.describe()
    }

    fn forward(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        self.forward_checked(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn crop_like_keeps_the_centre() {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_floats(
            [0., 1., 2., 3., 4., 5., 6., 7., 8., 9., 10., 11., 12., 13., 14., 15.],
            &device,
        )
        .reshape([1, 1, 4, 4]);
        let cut = crop_like(x.clone(), 2, 2).unwrap();
        assert_eq!(
            cut.into_data().to_vec::<f32>().unwrap(),
            vec![5.0, 6.0, 9.0, 10.0]
        );
        assert!(crop_like(x, 5, 1).is_err());
    }

    #[test]
    fn requires_more_than_the_equation_channels() {
        let device = Default::default();
        assert!(MixedModel::<B>::init(&FullyCnnConfig::new(2, 4), &device).is_err());
        let model = MixedModel::<B>::init(&FullyCnnConfig::new(4, 4), &device).unwrap();
        assert_eq!(model.n_in_channels(), 4);
        assert_eq!(model.net().n_in_channels(), 2);
    }

    #[test]
    fn output_matches_cropped_equations_and_scales_first_channels() {
        let device = Default::default();
        let model = MixedModel::<B>::init(&FullyCnnConfig::new(4, 4), &device).unwrap();
        let [n, h, w] = [2, 25, 27];
        let normal = Distribution::Normal(0.0, 1.0);
        let velocity = Tensor::<B, 4>::random([n, 2, h, w], normal, &device);
        let zeros = Tensor::<B, 4>::zeros([n, 1, h, w], &device);
        let ones = Tensor::<B, 4>::ones([n, 1, h, w], &device);
        let x = Tensor::cat(vec![velocity.clone(), zeros, ones], 1);

        let out = model.forward_checked(x).unwrap();
        assert_eq!(out.dims(), [n, 4, h - 20, w - 20]);

        let raw = model.net().forward(velocity);
        let zeroed = out.clone().slice([0..n, 0..1, 0..5, 0..7]);
        assert_eq!(zeroed.abs().max().into_scalar(), 0.0);
        let kept = out.slice([0..n, 1..4, 0..5, 0..7]);
        let expected = raw.slice([0..n, 1..4, 0..5, 0..7]);
        let diff = (kept - expected).abs().max().into_scalar();
        assert!(diff < 1e-5, "diff {diff}");
    }

    #[test]
    fn delegated_members_round_trip_through_the_net() {
        let device = Default::default();
        let mut model = MixedModel::<B>::init(&FullyCnnConfig::new(4, 4), &device).unwrap();

        let transform = FinalTransform::softplus_precision(vec![2, 3]);
        model.set_final_transform(transform.clone());
        assert_eq!(model.final_transform(), &transform);
        assert_eq!(model.net().final_transform(), &transform);

        model.set_padding(Padding::Same);
        assert_eq!(model.padding(), Padding::Same);
        assert_eq!(model.net().padding(), Padding::Same);

        model.set_batch_norm(true);
        assert!(model.batch_norm() && model.net().batch_norm());

        assert_eq!(model.n_out_channels(), model.net().n_out_channels());
        assert_eq!(model.describe(), model.net().describe());
        assert_eq!(model.output_size(30, 30), Some((30, 30)));
    }
}
