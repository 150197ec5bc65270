// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::{FieldNet, FinalTransform};
use crate::error::{NnError, NnResult};
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

/// Spatial padding policy of the convolution stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; every stage trims `kernel - 1` rows and columns.
    #[default]
    None,
    /// Pads by `kernel / 2` so spatial size is preserved.
    Same,
}

impl Padding {
    /// Zero padding applied on each side for a square `kernel`.
    pub fn amount(self, kernel: usize) -> usize {
        match self {
            Padding::None => 0,
            Padding::Same => kernel / 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Padding::None => "none",
            Padding::Same => "same",
        }
    }
}

impl FromStr for Padding {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Padding::None),
            "same" => Ok(Padding::Same),
            _ => Err(NnError::InvalidPadding(s.to_string())),
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kernel, out_channels)` of the seven hidden stages.
const HIDDEN_STAGES: [(usize, usize); 7] = [
    (5, 128),
    (5, 64),
    (3, 32),
    (3, 32),
    (3, 32),
    (3, 32),
    (3, 32),
];
const OUTPUT_KERNEL: usize = 3;

/// Zero-pads the two spatial axes of an NCHW tensor by `pad` on every side.
pub(crate) fn zero_pad<B: Backend>(x: Tensor<B, 4>, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return x;
    }
    let [n, c, h, w] = x.dims();
    let padded = Tensor::zeros([n, c, h + 2 * pad, w + 2 * pad], &x.device());
    padded.slice_assign([0..n, 0..c, pad..pad + h, pad..pad + w], x)
}

/// Builder for [`FullyCnn`].
#[derive(Clone, Debug)]
pub struct FullyCnnConfig {
    pub n_in_channels: usize,
    pub n_out_channels: usize,
    pub padding: Padding,
    pub batch_norm: bool,
    pub final_transform: FinalTransform,
}

impl FullyCnnConfig {
    pub fn new(n_in_channels: usize, n_out_channels: usize) -> Self {
        Self {
            n_in_channels,
            n_out_channels,
            padding: Padding::None,
            batch_norm: false,
            final_transform: FinalTransform::Identity,
        }
    }

    /// Overrides the padding policy.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Overrides the padding policy from its textual form.
    pub fn with_padding_str(self, padding: &str) -> NnResult<Self> {
        Ok(self.with_padding(padding.parse()?))
    }

    /// Overrides whether hidden stages end with batch normalisation.
    pub fn with_batch_norm(mut self, batch_norm: bool) -> Self {
        self.batch_norm = batch_norm;
        self
    }

    /// Overrides the output transformation.
    pub fn with_final_transform(mut self, transform: FinalTransform) -> Self {
        self.final_transform = transform;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> NnResult<FullyCnn<B>> {
        if self.n_in_channels == 0 {
            return Err(NnError::Empty {
                what: "input channels",
            });
        }
        if self.n_out_channels == 0 {
            return Err(NnError::Empty {
                what: "output channels",
            });
        }
        check_transform(&self.final_transform, self.n_out_channels)?;

        let mut blocks = Vec::with_capacity(HIDDEN_STAGES.len());
        let mut in_channels = self.n_in_channels;
        for (kernel, out_channels) in HIDDEN_STAGES {
            blocks.push(ConvBlock::new(
                in_channels,
                out_channels,
                kernel,
                self.batch_norm,
                device,
            ));
            in_channels = out_channels;
        }
        let output = Conv2dConfig::new(
            [in_channels, self.n_out_channels],
            [OUTPUT_KERNEL, OUTPUT_KERNEL],
        )
        .with_padding(PaddingConfig2d::Valid)
        .init(device);

        Ok(FullyCnn {
            blocks,
            output,
            n_in_channels: self.n_in_channels,
            n_out_channels: self.n_out_channels,
            padding: Ignored(self.padding),
            final_transform: Ignored(self.final_transform.clone()),
        })
    }
}

fn check_transform(transform: &FinalTransform, n_out_channels: usize) -> NnResult<()> {
    match transform.max_index() {
        Some(max) if max >= n_out_channels => Err(NnError::ChannelMismatch {
            what: "final transformation",
            expected: n_out_channels,
            got: max + 1,
        }),
        _ => Ok(()),
    }
}

/// `conv -> ReLU -> [BatchNorm]` hidden stage.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
}

impl<B: Backend> ConvBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        batch_norm: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let norm = batch_norm.then(|| BatchNormConfig::new(out_channels).init(device));
        Self {
            conv,
            norm,
            in_channels,
            out_channels,
            kernel,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, padding: Padding) -> Tensor<B, 4> {
        let x = self.conv.forward(zero_pad(x, padding.amount(self.kernel)));
        let x = relu(x);
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}

/// Fully convolutional network mapping surface velocities to subgrid
/// forcing: seven `conv -> ReLU -> [BatchNorm]` stages, a bare output
/// convolution and a [`FinalTransform`].
///
/// Widths run `in -> 128 -> 64 -> 32 (x5) -> out`; the first two kernels are
/// 5x5 and the rest 3x3, so without padding the output is 20 pixels smaller
/// than the input along each spatial axis.
#[derive(Module, Debug)]
pub struct FullyCnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    output: Conv2d<B>,
    n_in_channels: usize,
    n_out_channels: usize,
    padding: Ignored<Padding>,
    final_transform: Ignored<FinalTransform>,
}

impl<B: Backend> FullyCnn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let padding = self.padding.0;
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x, padding);
        }
        let x = self
            .output
            .forward(zero_pad(x, padding.amount(OUTPUT_KERNEL)));
        self.final_transform.0.apply(x)
    }

    /// Like [`FullyCnn::forward`] but rejects inputs with the wrong channel
    /// count or a spatial size the stack cannot shrink.
    pub fn forward_checked(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        let [_, c, h, w] = x.dims();
        if c != self.n_in_channels {
            return Err(NnError::ChannelMismatch {
                what: "FullyCnn input",
                expected: self.n_in_channels,
                got: c,
            });
        }
        if self.output_size(h, w).is_none() {
            return Err(NnError::InputTooSmall {
                height: h,
                width: w,
            });
        }
        Ok(self.forward(x))
    }

    /// `(kernel, in, out)` of each of the eight convolutions.
    fn stages(&self) -> Vec<(usize, usize, usize)> {
        let mut stages: Vec<_> = self
            .blocks
            .iter()
            .map(|b| (b.kernel, b.in_channels, b.out_channels))
            .collect();
        let last_in = stages.last().map_or(self.n_in_channels, |s| s.2);
        stages.push((OUTPUT_KERNEL, last_in, self.n_out_channels));
        stages
    }
}

impl<B: Backend> FieldNet<B> for FullyCnn<B> {
    fn n_in_channels(&self) -> usize {
        self.n_in_channels
    }

    fn n_out_channels(&self) -> usize {
        self.n_out_channels
    }

    fn padding(&self) -> Padding {
        self.padding.0
    }

    fn set_padding(&mut self, padding: Padding) {
        self.padding = Ignored(padding);
    }

    fn batch_norm(&self) -> bool {
        self.blocks.iter().any(|b| b.norm.is_some())
    }

    fn set_batch_norm(&mut self, enabled: bool) {
        let device = self.output.weight.val().device();
        for block in &mut self.blocks {
            if !enabled {
                block.norm = None;
            } else if block.norm.is_none() {
                block.norm = Some(BatchNormConfig::new(block.out_channels).init(&device));
            }
        }
    }

    fn final_transform(&self) -> &FinalTransform {
        &self.final_transform.0
    }

    fn set_final_transform(&mut self, transform: FinalTransform) {
        self.final_transform = Ignored(transform);
    }

    fn output_size(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        let padding = self.padding.0;
        let (mut h, mut w) = (h, w);
        for (kernel, _, _) in self.stages() {
            let pad = 2 * padding.amount(kernel);
            h = (h + pad).checked_sub(kernel - 1).filter(|v| *v > 0)?;
            w = (w + pad).checked_sub(kernel - 1).filter(|v| *v > 0)?;
        }
        Some((h, w))
    }

    fn describe(&self) -> String {
        let padding = self.padding.0;
        let mut out = format!(
            "FullyCnn(n_in_channels={}, n_out_channels={}, padding={}, batch_norm={})\n",
            self.n_in_channels,
            self.n_out_channels,
            padding,
            self.batch_norm()
        );
        let mut index = 0;
        for block in &self.blocks {
            let _ = writeln!(
                out,
                "  ({index}): Conv2d({}, {}, kernel_size=({k}, {k}), padding={})",
                block.in_channels,
                block.out_channels,
                padding.amount(block.kernel),
                k = block.kernel,
            );
            let _ = writeln!(out, "  ({}): ReLU", index + 1);
            index += 2;
            if block.norm.is_some() {
                let _ = writeln!(out, "  ({index}): BatchNorm2d({})", block.out_channels);
                index += 1;
            }
        }
        let last_in = self.blocks.last().map_or(self.n_in_channels, |b| b.out_channels);
        let _ = writeln!(
            out,
            "  ({index}): Conv2d({last_in}, {}, kernel_size=({k}, {k}), padding={})",
            self.n_out_channels,
            padding.amount(OUTPUT_KERNEL),
            k = OUTPUT_KERNEL,
        );
        let _ = writeln!(out, "  final_transformation: {}", self.final_transform.0);
        out
    }

    fn forward(&self, x: Tensor<B, 4>) -> NnResult<Tensor<B, 4>> {
        self.forward_checked(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn padding_parses_case_insensitively() {
        assert_eq!("none".parse::<Padding>().unwrap(), Padding::None);
        assert_eq!("SAME".parse::<Padding>().unwrap(), Padding::Same);
        assert!(matches!(
            "valid".parse::<Padding>(),
            Err(NnError::InvalidPadding(p)) if p == "valid"
        ));
        assert!(FullyCnnConfig::new(2, 4).with_padding_str("reflect").is_err());
    }

    #[test]
    fn output_shapes_follow_padding() {
        let device = Default::default();
        for (padding, shrink) in [(Padding::None, 20), (Padding::Same, 0)] {
            let net = FullyCnnConfig::new(2, 4)
                .with_padding(padding)
                .init::<B>(&device)
                .unwrap();
            let x = Tensor::<B, 4>::random([2, 2, 24, 26], Distribution::Normal(0.0, 1.0), &device);
            let y = net.forward_checked(x).unwrap();
            assert_eq!(y.dims(), [2, 4, 24 - shrink, 26 - shrink]);
            assert_eq!(net.output_size(24, 26), Some((24 - shrink, 26 - shrink)));
        }
    }

    #[test]
    fn nan_input_still_produces_the_documented_shape() {
        let device = Default::default();
        let net = FullyCnnConfig::new(2, 4).init::<B>(&device).unwrap();
        let mut data = vec![0.5f32; 17 * 2 * 35 * 30];
        data[0] = f32::NAN;
        let x = Tensor::<B, 4>::from_data(TensorData::new(data, [17, 2, 35, 30]), &device);
        let y = net.forward(x);
        assert_eq!(y.dims(), [17, 4, 15, 10]);
    }

    #[test]
    fn too_small_or_wrong_channel_inputs_are_rejected() {
        let device = Default::default();
        let net = FullyCnnConfig::new(2, 4).init::<B>(&device).unwrap();
        assert_eq!(net.output_size(20, 40), None);
        assert_eq!(net.output_size(21, 21), Some((1, 1)));
        let x = Tensor::<B, 4>::zeros([1, 2, 20, 30], &device);
        assert!(matches!(
            net.forward_checked(x),
            Err(NnError::InputTooSmall { .. })
        ));
        let x = Tensor::<B, 4>::zeros([1, 3, 30, 30], &device);
        assert!(matches!(
            net.forward_checked(x),
            Err(NnError::ChannelMismatch { expected: 2, got: 3, .. })
        ));
    }

    #[test]
    fn transform_indices_must_fit_the_output() {
        let device = Default::default();
        let err = FullyCnnConfig::new(2, 4)
            .with_final_transform(FinalTransform::softplus_precision(vec![2, 4]))
            .init::<B>(&device)
            .unwrap_err();
        assert!(matches!(err, NnError::ChannelMismatch { got: 5, .. }));
    }

    #[test]
    fn precision_channels_come_out_positive() {
        let device = Default::default();
        let net = FullyCnnConfig::new(2, 4)
            .with_padding(Padding::Same)
            .with_final_transform(FinalTransform::softplus_precision(vec![2, 3]))
            .init::<B>(&device)
            .unwrap();
        let x = Tensor::<B, 4>::random([1, 2, 8, 8], Distribution::Normal(0.0, 3.0), &device);
        let y = net.forward(x);
        let precision = y.slice([0..1, 2..4, 0..8, 0..8]);
        let min = precision.min().into_scalar();
        assert!(min >= 0.1 - 1e-6, "min precision {min}");
    }

    #[test]
    fn batch_norm_can_be_toggled_and_is_described() {
        let device = Default::default();
        let mut net = FullyCnnConfig::new(3, 2)
            .with_batch_norm(true)
            .init::<B>(&device)
            .unwrap();
        assert!(net.batch_norm());
        let text = net.describe();
        assert_eq!(text.matches("BatchNorm2d").count(), 7);
        assert!(text.contains("Conv2d(3, 128, kernel_size=(5, 5), padding=0)"));
        assert!(text.contains("Conv2d(32, 2, kernel_size=(3, 3), padding=0)"));

        net.set_batch_norm(false);
        assert!(!net.batch_norm());
        assert!(!net.describe().contains("BatchNorm2d"));
        net.set_padding(Padding::Same);
        assert_eq!(net.output_size(9, 9), Some((9, 9)));
    }
}
