// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Evaluation metrics accumulated batch by batch over a test pass.

use crate::error::{NnError, NnResult};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use ocean_data::ChannelScaling;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Mean squared error.
    Mse,
    /// Largest absolute error.
    MaxAbs,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Mse => "mse",
            MetricKind::MaxAbs => "inf_norm",
        }
    }

    fn compute<B: Backend>(self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> f64 {
        let diff = prediction - target;
        let value = match self {
            MetricKind::Mse => (diff.clone() * diff).mean().into_scalar(),
            MetricKind::MaxAbs => diff.abs().max().into_scalar(),
        };
        value.elem::<f64>()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps normalised channels back to physical units: `x * scale + offset`.
fn inverse_scaling<B: Backend>(
    scaling: &ChannelScaling,
    x: Tensor<B, 4>,
) -> NnResult<Tensor<B, 4>> {
    let [_, c, _, _] = x.dims();
    if c != scaling.channels() {
        return Err(NnError::ChannelMismatch {
            what: "metric inverse transform",
            expected: scaling.channels(),
            got: c,
        });
    }
    let device = x.device();
    let scale = Tensor::<B, 4>::from_data(
        TensorData::new(scaling.scale().to_vec(), [1, c, 1, 1]),
        &device,
    );
    let offset = Tensor::<B, 4>::from_data(
        TensorData::new(scaling.offset().to_vec(), [1, c, 1, 1]),
        &device,
    );
    Ok(x * scale + offset)
}

/// Running average of one metric over the batches seen since the last reset.
#[derive(Clone, Debug)]
pub struct Metric {
    kind: MetricKind,
    value: f64,
    count: usize,
    inverse_transform: Option<ChannelScaling>,
}

impl Metric {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            value: 0.0,
            count: 0,
            inverse_transform: None,
        }
    }

    /// Overrides the scaling undone on prediction and target before comparing.
    pub fn with_inverse_transform(mut self, scaling: ChannelScaling) -> Self {
        self.inverse_transform = Some(scaling);
        self
    }

    pub fn set_inverse_transform(&mut self, scaling: Option<ChannelScaling>) {
        self.inverse_transform = scaling;
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
    }

    /// Folds a new observation into the average:
    /// `v <- i / (i + 1) * v + x / (i + 1)`.
    pub fn observe(&mut self, x: f64) {
        let i = self.count as f64;
        self.value = i / (i + 1.0) * self.value + x / (i + 1.0);
        self.count += 1;
    }

    pub fn update<B: Backend>(
        &mut self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<f64> {
        let (prediction, target) = match &self.inverse_transform {
            Some(scaling) => (
                inverse_scaling(scaling, prediction)?,
                inverse_scaling(scaling, target)?,
            ),
            None => (prediction, target),
        };
        if prediction.dims() != target.dims() {
            return Err(NnError::ShapeMismatch {
                what: "metric inputs",
                left: prediction.dims().to_vec(),
                right: target.dims().to_vec(),
            });
        }
        let x = self.kind.compute(prediction, target);
        self.observe(x);
        Ok(x)
    }
}

/// Fixed set of metrics reported after every evaluation pass.
#[derive(Clone, Debug)]
pub struct MetricRegistry {
    metrics: Vec<Metric>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new(&[MetricKind::Mse, MetricKind::MaxAbs])
    }
}

impl MetricRegistry {
    pub fn new(kinds: &[MetricKind]) -> Self {
        Self {
            metrics: kinds.iter().copied().map(Metric::new).collect(),
        }
    }

    pub fn set_inverse_transform(&mut self, scaling: Option<ChannelScaling>) {
        for metric in &mut self.metrics {
            metric.set_inverse_transform(scaling.clone());
        }
    }

    pub fn reset(&mut self) {
        self.metrics.iter_mut().for_each(Metric::reset);
    }

    pub fn update<B: Backend>(
        &mut self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> NnResult<()> {
        for metric in &mut self.metrics {
            metric.update(prediction.clone(), target.clone())?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|metric| metric.name() == name)
    }

    pub fn values(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|metric| (metric.name().to_string(), metric.value()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn tensor(values: Vec<f32>, shape: [usize; 4]) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn running_average_matches_the_arithmetic_mean() {
        let mut metric = Metric::new(MetricKind::Mse);
        for x in [3.0, 5.0, 10.0, 2.0] {
            metric.observe(x);
        }
        assert!((metric.value() - 5.0).abs() < 1e-12);
        assert_eq!(metric.count(), 4);
        metric.reset();
        assert_eq!((metric.value(), metric.count()), (0.0, 0));
    }

    #[test]
    fn kinds_compute_their_reductions() {
        let prediction = tensor(vec![1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let target = tensor(vec![1.0, 0.0, 3.0, 1.0], [1, 1, 2, 2]);
        let mut mse = Metric::new(MetricKind::Mse);
        let mut inf = Metric::new(MetricKind::MaxAbs);
        let first = mse.update(prediction.clone(), target.clone()).unwrap();
        assert!((first - 13.0 / 4.0).abs() < 1e-6);
        assert!((inf.update(prediction, target).unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn inverse_transform_is_applied_to_both_sides() {
        let scaling = ChannelScaling::new(vec![2.0, 10.0], vec![5.0, -1.0]).unwrap();
        let prediction = tensor(vec![1.0, 1.0], [1, 2, 1, 1]);
        let target = tensor(vec![0.0, 0.0], [1, 2, 1, 1]);
        let mut metric = Metric::new(MetricKind::MaxAbs).with_inverse_transform(scaling);
        let x = metric.update(prediction, target).unwrap();
        assert!((x - 10.0).abs() < 1e-6);

        let wrong = tensor(vec![0.0], [1, 1, 1, 1]);
        assert!(metric.update(wrong.clone(), wrong).is_err());
    }

    #[test]
    fn registry_reports_named_values() {
        let mut registry = MetricRegistry::default();
        let prediction = tensor(vec![2.0], [1, 1, 1, 1]);
        let target = tensor(vec![0.0], [1, 1, 1, 1]);
        registry.update(prediction.clone(), target.clone()).unwrap();
        registry.update(prediction.mul_scalar(0.0), target).unwrap();
        let values = registry.values();
        assert_eq!(values.keys().cloned().collect::<Vec<_>>(), vec!["inf_norm", "mse"]);
        assert!((values["mse"] - 2.0).abs() < 1e-9);
        assert!((values["inf_norm"] - 1.0).abs() < 1e-9);
        assert_eq!(registry.get("mse").map(Metric::count), Some(2));
        registry.reset();
        assert!(registry.iter().all(|metric| metric.count() == 0));
    }
}
