// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{DataError, DataResult};
use crate::subdomain::{crop_center, Sample};
use std::ops::Range;
use std::sync::Arc;
use tracing::info;

/// Indexable collection of training samples.
pub trait FieldDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> DataResult<Sample>;

    fn n_features(&self) -> usize;

    fn n_targets(&self) -> usize;

    /// Spatial `(lat, lon)` size of the feature fields.
    fn feature_shape(&self) -> (usize, usize);

    /// Spatial `(lat, lon)` size of the target fields.
    fn target_shape(&self) -> (usize, usize);
}

impl<D: FieldDataset + ?Sized> FieldDataset for Arc<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> DataResult<Sample> {
        (**self).get(index)
    }

    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn n_targets(&self) -> usize {
        (**self).n_targets()
    }

    fn feature_shape(&self) -> (usize, usize) {
        (**self).feature_shape()
    }

    fn target_shape(&self) -> (usize, usize) {
        (**self).target_shape()
    }
}

/// Index at `pct` of the way through `len` items, rounded down.
pub fn at_idx_pct(pct: f64, len: usize) -> usize {
    ((pct * len as f64).floor().max(0.0) as usize).min(len)
}

/// Contiguous window `range` of another dataset.
#[derive(Clone, Debug)]
pub struct Subset<D> {
    inner: D,
    range: Range<usize>,
}

impl<D: FieldDataset> Subset<D> {
    pub fn new(inner: D, range: Range<usize>) -> DataResult<Self> {
        if range.end > inner.len() || range.start > range.end {
            return Err(DataError::IndexOutOfRange {
                index: range.end.max(range.start),
                len: inner.len(),
            });
        }
        Ok(Self { inner, range })
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: FieldDataset> FieldDataset for Subset<D> {
    fn len(&self) -> usize {
        self.range.len()
    }

    fn get(&self, index: usize) -> DataResult<Sample> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        self.inner.get(self.range.start + index)
    }

    fn n_features(&self) -> usize {
        self.inner.n_features()
    }

    fn n_targets(&self) -> usize {
        self.inner.n_targets()
    }

    fn feature_shape(&self) -> (usize, usize) {
        self.inner.feature_shape()
    }

    fn target_shape(&self) -> (usize, usize) {
        self.inner.target_shape()
    }
}

/// Splits each sample axis into a leading train window `[0, train_end)` and a
/// trailing test window `[test_start, len)`, both given as fractions.
pub fn split_train_test<D: FieldDataset + Clone>(
    dataset: D,
    train_split_end: f64,
    test_split_start: f64,
) -> DataResult<(Subset<D>, Subset<D>)> {
    for (label, value) in [
        ("train_split_end", train_split_end),
        ("test_split_start", test_split_start),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(DataError::SplitFraction { label, value });
        }
    }
    if test_split_start < train_split_end {
        return Err(DataError::OverlappingSplits {
            train_end: train_split_end,
            test_start: test_split_start,
        });
    }
    let len = dataset.len();
    let train = Subset::new(dataset.clone(), 0..at_idx_pct(train_split_end, len))?;
    let test = Subset::new(dataset, at_idx_pct(test_split_start, len)..len)?;
    Ok((train, test))
}

/// Several datasets behind one index space.
///
/// Samples are centre-cropped to the smallest feature and target shapes of
/// the parts so every batch stacks.
#[derive(Clone, Debug)]
pub struct ConcatDataset<D> {
    parts: Vec<D>,
    offsets: Vec<usize>,
    feature_shape: (usize, usize),
    target_shape: (usize, usize),
}

impl<D: FieldDataset> ConcatDataset<D> {
    pub fn new(parts: Vec<D>) -> DataResult<Self> {
        let first = parts.first().ok_or(DataError::Empty("dataset list"))?;
        let (n_features, n_targets) = (first.n_features(), first.n_targets());
        let mut feature_shape = first.feature_shape();
        let mut target_shape = first.target_shape();
        let mut offsets = Vec::with_capacity(parts.len() + 1);
        offsets.push(0);
        for part in &parts {
            if part.n_features() != n_features {
                return Err(DataError::Incompatible {
                    what: "feature channels",
                    left: n_features,
                    right: part.n_features(),
                });
            }
            if part.n_targets() != n_targets {
                return Err(DataError::Incompatible {
                    what: "target channels",
                    left: n_targets,
                    right: part.n_targets(),
                });
            }
            let (fh, fw) = part.feature_shape();
            let (th, tw) = part.target_shape();
            feature_shape = (feature_shape.0.min(fh), feature_shape.1.min(fw));
            target_shape = (target_shape.0.min(th), target_shape.1.min(tw));
            let last = offsets.last().copied().unwrap_or(0);
            offsets.push(last + part.len());
        }
        info!(
            parts = parts.len(),
            samples = offsets.last().copied().unwrap_or(0),
            ?feature_shape,
            ?target_shape,
            "concatenated datasets"
        );
        Ok(Self {
            parts,
            offsets,
            feature_shape,
            target_shape,
        })
    }

    pub fn parts(&self) -> &[D] {
        &self.parts
    }

    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        // offsets[k] <= index < offsets[k + 1]
        let part = self.offsets.partition_point(|&start| start <= index);
        if part == 0 || part >= self.offsets.len() {
            return None;
        }
        Some((part - 1, index - self.offsets[part - 1]))
    }
}

impl<D: FieldDataset> FieldDataset for ConcatDataset<D> {
    fn len(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn get(&self, index: usize) -> DataResult<Sample> {
        let (part, local) = self.locate(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        let sample = self.parts[part].get(local)?;
        Ok(Sample {
            features: crop_center(&sample.features, self.feature_shape)?,
            targets: crop_center(&sample.targets, self.target_shape)?,
        })
    }

    fn n_features(&self) -> usize {
        self.parts[0].n_features()
    }

    fn n_targets(&self) -> usize {
        self.parts[0].n_targets()
    }

    fn feature_shape(&self) -> (usize, usize) {
        self.feature_shape
    }

    fn target_shape(&self) -> (usize, usize) {
        self.target_shape
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array3;

    /// Dataset whose sample `i` is filled with `base + i`.
    #[derive(Clone, Debug)]
    pub(crate) struct Constant {
        pub len: usize,
        pub base: f32,
        pub shape: (usize, usize),
    }

    impl FieldDataset for Constant {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: usize) -> DataResult<Sample> {
            if index >= self.len {
                return Err(DataError::IndexOutOfRange {
                    index,
                    len: self.len,
                });
            }
            let value = self.base + index as f32;
            Ok(Sample {
                features: Array3::from_elem((2, self.shape.0, self.shape.1), value),
                targets: Array3::from_elem((2, self.shape.0, self.shape.1), -value),
            })
        }

        fn n_features(&self) -> usize {
            2
        }

        fn n_targets(&self) -> usize {
            2
        }

        fn feature_shape(&self) -> (usize, usize) {
            self.shape
        }

        fn target_shape(&self) -> (usize, usize) {
            self.shape
        }
    }

    #[test]
    fn at_idx_pct_rounds_down() {
        assert_eq!(at_idx_pct(0.8, 10), 8);
        assert_eq!(at_idx_pct(0.85, 10), 8);
        assert_eq!(at_idx_pct(0.0, 10), 0);
        assert_eq!(at_idx_pct(1.0, 7), 7);
    }

    #[test]
    fn split_produces_disjoint_windows() {
        let data = Constant {
            len: 10,
            base: 0.0,
            shape: (2, 2),
        };
        let (train, test) = split_train_test(data, 0.7, 0.8).unwrap();
        assert_eq!(train.range(), 0..7);
        assert_eq!(test.range(), 8..10);
        assert_eq!(test.get(0).unwrap().features[[0, 0, 0]], 8.0);
        assert!(test.get(2).is_err());
    }

    #[test]
    fn split_validates_fractions() {
        let data = Constant {
            len: 4,
            base: 0.0,
            shape: (1, 1),
        };
        assert!(matches!(
            split_train_test(data.clone(), 1.2, 1.2),
            Err(DataError::SplitFraction { .. })
        ));
        assert!(matches!(
            split_train_test(data, 0.6, 0.5),
            Err(DataError::OverlappingSplits { .. })
        ));
    }

    #[test]
    fn concat_indexes_across_parts_and_crops() {
        let a = Constant {
            len: 2,
            base: 0.0,
            shape: (6, 8),
        };
        let b = Constant {
            len: 3,
            base: 100.0,
            shape: (4, 10),
        };
        let concat = ConcatDataset::new(vec![a, b]).unwrap();
        assert_eq!(concat.len(), 5);
        assert_eq!(concat.feature_shape(), (4, 8));
        let s1 = concat.get(1).unwrap();
        assert_eq!(s1.features[[0, 0, 0]], 1.0);
        assert_eq!(s1.features.dim(), (2, 4, 8));
        let s2 = concat.get(2).unwrap();
        assert_eq!(s2.features[[0, 0, 0]], 100.0);
        assert_eq!(s2.targets.dim(), (2, 4, 8));
        assert_eq!(concat.get(4).unwrap().features[[1, 3, 7]], 102.0);
        assert!(concat.get(5).is_err());
    }

    #[test]
    fn concat_skips_empty_parts() {
        let empty = Constant {
            len: 0,
            base: 0.0,
            shape: (2, 2),
        };
        let full = Constant {
            len: 2,
            base: 5.0,
            shape: (2, 2),
        };
        let concat = ConcatDataset::new(vec![empty, full]).unwrap();
        assert_eq!(concat.get(0).unwrap().features[[0, 0, 0]], 5.0);
    }

    #[test]
    fn concat_of_nothing_is_an_error() {
        assert!(ConcatDataset::<Constant>::new(Vec::new()).is_err());
    }
}
