// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::dataset::FieldDataset;
use crate::error::{DataError, DataResult};
use ndarray::{stack, Array4, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

/// Stacked `(batch, channel, lat, lon)` features and targets.
#[derive(Clone, Debug)]
pub struct Batch {
    pub features: Array4<f32>,
    pub targets: Array4<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn assemble<D: FieldDataset + ?Sized>(dataset: &D, indices: &[usize]) -> DataResult<Batch> {
    let mut samples = Vec::with_capacity(indices.len());
    for &idx in indices {
        samples.push(dataset.get(idx)?);
    }
    let features: Vec<ArrayView3<'_, f32>> = samples.iter().map(|s| s.features.view()).collect();
    let targets: Vec<ArrayView3<'_, f32>> = samples.iter().map(|s| s.targets.view()).collect();
    let features = stack(Axis(0), &features).map_err(|_| DataError::Incompatible {
        what: "feature sample shapes in batch",
        left: indices.len(),
        right: features.len(),
    })?;
    let targets = stack(Axis(0), &targets).map_err(|_| DataError::Incompatible {
        what: "target sample shapes in batch",
        left: indices.len(),
        right: targets.len(),
    })?;
    Ok(Batch { features, targets })
}

fn chunk_indices(order: &[usize], batch_size: usize, drop_last: bool) -> Vec<Vec<usize>> {
    order
        .chunks(batch_size.max(1))
        .filter(|chunk| !drop_last || chunk.len() == batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}

struct ImmediateBatches<D> {
    dataset: Arc<D>,
    chunks: std::vec::IntoIter<Vec<usize>>,
}

impl<D: FieldDataset> Iterator for ImmediateBatches<D> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.chunks.next()?;
        Some(assemble(self.dataset.as_ref(), &indices))
    }
}

struct PrefetchBatches {
    rx: Receiver<DataResult<Batch>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PrefetchBatches {
    fn spawn<D: FieldDataset + 'static>(
        dataset: Arc<D>,
        chunks: Vec<Vec<usize>>,
        depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(depth.max(1));
        let handle = thread::spawn(move || {
            for indices in chunks {
                if tx.send(assemble(dataset.as_ref(), &indices)).is_err() {
                    return;
                }
            }
        });
        Self {
            rx,
            handle: Some(handle),
        }
    }
}

impl Iterator for PrefetchBatches {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rx.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                // sender dropped: finished cleanly unless the worker panicked
                let handle = self.handle.take()?;
                match handle.join() {
                    Ok(()) => None,
                    Err(_) => Some(Err(DataError::WorkerDisconnected)),
                }
            }
        }
    }
}

impl Drop for PrefetchBatches {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // unblock a worker waiting on a full channel before joining
            let (_, idle) = mpsc::sync_channel(0);
            drop(std::mem::replace(&mut self.rx, idle));
            let _ = handle.join();
        }
    }
}

enum LoaderBackend<D> {
    Immediate(ImmediateBatches<D>),
    Prefetch(PrefetchBatches),
}

/// Iterator over the batches of one epoch.
pub struct EpochBatches<D> {
    backend: LoaderBackend<D>,
}

impl<D: FieldDataset> Iterator for EpochBatches<D> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.backend {
            LoaderBackend::Immediate(iter) => iter.next(),
            LoaderBackend::Prefetch(iter) => iter.next(),
        }
    }
}

/// Builder-style loader with per-epoch deterministic shuffling, fixed batch
/// sizes, optional dropping of the ragged tail and background prefetch.
pub struct DataLoader<D> {
    dataset: Arc<D>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    drop_last: bool,
    prefetch: usize,
}

impl<D> Clone for DataLoader<D> {
    fn clone(&self) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            batch_size: self.batch_size,
            shuffle_seed: self.shuffle_seed,
            drop_last: self.drop_last,
            prefetch: self.prefetch,
        }
    }
}

impl<D: FieldDataset + 'static> DataLoader<D> {
    pub fn new(dataset: Arc<D>) -> Self {
        Self {
            dataset,
            batch_size: 1,
            shuffle_seed: None,
            drop_last: false,
            prefetch: 0,
        }
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn prefetch_depth(&self) -> usize {
        self.prefetch
    }

    /// Updates the loader to emit batches of `batch_size` samples.
    pub fn batched(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Reshuffles the visitation order every epoch from `seed` and the epoch
    /// number.
    pub fn shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Drops the final batch when it holds fewer than `batch_size` samples.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Enables background prefetching with the given channel depth.
    pub fn prefetch(mut self, depth: usize) -> Self {
        self.prefetch = depth;
        self
    }

    /// Number of batches one epoch yields.
    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    /// Visitation order for `epoch`.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let epoch_seed = seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let mut rng = StdRng::seed_from_u64(epoch_seed);
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Iterates the batches of `epoch`.
    pub fn epoch(&self, epoch: usize) -> EpochBatches<D> {
        let chunks = chunk_indices(&self.order(epoch), self.batch_size, self.drop_last);
        let backend = if self.prefetch == 0 {
            LoaderBackend::Immediate(ImmediateBatches {
                dataset: Arc::clone(&self.dataset),
                chunks: chunks.into_iter(),
            })
        } else {
            LoaderBackend::Prefetch(PrefetchBatches::spawn(
                Arc::clone(&self.dataset),
                chunks,
                self.prefetch,
            ))
        };
        EpochBatches { backend }
    }
}
