// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{NnError, NnResult};

/// True when every milestone is larger than the one before it.
pub fn milestones_strictly_increasing(milestones: &[usize]) -> bool {
    milestones.windows(2).all(|pair| pair[0] < pair[1])
}

/// Step decay at fixed epochs: `lr = initial * gamma^k`, where `k` counts
/// the milestones at or below the current epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiStepLr {
    initial: f64,
    gamma: f64,
    milestones: Vec<usize>,
    epoch: usize,
}

impl MultiStepLr {
    pub fn new(initial: f64, gamma: f64, milestones: Vec<usize>) -> NnResult<Self> {
        if !milestones_strictly_increasing(&milestones) {
            return Err(NnError::InvalidMilestones { milestones });
        }
        Ok(Self {
            initial,
            gamma,
            milestones,
            epoch: 0,
        })
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn lr_at(&self, epoch: usize) -> f64 {
        let passed = self.milestones.partition_point(|&m| m <= epoch);
        self.initial * self.gamma.powi(passed as i32)
    }

    pub fn current_lr(&self) -> f64 {
        self.lr_at(self.epoch)
    }

    /// Advances one epoch and returns the new learning rate.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.current_lr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_ordering() {
        assert!(milestones_strictly_increasing(&[1, 3, 5]));
        assert!(milestones_strictly_increasing(&[]));
        assert!(milestones_strictly_increasing(&[7]));
        assert!(!milestones_strictly_increasing(&[1, 2, 2]));
        assert!(!milestones_strictly_increasing(&[4, 1]));
    }

    #[test]
    fn rejects_repeated_milestones() {
        let err = MultiStepLr::new(1e-3, 0.1, vec![1, 2, 2]).unwrap_err();
        assert!(matches!(err, NnError::InvalidMilestones { .. }));
        assert_eq!(
            err.to_string(),
            "epoch milestones list is not strictly increasing"
        );
    }

    #[test]
    fn decays_exactly_at_milestones() {
        let mut schedule = MultiStepLr::new(1.0, 0.5, vec![2, 4]).unwrap();
        let mut seen = vec![schedule.current_lr()];
        for _ in 0..5 {
            seen.push(schedule.step());
        }
        assert_eq!(seen, vec![1.0, 1.0, 0.5, 0.5, 0.25, 0.25]);
        assert_eq!(schedule.epoch(), 5);
        assert_eq!(schedule.lr_at(0), 1.0);
    }
}
