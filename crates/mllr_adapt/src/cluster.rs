//! Regression-class clustering.
//!
//! Lloyd iteration over the Gaussian means on squared Euclidean distance.
//! Everything is deterministic for a fixed `(means, k, max_iterations)`:
//! centroids start at every `floor(n / k)`-th mean, ties go to the lowest
//! class id, and an emptied class keeps its previous centroid.

use am_engine::Pool;
use rayon::prelude::*;

use crate::error::AdaptError;

/// Gaussian id -> regression class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMap {
    assignments: Vec<usize>,
    num_classes: usize,
}

impl ClusterMap {
    pub const DEFAULT_MAX_ITERATIONS: usize = 20;

    pub fn build(
        means: &Pool<Vec<f32>>,
        num_classes: usize,
        max_iterations: usize,
    ) -> Result<ClusterMap, AdaptError> {
        let n = means.len();
        if num_classes == 0 || num_classes > n {
            return Err(AdaptError::Mismatch(format!(
                "cannot split {} gaussians into {} regression classes",
                n, num_classes
            )));
        }
        // Global MLLR: one class, nothing to iterate
        if num_classes == 1 {
            return Ok(ClusterMap {
                assignments: vec![0; n],
                num_classes: 1,
            });
        }

        let dim = means.get(0).len();
        let stride = n / num_classes;
        let mut centroids: Vec<Vec<f64>> = (0..num_classes)
            .map(|c| means.get(c * stride).iter().map(|&v| f64::from(v)).collect())
            .collect();

        let mut assignments = assign(means, &centroids);
        for iteration in 1..=max_iterations {
            recompute_centroids(means, &assignments, &mut centroids, dim);
            let next = assign(means, &centroids);
            if next == assignments {
                tracing::debug!(iteration, "regression clustering converged");
                break;
            }
            assignments = next;
        }

        Ok(ClusterMap {
            assignments,
            num_classes,
        })
    }

    pub fn class_of(&self, gaussian: usize) -> usize {
        self.assignments[gaussian]
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of Gaussians covered by the map.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    pub fn class_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.num_classes];
        for &c in &self.assignments {
            sizes[c] += 1;
        }
        sizes
    }
}

/// Nearest centroid per mean; strict `<` keeps the lowest class id on ties.
fn assign(means: &Pool<Vec<f32>>, centroids: &[Vec<f64>]) -> Vec<usize> {
    (0..means.len())
        .into_par_iter()
        .map(|g| {
            let mean = means.get(g);
            let mut best = 0usize;
            let mut best_distance = f64::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let distance: f64 = mean
                    .iter()
                    .zip(centroid)
                    .map(|(&m, &x)| {
                        let d = f64::from(m) - x;
                        d * d
                    })
                    .sum();
                if distance < best_distance {
                    best_distance = distance;
                    best = c;
                }
            }
            best
        })
        .collect()
}

fn recompute_centroids(
    means: &Pool<Vec<f32>>,
    assignments: &[usize],
    centroids: &mut [Vec<f64>],
    dim: usize,
) {
    let k = centroids.len();
    let mut sums = vec![vec![0.0f64; dim]; k];
    let mut counts = vec![0usize; k];
    for (g, &c) in assignments.iter().enumerate() {
        counts[c] += 1;
        for (s, &m) in sums[c].iter_mut().zip(means.get(g)) {
            *s += f64::from(m);
        }
    }
    for c in 0..k {
        if counts[c] == 0 {
            continue; // emptied class keeps its centroid
        }
        for (target, s) in centroids[c].iter_mut().zip(&sums[c]) {
            *target = s / counts[c] as f64;
        }
    }
}
