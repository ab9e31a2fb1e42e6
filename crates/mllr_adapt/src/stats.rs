//! MLLR sufficient statistics.
//!
//! Per regression class `c` and feature dimension `i`, accumulates the
//! `(d+1) x (d+1)` outer-product matrix `G[c][i]` over extended mean vectors
//! `xi = [mu; 1]` and the right-hand side `z[c][i]` weighted by the observed
//! feature, with per-frame weight `gamma / sigma^2_i`. Solving
//! `G[c][i] w = z[c][i]` later yields the row `i` of the class transform.

use std::sync::Arc;

use am_engine::ModelStore;
use ndarray::{Array1, Array2};

use crate::cluster::ClusterMap;
use crate::error::AdaptError;
use crate::observation::DecodedResult;

/// Posterior mass below this contributes nothing measurable and is skipped.
const MIN_POSTERIOR: f64 = 1e-12;

pub struct Stats {
    store: Arc<ModelStore>,
    cluster: Arc<ClusterMap>,
    dim: usize,
    num_gaussians_per_state: usize,
    regressions: Vec<Vec<Array2<f64>>>,
    z_vectors: Vec<Vec<Array1<f64>>>,
    frames: u64,
    class_occupancy: Vec<f64>,
}

impl Stats {
    pub fn new(store: Arc<ModelStore>, cluster: Arc<ClusterMap>) -> Result<Stats, AdaptError> {
        let dim = store.gaussian_dimension();
        if dim == 0 {
            return Err(AdaptError::Mismatch("model has no gaussians".to_string()));
        }
        if cluster.len() != store.means_pool().len() {
            return Err(AdaptError::Mismatch(format!(
                "cluster map covers {} gaussians, model has {}",
                cluster.len(),
                store.means_pool().len()
            )));
        }

        let k = cluster.num_classes();
        let regressions = (0..k)
            .map(|_| (0..dim).map(|_| Array2::zeros((dim + 1, dim + 1))).collect())
            .collect();
        let z_vectors = (0..k)
            .map(|_| (0..dim).map(|_| Array1::zeros(dim + 1)).collect())
            .collect();
        let num_gaussians_per_state = store.num_gaussians_per_state();

        Ok(Stats {
            store,
            cluster,
            dim,
            num_gaussians_per_state,
            regressions,
            z_vectors,
            frames: 0,
            class_occupancy: vec![0.0; k],
        })
    }

    /// Accumulates one decoded utterance. Not reentrant; callers serialize.
    pub fn collect(&mut self, result: &DecodedResult) -> Result<(), AdaptError> {
        for frame in &result.frames {
            if frame.feature.len() != self.dim {
                return Err(AdaptError::Mismatch(format!(
                    "frame has {} dimensions, model has {}",
                    frame.feature.len(),
                    self.dim
                )));
            }
            self.frames += 1;

            for p in &frame.posteriors {
                let gamma = f64::from(p.posterior);
                if gamma < MIN_POSTERIOR {
                    continue;
                }
                if p.component >= self.num_gaussians_per_state {
                    return Err(AdaptError::Mismatch(format!(
                        "component {} out of range for {} gaussians per state",
                        p.component, self.num_gaussians_per_state
                    )));
                }
                let gaussian = p.senone * self.num_gaussians_per_state + p.component;
                let mean = self
                    .store
                    .means_pool()
                    .try_get(gaussian)
                    .ok_or_else(|| {
                        AdaptError::Mismatch(format!(
                            "senone {} component {} maps to gaussian {} of {}",
                            p.senone,
                            p.component,
                            gaussian,
                            self.store.means_pool().len()
                        ))
                    })?;
                let variance = self.store.variance_pool().get(gaussian);
                let class = self.cluster.class_of(gaussian);
                self.class_occupancy[class] += gamma;

                for i in 0..self.dim {
                    // Variances are floored at load time, so the division
                    // is safe.
                    let weight = gamma / f64::from(variance[i]);
                    let observed = weight * f64::from(frame.feature[i]);
                    let regression = &mut self.regressions[class][i];
                    let z = &mut self.z_vectors[class][i];
                    for row in 0..=self.dim {
                        let xi_row = extended_mean(mean, row);
                        z[row] += observed * xi_row;
                        for col in 0..=self.dim {
                            regression[[row, col]] +=
                                weight * xi_row * extended_mean(mean, col);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Zeroes every accumulator.
    pub fn reset(&mut self) {
        for per_class in &mut self.regressions {
            for m in per_class {
                m.fill(0.0);
            }
        }
        for per_class in &mut self.z_vectors {
            for v in per_class {
                v.fill(0.0);
            }
        }
        self.frames = 0;
        self.class_occupancy.fill(0.0);
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn num_classes(&self) -> usize {
        self.class_occupancy.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Total posterior mass accumulated for a class.
    pub fn class_occupancy(&self, class: usize) -> f64 {
        self.class_occupancy[class]
    }

    pub(crate) fn regression(&self, class: usize, dim: usize) -> &Array2<f64> {
        &self.regressions[class][dim]
    }

    pub(crate) fn z_vector(&self, class: usize, dim: usize) -> &Array1<f64> {
        &self.z_vectors[class][dim]
    }
}

/// Component `idx` of the extended mean `[mu; 1]`.
#[inline]
fn extended_mean(mean: &[f32], idx: usize) -> f64 {
    if idx < mean.len() {
        f64::from(mean[idx])
    } else {
        1.0
    }
}
