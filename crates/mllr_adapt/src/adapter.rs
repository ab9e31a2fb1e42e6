//! Adaptation lifecycle.

use std::path::Path;
use std::sync::Arc;

use am_engine::ModelStore;

use crate::cluster::ClusterMap;
use crate::error::AdaptError;
use crate::observation::DecodedResult;
use crate::stats::Stats;
use crate::transform::{SolveReport, Transform};
use crate::transformer;

/// Lifecycle phase of a `SpeakerAdapter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Empty,
    Collecting,
    Ready,
    Applied,
}

/// Owns the full adaptation pipeline for one speaker: the regression-class
/// clustering, the statistics, and the current transform.
///
/// `Empty -> Collecting -> Ready -> Applied`; `reset` returns to `Empty`.
pub struct SpeakerAdapter {
    store: Arc<ModelStore>,
    cluster: Arc<ClusterMap>,
    stats: Stats,
    transform: Transform,
    state: AdapterState,
}

impl SpeakerAdapter {
    pub fn new(store: Arc<ModelStore>, num_classes: usize) -> Result<SpeakerAdapter, AdaptError> {
        let cluster = Arc::new(ClusterMap::build(
            store.means_pool(),
            num_classes,
            ClusterMap::DEFAULT_MAX_ITERATIONS,
        )?);
        let stats = Stats::new(store.clone(), cluster.clone())?;
        let transform = Transform::identity(num_classes, store.gaussian_dimension());

        Ok(SpeakerAdapter {
            store,
            cluster,
            stats,
            transform,
            state: AdapterState::Empty,
        })
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn cluster_map(&self) -> &ClusterMap {
        &self.cluster
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Accumulates one decoded utterance.
    pub fn collect(&mut self, result: &DecodedResult) -> Result<(), AdaptError> {
        match self.state {
            AdapterState::Empty | AdapterState::Collecting => {
                self.stats.collect(result)?;
                self.state = AdapterState::Collecting;
                Ok(())
            }
            state => Err(AdaptError::InvalidState {
                operation: "collect",
                state,
            }),
        }
    }

    /// Solves the per-class transforms from the collected statistics.
    pub fn estimate(&mut self) -> Result<SolveReport, AdaptError> {
        if self.state != AdapterState::Collecting {
            return Err(AdaptError::InvalidState {
                operation: "estimate",
                state: self.state,
            });
        }
        let report = self.transform.update(&self.stats);
        self.state = AdapterState::Ready;
        Ok(report)
    }

    /// Seeds the adapter from a pre-computed transform file instead of
    /// estimating one.
    pub fn load_transform(&mut self, path: impl AsRef<Path>) -> Result<(), AdaptError> {
        let transform = Transform::load(path)?;
        if transform.dimension() != self.store.gaussian_dimension() {
            return Err(AdaptError::Mismatch(format!(
                "transform dimension {} != model dimension {}",
                transform.dimension(),
                self.store.gaussian_dimension()
            )));
        }
        if transform.num_classes() != self.cluster.num_classes() {
            return Err(AdaptError::Mismatch(format!(
                "transform has {} classes, adapter clusters into {}",
                transform.num_classes(),
                self.cluster.num_classes()
            )));
        }
        self.transform = transform;
        self.state = AdapterState::Ready;
        Ok(())
    }

    /// Applies the current transform to the means and writes the adapted
    /// means file.
    pub fn apply_to(&mut self, path: impl AsRef<Path>) -> Result<(), AdaptError> {
        if self.state != AdapterState::Ready {
            return Err(AdaptError::InvalidState {
                operation: "apply",
                state: self.state,
            });
        }
        let adapted = transformer::apply_transform(&self.store, &self.cluster, &self.transform)?;
        transformer::write_means(&self.store, &adapted, path)?;
        self.state = AdapterState::Applied;
        Ok(())
    }

    /// Discards all statistics and the current transform.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.transform =
            Transform::identity(self.cluster.num_classes(), self.store.gaussian_dimension());
        self.state = AdapterState::Empty;
    }
}
