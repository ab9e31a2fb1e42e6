//! Immutable post-load model container.

use std::collections::HashMap;

use crate::hmm::HmmManager;
use crate::pool::{Pool, NUM_GAUSSIANS_PER_STATE, NUM_SENONES, NUM_STREAMS};
use crate::senone::Senone;
use crate::unit::UnitManager;

/// Optional front-end feature rotation, `num_rows x num_values`.
#[derive(Debug, Clone)]
pub struct FeatureTransform {
    pub rows: Vec<Vec<f32>>,
}

impl FeatureTransform {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_values(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// All pools and maps of one loaded acoustic model. Every field is populated
/// by the loader except the feature transform and the four mean/variance
/// transformation pools, which are absent unless their files exist.
#[derive(Debug)]
pub struct ModelStore {
    pub(crate) means: Pool<Vec<f32>>,
    pub(crate) variances: Pool<Vec<f32>>,
    pub(crate) mixture_weights: Pool<Vec<f32>>,
    pub(crate) transition_matrices: Pool<Vec<Vec<f32>>>,
    pub(crate) senones: Pool<Senone>,
    pub(crate) ci_units: UnitManager,
    pub(crate) hmm_manager: HmmManager,
    pub(crate) properties: HashMap<String, String>,
    pub(crate) feature_transform: Option<FeatureTransform>,
    pub(crate) mean_transformation_matrix: Option<Vec<Vec<f32>>>,
    pub(crate) mean_transformation_vector: Option<Vec<f32>>,
    pub(crate) variance_transformation_matrix: Option<Vec<Vec<f32>>>,
    pub(crate) variance_transformation_vector: Option<Vec<f32>>,
    pub(crate) vector_lengths: Vec<usize>,
    pub(crate) num_states_per_hmm: usize,
}

impl ModelStore {
    pub fn means_pool(&self) -> &Pool<Vec<f32>> {
        &self.means
    }

    pub fn variance_pool(&self) -> &Pool<Vec<f32>> {
        &self.variances
    }

    pub fn mixture_weights_pool(&self) -> &Pool<Vec<f32>> {
        &self.mixture_weights
    }

    pub fn transition_matrix_pool(&self) -> &Pool<Vec<Vec<f32>>> {
        &self.transition_matrices
    }

    pub fn senone_pool(&self) -> &Pool<Senone> {
        &self.senones
    }

    pub fn context_independent_units(&self) -> &UnitManager {
        &self.ci_units
    }

    pub fn hmm_manager(&self) -> &HmmManager {
        &self.hmm_manager
    }

    /// `feat.params` key/value pairs.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn feature_transform(&self) -> Option<&FeatureTransform> {
        self.feature_transform.as_ref()
    }

    pub fn mean_transformation_matrix(&self) -> Option<&Vec<Vec<f32>>> {
        self.mean_transformation_matrix.as_ref()
    }

    pub fn mean_transformation_vector(&self) -> Option<&Vec<f32>> {
        self.mean_transformation_vector.as_ref()
    }

    pub fn variance_transformation_matrix(&self) -> Option<&Vec<Vec<f32>>> {
        self.variance_transformation_matrix.as_ref()
    }

    pub fn variance_transformation_vector(&self) -> Option<&Vec<f32>> {
        self.variance_transformation_vector.as_ref()
    }

    /// Per-stream feature vector lengths, as declared by the means file.
    pub fn vector_lengths(&self) -> &[usize] {
        &self.vector_lengths
    }

    pub fn num_states_per_hmm(&self) -> usize {
        self.num_states_per_hmm
    }

    pub fn num_senones(&self) -> usize {
        self.senones.len()
    }

    pub fn num_streams(&self) -> usize {
        self.means
            .feature(NUM_STREAMS)
            .map_or(self.vector_lengths.len(), |v| v as usize)
    }

    pub fn num_gaussians_per_state(&self) -> usize {
        self.means.feature(NUM_GAUSSIANS_PER_STATE).unwrap_or(0) as usize
    }

    /// Declared senone count of the parameter files (matches
    /// `senone_pool().len()` after a successful load).
    pub fn declared_num_senones(&self) -> usize {
        self.means.feature(NUM_SENONES).unwrap_or(0) as usize
    }

    /// Dimension of the (single-stream) Gaussian mean vectors.
    pub fn gaussian_dimension(&self) -> usize {
        self.means.try_get(0).map_or(0, Vec::len)
    }
}
