//! Senones: tied HMM states realized as Gaussian mixtures.

use crate::logmath::LogMath;

/// Optional affine transformations applied to a component's mean and
/// variance at construction time. `None` means identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComponentTransforms<'a> {
    pub mean_matrix: Option<&'a [Vec<f32>]>,
    pub mean_vector: Option<&'a [f32]>,
    pub variance_matrix: Option<&'a [Vec<f32>]>,
    pub variance_vector: Option<&'a [f32]>,
}

fn apply_affine(matrix: Option<&[Vec<f32>]>, vector: Option<&[f32]>, input: &[f32]) -> Vec<f32> {
    let mut out = match matrix {
        None => input.to_vec(),
        Some(m) => m
            .iter()
            .map(|row| row.iter().zip(input).map(|(a, x)| a * x).sum())
            .collect(),
    };
    if let Some(v) = vector {
        for (o, b) in out.iter_mut().zip(v) {
            *o += b;
        }
    }
    out
}

/// One diagonal Gaussian of a mixture, with the log-density terms
/// precomputed from the (transformed, floored) parameters.
#[derive(Debug, Clone)]
pub struct MixtureComponent {
    mean: Vec<f32>,
    variance: Vec<f32>,
    inverse_variance: Vec<f32>,
    log_constant: f32,
    score_floor: f32,
}

impl MixtureComponent {
    pub fn new(
        mean: Vec<f32>,
        variance: Vec<f32>,
        transforms: &ComponentTransforms<'_>,
        dist_floor: f32,
        variance_floor: f32,
        logmath: &LogMath,
    ) -> Self {
        let mean = apply_affine(transforms.mean_matrix, transforms.mean_vector, &mean);
        let mut variance =
            apply_affine(transforms.variance_matrix, transforms.variance_vector, &variance);
        for v in &mut variance {
            if *v < variance_floor {
                *v = variance_floor;
            }
        }

        let log_constant: f32 = variance
            .iter()
            .map(|&v| -0.5 * (2.0 * std::f32::consts::PI * v).ln())
            .sum();
        let inverse_variance = variance.iter().map(|&v| 1.0 / v).collect();

        MixtureComponent {
            mean,
            variance,
            inverse_variance,
            log_constant,
            score_floor: logmath.linear_to_log(dist_floor),
        }
    }

    /// Log density of `feature` under this Gaussian, floored to the
    /// component score floor.
    pub fn score(&self, feature: &[f32]) -> f32 {
        debug_assert_eq!(feature.len(), self.mean.len());
        let mut log_density = self.log_constant;
        for i in 0..self.mean.len() {
            let d = feature[i] - self.mean[i];
            log_density -= 0.5 * d * d * self.inverse_variance[i];
        }
        log_density.max(self.score_floor)
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn variance(&self) -> &[f32] {
        &self.variance
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }
}

/// A Gaussian mixture senone: `G` components plus a log mixture-weight
/// vector of length `G * numStreams`.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    id: usize,
    log_mixture_weights: Vec<f32>,
    components: Vec<MixtureComponent>,
}

impl GaussianMixture {
    pub fn new(id: usize, log_mixture_weights: Vec<f32>, components: Vec<MixtureComponent>) -> Self {
        GaussianMixture {
            id,
            log_mixture_weights,
            components,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn log_mixture_weights(&self) -> &[f32] {
        &self.log_mixture_weights
    }

    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Mixture log likelihood: log-sum over `w_k * N_k(feature)`.
    pub fn score(&self, feature: &[f32], logmath: &LogMath) -> f32 {
        let mut total = LogMath::LOG_ZERO;
        for (k, component) in self.components.iter().enumerate() {
            let weighted = self.log_mixture_weights[k] + component.score(feature);
            total = logmath.add_as_linear(total, weighted);
        }
        total
    }
}

/// A tied HMM state. Tagged over the realized mixture kinds; scoring and
/// cloning are the shared capability set.
#[derive(Debug, Clone)]
pub enum Senone {
    GaussianMixture(GaussianMixture),
}

impl Senone {
    pub fn id(&self) -> usize {
        match self {
            Senone::GaussianMixture(gm) => gm.id(),
        }
    }

    pub fn score(&self, feature: &[f32], logmath: &LogMath) -> f32 {
        match self {
            Senone::GaussianMixture(gm) => gm.score(feature, logmath),
        }
    }

    pub fn as_gaussian_mixture(&self) -> &GaussianMixture {
        match self {
            Senone::GaussianMixture(gm) => gm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_component(mean: Vec<f32>) -> MixtureComponent {
        let dim = mean.len();
        MixtureComponent::new(
            mean,
            vec![1.0; dim],
            &ComponentTransforms::default(),
            0.0,
            1e-4,
            &LogMath::new(),
        )
    }

    #[test]
    fn test_component_score_at_mean() {
        // At the mean of a unit-variance Gaussian the log density is
        // -0.5 * d * log(2 pi)
        let c = unit_component(vec![1.0, -1.0]);
        let expected = -(2.0 * std::f32::consts::PI).ln();
        assert!((c.score(&[1.0, -1.0]) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_component_score_falls_off() {
        let c = unit_component(vec![0.0, 0.0]);
        let at_mean = c.score(&[0.0, 0.0]);
        let off = c.score(&[1.0, 1.0]);
        assert!((at_mean - off - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_variance_floor_applied() {
        let c = MixtureComponent::new(
            vec![0.0],
            vec![0.0],
            &ComponentTransforms::default(),
            0.0,
            1e-4,
            &LogMath::new(),
        );
        assert_eq!(c.variance(), &[1e-4]);
    }

    #[test]
    fn test_mean_transform_pre_applied() {
        let matrix = vec![vec![2.0, 0.0], vec![0.0, 2.0]];
        let vector = vec![1.0, -1.0];
        let transforms = ComponentTransforms {
            mean_matrix: Some(&matrix),
            mean_vector: Some(&vector),
            ..Default::default()
        };
        let c = MixtureComponent::new(
            vec![1.0, 2.0],
            vec![1.0, 1.0],
            &transforms,
            0.0,
            1e-4,
            &LogMath::new(),
        );
        assert_eq!(c.mean(), &[3.0, 3.0]);
    }

    #[test]
    fn test_mixture_score_single_component() {
        let lm = LogMath::new();
        let gm = GaussianMixture::new(0, vec![0.0], vec![unit_component(vec![0.0])]);
        // One component with log weight 0: mixture score == component score
        let expected = -0.5 * (2.0 * std::f32::consts::PI).ln();
        assert!((gm.score(&[0.0], &lm) - expected).abs() < 1e-5);
    }
}
