//! Acoustic model loading.
//!
//! Fixed order: means, variances, mixture weights, transition matrices,
//! optional feature transform, senone assembly, HMM definition, model
//! properties. Any failure aborts the load.

use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::error::ModelError;
use crate::hmm::{HmmManager, HmmPosition, SenoneHmm, SenoneSequence};
use crate::logmath::LogMath;
use crate::pool::{Pool, NUM_GAUSSIANS_PER_STATE, NUM_SENONES, NUM_STREAMS};
use crate::s3::{self, S3Reader, Tokenizer};
use crate::senone::{ComponentTransforms, GaussianMixture, MixtureComponent, Senone};
use crate::store::{FeatureTransform, ModelStore};
use crate::unit::{Unit, UnitManager, SILENCE_NAME};

const DENSITY_VERSION: &str = "1.0";
const MIXTURE_WEIGHT_VERSION: &str = "1.0";
const TRANSITION_VERSION: &str = "1.0";
const TRANSFORM_VERSION: &str = "0.1";
const MDEF_VERSION: &str = "0.3";

/// Replaces exactly-zero entries with the smallest positive float; nonzero
/// entries are left alone.
fn non_zero_floor(values: &mut [f32]) {
    for v in values.iter_mut() {
        if *v == 0.0 {
            *v = f32::MIN_POSITIVE;
        }
    }
}

/// What the mdef parse produces besides the registries.
struct MdefOutcome {
    ci_units: UnitManager,
    hmm_manager: HmmManager,
    num_states_per_hmm: usize,
}

pub struct ModelLoader {
    config: LoaderConfig,
    logmath: LogMath,
}

impl ModelLoader {
    pub fn new(config: LoaderConfig, logmath: LogMath) -> Self {
        ModelLoader { config, logmath }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Loads the whole model and verifies the structural invariants.
    pub fn load(&self) -> Result<ModelStore, ModelError> {
        let (means, vector_lengths) = self.load_density("means", -f32::MAX)?;
        let (variances, variance_lengths) =
            self.load_density("variances", self.config.variance_floor)?;
        if vector_lengths != variance_lengths {
            return Err(ModelError::ModelMalformed(format!(
                "means and variances disagree on stream vector lengths ({:?} vs {:?})",
                vector_lengths, variance_lengths
            )));
        }

        let mixture_weights = self.load_mixture_weights("mixture_weights")?;
        let transition_matrices = self.load_transition_matrices("transition_matrices")?;
        let feature_transform = self.load_feature_transform("feature_transform")?;

        let senones = self.build_senones(&means, &variances, &mixture_weights)?;

        let mdef = self.load_hmms(senones.len(), transition_matrices.len())?;

        let properties = s3::read_props(self.config.data_path("feat.params"))?;

        tracing::info!(
            senones = senones.len(),
            gaussians = means.len(),
            transition_matrices = transition_matrices.len(),
            hmms = mdef.hmm_manager.len(),
            ci_units = mdef.ci_units.len(),
            "acoustic model loaded"
        );

        Ok(ModelStore {
            means,
            variances,
            mixture_weights,
            transition_matrices,
            senones,
            ci_units: mdef.ci_units,
            hmm_manager: mdef.hmm_manager,
            properties,
            feature_transform,
            mean_transformation_matrix: None,
            mean_transformation_vector: None,
            variance_transformation_matrix: None,
            variance_transformation_vector: None,
            vector_lengths,
            num_states_per_hmm: mdef.num_states_per_hmm,
        })
    }

    /// Loads a density file (means or variances), flooring every entry.
    /// Returns the pool and the per-stream vector lengths.
    fn load_density(
        &self,
        file: &str,
        floor: f32,
    ) -> Result<(Pool<Vec<f32>>, Vec<usize>), ModelError> {
        let path = self.config.data_path(file);
        let mut reader = S3Reader::open(&path)?;
        reader.expect_version(DENSITY_VERSION)?;

        let num_states = reader.read_count("state count")?;
        let num_streams = reader.read_count("stream count")?;
        let num_gaussians = reader.read_count("gaussian count")?;

        let mut vector_lengths = Vec::with_capacity(num_streams);
        for _ in 0..num_streams {
            vector_lengths.push(reader.read_count("vector length")?);
        }

        let raw_length = reader.read_count("raw length")?;
        let expected = num_gaussians * vector_lengths.iter().sum::<usize>() * num_states;
        if raw_length != expected {
            return Err(ModelError::corrupt(
                &path,
                format!("raw length {} != declared layout {}", raw_length, expected),
            ));
        }

        let mut pool = Pool::new(file);
        for _i in 0..num_states {
            for j in 0..num_streams {
                for _k in 0..num_gaussians {
                    let mut vector = reader.read_f32_vec(vector_lengths[j])?;
                    for v in &mut vector {
                        if *v < floor {
                            *v = floor;
                        }
                    }
                    pool.put(vector);
                }
            }
        }
        reader.validate_checksum()?;

        pool.set_feature(NUM_SENONES, num_states as i32);
        pool.set_feature(NUM_STREAMS, num_streams as i32);
        pool.set_feature(NUM_GAUSSIANS_PER_STATE, num_gaussians as i32);

        tracing::info!(
            path = %path.display(),
            senones = num_states,
            streams = num_streams,
            gaussians_per_state = num_gaussians,
            "loaded density file"
        );
        Ok((pool, vector_lengths))
    }

    /// Loads mixture weights: per senone, per stream, `G` weights which are
    /// normalized, floored and converted to log domain. Streams are
    /// concatenated into one vector of length `G * numStreams`.
    fn load_mixture_weights(&self, file: &str) -> Result<Pool<Vec<f32>>, ModelError> {
        let path = self.config.data_path(file);
        let floor = self.config.mixture_weight_floor;
        let mut reader = S3Reader::open(&path)?;
        reader.expect_version(MIXTURE_WEIGHT_VERSION)?;

        let num_states = reader.read_count("state count")?;
        let num_streams = reader.read_count("stream count")?;
        let num_gaussians = reader.read_count("gaussian count")?;
        let num_values = reader.read_count("value count")?;
        if num_values != num_states * num_streams * num_gaussians {
            return Err(ModelError::corrupt(
                &path,
                format!(
                    "value count {} != {} states x {} streams x {} gaussians",
                    num_values, num_states, num_streams, num_gaussians
                ),
            ));
        }

        let mut pool = Pool::new(file);
        for _i in 0..num_states {
            let mut log_weights = vec![0.0f32; num_gaussians * num_streams];
            for j in 0..num_streams {
                let weights = reader.read_f32_vec(num_gaussians)?;
                let sum: f32 = weights.iter().sum();
                if sum <= 0.0 {
                    return Err(ModelError::corrupt(
                        &path,
                        "mixture weight row sums to zero",
                    ));
                }
                for (k, &w) in weights.iter().enumerate() {
                    let normalized = (w / sum).max(floor);
                    log_weights[j * num_gaussians + k] = self.logmath.linear_to_log(normalized);
                }
            }
            pool.put(log_weights);
        }
        reader.validate_checksum()?;

        pool.set_feature(NUM_SENONES, num_states as i32);
        pool.set_feature(NUM_STREAMS, num_streams as i32);
        pool.set_feature(NUM_GAUSSIANS_PER_STATE, num_gaussians as i32);

        tracing::info!(path = %path.display(), senones = num_states, "loaded mixture weights");
        Ok(pool)
    }

    /// Loads tied transition matrices. Each row is zero-floored, normalized
    /// and converted to log domain; a terminal all-LOG_ZERO row is appended.
    fn load_transition_matrices(&self, file: &str) -> Result<Pool<Vec<Vec<f32>>>, ModelError> {
        let path = self.config.data_path(file);
        let mut reader = S3Reader::open(&path)?;
        reader.expect_version(TRANSITION_VERSION)?;

        let num_matrices = reader.read_count("matrix count")?;
        let num_rows = reader.read_count("row count")?;
        let num_states = reader.read_count("state count")?;
        let num_values = reader.read_count("value count")?;
        if num_values != num_matrices * num_rows * num_states {
            return Err(ModelError::corrupt(
                &path,
                format!(
                    "value count {} != {} matrices x {} rows x {} states",
                    num_values, num_matrices, num_rows, num_states
                ),
            ));
        }

        let mut pool = Pool::new(file);
        for _m in 0..num_matrices {
            let mut matrix = Vec::with_capacity(num_rows + 1);
            for _r in 0..num_rows {
                let mut row = reader.read_f32_vec(num_states)?;
                non_zero_floor(&mut row);
                let sum: f32 = row.iter().sum();
                for v in &mut row {
                    *v = self.logmath.linear_to_log(*v / sum);
                }
                matrix.push(row);
            }
            // Terminal state: no outgoing probability mass
            matrix.push(vec![LogMath::LOG_ZERO; num_states]);
            pool.put(matrix);
        }
        reader.validate_checksum()?;

        tracing::info!(path = %path.display(), matrices = num_matrices, "loaded transition matrices");
        Ok(pool)
    }

    /// Loads the optional front-end feature transform. A missing file is not
    /// an error; any other failure is.
    fn load_feature_transform(&self, file: &str) -> Result<Option<FeatureTransform>, ModelError> {
        let path = self.config.data_path(file);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no feature transform");
            return Ok(None);
        }

        let mut reader = S3Reader::open(&path)?;
        reader.expect_version(TRANSFORM_VERSION)?;

        let _ = reader.read_i32()?;
        let num_rows = reader.read_count("row count")?;
        let num_values = reader.read_count("value count")?;
        let num = reader.read_count("element count")?;
        if num != num_rows * num_values {
            return Err(ModelError::corrupt(
                &path,
                format!("element count {} != {} x {}", num, num_rows, num_values),
            ));
        }

        let mut rows = Vec::with_capacity(num_rows);
        for _ in 0..num_rows {
            rows.push(reader.read_f32_vec(num_values)?);
        }
        reader.validate_checksum()?;

        tracing::info!(path = %path.display(), rows = num_rows, "loaded feature transform");
        Ok(Some(FeatureTransform { rows }))
    }

    /// Pairs each senone's means and variances into mixture components and
    /// assembles the senone pool.
    fn build_senones(
        &self,
        means: &Pool<Vec<f32>>,
        variances: &Pool<Vec<f32>>,
        mixture_weights: &Pool<Vec<f32>>,
    ) -> Result<Pool<Senone>, ModelError> {
        let num_senones = mixture_weights.len();
        let num_gaussians = means.feature(NUM_GAUSSIANS_PER_STATE).unwrap_or(0) as usize;

        if means.len() != variances.len() || means.len() != num_senones * num_gaussians {
            return Err(ModelError::ModelMalformed(format!(
                "pool sizes disagree: {} means, {} variances, {} senones x {} gaussians",
                means.len(),
                variances.len(),
                num_senones,
                num_gaussians
            )));
        }

        // The transformation pools are absent in a plain model; components
        // treat them as identity.
        let transforms = ComponentTransforms::default();

        let mut pool = Pool::new("senones");
        for i in 0..num_senones {
            let mut components = Vec::with_capacity(num_gaussians);
            for k in 0..num_gaussians {
                let id = i * num_gaussians + k;
                let mean = means.get(id);
                let variance = variances.get(id);
                if mean.len() != variance.len() {
                    return Err(ModelError::ModelMalformed(format!(
                        "gaussian {} mean/variance dimension mismatch ({} vs {})",
                        id,
                        mean.len(),
                        variance.len()
                    )));
                }
                components.push(MixtureComponent::new(
                    mean.clone(),
                    variance.clone(),
                    &transforms,
                    self.config.mixture_component_score_floor,
                    self.config.variance_floor,
                    &self.logmath,
                ));
            }
            pool.put(Senone::GaussianMixture(GaussianMixture::new(
                i,
                mixture_weights.get(i).clone(),
                components,
            )));
        }
        Ok(pool)
    }

    /// Parses the textual HMM definition and registers all HMMs.
    fn load_hmms(&self, num_senones: usize, num_tmats: usize) -> Result<MdefOutcome, ModelError> {
        let path = self.config.mdef_path();
        let mut tok = Tokenizer::open(&path)?;

        let version = tok.expect_word()?;
        if version != MDEF_VERSION {
            return Err(ModelError::UnsupportedVersion {
                path,
                expected: MDEF_VERSION.to_string(),
                found: version,
            });
        }

        let num_base = self.mdef_count(&mut tok, "n_base")?;
        let num_tri = self.mdef_count(&mut tok, "n_tri")?;
        let num_state_map = self.mdef_count(&mut tok, "n_state_map")?;
        let num_tied_state = self.mdef_count(&mut tok, "n_tied_state")?;
        let num_ci_state = self.mdef_count(&mut tok, "n_tied_ci_state")?;
        let num_tied_tmat = self.mdef_count(&mut tok, "n_tied_tmat")?;

        if num_base == 0 || num_state_map % (num_base + num_tri) != 0 {
            return Err(ModelError::ModelMalformed(format!(
                "state map size {} does not divide over {} phones",
                num_state_map,
                num_base + num_tri
            )));
        }
        let num_states_per_hmm = num_state_map / (num_base + num_tri);
        if num_states_per_hmm < 2 {
            return Err(ModelError::ModelMalformed(format!(
                "{} states per hmm leaves no emitting states",
                num_states_per_hmm
            )));
        }
        let num_emitting = num_states_per_hmm - 1;

        if num_tied_state != num_senones {
            return Err(ModelError::ModelMalformed(format!(
                "mdef declares {} tied states but the parameter files hold {} senones",
                num_tied_state, num_senones
            )));
        }
        if num_tied_tmat != num_tmats {
            return Err(ModelError::ModelMalformed(format!(
                "mdef declares {} tied transition matrices but the pool holds {}",
                num_tied_tmat, num_tmats
            )));
        }

        let mut ci_units = UnitManager::new();
        let mut hmm_manager = HmmManager::new();

        // Context-independent phones
        for _ in 0..num_base {
            let row = self.read_phone_row(&mut tok, num_emitting, num_tied_tmat)?;
            if row.left != "-" || row.right != "-" || row.position != "-" {
                return Err(ModelError::ModelMalformed(format!(
                    "base phone {} carries context or position",
                    row.name
                )));
            }
            if ci_units.contains(&row.name) {
                return Err(ModelError::ModelMalformed(format!(
                    "duplicate base phone {}",
                    row.name
                )));
            }
            for &stid in &row.stids {
                if stid >= num_ci_state {
                    return Err(ModelError::ModelMalformed(format!(
                        "base phone {} has tied state {} outside [0, {})",
                        row.name, stid, num_ci_state
                    )));
                }
            }

            let unit = ci_units.intern(&row.name, row.attribute == "filler");
            let sequence: SenoneSequence = row.stids.into();
            hmm_manager.put(SenoneHmm::new(
                unit,
                sequence,
                row.tmat,
                HmmPosition::Undefined,
            ));
        }

        if hmm_manager.get(HmmPosition::Undefined, SILENCE_NAME).is_none() {
            return Err(ModelError::ModelMalformed(
                "no context-independent silence unit (SIL)".to_string(),
            ));
        }

        // Context-dependent phones. Consecutive rows that share
        // (name, left, right) and tied states reuse the prior unit and
        // senone sequence.
        let mut previous: Option<TriphoneRun> = None;
        for _ in 0..num_tri {
            let row = self.read_phone_row(&mut tok, num_emitting, num_tied_tmat)?;
            if row.left == "-" || row.right == "-" || row.position == "-" {
                return Err(ModelError::ModelMalformed(format!(
                    "triphone {} is missing context or position",
                    row.name
                )));
            }
            for &stid in &row.stids {
                if stid < num_ci_state || stid >= num_tied_state {
                    return Err(ModelError::ModelMalformed(format!(
                        "triphone {} has tied state {} outside [{}, {})",
                        row.name, stid, num_ci_state, num_tied_state
                    )));
                }
            }
            let position = HmmPosition::from_symbol(&row.position).ok_or_else(|| {
                ModelError::ModelMalformed(format!(
                    "triphone {} has unknown position symbol {:?}",
                    row.name, row.position
                ))
            })?;

            if !self.config.use_cd_units {
                continue;
            }

            let reused = previous.as_ref().filter(|p| {
                p.name == row.name
                    && p.left == row.left
                    && p.right == row.right
                    && p.sequence.as_ref() == row.stids.as_slice()
            });
            let (unit, sequence) = if let Some(p) = reused {
                (p.unit.clone(), p.sequence.clone())
            } else {
                let base = ci_units.get(&row.name).ok_or_else(|| {
                    ModelError::ModelMalformed(format!(
                        "triphone references unknown base phone {}",
                        row.name
                    ))
                })?;
                for context in [&row.left, &row.right] {
                    if !ci_units.contains(context) {
                        return Err(ModelError::ModelMalformed(format!(
                            "triphone {} references unknown context phone {}",
                            row.name, context
                        )));
                    }
                }
                let unit = Arc::new(Unit::context_dependent(
                    &row.name,
                    base.is_filler(),
                    &row.left,
                    &row.right,
                ));
                let sequence: SenoneSequence = row.stids.clone().into();
                (unit, sequence)
            };

            hmm_manager.put(SenoneHmm::new(
                unit.clone(),
                sequence.clone(),
                row.tmat,
                position,
            ));
            previous = Some(TriphoneRun {
                name: row.name,
                left: row.left,
                right: row.right,
                unit,
                sequence,
            });
        }

        tracing::info!(
            path = %path.display(),
            base_phones = num_base,
            triphones = num_tri,
            states_per_hmm = num_states_per_hmm,
            registered = hmm_manager.len(),
            "loaded hmm definitions"
        );

        Ok(MdefOutcome {
            ci_units,
            hmm_manager,
            num_states_per_hmm,
        })
    }

    /// Reads one `<int> <keyword>` header pair of the mdef.
    fn mdef_count(&self, tok: &mut Tokenizer, keyword: &str) -> Result<usize, ModelError> {
        let value = tok.expect_int()?;
        tok.expect_literal(keyword)?;
        if value < 0 {
            return Err(ModelError::corrupt(
                tok.path(),
                format!("negative {}: {}", keyword, value),
            ));
        }
        Ok(value as usize)
    }

    /// Reads one phone row: name, left, right, position, attribute, tmat id,
    /// the tied-state ids, and the literal `N` terminator.
    fn read_phone_row(
        &self,
        tok: &mut Tokenizer,
        num_emitting: usize,
        num_tmats: usize,
    ) -> Result<PhoneRow, ModelError> {
        let name = tok.expect_word()?;
        let left = tok.expect_word()?;
        let right = tok.expect_word()?;
        let position = tok.expect_word()?;
        let attribute = tok.expect_word()?;
        let tmat = tok.expect_int()?;
        if tmat < 0 || tmat as usize >= num_tmats {
            return Err(ModelError::ModelMalformed(format!(
                "phone {} references transition matrix {} of {}",
                name, tmat, num_tmats
            )));
        }

        let mut stids = Vec::with_capacity(num_emitting);
        for _ in 0..num_emitting {
            let stid = tok.expect_int()?;
            if stid < 0 {
                return Err(ModelError::ModelMalformed(format!(
                    "phone {} has negative tied state {}",
                    name, stid
                )));
            }
            stids.push(stid as usize);
        }
        tok.expect_literal("N")?;

        Ok(PhoneRow {
            name,
            left,
            right,
            position,
            attribute,
            tmat: tmat as usize,
            stids,
        })
    }
}

struct PhoneRow {
    name: String,
    left: String,
    right: String,
    position: String,
    attribute: String,
    tmat: usize,
    stids: Vec<usize>,
}

struct TriphoneRun {
    name: String,
    left: String,
    right: String,
    unit: Arc<Unit>,
    sequence: SenoneSequence,
}

/// Convenience: builds the loader and loads in one call.
pub fn load_model(config: LoaderConfig) -> Result<ModelStore, ModelError> {
    ModelLoader::new(config, LogMath::new()).load()
}
