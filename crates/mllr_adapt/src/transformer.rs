//! Applies a transform to the model means and writes the adapted file.

use std::path::Path;

use am_engine::s3::S3Writer;
use am_engine::ModelStore;
use rayon::prelude::*;

use crate::cluster::ClusterMap;
use crate::error::AdaptError;
use crate::transform::Transform;

/// Produces `adapted[g] = A_c * mean[g] + b_c` for every Gaussian, with `c`
/// the Gaussian's regression class. The store itself is untouched.
pub fn apply_transform(
    store: &ModelStore,
    cluster: &ClusterMap,
    transform: &Transform,
) -> Result<Vec<Vec<f32>>, AdaptError> {
    let dim = store.gaussian_dimension();
    if transform.dimension() != dim {
        return Err(AdaptError::Mismatch(format!(
            "transform dimension {} != model dimension {}",
            transform.dimension(),
            dim
        )));
    }
    if cluster.len() != store.means_pool().len() {
        return Err(AdaptError::Mismatch(format!(
            "cluster map covers {} gaussians, model has {}",
            cluster.len(),
            store.means_pool().len()
        )));
    }
    if transform.num_classes() != cluster.num_classes() {
        return Err(AdaptError::Mismatch(format!(
            "transform has {} classes, cluster map has {}",
            transform.num_classes(),
            cluster.num_classes()
        )));
    }

    let adapted = (0..store.means_pool().len())
        .into_par_iter()
        .map(|g| {
            let class = transform.class(cluster.class_of(g));
            let mean = store.means_pool().get(g);
            (0..dim)
                .map(|i| {
                    let mut acc = class.b[i];
                    for j in 0..dim {
                        acc += class.a[[i, j]] * f64::from(mean[j]);
                    }
                    acc as f32
                })
                .collect()
        })
        .collect();
    Ok(adapted)
}

/// Writes an adapted means file with the same S3 layout as the input means
/// file: same header fields, host byte order, trailing checksum.
pub fn write_means(
    store: &ModelStore,
    means: &[Vec<f32>],
    path: impl AsRef<Path>,
) -> Result<(), AdaptError> {
    let path = path.as_ref();
    if means.len() != store.means_pool().len() {
        return Err(AdaptError::Mismatch(format!(
            "writing {} means for a model with {}",
            means.len(),
            store.means_pool().len()
        )));
    }

    let mut writer = S3Writer::create(path, &[("version", "1.0"), ("chksum0", "yes")])?;
    writer.write_i32(store.declared_num_senones() as i32)?;
    writer.write_i32(store.num_streams() as i32)?;
    writer.write_i32(store.num_gaussians_per_state() as i32)?;
    for &len in store.vector_lengths() {
        writer.write_i32(len as i32)?;
    }
    let total: usize = means.iter().map(Vec::len).sum();
    writer.write_i32(total as i32)?;
    for vector in means {
        writer.write_f32_vec(vector)?;
    }
    writer.finish()?;

    tracing::info!(path = %path.display(), gaussians = means.len(), "wrote adapted means");
    Ok(())
}
