//! End-to-end adaptation tests over a synthetic model.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use am_engine::s3::S3Writer;
use am_engine::{LoaderConfig, LogMath, ModelLoader, ModelStore};
use mllr_adapt::{
    AdaptError, AdapterState, ClusterMap, DecodedResult, FrameScores, GaussianPosterior,
    SpeakerAdapter, Transform,
};

/// Four single-gaussian senones with d=2 means at the corners of a square,
/// unit variances, two CI phones covering senones {0,1} and {2,3}.
const MEANS: [[f32; 2]; 4] = [[0.0, 0.0], [2.0, 0.0], [0.0, 2.0], [2.0, 2.0]];

fn write_model(dir: &Path) -> anyhow::Result<()> {
    write_density(dir, "means", &MEANS)?;
    write_density(dir, "variances", &[[1.0, 1.0]; 4])?;

    let mut w = S3Writer::create(
        dir.join("mixture_weights"),
        &[("version", "1.0"), ("chksum0", "yes")],
    )?;
    w.write_i32(4)?;
    w.write_i32(1)?;
    w.write_i32(1)?;
    w.write_i32(4)?;
    for _ in 0..4 {
        w.write_f32_vec(&[1.0])?;
    }
    w.finish()?;

    let mut w = S3Writer::create(
        dir.join("transition_matrices"),
        &[("version", "1.0"), ("chksum0", "yes")],
    )?;
    w.write_i32(1)?;
    w.write_i32(2)?;
    w.write_i32(3)?;
    w.write_i32(6)?;
    w.write_f32_vec(&[0.6, 0.4, 0.0])?;
    w.write_f32_vec(&[0.0, 0.5, 0.5])?;
    w.finish()?;

    fs::write(
        dir.join("mdef"),
        "0.3\n\
         2 n_base\n\
         0 n_tri\n\
         6 n_state_map\n\
         4 n_tied_state\n\
         4 n_tied_ci_state\n\
         1 n_tied_tmat\n\
         SIL - - - filler 0 0 1 N\n\
         AA - - - n/a 0 2 3 N\n",
    )?;
    fs::write(dir.join("feat.params"), "-feat 1s_c\n")?;
    Ok(())
}

fn write_density(dir: &Path, file: &str, vectors: &[[f32; 2]]) -> anyhow::Result<()> {
    let mut w = S3Writer::create(dir.join(file), &[("version", "1.0"), ("chksum0", "yes")])?;
    w.write_i32(vectors.len() as i32)?;
    w.write_i32(1)?;
    w.write_i32(1)?;
    w.write_i32(2)?;
    w.write_i32((vectors.len() * 2) as i32)?;
    for v in vectors {
        w.write_f32_vec(v)?;
    }
    w.finish()?;
    Ok(())
}

fn load(dir: &Path) -> anyhow::Result<Arc<ModelStore>> {
    let store = ModelLoader::new(LoaderConfig::new(dir), LogMath::new()).load()?;
    Ok(Arc::new(store))
}

/// One frame with full posterior on a single Gaussian.
fn frame(feature: [f32; 2], senone: usize) -> FrameScores {
    FrameScores {
        feature: feature.to_vec(),
        posteriors: vec![GaussianPosterior {
            senone,
            component: 0,
            posterior: 1.0,
        }],
    }
}

/// Observations at every mean, shifted by `delta`.
fn shifted_result(delta: [f32; 2]) -> DecodedResult {
    DecodedResult::new(
        (0..4)
            .map(|g| frame([MEANS[g][0] + delta[0], MEANS[g][1] + delta[1]], g))
            .collect(),
    )
}

#[test]
fn test_single_observation_falls_back_to_identity() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    let mut adapter = SpeakerAdapter::new(store, 1)?;
    adapter.collect(&DecodedResult::new(vec![frame(MEANS[0], 0)]))?;
    let report = adapter.estimate()?;

    // One observation cannot pin down an affine map in d=2: the class is
    // degenerate and keeps the identity.
    assert_eq!(report.degenerate, vec![0]);
    let class = adapter.transform().class(0);
    for i in 0..2 {
        for j in 0..2 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((class.a[[i, j]] - expected).abs() < 1e-5);
        }
        assert!(class.b[i].abs() < 1e-5);
    }

    let out = dir.path().join("means.adapted");
    adapter.apply_to(&out)?;
    assert_eq!(adapter.state(), AdapterState::Applied);

    // Identity transform, identical header fields: the adapted file is
    // byte-identical to the input means file.
    assert_eq!(fs::read(dir.path().join("means"))?, fs::read(&out)?);
    Ok(())
}

#[test]
fn test_global_shift_is_recovered() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;
    let delta = [0.5f32, -0.25];

    let mut adapter = SpeakerAdapter::new(store.clone(), 1)?;
    adapter.collect(&shifted_result(delta))?;
    let report = adapter.estimate()?;
    assert!(report.is_clean());
    assert_eq!(report.frames, 4);

    let class = adapter.transform().class(0);
    for i in 0..2 {
        for j in 0..2 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!(
                (class.a[[i, j]] - expected).abs() < 1e-4,
                "a[{},{}] = {}",
                i,
                j,
                class.a[[i, j]]
            );
        }
        assert!(
            (class.b[i] - f64::from(delta[i])).abs() < 1e-4,
            "b[{}] = {}",
            i,
            class.b[i]
        );
    }

    // Applied means shift by delta
    let out = dir.path().join("means.adapted");
    adapter.apply_to(&out)?;

    let adapted_dir = tempfile::tempdir()?;
    write_model(adapted_dir.path())?;
    fs::copy(&out, adapted_dir.path().join("means"))?;
    let adapted = load(adapted_dir.path())?;
    for g in 0..4 {
        let before = store.means_pool().get(g);
        let after = adapted.means_pool().get(g);
        for i in 0..2 {
            assert!(
                (after[i] - before[i] - delta[i]).abs() < 1e-4,
                "gaussian {} dim {}: {} -> {}",
                g,
                i,
                before[i],
                after[i]
            );
        }
    }
    Ok(())
}

#[test]
fn test_state_machine_guards() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;
    let out = dir.path().join("means.adapted");

    let mut adapter = SpeakerAdapter::new(store, 1)?;
    assert_eq!(adapter.state(), AdapterState::Empty);

    // apply and estimate are invalid before any statistics exist
    assert!(matches!(
        adapter.apply_to(&out),
        Err(AdaptError::InvalidState { operation: "apply", .. })
    ));
    assert!(matches!(
        adapter.estimate(),
        Err(AdaptError::InvalidState { operation: "estimate", .. })
    ));

    adapter.collect(&shifted_result([0.1, 0.1]))?;
    assert_eq!(adapter.state(), AdapterState::Collecting);
    adapter.estimate()?;
    assert_eq!(adapter.state(), AdapterState::Ready);

    // collect after estimation would mix epochs
    assert!(matches!(
        adapter.collect(&shifted_result([0.1, 0.1])),
        Err(AdaptError::InvalidState { operation: "collect", .. })
    ));

    adapter.apply_to(&out)?;
    assert_eq!(adapter.state(), AdapterState::Applied);
    assert!(adapter.apply_to(&out).is_err());

    adapter.reset();
    assert_eq!(adapter.state(), AdapterState::Empty);
    assert_eq!(adapter.stats().frames(), 0);
    adapter.collect(&shifted_result([0.2, 0.0]))?;
    assert_eq!(adapter.state(), AdapterState::Collecting);
    Ok(())
}

#[test]
fn test_transform_file_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    let mut adapter = SpeakerAdapter::new(store, 1)?;
    adapter.collect(&shifted_result([0.5, -0.25]))?;
    adapter.estimate()?;

    let path = dir.path().join("mllr_matrix");
    adapter.transform().save(&path)?;
    let loaded = Transform::load(&path)?;

    assert_eq!(loaded.num_classes(), 1);
    assert_eq!(loaded.dimension(), 2);
    let original = adapter.transform().class(0);
    let restored = loaded.class(0);
    for i in 0..2 {
        for j in 0..2 {
            assert!((original.a[[i, j]] - restored.a[[i, j]]).abs() < 1e-5);
        }
        assert!((original.b[i] - restored.b[i]).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn test_adapter_seeded_from_transform_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    // Estimate with one adapter, save, seed a fresh adapter from the file.
    let mut estimator = SpeakerAdapter::new(store.clone(), 1)?;
    estimator.collect(&shifted_result([1.0, 1.0]))?;
    estimator.estimate()?;
    let path = dir.path().join("mllr_matrix");
    estimator.transform().save(&path)?;

    let mut adapter = SpeakerAdapter::new(store.clone(), 1)?;
    adapter.load_transform(&path)?;
    assert_eq!(adapter.state(), AdapterState::Ready);

    let out = dir.path().join("means.adapted");
    adapter.apply_to(&out)?;

    let adapted_dir = tempfile::tempdir()?;
    write_model(adapted_dir.path())?;
    fs::copy(&out, adapted_dir.path().join("means"))?;
    let adapted = load(adapted_dir.path())?;
    for g in 0..4 {
        let before = store.means_pool().get(g);
        let after = adapted.means_pool().get(g);
        for i in 0..2 {
            assert!((after[i] - before[i] - 1.0).abs() < 1e-3);
        }
    }
    Ok(())
}

#[test]
fn test_two_class_adaptation_keeps_classes_apart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    let mut adapter = SpeakerAdapter::new(store, 2)?;
    let map = adapter.cluster_map();
    assert_eq!(map.num_classes(), 2);
    assert_eq!(map.len(), 4);
    for size in map.class_sizes() {
        assert!(size >= 1);
    }

    // Statistics land in the class of the observed Gaussian
    adapter.collect(&shifted_result([0.1, 0.0]))?;
    let occupancy: f64 = (0..2).map(|c| adapter.stats().class_occupancy(c)).sum();
    assert!((occupancy - 4.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_cluster_map_is_reproducible() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    let a = ClusterMap::build(store.means_pool(), 2, ClusterMap::DEFAULT_MAX_ITERATIONS)?;
    let b = ClusterMap::build(store.means_pool(), 2, ClusterMap::DEFAULT_MAX_ITERATIONS)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_tiny_posteriors_are_ignored() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(dir.path())?;
    let store = load(dir.path())?;

    let mut adapter = SpeakerAdapter::new(store, 1)?;
    adapter.collect(&DecodedResult::new(vec![FrameScores {
        feature: vec![1.0, 1.0],
        posteriors: vec![GaussianPosterior {
            senone: 0,
            component: 0,
            posterior: 1e-30,
        }],
    }]))?;
    assert_eq!(adapter.stats().frames(), 1);
    assert_eq!(adapter.stats().class_occupancy(0), 0.0);
    Ok(())
}
