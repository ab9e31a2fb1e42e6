//! Loader configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Explicit configuration record for the model loader. Replaces the
/// string-keyed property sheet of older toolchains; every knob is a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root directory of the model.
    pub location: PathBuf,
    /// HMM definition file, relative to the data location.
    pub model_definition: String,
    /// Subdirectory of `location` holding the parameter files.
    pub data_location: String,
    /// Register context-dependent (triphone) HMMs while parsing.
    pub use_cd_units: bool,
    /// Linear-domain floor for per-component densities.
    pub mixture_component_score_floor: f32,
    /// Floor applied to every variance entry.
    pub variance_floor: f32,
    /// Floor applied to every normalized mixture weight.
    pub mixture_weight_floor: f32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            location: PathBuf::new(),
            model_definition: "mdef".to_string(),
            data_location: String::new(),
            use_cd_units: true,
            mixture_component_score_floor: 0.0,
            variance_floor: 1e-4,
            mixture_weight_floor: 1e-7,
        }
    }
}

impl LoaderConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        LoaderConfig {
            location: location.into(),
            ..Default::default()
        }
    }

    /// Path of a parameter file under `location/data_location`.
    pub fn data_path(&self, file: &str) -> PathBuf {
        if self.data_location.is_empty() {
            self.location.join(file)
        } else {
            self.location.join(&self.data_location).join(file)
        }
    }

    pub fn mdef_path(&self) -> PathBuf {
        self.data_path(&self.model_definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LoaderConfig::default();
        assert_eq!(cfg.model_definition, "mdef");
        assert!(cfg.use_cd_units);
        assert_eq!(cfg.variance_floor, 1e-4);
        assert_eq!(cfg.mixture_weight_floor, 1e-7);
    }

    #[test]
    fn test_data_path_with_subdir() {
        let mut cfg = LoaderConfig::new("/models/en-us");
        assert_eq!(cfg.data_path("means"), PathBuf::from("/models/en-us/means"));
        cfg.data_location = "params".to_string();
        assert_eq!(
            cfg.data_path("means"),
            PathBuf::from("/models/en-us/params/means")
        );
    }
}
