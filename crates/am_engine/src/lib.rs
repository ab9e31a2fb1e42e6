//! Acoustic Model Engine
//!
//! Loads a tied-state HMM/GMM acoustic model (S3 binary parameter files plus
//! a textual HMM definition) into an immutable in-memory `ModelStore`.
//! The store is read-only after load and safe to share across threads.

pub mod config;
pub mod error;
pub mod hmm;
pub mod loader;
pub mod logmath;
pub mod pool;
pub mod s3;
pub mod senone;
pub mod store;
pub mod unit;

// Primary public API re-exports
pub use config::LoaderConfig;
pub use error::ModelError;
pub use hmm::{HmmManager, HmmPosition, SenoneHmm, SenoneSequence};
pub use loader::{load_model, ModelLoader};
pub use logmath::LogMath;
pub use pool::Pool;
pub use senone::{GaussianMixture, MixtureComponent, Senone};
pub use store::{FeatureTransform, ModelStore};
pub use unit::{LeftRightContext, Unit, UnitManager};
