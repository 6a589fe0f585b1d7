//! Limb-Dynamics: muscle-driven joint dynamics for myoelectric control
//!
//! This library turns muscle activations into joint motion. It features:
//!
//! - Bilinear muscle springs acting through signed moment arms
//! - Critically damped joint dynamics for any number of degrees of freedom
//! - Exact step integration by matrix exponential, or a cheap explicit step
//! - Optional learned compensation of the muscle law, blended by a configurable ratio
//! - Whole-limb models that mix raw channels into muscle activations
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use limb_dynamics::limb::presets::{wrist_2dof, Side};
//! use ndarray::Array1;
//!
//! fn main() -> Result<(), limb_dynamics::DynamicsError> {
//!     let wrist = wrist_2dof(4, Side::Right)?;
//!     let mut state = Array1::zeros(wrist.state_width());
//!
//!     for _ in 0..60 {
//!         let (position, next) = wrist.step(state.view(), &[0.2, 0.0, 0.6, 0.1], 1.0 / 60.0)?;
//!         println!("Position: {:?}", position);
//!         state = next;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod dynamics;
pub mod error;
pub mod limb;
pub mod model;

// Re-export commonly used types for convenience
pub use config::{IntegrationMode, MixingInit, ModelConfig};
pub use dynamics::{EngineMetrics, JointDynamicsEngine, JointState, StepOutput};
pub use error::{DynamicsError, DynamicsResult};
pub use limb::{LimbSummary, MultiJointModel, Side};
pub use model::{CompensationNetwork, CompensationWeights, JointParameterStore, MuscleSpec, ParameterField};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Muscle-driven joint dynamics for myoelectric control".to_string(),
        features: vec![
            "Bilinear muscle model".to_string(),
            "Exact matrix-exponential integration".to_string(),
            "Learned muscle-law compensation".to_string(),
            "Multi-joint limb composition".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
