//! Muscle and joint parameter model
//! Location: src/model/mod.rs

pub mod compensation;
pub mod muscle;
pub mod parameters;

pub use compensation::{CompensationNetwork, CompensationWeights, DenseLayer};
pub use muscle::MuscleSpec;
pub use parameters::{
    JointParameterStore, ParameterField, ParameterGroup, ParameterSummary, PhysicalParameters,
    StoredParameters,
};
