//! Joint dynamics: system assembly, discretisation and the stepping engine
//! Location: src/dynamics/mod.rs

pub mod assembly;
pub mod engine;
pub mod integrator;

pub use engine::{EngineMetrics, EngineSnapshot, JointDynamicsEngine, JointState, StepOutput};
pub use integrator::{matrix_exponential, ContinuousSystem, DiscreteSystem};
