//! Static muscle description
//! Location: src/model/muscle.rs
//!
//! Muscles follow the bilinear myokinetic model: stiffness and rest length are each
//! `base + gain * activation`, and the muscle acts on the joint through a fixed moment arm.

use crate::config::constants::dynamics;
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use serde::{Deserialize, Serialize};

/// One muscle pulling on a joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleSpec {
    /// Optional anatomical label, used in logs and summaries
    #[serde(default)]
    pub name: Option<String>,
    /// Passive stiffness, N/m
    pub k0: f64,
    /// Activation-gain stiffness, N/m
    pub k1: f64,
    /// Rest length, m
    pub l0: f64,
    /// Activation-gain length, m
    pub l1: f64,
    /// Moment arm per degree of freedom, m. Sign gives the pulling direction.
    pub moment_arm: Vec<f64>,
    /// EMG-to-activation nonlinearity exponent in [-3, 0). Carried, not yet used.
    #[serde(default = "default_nonlinearity")]
    pub nonlinearity: f64,
}

fn default_nonlinearity() -> f64 {
    dynamics::DEFAULT_NONLINEARITY
}

impl MuscleSpec {
    pub fn new(k0: f64, k1: f64, l0: f64, l1: f64, moment_arm: impl Into<Vec<f64>>) -> Self {
        Self {
            name: None,
            k0,
            k1,
            l0,
            l1,
            moment_arm: moment_arm.into(),
            nonlinearity: dynamics::DEFAULT_NONLINEARITY,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_nonlinearity(mut self, nonlinearity: f64) -> Self {
        self.nonlinearity = nonlinearity;
        self
    }

    /// Number of degrees of freedom this muscle acts on
    pub fn dof(&self) -> usize {
        self.moment_arm.len()
    }

    /// Label for logs: the name, or the muscle's index
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("muscle[{}]", index))
    }

    /// Check the moment arm matches the joint and every constant is finite
    pub fn validate(&self, dof: usize) -> DynamicsResult<()> {
        if self.moment_arm.len() != dof {
            return Err(DynamicsErrorBuilder::new("muscle", "validate")
                .length_mismatch("moment_arm", dof, self.moment_arm.len()));
        }

        let constants = [self.k0, self.k1, self.l0, self.l1, self.nonlinearity];
        if constants.iter().chain(self.moment_arm.iter()).any(|v| !v.is_finite()) {
            return Err(DynamicsErrorBuilder::new("muscle", "validate")
                .configuration(format!("{:?} has non-finite constants", self.name)));
        }

        Ok(())
    }
}
