//! Normalised joint parameter storage
//! Location: src/model/parameters.rs
//!
//! Every coefficient is stored divided by its per-quantity scale constant and by the shared
//! `lr_scale` multiplier. The physical value is `stored * scale * lr_scale`.
//!
//! Sign convention: magnitudes (stiffnesses, lengths, inertia) are read through
//! [`JointParameterStore::physical_value`], which always returns the absolute value, so the
//! stored sign carries no meaning for them. Moment arms keep their sign, which encodes the
//! pulling direction.

use super::muscle::MuscleSpec;
use crate::config::ScaleConfig;
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scalar magnitude fields with a physical reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterField {
    K0,
    K1,
    L0,
    L1,
    /// Indexed by axis rather than by muscle
    Inertia,
}

/// Unit of freezing: external updates to a frozen group are rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterGroup {
    Inertia,
    Muscle(usize),
}

/// Normalised values as handed over by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredParameters {
    pub k0: Vec<f64>,
    pub k1: Vec<f64>,
    pub l0: Vec<f64>,
    pub l1: Vec<f64>,
    /// One row per muscle, one column per DOF
    pub moment_arms: Vec<Vec<f64>>,
    #[serde(default)]
    pub nonlinearity: Vec<f64>,
    pub inertia: Vec<f64>,
}

/// Physical values of one parameter snapshot, read once per engine call
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalParameters {
    pub k0: Array1<f64>,
    pub k1: Array1<f64>,
    pub l0: Array1<f64>,
    pub l1: Array1<f64>,
    /// `N x DOF`, signed
    pub moment_arms: Array2<f64>,
    pub inertia: Array1<f64>,
}

/// Physical parameter report for logs and tooling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub k0: Vec<f64>,
    pub k1: Vec<f64>,
    pub l0: Vec<f64>,
    pub l1: Vec<f64>,
    pub moment_arms: Vec<Vec<f64>>,
    pub inertia: Vec<f64>,
    pub frozen: Vec<ParameterGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointParameterStore {
    dof: usize,
    scales: ScaleConfig,
    stored: StoredParameters,
    frozen: BTreeSet<ParameterGroup>,
}

impl JointParameterStore {
    /// Normalise a muscle list and per-axis inertias
    pub fn new(muscles: &[MuscleSpec], inertias: &[f64], scales: &ScaleConfig) -> DynamicsResult<Self> {
        Self::validate_scales(scales)?;
        let dof = inertias.len();
        if dof == 0 {
            return Err(DynamicsErrorBuilder::new("parameters", "new")
                .configuration("a joint needs at least one degree of freedom"));
        }
        if muscles.is_empty() {
            return Err(DynamicsErrorBuilder::new("parameters", "new")
                .configuration("a joint needs at least one muscle"));
        }
        for (i, muscle) in muscles.iter().enumerate() {
            muscle.validate(dof)?;
            tracing::trace!(muscle = %muscle.label(i), k0 = muscle.k0, k1 = muscle.k1, "muscle accepted");
        }

        let lr = scales.lr_scale;
        let normalise = |value: f64, scale: f64| value / scale / lr;

        let stored = StoredParameters {
            k0: muscles.iter().map(|m| normalise(m.k0, scales.k0)).collect(),
            k1: muscles.iter().map(|m| normalise(m.k1, scales.k1)).collect(),
            l0: muscles.iter().map(|m| normalise(m.l0, scales.l0)).collect(),
            l1: muscles.iter().map(|m| normalise(m.l1, scales.l1)).collect(),
            moment_arms: muscles
                .iter()
                .map(|m| m.moment_arm.iter().map(|&v| normalise(v, scales.moment_arm)).collect())
                .collect(),
            nonlinearity: muscles.iter().map(|m| m.nonlinearity / lr).collect(),
            inertia: inertias.iter().map(|&i| normalise(i, scales.inertia)).collect(),
        };

        tracing::debug!(muscles = muscles.len(), dof, "joint parameters normalised");
        Self::from_stored(stored, scales)
    }

    /// Rebuild a store from persisted normalised values
    pub fn from_stored(stored: StoredParameters, scales: &ScaleConfig) -> DynamicsResult<Self> {
        Self::validate_scales(scales)?;
        let builder = || DynamicsErrorBuilder::new("parameters", "from_stored");

        let n = stored.k0.len();
        let dof = stored.inertia.len();
        if n == 0 || dof == 0 {
            return Err(builder().configuration("empty muscle list or inertia vector"));
        }
        for (name, len) in [
            ("k1", stored.k1.len()),
            ("l0", stored.l0.len()),
            ("l1", stored.l1.len()),
            ("moment_arms", stored.moment_arms.len()),
        ] {
            if len != n {
                return Err(builder().length_mismatch(name, n, len));
            }
        }
        if !stored.nonlinearity.is_empty() && stored.nonlinearity.len() != n {
            return Err(builder().length_mismatch("nonlinearity", n, stored.nonlinearity.len()));
        }
        for (i, arm) in stored.moment_arms.iter().enumerate() {
            if arm.len() != dof {
                return Err(builder().length_mismatch(&format!("moment_arms[{}]", i), dof, arm.len()));
            }
        }

        let mut stored = stored;
        if stored.nonlinearity.is_empty() {
            stored.nonlinearity = vec![crate::config::dynamics::DEFAULT_NONLINEARITY / scales.lr_scale; n];
        }

        Ok(Self {
            dof,
            scales: scales.clone(),
            stored,
            frozen: BTreeSet::new(),
        })
    }

    fn validate_scales(scales: &ScaleConfig) -> DynamicsResult<()> {
        let values = [
            scales.k0,
            scales.k1,
            scales.l0,
            scales.l1,
            scales.inertia,
            scales.moment_arm,
            scales.lr_scale,
        ];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(DynamicsErrorBuilder::new("parameters", "validate_scales")
                .configuration("scale constants must be finite and positive"));
        }
        Ok(())
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn muscle_count(&self) -> usize {
        self.stored.k0.len()
    }

    pub fn scales(&self) -> &ScaleConfig {
        &self.scales
    }

    /// Raw normalised values
    pub fn stored(&self) -> &StoredParameters {
        &self.stored
    }

    fn scale_of(&self, field: ParameterField) -> f64 {
        match field {
            ParameterField::K0 => self.scales.k0,
            ParameterField::K1 => self.scales.k1,
            ParameterField::L0 => self.scales.l0,
            ParameterField::L1 => self.scales.l1,
            ParameterField::Inertia => self.scales.inertia,
        }
    }

    fn values_of(&self, field: ParameterField) -> &[f64] {
        match field {
            ParameterField::K0 => &self.stored.k0,
            ParameterField::K1 => &self.stored.k1,
            ParameterField::L0 => &self.stored.l0,
            ParameterField::L1 => &self.stored.l1,
            ParameterField::Inertia => &self.stored.inertia,
        }
    }

    fn values_of_mut(&mut self, field: ParameterField) -> &mut Vec<f64> {
        match field {
            ParameterField::K0 => &mut self.stored.k0,
            ParameterField::K1 => &mut self.stored.k1,
            ParameterField::L0 => &mut self.stored.l0,
            ParameterField::L1 => &mut self.stored.l1,
            ParameterField::Inertia => &mut self.stored.inertia,
        }
    }

    fn check_index(&self, field: ParameterField, index: usize, operation: &str) -> DynamicsResult<()> {
        let len = self.values_of(field).len();
        if index >= len {
            return Err(DynamicsErrorBuilder::new("parameters", operation)
                .configuration(format!("{:?} index {} out of range for length {}", field, index, len)));
        }
        Ok(())
    }

    /// True magnitude: `|stored * scale * lr_scale|`
    pub fn physical_value(&self, field: ParameterField, index: usize) -> DynamicsResult<f64> {
        self.check_index(field, index, "physical_value")?;
        Ok((self.values_of(field)[index] * self.scale_of(field) * self.scales.lr_scale).abs())
    }

    pub fn physical_values(&self, field: ParameterField) -> Array1<f64> {
        let scale = self.scale_of(field) * self.scales.lr_scale;
        self.values_of(field).iter().map(|v| (v * scale).abs()).collect()
    }

    /// Signed physical moment arm of one muscle
    pub fn moment_arm(&self, muscle: usize) -> Array1<f64> {
        let scale = self.scales.moment_arm * self.scales.lr_scale;
        self.stored.moment_arms[muscle].iter().map(|v| v * scale).collect()
    }

    /// Physical nonlinearity exponent of one muscle
    pub fn nonlinearity(&self, muscle: usize) -> f64 {
        self.stored.nonlinearity[muscle] * self.scales.lr_scale
    }

    /// All physical values at once, as used by one engine call
    pub fn physical(&self) -> PhysicalParameters {
        let n = self.muscle_count();
        let mut moment_arms = Array2::zeros((n, self.dof));
        for i in 0..n {
            moment_arms.row_mut(i).assign(&self.moment_arm(i));
        }

        PhysicalParameters {
            k0: self.physical_values(ParameterField::K0),
            k1: self.physical_values(ParameterField::K1),
            l0: self.physical_values(ParameterField::L0),
            l1: self.physical_values(ParameterField::L1),
            moment_arms,
            inertia: self.physical_values(ParameterField::Inertia),
        }
    }

    pub fn stored_value(&self, field: ParameterField, index: usize) -> DynamicsResult<f64> {
        self.check_index(field, index, "stored_value")?;
        Ok(self.values_of(field)[index])
    }

    fn group_of(field: ParameterField, index: usize) -> ParameterGroup {
        match field {
            ParameterField::Inertia => ParameterGroup::Inertia,
            _ => ParameterGroup::Muscle(index),
        }
    }

    fn ensure_not_frozen(&self, group: ParameterGroup, operation: &str) -> DynamicsResult<()> {
        if self.frozen.contains(&group) {
            return Err(DynamicsErrorBuilder::new("parameters", operation)
                .configuration(format!("parameter group {:?} is frozen", group)));
        }
        Ok(())
    }

    /// Copy with one normalised value replaced
    pub fn with_stored_value(&self, field: ParameterField, index: usize, value: f64) -> DynamicsResult<Self> {
        self.check_index(field, index, "with_stored_value")?;
        self.ensure_not_frozen(Self::group_of(field, index), "with_stored_value")?;

        let mut updated = self.clone();
        updated.values_of_mut(field)[index] = value;
        Ok(updated)
    }

    /// Copy with one muscle's normalised moment arm replaced
    pub fn with_stored_moment_arm(&self, muscle: usize, arm: Vec<f64>) -> DynamicsResult<Self> {
        let builder = || DynamicsErrorBuilder::new("parameters", "with_stored_moment_arm");
        if muscle >= self.muscle_count() {
            return Err(builder().configuration(format!("muscle index {} out of range", muscle)));
        }
        if arm.len() != self.dof {
            return Err(builder().length_mismatch("moment_arm", self.dof, arm.len()));
        }
        self.ensure_not_frozen(ParameterGroup::Muscle(muscle), "with_stored_moment_arm")?;

        let mut updated = self.clone();
        updated.stored.moment_arms[muscle] = arm;
        Ok(updated)
    }

    pub fn freeze(&mut self, group: ParameterGroup) {
        self.frozen.insert(group);
    }

    pub fn unfreeze(&mut self, group: ParameterGroup) {
        self.frozen.remove(&group);
    }

    pub fn is_frozen(&self, group: ParameterGroup) -> bool {
        self.frozen.contains(&group)
    }

    pub fn frozen_groups(&self) -> impl Iterator<Item = ParameterGroup> + '_ {
        self.frozen.iter().copied()
    }

    /// Frozen groups whose values differ between `self` and `other`
    pub fn frozen_changes(&self, other: &Self) -> Vec<ParameterGroup> {
        self.frozen
            .iter()
            .copied()
            .filter(|group| match *group {
                ParameterGroup::Inertia => self.stored.inertia != other.stored.inertia,
                ParameterGroup::Muscle(i) => {
                    let (a, b) = (&self.stored, &other.stored);
                    a.k0.get(i) != b.k0.get(i)
                        || a.k1.get(i) != b.k1.get(i)
                        || a.l0.get(i) != b.l0.get(i)
                        || a.l1.get(i) != b.l1.get(i)
                        || a.moment_arms.get(i) != b.moment_arms.get(i)
                }
            })
            .collect()
    }

    pub fn summary(&self) -> ParameterSummary {
        ParameterSummary {
            k0: self.physical_values(ParameterField::K0).to_vec(),
            k1: self.physical_values(ParameterField::K1).to_vec(),
            l0: self.physical_values(ParameterField::L0).to_vec(),
            l1: self.physical_values(ParameterField::L1).to_vec(),
            moment_arms: (0..self.muscle_count()).map(|i| self.moment_arm(i).to_vec()).collect(),
            inertia: self.physical_values(ParameterField::Inertia).to_vec(),
            frozen: self.frozen.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrist_like() -> (Vec<MuscleSpec>, Vec<f64>) {
        let muscles = vec![
            MuscleSpec::new(2000.0, 40000.0, 0.03, 0.006, vec![0.05, 0.0]),
            MuscleSpec::new(2000.0, 40000.0, 0.03, 0.006, vec![-0.05, 0.0]),
        ];
        (muscles, vec![0.004, 0.008])
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0), "{} != {}", a, b);
    }

    #[test]
    fn test_round_trip_to_physical() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();

        assert_eq!(store.muscle_count(), 2);
        assert_eq!(store.dof(), 2);
        assert_close(store.physical_value(ParameterField::K0, 0).unwrap(), 2000.0);
        assert_close(store.physical_value(ParameterField::K1, 1).unwrap(), 40000.0);
        assert_close(store.physical_value(ParameterField::L1, 0).unwrap(), 0.006);
        assert_close(store.physical_value(ParameterField::Inertia, 1).unwrap(), 0.008);
        assert_close(store.moment_arm(1)[0], -0.05);
        assert_close(store.nonlinearity(0), -2.0);
    }

    #[test]
    fn test_physical_value_out_of_range() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        assert!(store.physical_value(ParameterField::K0, 2).is_err());
        assert!(store.physical_value(ParameterField::Inertia, 2).is_err());
        assert!(store.physical_value(ParameterField::Inertia, 1).is_ok());
    }

    #[test]
    fn test_stored_values_are_normalised() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        // 2000 / 2000 / 5
        assert_close(store.stored_value(ParameterField::K0, 0).unwrap(), 0.2);
    }

    #[test]
    fn test_negative_stored_value_reads_as_magnitude() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        let flipped = store.with_stored_value(ParameterField::K0, 0, -0.2).unwrap();
        assert_close(flipped.physical_value(ParameterField::K0, 0).unwrap(), 2000.0);
        let flipped = flipped.with_stored_value(ParameterField::Inertia, 0, -0.1).unwrap();
        assert!(flipped.physical().inertia.iter().all(|&i| i > 0.0));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let (muscles, _) = wrist_like();
        assert!(JointParameterStore::new(&muscles, &[0.004], &ScaleConfig::default()).is_err());
        assert!(JointParameterStore::new(&[], &[0.004], &ScaleConfig::default()).is_err());
        assert!(JointParameterStore::new(&muscles, &[], &ScaleConfig::default()).is_err());
    }

    #[test]
    fn test_from_stored_validates_lengths() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        let mut stored = store.stored().clone();
        stored.l1.pop();
        assert!(JointParameterStore::from_stored(stored, &ScaleConfig::default()).is_err());

        let rebuilt = JointParameterStore::from_stored(store.stored().clone(), &ScaleConfig::default()).unwrap();
        assert_eq!(rebuilt.physical(), store.physical());
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let (muscles, inertia) = wrist_like();
        let scales = ScaleConfig { lr_scale: 0.0, ..ScaleConfig::default() };
        assert!(JointParameterStore::new(&muscles, &inertia, &scales).is_err());
    }

    #[test]
    fn test_frozen_groups_reject_updates() {
        let (muscles, inertia) = wrist_like();
        let mut store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        store.freeze(ParameterGroup::Inertia);
        store.freeze(ParameterGroup::Muscle(1));

        assert!(store.with_stored_value(ParameterField::Inertia, 0, 1.0).is_err());
        assert!(store.with_stored_value(ParameterField::K1, 1, 1.0).is_err());
        assert!(store.with_stored_moment_arm(1, vec![0.0, 1.0]).is_err());
        assert!(store.with_stored_value(ParameterField::K1, 0, 1.0).is_ok());

        store.unfreeze(ParameterGroup::Inertia);
        assert!(store.with_stored_value(ParameterField::Inertia, 0, 1.0).is_ok());
    }

    #[test]
    fn test_frozen_changes_detected() {
        let (muscles, inertia) = wrist_like();
        let mut store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        store.freeze(ParameterGroup::Muscle(0));

        let mut other = store.clone();
        other.stored.k0[0] = 9.0;
        other.stored.k0[1] = 9.0;
        assert_eq!(store.frozen_changes(&other), vec![ParameterGroup::Muscle(0)]);
    }

    #[test]
    fn test_summary_serialises() {
        let (muscles, inertia) = wrist_like();
        let store = JointParameterStore::new(&muscles, &inertia, &ScaleConfig::default()).unwrap();
        let json = serde_json::to_string(&store.summary()).unwrap();
        assert!(json.contains("moment_arms"));
    }
}
