// src/limb/mod.rs
//! Whole-limb composition
//!
//! A [`MultiJointModel`] maps raw channel values onto muscle activations through a learned
//! mixing matrix, hands each joint its contiguous slice of state and activation, and
//! concatenates the results in joint order.

pub mod presets;

pub use presets::Side;

use crate::config::constants::limb::{RAW_CHANNEL_MAX, RAW_CHANNEL_MIN};
use crate::config::{LimbConfig, MixingInit};
use crate::dynamics::{JointDynamicsEngine, StepOutput};
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use crate::model::{JointParameterStore, ParameterGroup, ParameterSummary};
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Physical parameters of every joint plus the mixing matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimbSummary {
    pub joints: Vec<ParameterSummary>,
    /// `C x N_total`, physical
    pub mixing: Vec<Vec<f64>>,
    pub mixing_frozen: bool,
}

/// Ordered set of joints driven by one raw channel vector
pub struct MultiJointModel {
    channels: usize,
    mixing_lr: f64,
    /// Stored normalised, physical = stored * mixing_lr
    mixing: RwLock<Arc<Array2<f64>>>,
    mixing_frozen: AtomicBool,
    joints: Vec<JointDynamicsEngine>,
    /// Start of each joint's activation slice
    muscle_offsets: Vec<usize>,
    /// Start of each joint's state slice
    state_offsets: Vec<usize>,
    total_muscles: usize,
    total_state: usize,
    clamped_channels: AtomicU64,
}

impl std::fmt::Debug for MultiJointModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiJointModel")
            .field("channels", &self.channels)
            .field("joints", &self.joints)
            .field("mixing_frozen", &self.is_mixing_frozen())
            .finish()
    }
}

impl MultiJointModel {
    pub fn new(channels: usize, joints: Vec<JointDynamicsEngine>, config: &LimbConfig) -> DynamicsResult<Self> {
        let builder = || DynamicsErrorBuilder::new("limb", "new");
        if channels == 0 {
            return Err(builder().configuration("at least one raw channel is required"));
        }
        if joints.is_empty() {
            return Err(builder().configuration("at least one joint is required"));
        }
        if !config.mixing_lr.is_finite() || config.mixing_lr <= 0.0 {
            return Err(builder().configuration(format!(
                "mixing_lr must be finite and positive, got {}",
                config.mixing_lr
            )));
        }

        let mut muscle_offsets = Vec::with_capacity(joints.len());
        let mut state_offsets = Vec::with_capacity(joints.len());
        let (mut total_muscles, mut total_state) = (0, 0);
        for joint in &joints {
            muscle_offsets.push(total_muscles);
            state_offsets.push(total_state);
            total_muscles += joint.muscle_count();
            total_state += 2 * joint.dof();
        }

        let physical = initial_mixing(config.mixing_init, channels, total_muscles);
        let stored = physical / config.mixing_lr;

        if config.freeze_inertia {
            for joint in &joints {
                joint.freeze(ParameterGroup::Inertia);
            }
        }

        tracing::debug!(
            channels,
            joints = joints.len(),
            muscles = total_muscles,
            mixing_init = ?config.mixing_init,
            "multi-joint model created"
        );

        Ok(Self {
            channels,
            mixing_lr: config.mixing_lr,
            mixing: RwLock::new(Arc::new(stored)),
            mixing_frozen: AtomicBool::new(config.freeze_mixing),
            joints,
            muscle_offsets,
            state_offsets,
            total_muscles,
            total_state,
            clamped_channels: AtomicU64::new(0),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn joints(&self) -> &[JointDynamicsEngine] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&JointDynamicsEngine> {
        self.joints.get(index)
    }

    pub fn muscle_count(&self) -> usize {
        self.total_muscles
    }

    pub fn total_dof(&self) -> usize {
        self.total_state / 2
    }

    /// Width of the concatenated `[θ_1, θ̇_1, θ_2, θ̇_2, …]` state
    pub fn state_width(&self) -> usize {
        self.total_state
    }

    /// Raw channel values clamped so far
    pub fn clamped_channels(&self) -> u64 {
        self.clamped_channels.load(Ordering::Relaxed)
    }

    /// Physical mixing matrix, `C x N_total`
    pub fn mixing_matrix(&self) -> Array2<f64> {
        &**self.mixing.read() * self.mixing_lr
    }

    /// Replace the mixing matrix with new physical values
    pub fn set_mixing_matrix(&self, physical: Array2<f64>) -> DynamicsResult<()> {
        let builder = || DynamicsErrorBuilder::new("limb", "set_mixing_matrix");
        if self.is_mixing_frozen() {
            return Err(builder().configuration("mixing matrix is frozen"));
        }
        if physical.dim() != (self.channels, self.total_muscles) {
            return Err(builder().configuration(format!(
                "mixing matrix is {:?}, expected ({}, {})",
                physical.dim(),
                self.channels,
                self.total_muscles
            )));
        }
        if physical.iter().any(|v| !v.is_finite()) {
            return Err(builder().configuration("mixing matrix must be finite"));
        }
        *self.mixing.write() = Arc::new(physical / self.mixing_lr);
        Ok(())
    }

    pub fn freeze_mixing(&self) {
        self.mixing_frozen.store(true, Ordering::Release);
    }

    pub fn unfreeze_mixing(&self) {
        self.mixing_frozen.store(false, Ordering::Release);
    }

    pub fn is_mixing_frozen(&self) -> bool {
        self.mixing_frozen.load(Ordering::Acquire)
    }

    /// Freeze every inertia vector
    pub fn freeze_inertia(&self) {
        for joint in &self.joints {
            joint.freeze(ParameterGroup::Inertia);
        }
    }

    pub fn unfreeze_inertia(&self) {
        for joint in &self.joints {
            joint.unfreeze(ParameterGroup::Inertia);
        }
    }

    /// Freeze what a deployed model must not drift on: the mixing matrix and the inertias
    pub fn freeze_for_deployment(&self) {
        self.freeze_mixing();
        self.freeze_inertia();
    }

    pub fn disable_compensation(&self) {
        for joint in &self.joints {
            joint.disable_compensation();
        }
    }

    pub fn enable_compensation(&self) {
        for joint in &self.joints {
            joint.enable_compensation();
        }
    }

    /// Apply an external parameter update to one joint
    pub fn update_joint_parameters<F>(&self, index: usize, update: F) -> DynamicsResult<()>
    where
        F: FnOnce(&JointParameterStore) -> DynamicsResult<JointParameterStore>,
    {
        let joint = self.joints.get(index).ok_or_else(|| {
            DynamicsErrorBuilder::new("limb", "update_joint_parameters")
                .configuration(format!("joint index {} out of range for {} joints", index, self.joints.len()))
        })?;
        joint.update_parameters(update)
    }

    pub fn parameter_summary(&self) -> LimbSummary {
        let mixing = self.mixing_matrix();
        let summary = LimbSummary {
            joints: self.joints.iter().map(|j| j.snapshot().parameters.summary()).collect(),
            mixing: mixing.rows().into_iter().map(|r| r.to_vec()).collect(),
            mixing_frozen: self.is_mixing_frozen(),
        };
        tracing::debug!(?summary, "limb parameters");
        summary
    }

    /// Advance every joint by `dt`
    ///
    /// `state` rows are `[θ_1, θ̇_1, θ_2, θ̇_2, …]`, `raw` rows hold one value per channel.
    /// Returns positions `B x ΣDOF` and the full next state.
    pub fn forward(&self, state: ArrayView2<f64>, raw: ArrayView2<f64>, dt: f64) -> DynamicsResult<StepOutput> {
        let builder = || DynamicsErrorBuilder::new("limb", "forward");
        if raw.ncols() != self.channels {
            return Err(builder().length_mismatch("raw row", self.channels, raw.ncols()));
        }
        if state.ncols() != self.total_state {
            return Err(builder().length_mismatch("state row", self.total_state, state.ncols()));
        }
        if raw.nrows() != state.nrows() {
            return Err(builder().length_mismatch("raw rows", state.nrows(), raw.nrows()));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(builder().degenerate("raw", "input contains NaN or infinity"));
        }

        let raw = self.clamp_raw(raw);
        let mixing = self.mixing_matrix();
        let activation = raw.dot(&mixing);

        let mut positions = Vec::with_capacity(self.joints.len());
        let mut states = Vec::with_capacity(self.joints.len());
        for (j, joint) in self.joints.iter().enumerate() {
            let (s0, m0) = (self.state_offsets[j], self.muscle_offsets[j]);
            let joint_state = state.slice(s![.., s0..s0 + 2 * joint.dof()]);
            let joint_activation = activation.slice(s![.., m0..m0 + joint.muscle_count()]);
            let out = joint.forward(joint_state, joint_activation, dt)?;
            positions.push(out.position);
            states.push(out.state);
        }

        let position_views: Vec<ArrayView2<f64>> = positions.iter().map(|p| p.view()).collect();
        let state_views: Vec<ArrayView2<f64>> = states.iter().map(|s| s.view()).collect();
        Ok(StepOutput {
            position: concatenate(Axis(1), &position_views)?,
            state: concatenate(Axis(1), &state_views)?,
        })
    }

    /// Single-instance wrapper: `(positions, next_state)`
    pub fn step(&self, state: ArrayView1<f64>, raw: &[f64], dt: f64) -> DynamicsResult<(Array1<f64>, Array1<f64>)> {
        let raw = ArrayView1::from(raw);
        let out = self.forward(state.insert_axis(Axis(0)), raw.insert_axis(Axis(0)), dt)?;
        Ok((out.position.row(0).to_owned(), out.state.row(0).to_owned()))
    }

    fn clamp_raw(&self, raw: ArrayView2<f64>) -> Array2<f64> {
        let out_of_range = raw
            .iter()
            .filter(|&&v| !(RAW_CHANNEL_MIN..=RAW_CHANNEL_MAX).contains(&v))
            .count();
        if out_of_range > 0 {
            self.clamped_channels.fetch_add(out_of_range as u64, Ordering::Relaxed);
            tracing::warn!(out_of_range, "raw channel value outside [0, 1] clamped");
        }
        raw.mapv(|v| v.clamp(RAW_CHANNEL_MIN, RAW_CHANNEL_MAX))
    }
}

/// Physical mixing matrix at construction
fn initial_mixing(init: MixingInit, channels: usize, muscles: usize) -> Array2<f64> {
    match init {
        MixingInit::Identity => Array2::from_shape_fn((channels, muscles), |(c, m)| if c == m { 1.0 } else { 0.0 }),
        MixingInit::Uniform => Array2::from_elem((channels, muscles), 1.0 / channels as f64),
    }
}
