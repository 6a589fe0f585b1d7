// src/dynamics/engine.rs
//! Joint dynamics engine
//!
//! One engine drives one joint of arbitrary DOF. Every call is pure with respect to the joint
//! state: the caller owns `[θ, θ̇]` and passes it in and out. Parameters and compensation
//! networks live in an immutable snapshot behind an `Arc`; external updates build a new
//! snapshot and swap it in, so a call in flight always sees one consistent set.

use super::assembly::{assemble, Compensation};
use super::integrator::{to_dmatrix, to_dvector};
use crate::config::constants::dynamics::{ACTIVATION_MAX, ACTIVATION_MIN};
use crate::config::constants::network::DEFAULT_WEIGHT_SEED;
use crate::config::{IntegrationMode, ModelConfig};
use crate::error::{DynamicsError, DynamicsErrorBuilder, DynamicsResult};
use crate::model::{
    CompensationNetwork, CompensationWeights, JointParameterStore, MuscleSpec, ParameterGroup,
    PhysicalParameters,
};
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Joint state of a single instance
#[derive(Debug, Clone, PartialEq)]
pub struct JointState {
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
}

impl JointState {
    pub fn new(position: Array1<f64>, velocity: Array1<f64>) -> DynamicsResult<Self> {
        if position.len() != velocity.len() {
            return Err(DynamicsErrorBuilder::new("engine", "joint_state")
                .length_mismatch("velocity", position.len(), velocity.len()));
        }
        Ok(Self { position, velocity })
    }

    pub fn at_rest(dof: usize) -> Self {
        Self {
            position: Array1::zeros(dof),
            velocity: Array1::zeros(dof),
        }
    }

    pub fn dof(&self) -> usize {
        self.position.len()
    }

    /// `[θ…, θ̇…]`
    pub fn to_vector(&self) -> Array1<f64> {
        self.position.iter().chain(self.velocity.iter()).copied().collect()
    }

    pub fn from_vector(x: ArrayView1<f64>) -> DynamicsResult<Self> {
        if x.len() % 2 != 0 {
            return Err(DynamicsErrorBuilder::new("engine", "joint_state")
                .configuration(format!("state vector length {} is odd", x.len())));
        }
        let dof = x.len() / 2;
        Ok(Self {
            position: x.slice(s![..dof]).to_owned(),
            velocity: x.slice(s![dof..]).to_owned(),
        })
    }
}

/// Result of one batched step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// `B x DOF`
    pub position: Array2<f64>,
    /// `B x 2·DOF`
    pub state: Array2<f64>,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineMetrics {
    pub calls: u64,
    pub instances_stepped: u64,
    pub clamped_activations: u64,
    pub degeneracy_failures: u64,
}

/// Parameters and networks read together by one call
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub parameters: JointParameterStore,
    pub networks: Vec<CompensationNetwork>,
}

pub struct JointDynamicsEngine {
    dof: usize,
    config: ModelConfig,
    snapshot: RwLock<Arc<EngineSnapshot>>,
    compensation_enabled: AtomicBool,

    calls: AtomicU64,
    instances_stepped: AtomicU64,
    clamped_activations: AtomicU64,
    degeneracy_failures: AtomicU64,
}

impl std::fmt::Debug for JointDynamicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JointDynamicsEngine")
            .field("dof", &self.dof)
            .field("muscles", &self.muscle_count())
            .field("integration", &self.config.dynamics.integration)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl JointDynamicsEngine {
    /// Build an engine with seeded default compensation weights
    pub fn new(muscles: &[MuscleSpec], inertias: &[f64], config: &ModelConfig) -> DynamicsResult<Self> {
        config.validate()?;
        let parameters = JointParameterStore::new(muscles, inertias, &config.scales)?;
        let networks = (0..muscles.len())
            .map(|i| CompensationNetwork::new(CompensationWeights::random(DEFAULT_WEIGHT_SEED + i as u64)))
            .collect();
        Self::from_parts(parameters, networks, config)
    }

    /// Build from an existing store and one network per muscle
    pub fn from_parts(
        parameters: JointParameterStore,
        networks: Vec<CompensationNetwork>,
        config: &ModelConfig,
    ) -> DynamicsResult<Self> {
        config.validate()?;
        if parameters.scales() != &config.scales {
            return Err(DynamicsErrorBuilder::new("engine", "from_parts")
                .configuration("parameter store was normalised with different scale constants"));
        }
        Self::check_networks(&parameters, &networks)?;

        let dof = parameters.dof();
        tracing::debug!(
            dof,
            muscles = parameters.muscle_count(),
            integration = ?config.dynamics.integration,
            nn_ratio = config.dynamics.nn_ratio,
            "joint dynamics engine created"
        );

        Ok(Self {
            dof,
            config: config.clone(),
            snapshot: RwLock::new(Arc::new(EngineSnapshot { parameters, networks })),
            compensation_enabled: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            instances_stepped: AtomicU64::new(0),
            clamped_activations: AtomicU64::new(0),
            degeneracy_failures: AtomicU64::new(0),
        })
    }

    /// Same engine with the given networks in place of the defaults
    pub fn with_networks(self, networks: Vec<CompensationNetwork>) -> DynamicsResult<Self> {
        self.replace_networks(networks)?;
        Ok(self)
    }

    fn check_networks(parameters: &JointParameterStore, networks: &[CompensationNetwork]) -> DynamicsResult<()> {
        if networks.len() != parameters.muscle_count() {
            return Err(DynamicsErrorBuilder::new("engine", "check_networks").length_mismatch(
                "networks",
                parameters.muscle_count(),
                networks.len(),
            ));
        }
        Ok(())
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn muscle_count(&self) -> usize {
        self.snapshot.read().parameters.muscle_count()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn integration_mode(&self) -> IntegrationMode {
        self.config.dynamics.integration
    }

    /// Current parameter/network snapshot
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn disable_compensation(&self) {
        self.compensation_enabled.store(false, Ordering::Release);
    }

    pub fn enable_compensation(&self) {
        self.compensation_enabled.store(true, Ordering::Release);
    }

    pub fn is_compensation_enabled(&self) -> bool {
        self.compensation_enabled.load(Ordering::Acquire)
    }

    /// Blend ratio in effect for the next call
    pub fn effective_nn_ratio(&self) -> f64 {
        if self.is_compensation_enabled() {
            self.config.dynamics.nn_ratio
        } else {
            0.0
        }
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            instances_stepped: self.instances_stepped.load(Ordering::Relaxed),
            clamped_activations: self.clamped_activations.load(Ordering::Relaxed),
            degeneracy_failures: self.degeneracy_failures.load(Ordering::Relaxed),
        }
    }

    /// Apply an external parameter update and swap the result in
    ///
    /// The update sees the current store and returns its replacement. Frozen groups keep
    /// their freeze and must come back unchanged. The write lock is held while `update` runs,
    /// so it must not call back into this engine.
    pub fn update_parameters<F>(&self, update: F) -> DynamicsResult<()>
    where
        F: FnOnce(&JointParameterStore) -> DynamicsResult<JointParameterStore>,
    {
        let builder = || DynamicsErrorBuilder::new("engine", "update_parameters");
        let mut guard = self.snapshot.write();
        let current = &guard.parameters;
        let mut updated = update(current)?;

        if updated.dof() != current.dof() {
            return Err(builder().length_mismatch("dof", current.dof(), updated.dof()));
        }
        if updated.muscle_count() != current.muscle_count() {
            return Err(builder().length_mismatch("muscles", current.muscle_count(), updated.muscle_count()));
        }
        if updated.scales() != current.scales() {
            return Err(builder().configuration("update changed the scale constants"));
        }
        let touched = current.frozen_changes(&updated);
        if !touched.is_empty() {
            return Err(builder().configuration(format!("update modifies frozen groups {:?}", touched)));
        }
        for group in current.frozen_groups() {
            updated.freeze(group);
        }

        let networks = guard.networks.clone();
        *guard = Arc::new(EngineSnapshot {
            parameters: updated,
            networks,
        });
        tracing::debug!("joint parameters updated");
        Ok(())
    }

    /// Swap in new compensation networks, one per muscle
    pub fn replace_networks(&self, networks: Vec<CompensationNetwork>) -> DynamicsResult<()> {
        let mut guard = self.snapshot.write();
        Self::check_networks(&guard.parameters, &networks)?;
        let parameters = guard.parameters.clone();
        *guard = Arc::new(EngineSnapshot { parameters, networks });
        Ok(())
    }

    pub fn freeze(&self, group: ParameterGroup) {
        self.set_frozen(group, true);
    }

    pub fn unfreeze(&self, group: ParameterGroup) {
        self.set_frozen(group, false);
    }

    fn set_frozen(&self, group: ParameterGroup, frozen: bool) {
        let mut guard = self.snapshot.write();
        let mut snapshot = EngineSnapshot::clone(&guard);
        if frozen {
            snapshot.parameters.freeze(group);
        } else {
            snapshot.parameters.unfreeze(group);
        }
        *guard = Arc::new(snapshot);
    }

    /// Advance a batch of joint states by `dt` with no external torque
    pub fn forward(&self, state: ArrayView2<f64>, activation: ArrayView2<f64>, dt: f64) -> DynamicsResult<StepOutput> {
        let torque = Array2::zeros((state.nrows(), self.dof));
        self.forward_with_torque(state, activation, dt, torque.view(), torque.view())
    }

    /// Advance a batch with an external joint torque varying linearly from `torque_start` to
    /// `torque_end` across the step
    ///
    /// The approximate integrator only sees `torque_start`.
    pub fn forward_with_torque(
        &self,
        state: ArrayView2<f64>,
        activation: ArrayView2<f64>,
        dt: f64,
        torque_start: ArrayView2<f64>,
        torque_end: ArrayView2<f64>,
    ) -> DynamicsResult<StepOutput> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let result = self.forward_inner(state, activation, dt, torque_start, torque_end);
        if let Err(err) = &result {
            self.record_failure(err);
        }
        result
    }

    fn forward_inner(
        &self,
        state: ArrayView2<f64>,
        activation: ArrayView2<f64>,
        dt: f64,
        torque_start: ArrayView2<f64>,
        torque_end: ArrayView2<f64>,
    ) -> DynamicsResult<StepOutput> {
        let snapshot = self.snapshot();
        let muscles = snapshot.parameters.muscle_count();
        self.validate_inputs(state, activation, dt, torque_start, torque_end, muscles)?;

        let activation = self.clamp_activation(activation);
        let physical = snapshot.parameters.physical();
        let compensation = Compensation {
            networks: &snapshot.networks,
            ratio: self.effective_nn_ratio(),
            k_scale: self.config.scales.k1,
            l_scale: self.config.scales.l1,
        };

        let batch = state.nrows();
        let step_row = |row: usize| {
            self.step_instance(
                &physical,
                &compensation,
                state.row(row),
                activation.row(row),
                torque_start.row(row),
                torque_end.row(row),
                dt,
            )
        };

        let parallel = cfg!(feature = "always_parallel")
            || batch >= self.config.performance.parallel_batch_threshold;
        let rows: Vec<Array1<f64>> = if parallel {
            (0..batch).into_par_iter().map(step_row).collect::<DynamicsResult<_>>()?
        } else {
            (0..batch).map(step_row).collect::<DynamicsResult<_>>()?
        };

        let mut next = Array2::zeros((batch, 2 * self.dof));
        for (r, row) in rows.iter().enumerate() {
            next.row_mut(r).assign(row);
        }
        self.instances_stepped.fetch_add(batch as u64, Ordering::Relaxed);
        tracing::trace!(batch, dt, parallel, "joint step");

        Ok(StepOutput {
            position: next.slice(s![.., ..self.dof]).to_owned(),
            state: next,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn step_instance(
        &self,
        physical: &PhysicalParameters,
        compensation: &Compensation<'_>,
        x: ArrayView1<f64>,
        activation: ArrayView1<f64>,
        torque_start: ArrayView1<f64>,
        torque_end: ArrayView1<f64>,
        dt: f64,
    ) -> DynamicsResult<Array1<f64>> {
        let joint = assemble(physical, compensation, x, activation, self.config.dynamics.min_inertia)?;

        let ones = Array1::<f64>::ones(self.dof);
        let u0 = concatenate(Axis(0), &[ones.view(), torque_start.view()])?;
        let u1 = concatenate(Axis(0), &[ones.view(), torque_end.view()])?;
        let next = joint
            .system
            .step(self.config.dynamics.integration, x, u0.view(), u1.view(), dt)?;

        if next.iter().any(|v| !v.is_finite()) {
            return Err(DynamicsErrorBuilder::new("engine", "step_instance")
                .degenerate("state", "integrated state is not finite"));
        }
        Ok(next)
    }

    fn validate_inputs(
        &self,
        state: ArrayView2<f64>,
        activation: ArrayView2<f64>,
        dt: f64,
        torque_start: ArrayView2<f64>,
        torque_end: ArrayView2<f64>,
        muscles: usize,
    ) -> DynamicsResult<()> {
        let builder = || DynamicsErrorBuilder::new("engine", "forward");
        if !dt.is_finite() || dt < 0.0 {
            return Err(builder().configuration(format!("time step must be finite and non-negative, got {}", dt)));
        }
        if state.ncols() != 2 * self.dof {
            return Err(builder().length_mismatch("state row", 2 * self.dof, state.ncols()));
        }
        if activation.ncols() != muscles {
            return Err(builder().length_mismatch("activation row", muscles, activation.ncols()));
        }
        let batch = state.nrows();
        for (what, rows) in [
            ("activation rows", activation.nrows()),
            ("torque_start rows", torque_start.nrows()),
            ("torque_end rows", torque_end.nrows()),
        ] {
            if rows != batch {
                return Err(builder().length_mismatch(what, batch, rows));
            }
        }
        for (what, cols) in [("torque_start row", torque_start.ncols()), ("torque_end row", torque_end.ncols())] {
            if cols != self.dof {
                return Err(builder().length_mismatch(what, self.dof, cols));
            }
        }

        for (what, values) in [
            ("state", state.view()),
            ("activation", activation.view()),
            ("torque_start", torque_start.view()),
            ("torque_end", torque_end.view()),
        ] {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(builder().degenerate(what, "input contains NaN or infinity"));
            }
        }
        Ok(())
    }

    /// Clamp to `[0, 1]`; out-of-range values are counted and logged, never rejected
    fn clamp_activation(&self, activation: ArrayView2<f64>) -> Array2<f64> {
        let out_of_range = activation
            .iter()
            .filter(|&&a| !(ACTIVATION_MIN..=ACTIVATION_MAX).contains(&a))
            .count();
        if out_of_range > 0 {
            self.clamped_activations.fetch_add(out_of_range as u64, Ordering::Relaxed);
            tracing::warn!(out_of_range, "activation outside [0, 1] clamped");
        }
        activation.mapv(|a| a.clamp(ACTIVATION_MIN, ACTIVATION_MAX))
    }

    fn record_failure(&self, err: &DynamicsError) {
        if err.is_numeric() {
            self.degeneracy_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, "joint step failed");
        }
    }

    /// Single-instance convenience wrapper around [`forward`](Self::forward)
    pub fn step(&self, state: &JointState, activation: &[f64], dt: f64) -> DynamicsResult<JointState> {
        if state.dof() != self.dof {
            return Err(DynamicsErrorBuilder::new("engine", "step").length_mismatch("joint state", self.dof, state.dof()));
        }
        let x = state.to_vector();
        let a = ArrayView1::from(activation);
        let out = self.forward(x.view().insert_axis(Axis(0)), a.insert_axis(Axis(0)), dt)?;
        JointState::from_vector(out.state.row(0))
    }

    /// Static rest position under constant activation, the solution of `K θ = b`
    ///
    /// Compensation is evaluated at zero length and rate.
    pub fn equilibrium(&self, activation: &[f64]) -> DynamicsResult<Array1<f64>> {
        let result = self.equilibrium_inner(activation);
        if let Err(err) = &result {
            self.record_failure(err);
        }
        result
    }

    fn equilibrium_inner(&self, activation: &[f64]) -> DynamicsResult<Array1<f64>> {
        let builder = || DynamicsErrorBuilder::new("engine", "equilibrium");
        let snapshot = self.snapshot();
        let muscles = snapshot.parameters.muscle_count();
        if activation.len() != muscles {
            return Err(builder().length_mismatch("activation", muscles, activation.len()));
        }
        let activation = ArrayView1::from(activation).insert_axis(Axis(0));
        if activation.iter().any(|v| !v.is_finite()) {
            return Err(builder().degenerate("activation", "input contains NaN or infinity"));
        }
        let activation = self.clamp_activation(activation);

        let physical = snapshot.parameters.physical();
        let compensation = Compensation {
            networks: &snapshot.networks,
            ratio: self.effective_nn_ratio(),
            k_scale: self.config.scales.k1,
            l_scale: self.config.scales.l1,
        };
        let rest = Array1::zeros(2 * self.dof);
        let joint = assemble(
            &physical,
            &compensation,
            rest.view(),
            activation.row(0),
            self.config.dynamics.min_inertia,
        )?;

        let theta = to_dmatrix(joint.stiffness.view())
            .lu()
            .solve(&to_dvector(joint.bias.view()))
            .ok_or_else(|| builder().degenerate("stiffness", "stiffness matrix is singular"))?;
        let theta: Array1<f64> = theta.iter().copied().collect();
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(builder().degenerate("equilibrium", "rest position is not finite"));
        }
        Ok(theta)
    }
}
