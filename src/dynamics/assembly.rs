//! Assembly of the linear joint system for one instance
//! Location: src/dynamics/assembly.rs
//!
//! Per call the muscle model is linearised around the current activation: each muscle becomes
//! a spring of stiffness `κ_i` and force offset `f_i`, and the joint sees
//! `I θ̈ = -K θ - D θ̇ + b + τ` with `K = Σ κ_i M_i M_iᵀ` and `b = Σ f_i M_i`.

use super::integrator::ContinuousSystem;
use crate::config::constants::dynamics::CRITICAL_DAMPING_FACTOR;
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use crate::model::{CompensationNetwork, PhysicalParameters};
use ndarray::{s, Array1, Array2, ArrayView1};

/// Learned offsets applied on top of the bilinear gains
pub struct Compensation<'a> {
    pub networks: &'a [CompensationNetwork],
    /// Effective blend ratio; zero skips evaluation entirely
    pub ratio: f64,
    pub k_scale: f64,
    pub l_scale: f64,
}

impl Compensation<'_> {
    /// `(Δk_i, Δl_i)` per muscle, already scaled to physical units
    pub fn offsets(
        &self,
        lengths: &Array1<f64>,
        rates: &Array1<f64>,
        activation: ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let n = activation.len();
        let mut dk = Array1::zeros(n);
        let mut dl = Array1::zeros(n);
        if self.ratio == 0.0 {
            return (dk, dl);
        }
        for (i, net) in self.networks.iter().enumerate().take(n) {
            let (raw_k, raw_l) = net.evaluate(lengths[i], rates[i], activation[i]);
            dk[i] = raw_k * self.ratio * self.k_scale;
            dl[i] = raw_l * self.ratio * self.l_scale;
        }
        (dk, dl)
    }
}

/// Linearised joint at one state and activation
#[derive(Debug, Clone)]
pub struct JointSystem {
    /// Aggregate stiffness `K`, `DOF x DOF`
    pub stiffness: Array2<f64>,
    /// Bias torque `b`
    pub bias: Array1<f64>,
    /// Diagonal damping `D`
    pub damping: Array1<f64>,
    pub system: ContinuousSystem,
}

/// Muscle lengths `M θ` and rates `M θ̇`
pub fn muscle_kinematics(moment_arms: &Array2<f64>, state: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let dof = moment_arms.ncols();
    let lengths = moment_arms.dot(&state.slice(s![..dof]));
    let rates = moment_arms.dot(&state.slice(s![dof..]));
    (lengths, rates)
}

/// Bilinear law: `κ = K0 + (K1 + Δk) α`, `f = κ (L0 + (L1 + Δl) α)`
pub fn bilinear_terms(
    params: &PhysicalParameters,
    activation: ArrayView1<f64>,
    dk: &Array1<f64>,
    dl: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>) {
    let kappa = &params.k0 + &((&params.k1 + dk) * &activation);
    let rest = &params.l0 + &((&params.l1 + dl) * &activation);
    let force = &kappa * &rest;
    (kappa, force)
}

/// `K = Σ κ_i M_i M_iᵀ`, `b = Σ f_i M_i`
pub fn aggregate(
    moment_arms: &Array2<f64>,
    kappa: &Array1<f64>,
    force: &Array1<f64>,
) -> (Array2<f64>, Array1<f64>) {
    // Mᵀ diag(κ) M
    let weighted = moment_arms * &kappa.view().insert_axis(ndarray::Axis(1));
    let stiffness = moment_arms.t().dot(&weighted);
    let bias = moment_arms.t().dot(force);
    (stiffness, bias)
}

pub fn check_inertia(inertia: &Array1<f64>, min_inertia: f64) -> DynamicsResult<()> {
    for (j, &value) in inertia.iter().enumerate() {
        if !value.is_finite() || value <= min_inertia {
            return Err(DynamicsErrorBuilder::new("assembly", "check_inertia").degenerate_value(
                format!("inertia[{}]", j),
                value,
                format!("inertia must exceed {}", min_inertia),
            ));
        }
    }
    Ok(())
}

/// `D_j = 2 sqrt(K_jj I_j)`
pub fn critical_damping(stiffness: &Array2<f64>, inertia: &Array1<f64>) -> DynamicsResult<Array1<f64>> {
    let mut damping = Array1::zeros(inertia.len());
    for (j, &inertia_j) in inertia.iter().enumerate() {
        let k = stiffness[[j, j]];
        if !k.is_finite() || k < 0.0 {
            return Err(DynamicsErrorBuilder::new("assembly", "critical_damping").degenerate_value(
                format!("stiffness[{}][{}]", j, j),
                k,
                "diagonal stiffness must be finite and non-negative",
            ));
        }
        damping[j] = CRITICAL_DAMPING_FACTOR * (k * inertia_j).sqrt();
    }
    Ok(damping)
}

/// `A = [[0, I], [-K/I, -D/I]]`, `B = [[0, 0], [diag(b/I), diag(1/I)]]`
pub fn continuous_system(
    stiffness: &Array2<f64>,
    bias: &Array1<f64>,
    damping: &Array1<f64>,
    inertia: &Array1<f64>,
) -> DynamicsResult<ContinuousSystem> {
    let dof = inertia.len();
    let mut a = Array2::zeros((2 * dof, 2 * dof));
    let mut b = Array2::zeros((2 * dof, 2 * dof));

    a.slice_mut(s![..dof, dof..]).assign(&Array2::<f64>::eye(dof));
    for j in 0..dof {
        let inv = 1.0 / inertia[j];
        for k in 0..dof {
            a[[dof + j, k]] = -stiffness[[j, k]] * inv;
        }
        a[[dof + j, dof + j]] = -damping[j] * inv;
        b[[dof + j, j]] = bias[j] * inv;
        b[[dof + j, dof + j]] = inv;
    }

    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(DynamicsErrorBuilder::new("assembly", "continuous_system")
            .degenerate("system_matrix", "system matrices contain NaN or infinity"));
    }
    ContinuousSystem::new(a, b)
}

/// Full assembly for one instance
pub fn assemble(
    params: &PhysicalParameters,
    compensation: &Compensation<'_>,
    state: ArrayView1<f64>,
    activation: ArrayView1<f64>,
    min_inertia: f64,
) -> DynamicsResult<JointSystem> {
    check_inertia(&params.inertia, min_inertia)?;

    let (lengths, rates) = muscle_kinematics(&params.moment_arms, state);
    let (dk, dl) = compensation.offsets(&lengths, &rates, activation);
    let (kappa, force) = bilinear_terms(params, activation, &dk, &dl);

    let (stiffness, bias) = aggregate(&params.moment_arms, &kappa, &force);
    if stiffness.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
        return Err(DynamicsErrorBuilder::new("assembly", "assemble")
            .degenerate("stiffness", "stiffness or bias torque is not finite"));
    }

    let damping = critical_damping(&stiffness, &params.inertia)?;
    let system = continuous_system(&stiffness, &bias, &damping, &params.inertia)?;

    Ok(JointSystem {
        stiffness,
        bias,
        damping,
        system,
    })
}
