// src/config/constants.rs
//! Model-wide constants
//!
//! Reference magnitudes for the scale constants come from the upper/lower extremity
//! musculoskeletal models the joint presets were fitted against.

/// Per-quantity scale constants of the normalised parameter representation
pub mod scales {
    /// Passive stiffness scale, N/m
    pub const K0_SCALE: f64 = 2000.0;
    /// Activation-gain stiffness scale, N/m
    pub const K1_SCALE: f64 = 40000.0;
    /// Rest length scale, m
    pub const L0_SCALE: f64 = 0.03;
    /// Activation-gain length scale, m
    pub const L1_SCALE: f64 = 0.006;
    /// Rotational inertia scale, kg·m²
    pub const INERTIA_SCALE: f64 = 0.008;
    /// Moment arm scale, m
    pub const MOMENT_ARM_SCALE: f64 = 0.05;
}

/// Joint dynamics constants
pub mod dynamics {
    /// Shared multiplier giving each parameter group its own effective step size
    pub const DEFAULT_LR_SCALE: f64 = 5.0;
    /// Compensation network blend ratio; zero recovers the pure analytic model
    pub const DEFAULT_NN_RATIO: f64 = 0.0;
    /// 60 Hz control loop
    pub const DEFAULT_DT_S: f64 = 0.0166667;
    /// Inertias at or below this magnitude are treated as degenerate
    pub const MIN_INERTIA: f64 = 1e-9;
    /// Default EMG-to-activation nonlinearity exponent, carried but unused
    pub const DEFAULT_NONLINEARITY: f64 = -2.0;
    pub const ACTIVATION_MIN: f64 = 0.0;
    pub const ACTIVATION_MAX: f64 = 1.0;
    /// Critical damping factor, D = CRITICAL_DAMPING_FACTOR * sqrt(K * I)
    pub const CRITICAL_DAMPING_FACTOR: f64 = 2.0;
}

/// Compensation network topology
pub mod network {
    /// (length, length_rate, activation)
    pub const INPUT_WIDTH: usize = 3;
    pub const HIDDEN_WIDTH: usize = 256;
    /// (Δk, Δl)
    pub const OUTPUT_WIDTH: usize = 2;
    pub const LEAKY_RELU_SLOPE: f64 = 0.01;
    /// Seed of the first muscle's default weights; muscle i uses seed + i
    pub const DEFAULT_WEIGHT_SEED: u64 = 0;
}

/// Whole-limb preset constants
pub mod limb {
    /// Normalisation multiplier of the activation mixing matrix
    pub const DEFAULT_MIXING_LR: f64 = 20.0;
    /// Rotational inertia of the 2-DOF wrist, [flexion/extension, deviation], kg·m²
    pub const WRIST_INERTIA: [f64; 2] = [0.004, 0.008];
    /// Rotational inertia of a single finger joint, kg·m²
    pub const FINGER_INERTIA: f64 = 0.004;
    pub const FINGER_JOINT_COUNT: usize = 4;
    pub const RAW_CHANNEL_MIN: f64 = 0.0;
    pub const RAW_CHANNEL_MAX: f64 = 1.0;
}

/// Performance constants
pub mod performance {
    /// Batches at least this large are stepped on the rayon pool
    pub const DEFAULT_PARALLEL_BATCH_THRESHOLD: usize = 64;
}

/// Configuration file locations, lowest precedence first
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/limb-dynamics/model.toml";
    pub const USER_CONFIG_DIR: &str = ".config/limb-dynamics";
    pub const DEFAULT_CONFIG_FILE: &str = "config/model.toml";
    pub const LOCAL_CONFIG_FILE: &str = "model.toml";
    /// Environment variable prefix for overrides, e.g. `LIMB_DYNAMICS_DYNAMICS__NN_RATIO=0.3`
    pub const ENV_PREFIX: &str = "LIMB_DYNAMICS_";
    /// Separates nested keys in environment overrides
    pub const ENV_SEPARATOR: &str = "__";
}
