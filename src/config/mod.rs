// src/config/mod.rs
//! Model configuration: scale constants, integration mode, compensation blend and limb options

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use serde::{Deserialize, Serialize};

/// Complete model configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub scales: ScaleConfig,
    #[serde(default)]
    pub dynamics: DynamicsConfig,
    #[serde(default)]
    pub limb: LimbConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Scale constants of the normalised parameter representation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScaleConfig {
    #[serde(default = "defaults::k0_scale")]
    pub k0: f64,
    #[serde(default = "defaults::k1_scale")]
    pub k1: f64,
    #[serde(default = "defaults::l0_scale")]
    pub l0: f64,
    #[serde(default = "defaults::l1_scale")]
    pub l1: f64,
    #[serde(default = "defaults::inertia_scale")]
    pub inertia: f64,
    #[serde(default = "defaults::moment_arm_scale")]
    pub moment_arm: f64,
    /// Shared multiplier applied on top of every per-quantity scale
    #[serde(default = "defaults::lr_scale")]
    pub lr_scale: f64,
}

/// Joint engine behaviour
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DynamicsConfig {
    /// Blend ratio of the compensation network, in [0, 1]
    #[serde(default = "defaults::nn_ratio")]
    pub nn_ratio: f64,

    #[serde(default = "defaults::integration")]
    pub integration: IntegrationMode,

    #[serde(default = "defaults::min_inertia")]
    pub min_inertia: f64,

    #[serde(default = "defaults::dt_s")]
    pub default_dt_s: f64,
}

/// Whole-limb composition options
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LimbConfig {
    #[serde(default = "defaults::mixing_lr")]
    pub mixing_lr: f64,

    #[serde(default = "defaults::mixing_init")]
    pub mixing_init: MixingInit,

    #[serde(default = "defaults::freeze_mixing")]
    pub freeze_mixing: bool,

    #[serde(default = "defaults::freeze_inertia")]
    pub freeze_inertia: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PerformanceConfig {
    #[serde(default = "defaults::parallel_batch_threshold")]
    pub parallel_batch_threshold: usize,
}

/// How a step is integrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMode {
    /// Augmented-matrix exponential, exact for piecewise-linear input
    Exact,
    /// Single explicit Euler step
    Approximate,
}

/// Initial layout of the activation mixing matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixingInit {
    /// Electrodes sit on their target muscles: channel i drives muscle i
    Identity,
    /// Every channel contributes equally to every muscle
    Uniform,
}

/// Default value providers using constants
mod defaults {
    use super::{IntegrationMode, MixingInit};
    use crate::config::constants::*;

    pub fn k0_scale() -> f64 { scales::K0_SCALE }
    pub fn k1_scale() -> f64 { scales::K1_SCALE }
    pub fn l0_scale() -> f64 { scales::L0_SCALE }
    pub fn l1_scale() -> f64 { scales::L1_SCALE }
    pub fn inertia_scale() -> f64 { scales::INERTIA_SCALE }
    pub fn moment_arm_scale() -> f64 { scales::MOMENT_ARM_SCALE }
    pub fn lr_scale() -> f64 { dynamics::DEFAULT_LR_SCALE }

    pub fn nn_ratio() -> f64 { dynamics::DEFAULT_NN_RATIO }
    pub fn integration() -> IntegrationMode { IntegrationMode::Exact }
    pub fn min_inertia() -> f64 { dynamics::MIN_INERTIA }
    pub fn dt_s() -> f64 { dynamics::DEFAULT_DT_S }

    pub fn mixing_lr() -> f64 { limb::DEFAULT_MIXING_LR }
    pub fn mixing_init() -> MixingInit { MixingInit::Identity }
    pub fn freeze_mixing() -> bool { false }
    pub fn freeze_inertia() -> bool { false }

    pub fn parallel_batch_threshold() -> usize { performance::DEFAULT_PARALLEL_BATCH_THRESHOLD }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            k0: defaults::k0_scale(),
            k1: defaults::k1_scale(),
            l0: defaults::l0_scale(),
            l1: defaults::l1_scale(),
            inertia: defaults::inertia_scale(),
            moment_arm: defaults::moment_arm_scale(),
            lr_scale: defaults::lr_scale(),
        }
    }
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            nn_ratio: defaults::nn_ratio(),
            integration: defaults::integration(),
            min_inertia: defaults::min_inertia(),
            default_dt_s: defaults::dt_s(),
        }
    }
}

impl Default for LimbConfig {
    fn default() -> Self {
        Self {
            mixing_lr: defaults::mixing_lr(),
            mixing_init: defaults::mixing_init(),
            freeze_mixing: defaults::freeze_mixing(),
            freeze_inertia: defaults::freeze_inertia(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_batch_threshold: defaults::parallel_batch_threshold(),
        }
    }
}

impl ModelConfig {
    /// Configuration using the explicit-step integrator
    pub fn approximate() -> Self {
        let mut config = Self::default();
        config.dynamics.integration = IntegrationMode::Approximate;
        config
    }

    /// Same configuration with a different compensation blend ratio
    pub fn with_nn_ratio(mut self, nn_ratio: f64) -> Self {
        self.dynamics.nn_ratio = nn_ratio;
        self
    }

    /// Same configuration with a different integration mode
    pub fn with_integration(mut self, mode: IntegrationMode) -> Self {
        self.dynamics.integration = mode;
        self
    }

    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let scales = [
            ("scales.k0", self.scales.k0),
            ("scales.k1", self.scales.k1),
            ("scales.l0", self.scales.l0),
            ("scales.l1", self.scales.l1),
            ("scales.inertia", self.scales.inertia),
            ("scales.moment_arm", self.scales.moment_arm),
            ("scales.lr_scale", self.scales.lr_scale),
            ("limb.mixing_lr", self.limb.mixing_lr),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value <= 0.0 {
                errors.push(format!("{} must be finite and positive, got {}", name, value));
            }
        }

        let nn_ratio = self.dynamics.nn_ratio;
        if !(0.0..=1.0).contains(&nn_ratio) {
            errors.push(format!("dynamics.nn_ratio must lie in [0, 1], got {}", nn_ratio));
        }

        if !self.dynamics.min_inertia.is_finite() || self.dynamics.min_inertia < 0.0 {
            errors.push(format!(
                "dynamics.min_inertia must be finite and non-negative, got {}",
                self.dynamics.min_inertia
            ));
        }

        if !self.dynamics.default_dt_s.is_finite() || self.dynamics.default_dt_s <= 0.0 {
            errors.push(format!(
                "dynamics.default_dt_s must be finite and positive, got {}",
                self.dynamics.default_dt_s
            ));
        }

        if self.performance.parallel_batch_threshold == 0 {
            errors.push("performance.parallel_batch_threshold must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert failures into a crate error
    pub fn validate(&self) -> DynamicsResult<()> {
        self.validate_consistency().map_err(|errors| {
            DynamicsErrorBuilder::new("config", "validate").configuration(errors.join("; "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = ModelConfig::default();
        assert_eq!(config.scales.k0, scales::K0_SCALE);
        assert_eq!(config.dynamics.integration, IntegrationMode::Exact);
        assert_eq!(config.dynamics.nn_ratio, 0.0);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ModelConfig::default().with_nn_ratio(0.3);
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ModelConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ModelConfig = toml::from_str(
            r#"
[dynamics]
integration = "approximate"
"#,
        )
        .unwrap();

        assert_eq!(config.dynamics.integration, IntegrationMode::Approximate);
        assert_eq!(config.scales.k1, scales::K1_SCALE);
        assert_eq!(config.limb.mixing_init, MixingInit::Identity);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ModelConfig::default();
        config.dynamics.nn_ratio = 1.5;
        config.scales.inertia = 0.0;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = ModelConfig::approximate().with_nn_ratio(0.5);
        assert_eq!(config.dynamics.integration, IntegrationMode::Approximate);
        assert_eq!(config.dynamics.nn_ratio, 0.5);
        assert_eq!(
            config.with_integration(IntegrationMode::Exact).dynamics.integration,
            IntegrationMode::Exact
        );
    }
}
