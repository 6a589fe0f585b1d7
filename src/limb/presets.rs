// src/limb/presets.rs
//! Ready-made limb configurations
//!
//! Muscle constants are in SI units: stiffness N/m, lengths and moment arms m.

use super::MultiJointModel;
use crate::config::constants::limb::{FINGER_INERTIA, FINGER_JOINT_COUNT, WRIST_INERTIA};
use crate::config::ModelConfig;
use crate::dynamics::JointDynamicsEngine;
use crate::error::DynamicsResult;
use crate::model::MuscleSpec;
use serde::{Deserialize, Serialize};

/// Body side; mirrors the muscles whose moment arm flips across the midline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Four muscles acting on a 2-DOF joint, moment arms `[flexion, deviation]`
pub fn wrist_muscles(side: Side) -> Vec<MuscleSpec> {
    let (tp_arm, pl_arm) = match side {
        Side::Left => (vec![0.02, -0.01], vec![-0.0275, -0.01]),
        Side::Right => (vec![-0.02, -0.01], vec![0.0275, -0.01]),
    };
    vec![
        MuscleSpec::new(2000.0, 40000.0, 0.03, 0.006, tp_arm).with_name("TP"),
        MuscleSpec::new(2000.0, 40000.0, 0.05, 0.006, pl_arm).with_name("PL"),
        MuscleSpec::new(2000.0, 40000.0, 0.098, 0.006, vec![0.0125, 0.04]).with_name("TA"),
        MuscleSpec::new(2000.0, 40000.0, 0.05, 0.006, vec![0.0025, -0.045]).with_name("GAS"),
    ]
}

/// Flexor/extensor pair on a single DOF
pub fn antagonist_pair(rest_length: f64) -> Vec<MuscleSpec> {
    vec![
        MuscleSpec::new(100.0, 2000.0, rest_length, 0.006, vec![0.05]).with_name("flexor"),
        MuscleSpec::new(100.0, 2000.0, rest_length, 0.006, vec![-0.05]).with_name("extensor"),
    ]
}

/// Finger pair of the multi-finger hand: the first muscle pulls toward negative angles
pub fn finger_pair(rest_length: f64) -> Vec<MuscleSpec> {
    vec![
        MuscleSpec::new(100.0, 2000.0, rest_length, 0.006, vec![-0.05]).with_name("flexor"),
        MuscleSpec::new(100.0, 2000.0, rest_length, 0.006, vec![0.05]).with_name("extensor"),
    ]
}

pub fn wrist_2dof(channels: usize, side: Side) -> DynamicsResult<MultiJointModel> {
    wrist_2dof_with_config(channels, side, &ModelConfig::default())
}

pub fn wrist_2dof_with_config(channels: usize, side: Side, config: &ModelConfig) -> DynamicsResult<MultiJointModel> {
    let joint = JointDynamicsEngine::new(&wrist_muscles(side), &WRIST_INERTIA, config)?;
    MultiJointModel::new(channels, vec![joint], &config.limb)
}

pub fn hand_1dof(channels: usize) -> DynamicsResult<MultiJointModel> {
    hand_1dof_with_config(channels, &ModelConfig::default())
}

pub fn hand_1dof_with_config(channels: usize, config: &ModelConfig) -> DynamicsResult<MultiJointModel> {
    let joint = JointDynamicsEngine::new(&antagonist_pair(0.08), &[FINGER_INERTIA], config)?;
    MultiJointModel::new(channels, vec![joint], &config.limb)
}

pub fn hand_4dof(channels: usize) -> DynamicsResult<MultiJointModel> {
    hand_4dof_with_config(channels, &ModelConfig::default())
}

/// Four independent finger joints sharing one mixing matrix
pub fn hand_4dof_with_config(channels: usize, config: &ModelConfig) -> DynamicsResult<MultiJointModel> {
    let joints = (0..FINGER_JOINT_COUNT)
        .map(|_| JointDynamicsEngine::new(&finger_pair(0.06), &[FINGER_INERTIA], config))
        .collect::<DynamicsResult<Vec<_>>>()?;
    MultiJointModel::new(channels, joints, &config.limb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrist_sides_mirror() {
        let left = wrist_muscles(Side::Left);
        let right = wrist_muscles(Side::Right);
        for i in 0..2 {
            assert_eq!(left[i].moment_arm[0], -right[i].moment_arm[0]);
            assert_eq!(left[i].moment_arm[1], right[i].moment_arm[1]);
        }
        assert_eq!(left[2], right[2]);
        assert_eq!(left[3], right[3]);
    }

    #[test]
    fn test_preset_shapes() {
        let wrist = wrist_2dof(4, Side::Right).unwrap();
        assert_eq!((wrist.total_dof(), wrist.muscle_count()), (2, 4));

        let finger = hand_1dof(2).unwrap();
        assert_eq!((finger.total_dof(), finger.muscle_count()), (1, 2));

        let hand = hand_4dof(8).unwrap();
        assert_eq!(hand.joints().len(), 4);
        assert_eq!((hand.total_dof(), hand.muscle_count(), hand.state_width()), (4, 8, 8));
    }

    #[test]
    fn test_finger_pairs_are_ordered_negative_first() {
        let hand = hand_4dof(8).unwrap();
        for joint in hand.joints() {
            let params = &joint.snapshot().parameters;
            assert!(params.moment_arm(0)[0] < 0.0);
            assert!(params.moment_arm(1)[0] > 0.0);
        }

        let single = hand_1dof(2).unwrap();
        assert!(single.joint(0).unwrap().snapshot().parameters.moment_arm(0)[0] > 0.0);
    }
}
