//! Whole-limb composition tests
//!
//! Run with: cargo test --test limb_integration

use limb_dynamics::limb::presets::{hand_1dof, hand_4dof, hand_4dof_with_config, wrist_2dof, wrist_2dof_with_config};
use limb_dynamics::model::ParameterField;
use limb_dynamics::{DynamicsError, MixingInit, ModelConfig, Side};
use ndarray::{array, s, Array1, Array2};

#[test]
fn test_hand_4dof_dispatches_joint_slices() {
    let hand = hand_4dof(8).unwrap();
    let state = Array2::from_shape_fn((3, 8), |(r, c)| 0.05 * (r as f64 + 1.0) * (c as f64 - 3.5));
    let raw = Array2::from_shape_fn((3, 8), |(r, c)| ((r + 2 * c) % 7) as f64 / 6.0);

    let out = hand.forward(state.view(), raw.view(), 0.0166667).unwrap();
    assert_eq!(out.state.dim(), (3, 8));
    assert_eq!(out.position.dim(), (3, 4));

    // identity mixing: channels 2j, 2j+1 drive joint j directly
    for (j, joint) in hand.joints().iter().enumerate() {
        let direct = joint
            .forward(
                state.slice(s![.., 2 * j..2 * j + 2]),
                raw.slice(s![.., 2 * j..2 * j + 2]),
                0.0166667,
            )
            .unwrap();
        let composed = out.state.slice(s![.., 2 * j..2 * j + 2]);
        for (a, b) in composed.iter().zip(direct.state.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        for row in 0..3 {
            assert!((out.position[[row, j]] - direct.position[[row, 0]]).abs() < 1e-12);
        }
    }
}

#[test]
fn test_channel_and_state_widths_validated() {
    let wrist = wrist_2dof(4, Side::Left).unwrap();
    let err = wrist
        .forward(Array2::zeros((1, 4)).view(), Array2::zeros((1, 5)).view(), 0.01)
        .unwrap_err();
    assert!(matches!(err, DynamicsError::Configuration { .. }));

    let err = wrist
        .forward(Array2::zeros((1, 2)).view(), Array2::zeros((1, 4)).view(), 0.01)
        .unwrap_err();
    assert!(matches!(err, DynamicsError::Configuration { .. }));
}

#[test]
fn test_more_channels_than_muscles() {
    // extra channels map to nothing under identity mixing
    let finger = hand_1dof(6).unwrap();
    assert_eq!(finger.mixing_matrix().dim(), (6, 2));
    let (_, with_extra) = finger.step(Array1::zeros(2).view(), &[0.4, 0.1, 1.0, 1.0, 1.0, 1.0], 0.01).unwrap();
    let (_, without) = finger.step(Array1::zeros(2).view(), &[0.4, 0.1, 0.0, 0.0, 0.0, 0.0], 0.01).unwrap();
    assert_eq!(with_extra, without);
}

#[test]
fn test_flexor_activation_moves_finger() {
    let finger = hand_1dof(2).unwrap();
    let mut state = Array1::zeros(2);
    for _ in 0..30 {
        let (_, next) = finger.step(state.view(), &[1.0, 0.0], 0.0166667).unwrap();
        state = next;
    }
    let rest = finger.joint(0).unwrap().equilibrium(&[1.0, 0.0]).unwrap();
    assert!(state[0] * rest[0] > 0.0, "moved against the flexor: {} vs {}", state[0], rest[0]);
}

#[test]
fn test_first_channel_flexes_first_finger_negative() {
    let hand = hand_4dof(8).unwrap();
    let mut raw = [0.0; 8];
    raw[0] = 1.0;
    let (position, _) = hand.step(Array1::zeros(8).view(), &raw, 0.0166667).unwrap();

    assert!(position[0] < 0.0, "finger 0 moved to {}", position[0]);
    for j in 1..4 {
        assert!(position[j].abs() < 1e-9, "finger {} moved to {}", j, position[j]);
    }
}

#[test]
fn test_uniform_mixing_spreads_channels() {
    let mut config = ModelConfig::default();
    config.limb.mixing_init = MixingInit::Uniform;
    let hand = hand_4dof_with_config(4, &config).unwrap();
    let w = hand.mixing_matrix();
    assert_eq!(w.dim(), (4, 8));
    assert!(w.iter().all(|v| (v - 0.25).abs() < 1e-12));
}

#[test]
fn test_mixing_replacement_changes_activation() {
    let wrist = wrist_2dof(4, Side::Right).unwrap();
    let state = Array2::zeros((1, 4));
    let raw = array![[0.0, 0.0, 1.0, 0.0]];
    let before = wrist.forward(state.view(), raw.view(), 0.02).unwrap();

    // route channel 2 to TP instead of TA
    let mut w = Array2::zeros((4, 4));
    w[[2, 0]] = 1.0;
    wrist.set_mixing_matrix(w.clone()).unwrap();
    let after = wrist.forward(state.view(), raw.view(), 0.02).unwrap();
    assert_ne!(before, after);

    let read_back = wrist.mixing_matrix();
    for (a, b) in read_back.iter().zip(w.iter()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_frozen_config_applies_at_construction() {
    let mut config = ModelConfig::default();
    config.limb.freeze_mixing = true;
    config.limb.freeze_inertia = true;
    let wrist = wrist_2dof_with_config(4, Side::Left, &config).unwrap();

    assert!(wrist.set_mixing_matrix(Array2::eye(4)).is_err());
    let err = wrist
        .update_joint_parameters(0, |p| p.with_stored_value(ParameterField::Inertia, 0, 1.0))
        .unwrap_err();
    assert!(matches!(err, DynamicsError::Configuration { .. }));
    assert!(wrist
        .update_joint_parameters(0, |p| p.with_stored_value(ParameterField::K1, 2, 0.5))
        .is_ok());
}

#[test]
fn test_compensation_toggle_fans_out() {
    let hand = hand_4dof_with_config(8, &ModelConfig::default().with_nn_ratio(0.2)).unwrap();
    hand.disable_compensation();
    assert!(hand.joints().iter().all(|j| j.effective_nn_ratio() == 0.0));
    hand.enable_compensation();
    assert!(hand.joints().iter().all(|j| j.effective_nn_ratio() == 0.2));
}

#[test]
fn test_summary_serialises_to_json() {
    let wrist = wrist_2dof(4, Side::Left).unwrap();
    let summary = wrist.parameter_summary();
    assert_eq!(summary.joints[0].inertia.len(), 2);
    assert!((summary.joints[0].k0[0] - 2000.0).abs() < 1e-9);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["mixing"].as_array().map(|rows| rows.len()), Some(4));
}
