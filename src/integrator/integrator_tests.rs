use approx::assert_relative_eq;

use crate::integrator::*;
use crate::particles::{GPart, Part, SPart, XPart};

#[test]
fn test_drift_part_accumulates_both_envelopes() {
    let mut p = Part::new([1.0, 1.0, 1.0], [0.0; 3], 0.1, 1.0);
    let mut xp = XPart { v_full: [0.5, 0.0, -0.5], ..XPart::default() };

    drift_part(&mut p, &mut xp, 2.0, 16);

    assert_relative_eq!(p.x[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(p.x[2], 0.0, epsilon = 1e-12);
    assert_relative_eq!(xp.x_diff[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(xp.x_diff_sort[0], 1.0, epsilon = 1e-6);
    assert_eq!(p.ti_drift, 16);

    // A second drift keeps accumulating rather than overwriting.
    drift_part(&mut p, &mut xp, 2.0, 24);
    assert_relative_eq!(xp.x_diff[0], 2.0, epsilon = 1e-6);
}

#[test]
fn test_drift_gpart_moves_and_stamps() {
    let mut gp = GPart::new_dark_matter([0.0; 3], [1.0, 0.0, 0.0], 1.0, 0);
    drift_gpart(&mut gp, 0.5, 4);

    assert_relative_eq!(gp.x[0], 0.5, epsilon = 1e-12);
    assert_relative_eq!(gp.x_diff[0], 0.5, epsilon = 1e-6);
    assert_eq!(gp.ti_drift, 4);
}

#[test]
fn test_drift_spart_has_no_envelope() {
    let mut sp = SPart::new([0.0; 3], [0.0, 2.0, 0.0], 1.0);
    drift_spart(&mut sp, 0.25, 4);
    assert_relative_eq!(sp.x[1], 0.5, epsilon = 1e-12);
    assert_eq!(sp.ti_drift, 4);
}

#[test]
fn test_kick_gpart_applies_accumulated_acceleration() {
    let mut gp = GPart::new_dark_matter([0.0; 3], [1.0, 0.0, 0.0], 1.0, 0);
    gp.a_grav = [0.0, 4.0, 0.0];

    kick_gpart(&mut gp, 0.5);

    assert_relative_eq!(gp.v_full[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(gp.v_full[1], 2.0, epsilon = 1e-6);
}

#[test]
fn test_kick_part_updates_full_step_velocity() {
    let mut xp = XPart { v_full: [0.0, 0.0, 1.0], ..XPart::default() };
    kick_part(&mut xp, [2.0, 0.0, 0.0], 0.25);

    assert_relative_eq!(xp.v_full[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(xp.v_full[2], 1.0, epsilon = 1e-6);
}
