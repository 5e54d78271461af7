// src/integrator/mod.rs

//! The integrator collaborator surface.
//!
//! Leaf-level drift and kick updates for the three particle species. The
//! drift engine calls these once per particle per drift; everything cell
//! related (envelope folding, time stamps) stays with the caller.

use crate::particles::{GPart, Part, SPart, XPart};
use crate::timeline::IntegerTime;

#[cfg(test)]
mod integrator_tests;

/// Drift a gas particle forward by `dt`, accumulating its displacement
/// since the last rebuild and since the last sort.
#[inline]
pub fn drift_part(p: &mut Part, xp: &mut XPart, dt: f64, ti_current: IntegerTime) {
    for k in 0..3 {
        let dx = xp.v_full[k] as f64 * dt;
        p.x[k] += dx;
        xp.x_diff[k] += dx as f32;
        xp.x_diff_sort[k] += dx as f32;
    }
    p.ti_drift = ti_current;
}

/// Drift a gravity particle forward by `dt`.
#[inline]
pub fn drift_gpart(gp: &mut GPart, dt: f64, ti_current: IntegerTime) {
    for k in 0..3 {
        let dx = gp.v_full[k] as f64 * dt;
        gp.x[k] += dx;
        gp.x_diff[k] += dx as f32;
    }
    gp.ti_drift = ti_current;
}

/// Drift a star particle forward by `dt`.
///
/// Stars carry no displacement envelope of their own: every star has a
/// gravity particle whose envelope covers it.
#[inline]
pub fn drift_spart(sp: &mut SPart, dt: f64, ti_current: IntegerTime) {
    for k in 0..3 {
        sp.x[k] += sp.v[k] as f64 * dt;
    }
    sp.ti_drift = ti_current;
}

/// Half-kick a gas particle's full-step velocity by its acceleration.
#[inline]
pub fn kick_part(xp: &mut XPart, a: [f32; 3], dt: f64) {
    for k in 0..3 {
        xp.v_full[k] += a[k] * dt as f32;
    }
}

/// Half-kick a gravity particle.
#[inline]
pub fn kick_gpart(gp: &mut GPart, dt: f64) {
    for k in 0..3 {
        gp.v_full[k] += gp.a_grav[k] * dt as f32;
    }
}
