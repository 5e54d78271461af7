// src/hydro/mod.rs

//! The hydro collaborator surface.
//!
//! The tree machinery never looks inside a gas particle's thermodynamic
//! state; it only calls these entry points at the drift and ghost
//! boundaries. The interaction loops themselves (density, gradient, force)
//! live with the flux solver and are out of scope here.

use crate::errors::SimError;
use crate::particles::{DensityAccumulators, Part, XPart};


/// Tunables of the SPH scheme the tree machinery needs to know about.
#[derive(Debug, Clone, Copy)]
pub struct HydroConfig {
    /// Global upper bound on the smoothing length.
    pub h_max: f32,
    /// Target number of neighbours, in units of kernel volume.
    pub eta_neighbours: f32,
}

impl Default for HydroConfig {
    fn default() -> Self {
        Self { h_max: f32::MAX, eta_neighbours: 1.2348 }
    }
}

impl HydroConfig {
    pub fn new(h_max: Option<f32>, eta_neighbours: Option<f32>) -> Result<Self, SimError> {
        let default = HydroConfig::default();
        let h_max = h_max.unwrap_or(default.h_max);
        if h_max <= 0.0 {
            return Err(SimError::InvalidSmoothingLength);
        }
        Ok(Self { h_max, eta_neighbours: eta_neighbours.unwrap_or(default.eta_neighbours) })
    }
}

/// Get a particle ready for a density calculation: zero every accumulator
/// the density loop folds into.
#[inline]
pub fn init_part(p: &mut Part) {
    p.density = DensityAccumulators::default();
}

/// Convert the raw density-loop accumulators into a valid thermodynamic
/// state once the loop has closed over all neighbours.
#[inline]
pub fn convert_quantities(p: &mut Part, xp: &XPart) {
    // Finish the density sum with the particle's own contribution and
    // normalise by the kernel volume.
    let h_inv = 1.0 / p.h;
    let h_inv3 = h_inv * h_inv * h_inv;
    p.density.rho = (p.density.rho + p.mass) * h_inv3;
    p.density.wcount = (p.density.wcount + 1.0) * h_inv3;

    // Predicted velocity restarts from the full-step value.
    p.v = xp.v_full;
}
