// src/particles/particle.rs

//! The three particle species and their cross-links.
//!
//! Gas, gravity and star particles live in three parallel arrays owned by
//! the [`Space`](crate::space::Space). Cells never own particles; they hold
//! windows (offset + count) into these arrays. Subdivision permutes the
//! arrays in place, so the links between species are stored as indices and
//! re-derived after every reshuffle.

use crate::timeline::{IntegerTime, TimeBin};

/// What a gravity particle is linked to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GPartLink {
    /// A dark-matter particle carrying its own id.
    DarkMatter(u64),
    /// Back-link to the gas particle at this index in the space array.
    Gas(usize),
    /// Back-link to the star particle at this index in the space array.
    Star(usize),
}

/// Accumulators filled by the density loop. Opaque to the tree machinery;
/// only the hydro collaborator reads or writes the fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct DensityAccumulators {
    pub wcount: f32,
    pub wcount_dh: f32,
    pub rho: f32,
    pub rho_dh: f32,
}

/// A gas (SPH) particle.
#[derive(Clone, Copy, Debug)]
pub struct Part {
    /// Position.
    pub x: [f64; 3],
    /// Predicted velocity.
    pub v: [f32; 3],
    /// Smoothing length.
    pub h: f32,
    /// Internal energy per unit mass.
    pub u: f32,
    /// Mass.
    pub mass: f32,
    /// Density-loop state.
    pub density: DensityAccumulators,
    /// Index of the linked gravity particle, or negative if none.
    pub gpart: i64,
    /// Time of the last drift.
    pub ti_drift: IntegerTime,
    /// Time-step bin.
    pub time_bin: TimeBin,
}

impl Part {
    pub fn new(x: [f64; 3], v: [f32; 3], h: f32, mass: f32) -> Self {
        Part {
            x,
            v,
            h,
            u: 0.0,
            mass,
            density: DensityAccumulators::default(),
            gpart: -1,
            ti_drift: 0,
            time_bin: 0,
        }
    }
}

/// Extended gas state, index-parallel to [`Part`]. Carries the fields that
/// must survive a drift but are not needed by the interaction loops.
#[derive(Clone, Copy, Debug, Default)]
pub struct XPart {
    /// Cumulative displacement since the last rebuild.
    pub x_diff: [f32; 3],
    /// Cumulative displacement since the last sort.
    pub x_diff_sort: [f32; 3],
    /// Full-step velocity.
    pub v_full: [f32; 3],
}

/// A gravity particle. Every gas and star particle has one; dark matter is
/// represented by gravity particles alone.
#[derive(Clone, Copy, Debug)]
pub struct GPart {
    pub x: [f64; 3],
    pub v_full: [f32; 3],
    pub mass: f32,
    /// Acceleration accumulated by the gravity loops.
    pub a_grav: [f32; 3],
    /// Cumulative displacement since the last rebuild.
    pub x_diff: [f32; 3],
    /// What this gravity particle stands for.
    pub link: GPartLink,
    pub ti_drift: IntegerTime,
    pub time_bin: TimeBin,
}

impl GPart {
    pub fn new_dark_matter(x: [f64; 3], v_full: [f32; 3], mass: f32, id: u64) -> Self {
        GPart {
            x,
            v_full,
            mass,
            a_grav: [0.0; 3],
            x_diff: [0.0; 3],
            link: GPartLink::DarkMatter(id),
            ti_drift: 0,
            time_bin: 0,
        }
    }
}

/// A star particle.
#[derive(Clone, Copy, Debug)]
pub struct SPart {
    pub x: [f64; 3],
    pub v: [f32; 3],
    pub mass: f32,
    /// Index of the linked gravity particle, or negative if none.
    pub gpart: i64,
    pub ti_drift: IntegerTime,
    pub time_bin: TimeBin,
}

impl SPart {
    pub fn new(x: [f64; 3], v: [f32; 3], mass: f32) -> Self {
        SPart { x, v, mass, gpart: -1, ti_drift: 0, time_bin: 0 }
    }
}

/// Point the gravity particles linked from this window of gas particles
/// back at their (possibly reshuffled) owners.
///
/// `offset` is the window's position in the space-wide gas array.
pub fn relink_gparts_to_parts(parts: &[Part], offset: usize, gparts: &mut [GPart]) {
    for (k, p) in parts.iter().enumerate() {
        if p.gpart >= 0 {
            gparts[p.gpart as usize].link = GPartLink::Gas(offset + k);
        }
    }
}

/// Point the gravity particles linked from this window of star particles
/// back at their owners.
pub fn relink_gparts_to_sparts(sparts: &[SPart], offset: usize, gparts: &mut [GPart]) {
    for (k, sp) in sparts.iter().enumerate() {
        if sp.gpart >= 0 {
            gparts[sp.gpart as usize].link = GPartLink::Star(offset + k);
        }
    }
}

/// Point the gas particles named by this window of gravity particles back
/// at their (possibly reshuffled) gravity partners.
///
/// `offset` is the window's position in the space-wide gravity array.
pub fn relink_parts_to_gparts(gparts: &[GPart], offset: usize, parts: &mut [Part]) {
    for (k, gp) in gparts.iter().enumerate() {
        if let GPartLink::Gas(i) = gp.link {
            parts[i].gpart = (offset + k) as i64;
        }
    }
}

/// Point the star particles named by this window of gravity particles back
/// at their gravity partners.
pub fn relink_sparts_to_gparts(gparts: &[GPart], offset: usize, sparts: &mut [SPart]) {
    for (k, gp) in gparts.iter().enumerate() {
        if let GPartLink::Star(i) = gp.link {
            sparts[i].gpart = (offset + k) as i64;
        }
    }
}
