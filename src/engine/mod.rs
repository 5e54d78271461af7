// src/engine/mod.rs

//! The engine context: everything process-wide that the tree and task
//! machinery consult, carried by reference into every operation rather
//! than living as ambient globals.

mod collect;
mod maketasks;
mod runner;
mod step;

pub use collect::{reduce_summaries, LocalReduce, StepReduce, StepSummary};
pub use maketasks::make_tasks;
pub use runner::Runner;
pub use step::{collect_summary, drift_all, set_super_all, step, unskip_all};

#[cfg(test)]
mod collect_tests;

use std::sync::atomic::{AtomicU32, Ordering};

use crate::errors::SimError;
use crate::gravity::GravityConfig;
use crate::hydro::HydroConfig;
use crate::timeline::{IntegerTime, MAX_NR_TIMESTEPS};
use crate::utils::CELL_MAX_TAG;

/// Run hydrodynamics.
pub const POLICY_HYDRO: u32 = 1 << 0;
/// Run self-gravity.
pub const POLICY_SELF_GRAVITY: u32 = 1 << 1;
/// Run external gravity.
pub const POLICY_EXTERNAL_GRAVITY: u32 = 1 << 2;

pub struct Engine {
    /// Current position on the integer time-line.
    pub ti_current: IntegerTime,
    /// Physical duration of one integer tick.
    pub time_base: f64,
    /// This rank.
    pub node_id: i32,
    pub nr_nodes: i32,
    pub policy: u32,
    pub hydro: HydroConfig,
    pub gravity: GravityConfig,

    /// Per-step cell tag counter, wrapped at [`CELL_MAX_TAG`].
    cell_next_tag: AtomicU32,

    // Global step outcome, written back by the step reducer.
    pub ti_hydro_end_min: IntegerTime,
    pub ti_hydro_end_max: IntegerTime,
    pub ti_hydro_beg_max: IntegerTime,
    pub ti_gravity_end_min: IntegerTime,
    pub ti_gravity_end_max: IntegerTime,
    pub ti_gravity_beg_max: IntegerTime,
    pub ti_end_min: IntegerTime,
    pub ti_end_max: IntegerTime,
    pub ti_beg_max: IntegerTime,
    pub updates: u64,
    pub g_updates: u64,
    pub s_updates: u64,
    pub force_rebuild: bool,
}

impl Engine {
    pub fn new(
        policy: u32,
        time_base: f64,
        node_id: i32,
        nr_nodes: i32,
        hydro: HydroConfig,
        gravity: GravityConfig,
    ) -> Result<Self, SimError> {
        if time_base <= 0.0 {
            return Err(SimError::InvalidTime);
        }
        if node_id < 0 || nr_nodes <= node_id {
            return Err(SimError::SetupError(format!(
                "rank {} outside the communicator of size {}",
                node_id, nr_nodes
            )));
        }
        Ok(Engine {
            ti_current: 0,
            time_base,
            node_id,
            nr_nodes,
            policy,
            hydro,
            gravity,
            cell_next_tag: AtomicU32::new(0),
            ti_hydro_end_min: MAX_NR_TIMESTEPS,
            ti_hydro_end_max: 0,
            ti_hydro_beg_max: 0,
            ti_gravity_end_min: MAX_NR_TIMESTEPS,
            ti_gravity_end_max: 0,
            ti_gravity_beg_max: 0,
            ti_end_min: MAX_NR_TIMESTEPS,
            ti_end_max: 0,
            ti_beg_max: 0,
            updates: 0,
            g_updates: 0,
            s_updates: 0,
            force_rebuild: false,
        })
    }

    /// A single-rank engine with default physics settings.
    pub fn local(policy: u32, time_base: f64) -> Result<Self, SimError> {
        Engine::new(policy, time_base, 0, 1, HydroConfig::default(), GravityConfig::default())
    }

    #[inline]
    pub fn has_policy(&self, policy: u32) -> bool {
        self.policy & policy != 0
    }

    /// Draw the next communication tag.
    pub fn next_cell_tag(&self) -> u32 {
        self.cell_next_tag.fetch_add(1, Ordering::Relaxed) % CELL_MAX_TAG
    }
}
