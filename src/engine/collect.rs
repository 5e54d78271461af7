// src/engine/collect.rs

//! The step reducer.
//!
//! At the end of a step every rank holds a local summary: how many
//! particles of each kind it updated, the envelope of next wake times,
//! and whether its share of the tree wants rebuilding. The summaries are
//! combined into one global summary that every rank then applies, so all
//! ranks take the same next step and agree on whether to rebuild.

use crate::timeline::IntegerTime;

use super::Engine;

/// One rank's step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummary {
    pub updates: u64,
    pub g_updates: u64,
    pub s_updates: u64,
    pub ti_hydro_end_min: IntegerTime,
    pub ti_hydro_end_max: IntegerTime,
    pub ti_hydro_beg_max: IntegerTime,
    pub ti_gravity_end_min: IntegerTime,
    pub ti_gravity_end_max: IntegerTime,
    pub ti_gravity_beg_max: IntegerTime,
    pub rebuild: bool,
}

impl StepSummary {
    /// Fold another rank's summary into this one: update counts add, the
    /// per-kind end-time minima take the minimum, and everyone must agree
    /// to not rebuild.
    pub fn combine(&mut self, other: &StepSummary) {
        self.updates += other.updates;
        self.g_updates += other.g_updates;
        self.s_updates += other.s_updates;
        self.ti_hydro_end_min = self.ti_hydro_end_min.min(other.ti_hydro_end_min);
        self.ti_gravity_end_min = self.ti_gravity_end_min.min(other.ti_gravity_end_min);
        if other.rebuild {
            self.rebuild = true;
        }
    }

    /// Apply a reduced summary to the engine.
    pub fn apply(&self, e: &mut Engine) {
        e.ti_hydro_end_min = self.ti_hydro_end_min;
        e.ti_hydro_end_max = self.ti_hydro_end_max;
        e.ti_hydro_beg_max = self.ti_hydro_beg_max;
        e.ti_gravity_end_min = self.ti_gravity_end_min;
        e.ti_gravity_end_max = self.ti_gravity_end_max;
        e.ti_gravity_beg_max = self.ti_gravity_beg_max;
        e.ti_end_min = e.ti_hydro_end_min.min(e.ti_gravity_end_min);
        e.ti_end_max = e.ti_hydro_end_max.max(e.ti_gravity_end_max);
        e.ti_beg_max = e.ti_hydro_beg_max.max(e.ti_gravity_beg_max);
        e.updates = self.updates;
        e.g_updates = self.g_updates;
        e.s_updates = self.s_updates;
        e.force_rebuild = self.rebuild;
    }
}

/// Fold a set of per-rank summaries into the global one.
pub fn reduce_summaries(all: &[StepSummary]) -> StepSummary {
    let mut global = all[0];
    for other in &all[1..] {
        global.combine(other);
    }
    global
}

/// The reduction transport. The engine only sees this trait; the
/// single-process implementation is the identity, an MPI-backed one would
/// all-reduce the summary across ranks. A transport failure is fatal, so
/// the interface has no error channel.
pub trait StepReduce {
    fn reduce(&self, local: StepSummary) -> StepSummary;
}

/// Single-rank transport: the local summary already is the global one.
pub struct LocalReduce;

impl StepReduce for LocalReduce {
    fn reduce(&self, local: StepSummary) -> StepSummary {
        local
    }
}
