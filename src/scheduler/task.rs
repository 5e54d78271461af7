// src/scheduler/task.rs

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::cells::CellId;

/// Handle to a task inside the scheduler's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(pub u32);

/// What a task does when a worker picks it up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Interactions between the particles of one cell.
    SelfTask,
    /// Interactions between the particles of two neighbouring cells.
    Pair,
    /// A self task that recurses into the subtree before interacting.
    SubSelf,
    /// A pair task that recurses into both subtrees before interacting.
    SubPair,
    Sort,
    Ghost,
    GhostIn,
    GhostOut,
    ExtraGhost,
    DriftPart,
    DriftGPart,
    Kick1,
    Kick2,
    Timestep,
    EndForce,
    InitGrav,
    GravGhostIn,
    GravGhostOut,
    GravDown,
    GravLongRange,
    Cooling,
    SourceTerms,
    Send,
    Recv,
}

/// The flavour of an interaction or communication task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskSubkind {
    None,
    Density,
    Gradient,
    Force,
    Grav,
    ExternalGrav,
    /// Position/velocity payload of a communication task.
    Xv,
    /// Density payload of a communication task.
    Rho,
    /// End-of-step time vector of a communication task.
    Tend,
}

/// What a worker reports back after running a task body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task ran to completion; its dependents may proceed.
    Done,
    /// The task could not acquire a cell lock; put it back on the queue.
    Requeue,
}

/// A task stub. Stubs are constructed once per rebuild and survive for the
/// whole tree; each step the activation pass clears the skip flag on the
/// subset that must run.
#[derive(Debug)]
pub struct Task {
    pub kind: TaskKind,
    pub subkind: TaskSubkind,
    pub ci: Option<CellId>,
    pub cj: Option<CellId>,
    /// Sort direction for pair and sort tasks; communication tag for
    /// send/recv tasks.
    pub flags: u32,
    /// Set while the task is excluded from the current step.
    pub(super) skip: AtomicBool,
    /// Inbound dependency counter for the current step.
    pub(super) wait: AtomicI32,
    /// Tasks that may only run after this one.
    pub(super) unlocks: Vec<TaskId>,
    /// Destination rank of an activated send.
    pub(super) target_node: AtomicI32,
}

impl Task {
    pub(super) fn new(
        kind: TaskKind,
        subkind: TaskSubkind,
        ci: Option<CellId>,
        cj: Option<CellId>,
        flags: u32,
    ) -> Self {
        Task {
            kind,
            subkind,
            ci,
            cj,
            flags,
            skip: AtomicBool::new(true),
            wait: AtomicI32::new(0),
            unlocks: Vec::new(),
            target_node: AtomicI32::new(-1),
        }
    }

    /// Whether the task is part of the current step.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.skip.load(Ordering::Relaxed)
    }

    /// Destination rank of an activated send task.
    #[inline]
    pub fn target_node(&self) -> i32 {
        self.target_node.load(Ordering::Relaxed)
    }
}
