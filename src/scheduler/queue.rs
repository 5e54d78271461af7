// src/scheduler/queue.rs

//! The task scheduler.
//!
//! Task stubs are built once per rebuild; every step the activation pass
//! clears the skip flag on the subset that must run, `start` seeds the
//! dependency counters, and a pool of workers drains the ready queue.
//! Workers never block inside a task: a body that loses a cell lock
//! returns [`TaskOutcome::Requeue`] and the stub goes back on the queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use log::debug;

use crate::cells::CellId;

use super::task::{Task, TaskId, TaskKind, TaskOutcome, TaskSubkind};

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
    ready: Mutex<VecDeque<TaskId>>,
    ready_signal: Condvar,
    /// Activated tasks not yet completed this step.
    pending: AtomicUsize,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Add a task stub. Stubs start skipped.
    pub fn add_task(
        &mut self,
        kind: TaskKind,
        subkind: TaskSubkind,
        ci: Option<CellId>,
        cj: Option<CellId>,
        flags: u32,
    ) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        self.tasks.push(Task::new(kind, subkind, ci, cj, flags));
        id
    }

    /// Record that `unlocked` may only run once `t` has completed.
    pub fn add_unlock(&mut self, t: TaskId, unlocked: TaskId) {
        assert_ne!(t, unlocked, "task cannot unlock itself");
        self.tasks[t.0 as usize].unlocks.push(unlocked);
    }

    #[inline]
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0 as usize]
    }

    pub fn nr_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Mark every stub skipped, ready for the next activation pass.
    pub fn skip_all(&self) {
        for t in &self.tasks {
            t.skip.store(true, Ordering::Relaxed);
        }
    }

    /// Pull a task into the current step.
    #[inline]
    pub fn activate(&self, id: TaskId) {
        self.task(id).skip.store(false, Ordering::Relaxed);
    }

    /// Pull a send task into the current step, bound for the given rank.
    #[inline]
    pub fn activate_send(&self, id: TaskId, node: i32) {
        let t = self.task(id);
        debug_assert_eq!(t.kind, TaskKind::Send);
        t.target_node.store(node, Ordering::Relaxed);
        t.skip.store(false, Ordering::Relaxed);
    }

    /// Number of tasks activated for the current step.
    pub fn nr_active(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_active()).count()
    }

    /// Seed the dependency counters and the ready queue from the current
    /// activation state. Must run after the activation pass and before the
    /// workers start.
    pub fn start(&self) {
        for t in &self.tasks {
            t.wait.store(0, Ordering::Relaxed);
        }
        let mut active = 0usize;
        for t in &self.tasks {
            if !t.is_active() {
                continue;
            }
            active += 1;
            for &u in &t.unlocks {
                let dep = self.task(u);
                if dep.is_active() {
                    dep.wait.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.pending.store(active, Ordering::Relaxed);

        let mut queue = self.ready.lock().unwrap();
        queue.clear();
        for (k, t) in self.tasks.iter().enumerate() {
            if t.is_active() && t.wait.load(Ordering::Relaxed) == 0 {
                queue.push_back(TaskId(k as u32));
            }
        }
        debug!("scheduler seeded: {} active, {} immediately ready", active, queue.len());
    }

    fn enqueue(&self, id: TaskId) {
        let mut queue = self.ready.lock().unwrap();
        queue.push_back(id);
        drop(queue);
        self.ready_signal.notify_one();
    }

    /// Mark a task completed and release any dependents that become ready.
    pub fn done(&self, id: TaskId) {
        for &u in &self.task(id).unlocks {
            let dep = self.task(u);
            if dep.is_active() && dep.wait.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.enqueue(u);
            }
        }
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Step complete: wake everyone so the pool can shut down. The
            // lock orders this against a worker between its empty-queue
            // check and its wait, so the wake-up cannot be lost.
            let _queue = self.ready.lock().unwrap();
            self.ready_signal.notify_all();
        }
    }

    fn next_ready(&self) -> Option<TaskId> {
        let mut queue = self.ready.lock().unwrap();
        loop {
            if let Some(id) = queue.pop_front() {
                return Some(id);
            }
            if self.pending.load(Ordering::Acquire) == 0 {
                return None;
            }
            queue = self.ready_signal.wait(queue).unwrap();
        }
    }

    /// Drain the ready queue with a pool of OS-thread workers.
    ///
    /// `execute` is the task body dispatcher. It runs each task to
    /// completion without suspending; a body that fails to take a cell
    /// lock returns [`TaskOutcome::Requeue`] and the stub is handed to the
    /// back of the queue.
    pub fn run<F>(&self, nr_threads: usize, execute: F)
    where
        F: Fn(&Scheduler, TaskId) -> TaskOutcome + Sync,
    {
        assert!(nr_threads > 0, "scheduler needs at least one worker");

        std::thread::scope(|scope| {
            for _ in 0..nr_threads {
                scope.spawn(|| {
                    while let Some(id) = self.next_ready() {
                        match execute(self, id) {
                            TaskOutcome::Done => self.done(id),
                            TaskOutcome::Requeue => {
                                self.enqueue(id);
                                std::thread::yield_now();
                            }
                        }
                    }
                });
            }
        });
    }
}
