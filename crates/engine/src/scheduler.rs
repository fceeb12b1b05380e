//! Slot scheduling with domain and file-conflict awareness.
//!
//! The scheduler owns a fixed array of slots and a FIFO queue. Each pass
//! of [`Scheduler::fill_slots`] recomputes the conflict graph over the
//! running and queued tasks, then admits the first queued task that is
//! both domain-compatible and conflict-free with everything running.
//! Completion never auto-refills: the caller re-invokes `fill_slots` from
//! its completion handler, keeping scheduling event-driven.

use crate::conflict::ConflictDetector;
use armada_core::{Domain, Task, TaskStatus, Time};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// One unit of bounded execution concurrency.
#[derive(Debug, Clone)]
pub struct Slot {
    /// Position in the slot array
    pub index: usize,
    /// The occupying task, if any
    pub task: Option<Task>,
    /// When the occupant started
    pub started_at: Option<Time>,
}

/// Why a queued task was passed over during a scheduling pass.
///
/// Rebuilt from scratch on every pass; purely observational.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    /// Incompatible with a running task's domain
    DomainConflict {
        /// The running task's domain
        domain: Domain,
        /// The running task
        with_task: u64,
    },
    /// Shares a file with running tasks
    FileConflict {
        /// The running tasks it collides with
        with_tasks: Vec<u64>,
    },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::DomainConflict { domain, with_task } => {
                write!(f, "domain conflict with task #{with_task} ({domain})")
            }
            BlockReason::FileConflict { with_tasks } => {
                write!(f, "file conflict with tasks {with_tasks:?}")
            }
        }
    }
}

/// Running counters, surfaced at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Tasks that finished successfully
    pub completed: usize,
    /// Tasks that finished in error
    pub failed: usize,
    /// Tasks currently occupying slots
    pub running: usize,
    /// Tasks still queued
    pub queued: usize,
}

/// Point-in-time view of the scheduler, for dashboards and logs.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// Slots without an occupant
    pub free_slots: usize,
    /// Ids currently running
    pub running: Vec<u64>,
    /// Ids queued, front first
    pub queued: Vec<u64>,
    /// Current block reasons, rendered
    pub blocked: HashMap<u64, String>,
}

/// The top-level scheduling controller.
pub struct Scheduler {
    max_slots: usize,
    slots: Vec<Slot>,
    queue: VecDeque<Task>,
    scheduled: HashSet<u64>,
    completed: usize,
    failed: usize,
    block_reasons: HashMap<u64, BlockReason>,
    detector: ConflictDetector,
}

impl Scheduler {
    /// Create a scheduler with `max_slots` empty slots.
    pub fn new(max_slots: usize) -> Self {
        let slots = (0..max_slots)
            .map(|index| Slot {
                index,
                task: None,
                started_at: None,
            })
            .collect();
        Self {
            max_slots,
            slots,
            queue: VecDeque::new(),
            scheduled: HashSet::new(),
            completed: 0,
            failed: 0,
            block_reasons: HashMap::new(),
            detector: ConflictDetector::new(),
        }
    }

    /// The configured slot count.
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Append a task to the queue.
    ///
    /// Idempotent over the lifetime of the scheduler: a task id that was
    /// ever enqueued is never admitted twice. Returns whether the task was
    /// accepted.
    pub fn enqueue(&mut self, task: Task) -> bool {
        if !self.scheduled.insert(task.id) {
            debug!(task = task.id, "duplicate enqueue ignored");
            return false;
        }
        debug!(task = task.id, title = %task.title, "queued");
        self.queue.push_back(task);
        true
    }

    /// Fill free slots from the queue; returns the newly started tasks for
    /// the caller to launch.
    ///
    /// The conflict graph is recomputed over running and queued tasks on
    /// every call - conflicts depend on the current running set, so the
    /// graph cannot be cached across passes. Blocked tasks keep their
    /// queue position; the queue is FIFO with skips, never reordered.
    pub fn fill_slots(&mut self) -> Vec<Task> {
        let conflicts = {
            let pool = self
                .slots
                .iter()
                .filter_map(|s| s.task.as_ref())
                .chain(self.queue.iter());
            self.detector.detect_conflicts(pool)
        };

        self.block_reasons.clear();
        let mut started = Vec::new();

        for slot_idx in 0..self.slots.len() {
            if self.slots[slot_idx].task.is_some() {
                continue;
            }

            let running: Vec<(u64, Domain)> = self
                .slots
                .iter()
                .filter_map(|s| s.task.as_ref())
                .map(|t| (t.id, t.domain))
                .collect();

            let mut chosen: Option<usize> = None;
            for (queue_idx, candidate) in self.queue.iter().enumerate() {
                if let Some(reason) = Self::blocked_by(candidate, &running, &conflicts) {
                    debug!(task = candidate.id, %reason, "skipped");
                    self.block_reasons.insert(candidate.id, reason);
                    continue;
                }
                chosen = Some(queue_idx);
                break;
            }

            let Some(queue_idx) = chosen else {
                // Nothing assignable to this or any later free slot.
                break;
            };

            let Some(mut task) = self.queue.remove(queue_idx) else {
                break;
            };
            task.status = TaskStatus::Running;
            task.updated_at = chrono::Utc::now();
            self.block_reasons.remove(&task.id);
            info!(task = task.id, slot = slot_idx, domain = %task.domain, "started");

            let slot = &mut self.slots[slot_idx];
            slot.started_at = Some(chrono::Utc::now());
            slot.task = Some(task.clone());
            started.push(task);
        }

        started
    }

    fn blocked_by(
        candidate: &Task,
        running: &[(u64, Domain)],
        conflicts: &HashMap<u64, HashSet<u64>>,
    ) -> Option<BlockReason> {
        for &(id, domain) in running {
            if !candidate.domain.is_compatible_with(domain) {
                return Some(BlockReason::DomainConflict {
                    domain,
                    with_task: id,
                });
            }
        }

        if let Some(peers) = conflicts.get(&candidate.id) {
            let mut with_tasks: Vec<u64> = running
                .iter()
                .map(|&(id, _)| id)
                .filter(|id| peers.contains(id))
                .collect();
            if !with_tasks.is_empty() {
                with_tasks.sort_unstable();
                return Some(BlockReason::FileConflict { with_tasks });
            }
        }

        None
    }

    /// Mark a running task finished, free its slot, and update counters.
    ///
    /// Returns the task with its terminal status set, or None when no slot
    /// holds `id`. Does not refill; the caller invokes [`fill_slots`]
    /// again from its completion handler.
    ///
    /// [`fill_slots`]: Scheduler::fill_slots
    pub fn complete(&mut self, id: u64, success: bool) -> Option<Task> {
        let slot = self.slots.iter_mut().find(|s| {
            s.task.as_ref().map(|t| t.id) == Some(id)
        })?;

        let mut task = slot.task.take()?;
        slot.started_at = None;

        task.status = if success {
            self.completed += 1;
            TaskStatus::Completed
        } else {
            self.failed += 1;
            TaskStatus::Failed
        };
        task.updated_at = chrono::Utc::now();
        info!(task = id, status = %task.status, "finished");
        Some(task)
    }

    /// Whether anything is queued or running.
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || self.slots.iter().any(|s| s.task.is_some())
    }

    /// Whether every admitted task reached a terminal state.
    pub fn is_complete(&self) -> bool {
        !self.has_work()
    }

    /// Tasks currently occupying slots.
    pub fn running_tasks(&self) -> Vec<&Task> {
        self.slots.iter().filter_map(|s| s.task.as_ref()).collect()
    }

    /// Running counters.
    pub fn summary(&self) -> SchedulerSummary {
        SchedulerSummary {
            completed: self.completed,
            failed: self.failed,
            running: self.slots.iter().filter(|s| s.task.is_some()).count(),
            queued: self.queue.len(),
        }
    }

    /// Point-in-time view including current block reasons.
    ///
    /// The reasons are the ones recorded by the latest `fill_slots` pass -
    /// the single source of truth for "why is this task still queued".
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            free_slots: self.slots.iter().filter(|s| s.task.is_none()).count(),
            running: self
                .slots
                .iter()
                .filter_map(|s| s.task.as_ref().map(|t| t.id))
                .collect(),
            queued: self.queue.iter().map(|t| t.id).collect(),
            blocked: self
                .block_reasons
                .iter()
                .map(|(id, reason)| (*id, reason.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, domain: Domain, body: &str) -> Task {
        let mut t = Task::new(id, format!("task {id}"), body, vec![]);
        t.domain = domain;
        t
    }

    #[test]
    fn never_assigns_more_than_free_slots() {
        let mut s = Scheduler::new(2);
        for id in 1..=5 {
            s.enqueue(task(id, Domain::ALL[(id as usize) % 5], ""));
        }
        let started = s.fill_slots();
        assert!(started.len() <= 2);
    }

    #[test]
    fn identical_domains_run_one_at_a_time() {
        let mut s = Scheduler::new(3);
        s.enqueue(task(1, Domain::Backend, ""));
        s.enqueue(task(2, Domain::Backend, ""));
        s.enqueue(task(3, Domain::Backend, ""));

        let started = s.fill_slots();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, 1);

        let status = s.status();
        assert_eq!(status.queued, vec![2, 3]);
        assert!(status.blocked[&2].contains("domain conflict"));
        assert!(status.blocked[&3].contains("domain conflict"));
    }

    #[test]
    fn compatible_domains_fill_all_slots() {
        let mut s = Scheduler::new(3);
        s.enqueue(task(1, Domain::Backend, "edit src/api/a.rs"));
        s.enqueue(task(2, Domain::Frontend, "edit src/ui/b.tsx"));
        s.enqueue(task(3, Domain::Testing, "edit tests/c.rs"));

        let started = s.fill_slots();
        assert_eq!(started.len(), 3);
    }

    #[test]
    fn file_conflicts_serialize_compatible_domains() {
        let mut s = Scheduler::new(2);
        s.enqueue(task(1, Domain::Backend, "updates src/lib/config.ts"));
        s.enqueue(task(2, Domain::Frontend, "also reads src/lib/config.ts"));

        let started = s.fill_slots();
        assert_eq!(started.len(), 1);
        let status = s.status();
        assert!(status.blocked[&2].contains("file conflict"));

        // Once the first finishes, the second may start.
        s.complete(1, true);
        let started = s.fill_slots();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, 2);
    }

    #[test]
    fn unknown_domain_runs_alone() {
        let mut s = Scheduler::new(2);
        s.enqueue(task(1, Domain::Unknown, ""));
        s.enqueue(task(2, Domain::Backend, ""));

        let started = s.fill_slots();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, 1);
    }

    #[test]
    fn later_compatible_task_skips_ahead_without_reordering() {
        let mut s = Scheduler::new(2);
        s.enqueue(task(1, Domain::Backend, ""));
        s.enqueue(task(2, Domain::Backend, ""));
        s.enqueue(task(3, Domain::Frontend, ""));

        let started = s.fill_slots();
        let ids: Vec<u64> = started.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // Task 2 kept its queue position.
        assert_eq!(s.status().queued, vec![2]);
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut s = Scheduler::new(1);
        assert!(s.enqueue(task(1, Domain::Backend, "")));
        assert!(!s.enqueue(task(1, Domain::Backend, "")));
        assert_eq!(s.fill_slots().len(), 1);

        // Even after completion the id stays burned.
        s.complete(1, true);
        assert!(!s.enqueue(task(1, Domain::Backend, "")));
    }

    #[test]
    fn complete_updates_counters_and_frees_the_slot() {
        let mut s = Scheduler::new(1);
        s.enqueue(task(1, Domain::Backend, ""));
        s.fill_slots();
        assert!(s.has_work());

        let done = s.complete(1, true).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        s.enqueue(task(2, Domain::Backend, ""));
        s.fill_slots();
        let failed = s.complete(2, false).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);

        let summary = s.summary();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(s.is_complete());
    }

    #[test]
    fn complete_on_unknown_id_is_none() {
        let mut s = Scheduler::new(1);
        assert!(s.complete(99, true).is_none());
    }
}
