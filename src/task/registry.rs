//! Task Registry (spec §4.4, component C4).
//!
//! A single in-memory map `task_id -> task`. No I/O. `DashMap` gives us the
//! same low-ceremony interior mutability the facilitator leans on for its
//! nonce cache (`chain/eip155/pending_nonce_manager.rs`), even though in the
//! single-executor design (spec §5) writes are effectively exclusive.

use dashmap::DashMap;

use super::{Task, TaskStatus};
use crate::timestamp::UnixTimestamp;
use crate::types::DrId;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: Task) {
        self.tasks.insert(task.task_id.clone(), task);
    }

    pub fn mark_posted(
        &self,
        task_id: &str,
        dr_id: Option<DrId>,
        block_height: u64,
        tx_hash: Option<String>,
        seq: u64,
        now: UnixTimestamp,
    ) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Posted;
            task.dr_id = dr_id;
            task.post_block_height = Some(block_height);
            task.tx_hash = tx_hash;
            task.sequence_number = Some(seq);
            task.posted_at = Some(now);
        }
    }

    pub fn mark_completed(&self, task_id: &str, now: UnixTimestamp) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
        }
    }

    pub fn mark_failed(&self, task_id: &str, error: String, seq: Option<u64>, now: UnixTimestamp) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            if seq.is_some() {
                task.sequence_number = seq;
            }
            task.completed_at = Some(now);
        }
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    pub fn all(&self) -> Vec<Task> {
        self.tasks.iter().map(|e| e.value().clone()).collect()
    }

    /// Tasks in `Posting` or `Posted` (spec §4.4).
    pub fn active(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|e| e.value().status.is_active())
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn by_state(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|e| e.value().status == status)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Removes terminal tasks whose `completed_at` is older than `max_age_secs`.
    pub fn cleanup_older_than(&self, max_age_secs: u64, now: UnixTimestamp) -> usize {
        let stale: Vec<String> = self
            .tasks
            .iter()
            .filter(|e| {
                let task = e.value();
                task.status.is_terminal()
                    && task
                        .completed_at
                        .map(|t| t.elapsed_secs(now) >= max_age_secs)
                        .unwrap_or(false)
            })
            .map(|e| e.key().clone())
            .collect();
        let count = stale.len();
        for task_id in stale {
            self.tasks.remove(&task_id);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
