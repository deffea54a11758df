//! Task lifecycle model (spec §3 Task).

pub mod executor;
pub mod registry;

use crate::timestamp::UnixTimestamp;
use crate::types::DrId;

/// Lifecycle states. Transitions form a DAG ending at `Completed` or
/// `Failed` (spec §8 invariant, no back-edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Posting,
    Posted,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Posting | TaskStatus::Posted)
    }
}

/// The scheduler's tracking unit, one per DataRequest in flight (spec §3).
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub sequence_number: Option<u64>,
    pub dr_id: Option<DrId>,
    pub post_block_height: Option<u64>,
    pub tx_hash: Option<String>,
    pub created_at: UnixTimestamp,
    pub posted_at: Option<UnixTimestamp>,
    pub completed_at: Option<UnixTimestamp>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(task_id: String, created_at: UnixTimestamp) -> Self {
        Task {
            task_id,
            status: TaskStatus::Posting,
            sequence_number: None,
            dr_id: None,
            post_block_height: None,
            tx_hash: None,
            created_at,
            posted_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Monotonic `task_id` generator (`"task-<n>"`), one counter per process.
#[derive(Default)]
pub struct TaskIdGenerator {
    next: std::sync::atomic::AtomicU64,
}

impl TaskIdGenerator {
    pub fn next(&self) -> String {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("task-{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotonic_and_unique() {
        let gen = TaskIdGenerator::default();
        let ids: Vec<_> = (0..5).map(|_| gen.next()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert_eq!(ids[0], "task-0");
        assert_eq!(ids[4], "task-4");
    }

    #[test]
    fn fresh_task_starts_in_posting_with_no_sequence() {
        let task = Task::new("task-0".into(), UnixTimestamp(0));
        assert_eq!(task.status, TaskStatus::Posting);
        assert!(task.sequence_number.is_none());
        assert!(task.status.is_active());
        assert!(!task.status.is_terminal());
    }
}
