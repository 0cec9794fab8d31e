//! Task snapshots and the shared registry read by the polling interface.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registry of task snapshots keyed by id, shared between background workers
/// and status readers. Workers replace whole snapshots under the write lock,
/// so a poll never observes a half-applied progress update. Created once at
/// process start and injected into the task managers.
#[derive(Debug)]
pub struct TaskStore<T> {
    tasks: RwLock<HashMap<Uuid, T>>,
}

impl<T: Clone> TaskStore<T> {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: Uuid, task: T) {
        self.tasks
            .write()
            .expect("task store lock poisoned")
            .insert(id, task);
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.tasks
            .read()
            .expect("task store lock poisoned")
            .get(id)
            .cloned()
    }

    /// Applies a mutation to one task as a single atomic update.
    pub fn update(&self, id: &Uuid, apply: impl FnOnce(&mut T)) {
        let mut tasks = self.tasks.write().expect("task store lock poisoned");
        if let Some(task) = tasks.get_mut(id) {
            apply(task);
        }
    }
}

impl<T: Clone> Default for TaskStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl ConversionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStatus::Completed | ConversionStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTotals {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
}

/// Snapshot of a conversion job as exposed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTask {
    pub id: Uuid,
    pub status: ConversionStatus,
    /// 0-100, non-decreasing until a terminal state.
    pub progress: u8,
    pub message: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<ConversionTotals>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_errors: Vec<crate::types::RowReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_filename: Option<String>,
    /// Account inscription carried forward so the caller can chain an
    /// automation submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inscricao_municipal: Option<String>,
}

impl ConversionTask {
    pub fn queued(id: Uuid) -> Self {
        Self {
            id,
            status: ConversionStatus::Queued,
            progress: 0,
            message: "Na fila...".to_string(),
            details: String::new(),
            totals: None,
            row_errors: Vec::new(),
            output_filename: None,
            error_filename: None,
            inscricao_municipal: None,
        }
    }

    /// Progress updates never move backwards, even if a worker reports a
    /// stale value after a faster stage.
    pub fn set_progress(&mut self, progress: u8, message: &str, details: &str) {
        self.progress = self.progress.max(progress.min(100));
        self.message = message.to_string();
        self.details = details.to_string();
    }
}
