//! Storage seam used by the planner.
//!
//! The core needs only a handful of record operations; anything that can
//! provide them can back the planner. [`crate::db::Database`] is the
//! JSON-file implementation shipped with the crate.

use crate::error::StorageError;
use crate::task::{Resource, ResourceId, Task, TaskId};

pub trait TaskRepository {
    /// Current record for `id`, or `None` if it no longer exists.
    fn task(&self, id: TaskId) -> Result<Option<Task>, StorageError>;

    /// Every task planned for a resource, nested tasks included.
    fn tasks_for_resource(&self, resource: ResourceId) -> Result<Vec<Task>, StorageError>;

    fn all_tasks(&self) -> Result<Vec<Task>, StorageError>;

    fn resources(&self) -> Result<Vec<Resource>, StorageError>;

    fn resource(&self, id: ResourceId) -> Result<Option<Resource>, StorageError> {
        Ok(self.resources()?.into_iter().find(|r| r.id == id))
    }

    /// Store a new record. The repository assigns and returns the id; the
    /// `id` already set on `task` is ignored.
    fn insert(&mut self, task: Task) -> Result<TaskId, StorageError>;

    /// Overwrite the stored record with the same id.
    fn update(&mut self, task: &Task) -> Result<(), StorageError>;

    /// Remove a task and every task below it. Returns the removed ids.
    fn delete(&mut self, id: TaskId) -> Result<Vec<TaskId>, StorageError>;
}
