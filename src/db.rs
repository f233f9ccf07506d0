//! JSON-file task repository and date utilities.
//!
//! This module provides the `Database` struct holding resources and flat task
//! records, its [`TaskRepository`] implementation, and the `Store` that loads
//! and saves it under an advisory file lock so that concurrent requests cannot
//! interleave their read-verify-write steps.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, Local, NaiveDate};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::epoch;
use crate::error::StorageError;
use crate::repository::TaskRepository;
use crate::task::{Annotation, Resource, ResourceId, Task, TaskId};

/// In-memory image of one plan file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub resources: Vec<Resource>,
    pub tasks: Vec<Task>,
    /// Highest task id ever handed out; ids are never reused.
    #[serde(default)]
    pub last_task_id: TaskId,
}

impl Database {
    /// Load database from JSON file, returning an empty database if the file
    /// doesn't exist yet.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Database::default());
        }
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(Database::default());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Generate the next available task ID.
    pub fn next_id(&self) -> TaskId {
        let max_live = self.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        self.last_task_id.max(max_live) + 1
    }

    pub fn next_resource_id(&self) -> ResourceId {
        self.resources.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    /// Get a task by ID.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a mutable reference to a task by ID.
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.id == id)
    }

    /// Remove tasks by IDs.
    pub fn remove_ids(&mut self, ids: &HashSet<TaskId>) {
        self.tasks.retain(|t| !ids.contains(&t.id));
    }

    pub fn add_resource(
        &mut self,
        name: &str,
        shortname: Option<String>,
        department: Option<String>,
        sort_order: i32,
    ) -> ResourceId {
        let id = self.next_resource_id();
        self.resources.push(Resource {
            id,
            name: name.trim().to_string(),
            shortname,
            department,
            sort_order,
            annotations: Vec::new(),
        });
        id
    }

    /// Attach an absence block to a resource. Returns `None` for an unknown
    /// resource.
    pub fn add_annotation(&mut self, resource: ResourceId, mut annotation: Annotation) -> Option<u64> {
        let next = self
            .resources
            .iter()
            .flat_map(|r| r.annotations.iter().map(|a| a.id))
            .max()
            .unwrap_or(0)
            + 1;
        let target = self.resource_mut(resource)?;
        annotation.id = next;
        target.annotations.push(annotation);
        Some(next)
    }
}

impl TaskRepository for Database {
    fn task(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        Ok(self.get(id).cloned())
    }

    fn tasks_for_resource(&self, resource: ResourceId) -> Result<Vec<Task>, StorageError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.resource == Some(resource))
            .cloned()
            .collect())
    }

    fn all_tasks(&self) -> Result<Vec<Task>, StorageError> {
        Ok(self.tasks.clone())
    }

    fn resources(&self) -> Result<Vec<Resource>, StorageError> {
        Ok(self.resources.clone())
    }

    fn insert(&mut self, mut task: Task) -> Result<TaskId, StorageError> {
        let id = self.next_id();
        task.id = id;
        self.last_task_id = id;
        self.tasks.push(task);
        Ok(id)
    }

    fn update(&mut self, task: &Task) -> Result<(), StorageError> {
        match self.get_mut(task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("task {} vanished during update", task.id),
            ))),
        }
    }

    fn delete(&mut self, id: TaskId) -> Result<Vec<TaskId>, StorageError> {
        if self.get(id).is_none() {
            return Ok(Vec::new());
        }
        let child_map = build_children_map(&self.tasks);
        let mut ids = HashSet::new();
        collect_descendants(id, &child_map, &mut ids);
        ids.insert(id);
        self.remove_ids(&ids);
        let mut removed: Vec<TaskId> = ids.into_iter().collect();
        removed.sort_unstable();
        Ok(removed)
    }
}

/// Build a map of parent task IDs to their children's IDs.
pub fn build_children_map(tasks: &[Task]) -> BTreeMap<TaskId, Vec<TaskId>> {
    let mut map: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    for t in tasks {
        if let Some(p) = t.parent {
            map.entry(p).or_default().push(t.id);
        }
    }
    for v in map.values_mut() {
        v.sort_unstable();
    }
    map
}

/// Recursively collect all descendant task IDs from a root task.
pub fn collect_descendants(root: TaskId, child_map: &BTreeMap<TaskId, Vec<TaskId>>, out: &mut HashSet<TaskId>) {
    if let Some(children) = child_map.get(&root) {
        for &c in children {
            if out.insert(c) {
                collect_descendants(c, child_map, out);
            }
        }
    }
}

/// Held while a request works on the plan file; unlocks on drop.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "failed to release plan lock");
        }
    }
}

/// File-backed access to a [`Database`].
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    lock_retries: u32,
    lock_retry_delay: StdDuration,
}

impl Store {
    pub fn new(config: &Config) -> Self {
        Store {
            path: config.db_path.clone(),
            lock_retries: config.lock_retries.max(1),
            lock_retry_delay: config.lock_retry_delay,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<LockGuard, StorageError> {
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        for attempt in 1..=self.lock_retries {
            let acquired = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match acquired {
                Ok(()) => {
                    debug!(path = %lock_path.display(), exclusive, attempt, "plan lock acquired");
                    return Ok(LockGuard { file });
                }
                Err(_) if attempt < self.lock_retries => thread::sleep(self.lock_retry_delay),
                Err(_) => {}
            }
        }
        Err(StorageError::Locked {
            path: lock_path.display().to_string(),
            attempts: self.lock_retries,
        })
    }

    /// Load a snapshot under a shared lock.
    pub fn read(&self) -> Result<Database, StorageError> {
        let _guard = self.lock(false)?;
        Database::load(&self.path)
    }

    /// Run `f` against the database under an exclusive lock.
    ///
    /// The file is saved only when `f` succeeds, so a rejected request never
    /// leaves a partial write behind.
    pub fn write<T, E>(&self, f: impl FnOnce(&mut Database) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let _guard = self.lock(true)?;
        let mut db = Database::load(&self.path)?;
        let out = f(&mut db)?;
        db.save(&self.path)?;
        Ok(out)
    }
}

/// Parse human-readable date input.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "monday", "next friday", etc.
/// - "in 3d", "in 2w"
/// - "YYYY-MM-DD" format
/// - a millisecond timestamp, as a browser would send it
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return Some(today + Duration::days(days));
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return Some(today + Duration::weeks(weeks));
            }
        }
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];

    for (day_name, target_day) in weekdays {
        let current_day = today.weekday().num_days_from_monday() as i64;
        let days_ahead = (target_day + 7 - current_day) % 7;
        if s == day_name {
            return Some(today + Duration::days(days_ahead));
        }
        if s == format!("next {}", day_name) {
            let days_to_add = if days_ahead == 0 { 7 } else { days_ahead + 7 };
            return Some(today + Duration::days(days_to_add));
        }
    }

    if s.len() > 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return epoch::parse_millis(&s).ok();
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Today in local time.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
