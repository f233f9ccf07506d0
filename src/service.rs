//! Planner operations.
//!
//! Each method is one request against a repository: read the current record,
//! check the caller's content hash, apply, persist. Nothing is retried and a
//! rejected request leaves the repository untouched.

use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::{build_children_map, collect_descendants};
use crate::error::{PlanError, ValidationError};
use crate::fields::DisplayMode;
use crate::repository::TaskRepository;
use crate::task::{ResourceId, Task, TaskAttributes, TaskId};
use crate::tracker::{self, ReconcileRequest, Reconciliation};
use crate::tree::{ResourceView, TaskTree};
use crate::update::FieldUpdate;

/// Which resources an initial fetch covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceScope {
    pub department: Option<String>,
    /// Resource of the person looking at the chart; listed first.
    pub viewer: Option<ResourceId>,
}

/// Result of an initial fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialView {
    Resources(Vec<ResourceView>),
    Projects(TaskTree),
}

impl InitialView {
    pub fn display_mode(&self) -> DisplayMode {
        match self {
            InitialView::Resources(_) => DisplayMode::Resources,
            InitialView::Projects(_) => DisplayMode::Projects,
        }
    }
}

pub struct Planner<'a, R: TaskRepository + ?Sized> {
    repo: &'a mut R,
}

impl<'a, R: TaskRepository + ?Sized> Planner<'a, R> {
    pub fn new(repo: &'a mut R) -> Self {
        Planner { repo }
    }

    fn current(&self, id: TaskId) -> Result<Task, PlanError> {
        self.repo.task(id)?.ok_or(PlanError::NotFound { id })
    }

    /// Guarded single-field write from raw wire values.
    ///
    /// The value is validated before the repository is consulted.
    pub fn update_field(&mut self, id: TaskId, hash: &str, field: &str, value: &str) -> Result<Task, PlanError> {
        let update = FieldUpdate::parse(field, value)?;
        self.apply_update(id, hash, update)
    }

    /// Guarded single-field write.
    pub fn apply_update(&mut self, id: TaskId, hash: &str, update: FieldUpdate) -> Result<Task, PlanError> {
        let current = self.current(id)?;
        if let Err(e) = tracker::verify(&current, hash) {
            warn!(task = id, field = update.field_name(), "rejected stale update");
            return Err(e);
        }

        let mut next = current.clone();
        update.apply(&mut next)?;
        next.updated_at_utc = Utc::now().timestamp();

        if let FieldUpdate::Active(true) = update {
            if self.has_children(id)? {
                return Err(ValidationError::CompositeActivation { id }.into());
            }
            self.clear_active(&next)?;
        }
        self.repo.update(&next)?;
        info!(task = id, %update, "task updated");
        Ok(next)
    }

    fn has_children(&self, id: TaskId) -> Result<bool, PlanError> {
        Ok(self.repo.all_tasks()?.iter().any(|t| t.parent == Some(id)))
    }

    fn require_resource(&self, id: ResourceId) -> Result<(), PlanError> {
        match self.repo.resource(id)? {
            Some(_) => Ok(()),
            None => Err(ValidationError::UnknownResource { id }.into()),
        }
    }

    /// Deactivate every other task of the same resource.
    fn clear_active(&mut self, activated: &Task) -> Result<(), PlanError> {
        let siblings = match activated.resource {
            Some(r) => self.repo.tasks_for_resource(r)?,
            None => self.repo.all_tasks()?.into_iter().filter(|t| t.resource.is_none()).collect(),
        };
        for mut other in siblings.into_iter().filter(|t| t.active && t.id != activated.id) {
            debug!(task = other.id, "clearing previous active task");
            other.active = false;
            self.repo.update(&other)?;
        }
        Ok(())
    }

    /// Guarded full-record save of the editable attributes.
    ///
    /// `resource`, when it names a different resource, moves the task and
    /// everything below it. A nested task can only move together with its
    /// parent, so for it the resource must stay the parent's.
    pub fn update_task(
        &mut self,
        id: TaskId,
        hash: &str,
        attributes: TaskAttributes,
        resource: Option<ResourceId>,
    ) -> Result<Task, PlanError> {
        attributes.validate()?;
        let current = self.current(id)?;
        tracker::verify(&current, hash)?;

        if attributes.parent != current.parent {
            debug!(task = id, "ignoring parent in full save; hierarchy is fixed after creation");
        }
        let target = resource.filter(|r| current.resource != Some(*r));
        if let Some(r) = target {
            self.require_resource(r)?;
            if let Some(parent) = current.parent.map(|pid| self.repo.task(pid)).transpose()?.flatten() {
                parent_resource(&parent, Some(r))?;
            }
        }

        let mut next = current.clone();
        TaskAttributes { parent: current.parent, ..attributes }.apply_to(&mut next)?;
        next.updated_at_utc = Utc::now().timestamp();
        if let Some(r) = target {
            self.move_subtree(&mut next, r)?;
        }
        self.repo.update(&next)?;
        info!(task = id, "task saved");
        Ok(next)
    }

    /// Reassign `root` and its descendants to `target`. The resource's own
    /// active task, if it has one, stays active; moved tasks are deactivated.
    fn move_subtree(&mut self, root: &mut Task, target: ResourceId) -> Result<(), PlanError> {
        let all = self.repo.all_tasks()?;
        let target_busy = all.iter().any(|t| t.active && t.resource == Some(target));
        let children = build_children_map(&all);
        let mut below = HashSet::new();
        collect_descendants(root.id, &children, &mut below);

        for mut task in all.into_iter().filter(|t| t.id != root.id && below.contains(&t.id)) {
            task.resource = Some(target);
            task.active &= !target_busy;
            self.repo.update(&task)?;
        }
        root.resource = Some(target);
        root.active &= !target_busy;
        info!(task = root.id, resource = target, moved = below.len() + 1, "subtree moved");
        Ok(())
    }

    /// Insert a new leaf. A task created under a parent always belongs to
    /// the parent's resource; naming a different one is rejected.
    pub fn create_task(&mut self, attributes: TaskAttributes, resource: Option<ResourceId>) -> Result<TaskId, PlanError> {
        attributes.validate()?;
        if let Some(r) = resource {
            self.require_resource(r)?;
        }
        let parent = match attributes.parent {
            Some(pid) => Some(self.repo.task(pid)?.ok_or(ValidationError::UnknownParent { id: pid })?),
            None => None,
        };
        let resource = match &parent {
            Some(p) => parent_resource(p, resource)?,
            None => resource,
        };
        let task = attributes.into_task(0, resource, Utc::now().timestamp())?;
        let id = self.repo.insert(task)?;
        if let Some(mut p) = parent.filter(|p| p.active) {
            debug!(task = p.id, "parent gained a subtask; clearing its active flag");
            p.active = false;
            self.repo.update(&p)?;
        }
        info!(task = id, resource = ?resource, "task created");
        Ok(id)
    }

    /// Guarded delete of a task and everything below it.
    pub fn delete_task(&mut self, id: TaskId, hash: &str) -> Result<Vec<TaskId>, PlanError> {
        let current = self.current(id)?;
        tracker::verify(&current, hash)?;
        let removed = self.repo.delete(id)?;
        info!(task = id, removed = removed.len(), "task deleted");
        Ok(removed)
    }

    /// Report which of the caller's displayed tasks changed or disappeared.
    pub fn reconcile(&self, payload: &Value) -> Result<Reconciliation, PlanError> {
        let request = ReconcileRequest::from_json(payload)?;
        let result = tracker::reconcile(&*self.repo, &request)?;
        debug!(
            tracked = request.len(),
            changed = result.summary.changed,
            deleted = result.summary.deleted,
            "reconciled"
        );
        Ok(result)
    }

    /// Everything a chart needs to draw itself, from `as_of` onwards.
    ///
    /// With resources present the view is resource-rooted: resources are
    /// ordered by sort order and name with the viewer first, and a resource
    /// with no task ending on or after `as_of` is left out. Without
    /// resources the view is the project tree.
    pub fn fetch_initial(&self, scope: &ResourceScope, as_of: NaiveDate) -> Result<InitialView, PlanError> {
        let mut resources = self.repo.resources()?;
        if resources.is_empty() {
            let tree = current_tree(self.repo.all_tasks()?, as_of);
            return Ok(InitialView::Projects(tree));
        }

        if let Some(dept) = &scope.department {
            resources.retain(|r| r.department.as_deref() == Some(dept.as_str()));
        }
        resources.sort_by_key(|r| (Reverse(Some(r.id) == scope.viewer), r.sort_order, r.name.to_lowercase()));

        let mut views = Vec::new();
        for mut resource in resources {
            let tasks = current_tree(self.repo.tasks_for_resource(resource.id)?, as_of);
            if tasks.is_empty() {
                continue;
            }
            resource.annotations.retain(|a| a.end_date() >= as_of);
            views.push(ResourceView { resource, tasks });
        }
        Ok(InitialView::Resources(views))
    }
}

/// Resource for a task placed under `parent`: the parent's own, and a
/// different explicit request is an error.
fn parent_resource(parent: &Task, requested: Option<ResourceId>) -> Result<Option<ResourceId>, ValidationError> {
    match requested {
        Some(r) if parent.resource != Some(r) => Err(ValidationError::ResourceMismatch { parent: parent.id, resource: r }),
        _ => Ok(parent.resource),
    }
}

/// Tree of `records` keeping only root trees that end on or after `as_of`.
fn current_tree(records: Vec<Task>, as_of: NaiveDate) -> TaskTree {
    let mut tree = TaskTree::build(records);
    let finished: Vec<TaskId> = tree
        .roots()
        .iter()
        .filter(|n| n.effective_end() < as_of)
        .map(|n| n.id())
        .collect();
    for id in finished {
        tree.remove(id);
    }
    tree
}
