//! Hierarchical task model.
//!
//! A [`TaskTree`] is rebuilt from flat repository records for every request.
//! Parents own their children; the upward direction is a plain id lookup.
//! Aggregates of composite tasks are derived on read and never stored, so a
//! leaf edit needs no write-back to its ancestors.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::warn;

use crate::calendar::{self, WorkDays};
use crate::error::ValidationError;
use crate::fields::{Completion, AGGREGATE_COLOR};
use crate::task::{Resource, Task, TaskId};

/// A task together with the subtasks it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub task: Task,
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    pub fn leaf(task: Task) -> Self {
        TaskNode { task, children: Vec::new() }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Stored start for a leaf, earliest leaf start below a composite.
    pub fn effective_start(&self) -> NaiveDate {
        self.children
            .iter()
            .map(TaskNode::effective_start)
            .min()
            .unwrap_or(self.task.start_date)
    }

    /// Stored end for a leaf, latest leaf end below a composite.
    pub fn effective_end(&self) -> NaiveDate {
        self.children
            .iter()
            .map(TaskNode::effective_end)
            .max()
            .unwrap_or(self.task.end_date)
    }

    /// Stored duration for a leaf. For a composite, the workday span between
    /// its effective start and end, not the sum of the children.
    pub fn effective_duration(&self) -> WorkDays {
        if self.is_leaf() {
            return self.task.duration;
        }
        let days = calendar::compute_duration_workdays(self.effective_start(), self.effective_end());
        WorkDays::saturating_days(days)
    }

    pub fn completion(&self) -> Completion {
        if self.is_leaf() {
            Completion::Percent(self.task.complete)
        } else {
            Completion::Indeterminate
        }
    }

    pub fn display_color(&self) -> Option<&str> {
        if self.is_leaf() {
            self.task.color.as_deref()
        } else {
            Some(AGGREGATE_COLOR)
        }
    }

    /// Leaf records below (or equal to) this node, depth first.
    pub fn leaves(&self) -> Vec<&Task> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    fn subtree_ids(&self, out: &mut Vec<TaskId>) {
        out.push(self.task.id);
        for c in &self.children {
            c.subtree_ids(out);
        }
    }
}

fn collect_leaves<'a>(node: &'a TaskNode, out: &mut Vec<&'a Task>) {
    if node.is_leaf() {
        out.push(&node.task);
    }
    for c in &node.children {
        collect_leaves(c, out);
    }
}

/// Sibling order: earliest start first, then higher priority, then id.
fn order_key(node: &TaskNode) -> (NaiveDate, Reverse<crate::fields::Priority>, TaskId) {
    (node.task.start_date, Reverse(node.task.priority), node.task.id)
}

/// One row of the flattened tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatRow {
    pub id: TaskId,
    /// Depth, starting at 1 for roots.
    pub generation: usize,
    /// Vertical position, starting at 0.
    pub row: usize,
    pub is_leaf: bool,
}

/// Depth-first, parent-before-children linearization of `roots`.
pub fn flatten(roots: &[TaskNode]) -> Vec<FlatRow> {
    fn push(node: &TaskNode, generation: usize, out: &mut Vec<FlatRow>) {
        out.push(FlatRow {
            id: node.task.id,
            generation,
            row: out.len(),
            is_leaf: node.is_leaf(),
        });
        for c in &node.children {
            push(c, generation + 1, out);
        }
    }
    let mut out = Vec::new();
    for r in roots {
        push(r, 1, &mut out);
    }
    out
}

/// Per-request tree of tasks with parent lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTree {
    roots: Vec<TaskNode>,
    parents: HashMap<TaskId, TaskId>,
}

impl TaskTree {
    /// Build the owning tree from flat records.
    ///
    /// Records whose parent is not part of `records` become roots. Records
    /// caught in a parent cycle are unreachable and dropped with a warning.
    pub fn build(records: Vec<Task>) -> Self {
        let ids: HashSet<TaskId> = records.iter().map(|t| t.id).collect();
        let total = records.len();
        let mut children: HashMap<TaskId, Vec<Task>> = HashMap::new();
        let mut roots = Vec::new();
        for t in records {
            match t.parent {
                Some(p) if ids.contains(&p) && p != t.id => children.entry(p).or_default().push(t),
                _ => roots.push(t),
            }
        }

        let mut tree = TaskTree::default();
        for t in roots {
            let node = tree.assemble(t, &mut children);
            tree.roots.push(node);
        }
        tree.roots.sort_by_key(order_key);

        let dropped: usize = children.values().map(Vec::len).sum();
        if dropped > 0 {
            warn!(dropped, total, "ignoring tasks caught in a parent cycle");
        }
        tree
    }

    fn assemble(&mut self, task: Task, children: &mut HashMap<TaskId, Vec<Task>>) -> TaskNode {
        let kids = children.remove(&task.id).unwrap_or_default();
        let mut nodes: Vec<TaskNode> = kids
            .into_iter()
            .map(|c| {
                self.parents.insert(c.id, task.id);
                self.assemble(c, children)
            })
            .collect();
        nodes.sort_by_key(order_key);
        TaskNode { task, children: nodes }
    }

    pub fn roots(&self) -> &[TaskNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<TaskNode> {
        self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        find(&self.roots, id)
    }

    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.parents.get(&id).copied()
    }

    /// Ids from the direct parent up to the root.
    pub fn ancestors(&self, id: TaskId) -> Vec<TaskId> {
        let mut chain = Vec::new();
        let mut cur = self.parent_of(id);
        while let Some(p) = cur {
            chain.push(p);
            cur = self.parent_of(p);
        }
        chain
    }

    /// Rows whose aggregate view is stale after a change to `id`.
    ///
    /// Aggregates are computed on read, so nothing is written here; the
    /// returned ancestor chain tells a presentation layer what to redraw.
    pub fn propagate_change(&self, id: TaskId) -> Vec<TaskId> {
        self.ancestors(id)
    }

    /// Add a record as a leaf under its `parent` (or as a root).
    pub fn insert(&mut self, task: Task) -> Result<(), ValidationError> {
        let node = TaskNode::leaf(task);
        match node.task.parent {
            None => {
                self.roots.push(node);
                self.roots.sort_by_key(order_key);
            }
            Some(pid) => {
                let parent = find_mut(&mut self.roots, pid).ok_or(ValidationError::UnknownParent { id: pid })?;
                self.parents.insert(node.task.id, pid);
                parent.children.push(node);
                parent.children.sort_by_key(order_key);
            }
        }
        Ok(())
    }

    /// Detach a task and everything it owns.
    ///
    /// A parent left without children becomes a leaf again and falls back to
    /// its own stored dates.
    pub fn remove(&mut self, id: TaskId) -> Option<TaskNode> {
        let removed = remove_from(&mut self.roots, id)?;
        let mut ids = Vec::new();
        removed.subtree_ids(&mut ids);
        for i in ids {
            self.parents.remove(&i);
        }
        Some(removed)
    }

    pub fn flatten(&self) -> Vec<FlatRow> {
        flatten(&self.roots)
    }

    /// Earliest start and latest end over all roots; `None` when empty.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.roots.iter().map(TaskNode::effective_start).min()?;
        let end = self.roots.iter().map(TaskNode::effective_end).max()?;
        Some((start, end))
    }
}

fn find(nodes: &[TaskNode], id: TaskId) -> Option<&TaskNode> {
    nodes.iter().find_map(|n| if n.task.id == id { Some(n) } else { find(&n.children, id) })
}

fn find_mut(nodes: &mut [TaskNode], id: TaskId) -> Option<&mut TaskNode> {
    for node in nodes.iter_mut() {
        if node.task.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn remove_from(nodes: &mut Vec<TaskNode>, id: TaskId) -> Option<TaskNode> {
    if let Some(pos) = nodes.iter().position(|n| n.task.id == id) {
        return Some(nodes.remove(pos));
    }
    nodes.iter_mut().find_map(|n| remove_from(&mut n.children, id))
}

/// A resource row with its task trees.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub resource: Resource,
    pub tasks: TaskTree,
}

impl ResourceView {
    /// Overall bar of the resource; `None` once its last task is gone.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.tasks.span()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Priority;
    use proptest::prelude::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn task(id: TaskId, parent: Option<TaskId>, start: NaiveDate, days: u32) -> Task {
        let duration = WorkDays::from_days(days).unwrap();
        Task {
            id,
            resource: Some(1),
            parent,
            name: format!("task {id}"),
            color: Some("#FF0000".into()),
            start_date: start,
            duration,
            end_date: calendar::compute_end_date(start, duration).unwrap(),
            complete: 40,
            priority: Priority::Normal,
            owner: None,
            owner_shortname: None,
            job_reference: String::new(),
            job_description: String::new(),
            deadline: None,
            deadline_description: None,
            active: false,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    fn sample() -> TaskTree {
        // 1
        // ├── 2 (Mon 4th, 3d -> Wed 6th)
        // └── 3
        //     ├── 4 (Thu 7th, 4d -> Tue 12th)
        //     └── 5 (Fri 1st, 1d)
        TaskTree::build(vec![
            task(3, Some(1), date(20), 1),
            task(1, None, date(25), 1),
            task(2, Some(1), date(4), 3),
            task(4, Some(3), date(7), 4),
            task(5, Some(3), date(1), 1),
        ])
    }

    #[test]
    fn composite_aggregates() {
        let tree = sample();
        let root = tree.get(1).unwrap();
        assert_eq!(root.effective_start(), date(1));
        assert_eq!(root.effective_end(), date(12));
        // Fri 1st .. Tue 12th: 1 + 5 + 2 workdays.
        assert_eq!(root.effective_duration(), WorkDays::from_days(8).unwrap());
        assert_eq!(root.completion(), Completion::Indeterminate);
        assert_eq!(root.display_color(), Some(AGGREGATE_COLOR));

        let leaf = tree.get(2).unwrap();
        assert_eq!(leaf.completion(), Completion::Percent(40));
        assert_eq!(leaf.display_color(), Some("#FF0000"));
        assert_eq!(leaf.effective_duration(), WorkDays::from_days(3).unwrap());
    }

    #[test]
    fn flatten_is_depth_first_with_generations() {
        let rows = sample().flatten();
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        // Children of 3 are ordered by start: 5 (1st) before 4 (7th);
        // children of 1: 2 (4th) before 3 (20th).
        assert_eq!(ids, vec![1, 2, 3, 5, 4]);
        let gens: Vec<_> = rows.iter().map(|r| r.generation).collect();
        assert_eq!(gens, vec![1, 2, 2, 3, 3]);
        assert!(rows.iter().enumerate().all(|(i, r)| r.row == i));
        assert_eq!(sample().flatten(), rows);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let tree = sample();
        assert_eq!(tree.ancestors(4), vec![3, 1]);
        assert_eq!(tree.propagate_change(2), vec![1]);
        assert!(tree.ancestors(1).is_empty());
    }

    #[test]
    fn removing_last_child_restores_leaf() {
        let mut tree = sample();
        tree.remove(4).unwrap();
        tree.remove(5).unwrap();
        let node = tree.get(3).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.effective_start(), date(20));
        assert_eq!(tree.parent_of(4), None);
    }

    #[test]
    fn removing_everything_leaves_empty_view() {
        let mut tree = sample();
        let removed = tree.remove(1).unwrap();
        assert_eq!(removed.leaves().len(), 3);
        assert!(tree.is_empty());
        assert_eq!(tree.span(), None);
        assert!(tree.ancestors(4).is_empty());
    }

    #[test]
    fn insert_under_unknown_parent_fails() {
        let mut tree = sample();
        let err = tree.insert(task(9, Some(42), date(4), 1)).unwrap_err();
        assert_eq!(err, ValidationError::UnknownParent { id: 42 });
    }

    #[test]
    fn orphans_become_roots_and_cycles_are_dropped() {
        let tree = TaskTree::build(vec![
            task(1, Some(99), date(4), 1),
            task(2, Some(3), date(4), 1),
            task(3, Some(2), date(4), 1),
        ]);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.roots()[0].id(), 1);
    }

    #[test]
    fn siblings_prefer_high_priority_on_same_day() {
        let mut low = task(1, None, date(4), 1);
        low.priority = Priority::Low;
        let mut high = task(2, None, date(4), 1);
        high.priority = Priority::High;
        let tree = TaskTree::build(vec![low, high]);
        let ids: Vec<_> = tree.flatten().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    fn check_aggregates(node: &TaskNode) {
        if !node.is_leaf() {
            let leaves = node.leaves();
            let min = leaves.iter().map(|t| t.start_date).min().unwrap();
            let max = leaves.iter().map(|t| t.end_date).max().unwrap();
            assert_eq!(node.effective_start(), min);
            assert_eq!(node.effective_end(), max);
        }
        node.children.iter().for_each(check_aggregates);
    }

    proptest! {
        #[test]
        fn aggregates_track_leaves(ops in prop::collection::vec((any::<bool>(), 0usize..16, 0u32..40, 1u32..15), 1..60)) {
            let mut tree = TaskTree::default();
            let mut live: Vec<TaskId> = Vec::new();
            let mut next_id = 1;
            for (delete, pick, offset, days) in ops {
                if delete && !live.is_empty() {
                    let id = live[pick % live.len()];
                    if let Some(removed) = tree.remove(id) {
                        let mut gone = Vec::new();
                        removed.subtree_ids(&mut gone);
                        live.retain(|i| !gone.contains(i));
                    }
                } else {
                    let parent = if live.is_empty() || pick % 4 == 0 { None } else { Some(live[pick % live.len()]) };
                    let start = date(1) + chrono::Duration::days(i64::from(offset));
                    tree.insert(task(next_id, parent, start, days)).unwrap();
                    live.push(next_id);
                    next_id += 1;
                }
                tree.roots().iter().for_each(check_aggregates);
            }
        }
    }
}
