//! # Gantt planner core
//!
//! Scheduling core for a resource-planning Gantt chart: workday calendar
//! math, a hierarchical task tree with derived aggregates, and optimistic
//! concurrency through per-task content hashes.
//!
//! ## Key Features
//!
//! - **Workday calendar**: End dates and durations skip Saturdays and Sundays;
//!   durations are kept in quarter days.
//! - **Task hierarchy**: Composite tasks take their start, end and duration
//!   from their leaves. Nothing derived is ever written back.
//! - **Change tracking**: Every write carries the content hash the caller last
//!   saw. Stale writes are rejected, and a batch reconcile tells a client which
//!   of its displayed tasks changed or disappeared.
//! - **Two time units**: Storage keeps epoch seconds, the JSON handed to
//!   callers uses epoch milliseconds. [`epoch`] is the only place that converts.
//!
//! ## Quick Start
//!
//! ```bash
//! # Register a person and plan a task for them
//! gantt resource add "Ada Lovelace" --shortname ada --department dev
//! gantt add "Design review" --resource 1 --start 2024-03-04 --duration 2.5
//!
//! # Everything a chart needs, from today onwards
//! gantt init --department dev
//!
//! # Guarded edit: pass the checksum you were given
//! gantt set 1 --hash <checksum> complete 40
//! ```
//!
//! Data is stored in `~/.gantt/plan.json` unless `--db` or `GANTT_DB` says
//! otherwise.

pub mod calendar;
pub mod config;
pub mod db;
pub mod epoch;
pub mod error;
pub mod fields;
pub mod repository;
pub mod service;
pub mod task;
pub mod tracker;
pub mod tree;
pub mod update;
pub mod wire;
