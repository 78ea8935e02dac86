//! Engine internals: the typed world model, the quest planner, and the
//! world orchestrator.
//!
//! Nothing in here performs I/O or emits messages on its own; text formats
//! live in [`crate::script`] and the host-facing queue in
//! [`crate::server`]. The dependency direction is strictly
//! `model` → `plan` → `world`.

pub mod model;
pub mod plan;
pub mod world;
