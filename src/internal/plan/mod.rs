//! Quest lifecycle and planning.
//!
//! [`QuestManager`] owns the per-quest runtime record (status, active goal,
//! substate versions, parent link, tuning options). [`QuestPlanner`] turns
//! a quest-filtered state snapshot into a [`QuestPlan`] by heuristic graph
//! search over action-induced state transitions.

pub mod heuristic;
pub mod manager;
pub mod plan;
pub mod planner;

pub use manager::{
    QuestHeuristic, QuestManager, QuestOption, QuestOptions, QuestStatus, SearchStrategy,
};
pub use plan::{PlanStep, QuestPlan};
pub use planner::QuestPlanner;
