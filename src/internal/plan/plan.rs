//! Plans: what the planner hands back to a quest manager.

use std::sync::Arc;

use crate::internal::model::{ActionRef, ObjectRef, Quest, State};

use super::manager::QuestStatus;

/// One grounded step of a plan: an action plus the concrete objects bound
/// to its parameter slots.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub action: ActionRef,
    pub arguments: Vec<ObjectRef>,
}

impl PlanStep {
    /// Argument names, in slot order. Used for plan messages.
    pub fn argument_names(&self) -> Vec<String> {
        self.arguments.iter().map(|o| o.name().to_string()).collect()
    }
}

/// The outcome of one planning pass for one quest.
///
/// `steps` is non-empty only when `status` is `Reachable`. `Done` means the
/// snapshot already satisfied the goal; `Unknown` means search was cut off
/// by a limit before a verdict.
#[derive(Debug)]
pub struct QuestPlan {
    /// Substate version of the snapshot this plan was built for. Managers
    /// use it to reject plans that raced with newer state changes.
    pub substate_id: i64,
    /// The (quest-filtered) snapshot the search started from.
    pub given_state: Arc<State>,
    pub quest: Arc<Quest>,
    pub goal_index: usize,
    pub status: QuestStatus,
    pub steps: Vec<PlanStep>,
}
