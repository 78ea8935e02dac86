//! Per-quest runtime state.
//!
//! Manager rules:
//! 1. An active quest never becomes inactive again.
//! 2. `Done` is terminal.
//! 3. `Unreachable` is terminal.
//! 4. The active goal index never decreases.

use std::sync::Arc;

use crate::internal::model::Quest;

use super::plan::QuestPlan;

/// Status of a quest within its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestStatus {
    /// Not yet activated; invisible to the player.
    Inactive,
    /// A goal has been achieved. Terminal.
    Done,
    /// A goal is reachable and a concrete plan exists.
    Reachable,
    /// No goal is reachable. Terminal.
    Unreachable,
    /// Active, but the last search was inconclusive (limits hit, or no
    /// planning pass has finished yet). Distinct from `Reachable`: there is
    /// no plan.
    Unknown,
}

impl QuestStatus {
    /// `Done` and `Unreachable` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Done | QuestStatus::Unreachable)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, QuestStatus::Inactive)
    }
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestStatus::Inactive => "INACTIVE",
            QuestStatus::Done => "DONE",
            QuestStatus::Reachable => "REACHABLE",
            QuestStatus::Unreachable => "UNREACHABLE",
            QuestStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Heuristic used by the planner's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestHeuristic {
    /// Sum of `(arity + omega)` over unmet goal statements.
    Simple,
    /// Additive ignore-delete relaxation.
    Hsp,
}

/// Open-set discipline of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    AStar,
    Dfs,
}

/// Planner tuning for one quest.
#[derive(Debug, Clone)]
pub struct QuestOptions {
    /// Maximum number of expansion steps per goal search.
    pub search_limit: usize,
    /// Maximum size of the open set.
    pub space_limit: usize,
    /// Additive weight of the SIMPLE heuristic (and the HSP fallback).
    pub omega: usize,
    pub heuristic: QuestHeuristic,
    pub strategy: SearchStrategy,
}

impl Default for QuestOptions {
    fn default() -> Self {
        Self {
            search_limit: 1000,
            space_limit: 10_000,
            omega: 0,
            heuristic: QuestHeuristic::Simple,
            strategy: SearchStrategy::AStar,
        }
    }
}

/// One option assignment, as set from `.quest` `options:` blocks or host
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestOption {
    SearchLimit(usize),
    SpaceLimit(usize),
    Omega(usize),
    Heuristic(QuestHeuristic),
    Strategy(SearchStrategy),
}

/// Runtime record of one quest: status, plan, substate versions, parent.
#[derive(Debug)]
pub struct QuestManager {
    quest: Arc<Quest>,
    status: QuestStatus,
    /// Substate version the last accepted plan was built for.
    last_planned_substate: i64,
    /// Current substate version; advanced by every world change relevant to
    /// this quest.
    current_substate: i64,
    last_plan: Option<Arc<QuestPlan>>,
    last_active_goal: usize,
    options: QuestOptions,
    parent: Option<(Arc<Quest>, usize)>,
}

impl QuestManager {
    pub fn new(quest: Arc<Quest>) -> Self {
        Self {
            quest,
            status: QuestStatus::Inactive,
            last_planned_substate: -1,
            current_substate: 0,
            last_plan: None,
            last_active_goal: 0,
            options: QuestOptions::default(),
            parent: None,
        }
    }

    pub fn quest(&self) -> &Arc<Quest> {
        &self.quest
    }

    pub fn status(&self) -> QuestStatus {
        self.status
    }

    pub fn last_plan(&self) -> Option<&Arc<QuestPlan>> {
        self.last_plan.as_ref()
    }

    pub fn last_active_goal(&self) -> usize {
        self.last_active_goal
    }

    pub fn current_substate(&self) -> i64 {
        self.current_substate
    }

    pub fn last_planned_substate(&self) -> i64 {
        self.last_planned_substate
    }

    pub fn options(&self) -> &QuestOptions {
        &self.options
    }

    pub fn parent(&self) -> Option<&(Arc<Quest>, usize)> {
        self.parent.as_ref()
    }

    /// `Inactive → Unknown`. No-op when already active.
    pub fn activate(&mut self) {
        if self.status == QuestStatus::Inactive {
            self.status = QuestStatus::Unknown;
        }
    }

    /// Advance the substate version; the planner will notice the gap to
    /// `last_planned_substate` and re-plan.
    pub fn bump_substate(&mut self) {
        self.current_substate += 1;
    }

    /// Planning is due when the quest is live and the state moved past the
    /// last accepted plan.
    pub fn needs_planning(&self) -> bool {
        self.status.is_active()
            && !self.status.is_terminal()
            && self.current_substate > self.last_planned_substate
    }

    /// Accept or reject a freshly built plan.
    ///
    /// Rejects plans built for a substate older than the last accepted one
    /// (a slow planning pass racing newer state), and any plan at all once
    /// the manager is terminal.
    pub fn set_plan(&mut self, plan: Arc<QuestPlan>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if plan.substate_id < self.last_planned_substate {
            return false;
        }
        self.status = plan.status;
        self.last_planned_substate = plan.substate_id;
        self.last_active_goal = plan.goal_index;
        self.last_plan = Some(plan);
        true
    }

    /// Forced status assignment from an action's status hook (or a loaded
    /// save file). Transitions out of a terminal status are ignored.
    pub fn force_status(&mut self, status: QuestStatus, goal: usize) {
        if self.status.is_terminal() && status != self.status {
            return;
        }
        self.status = status;
        self.last_active_goal = goal;
    }

    /// Record the parent quest and the parent goal this quest serves.
    /// Once set, the link only changes while the quest is still inactive.
    pub fn set_parent(&mut self, parent: Arc<Quest>, parent_goal: usize) {
        if self.parent.is_none() || self.status == QuestStatus::Inactive {
            self.parent = Some((parent, parent_goal));
        }
    }

    pub fn set_option(&mut self, option: QuestOption) {
        match option {
            QuestOption::SearchLimit(v) => self.options.search_limit = v,
            QuestOption::SpaceLimit(v) => self.options.space_limit = v,
            QuestOption::Omega(v) => self.options.omega = v,
            QuestOption::Heuristic(h) => self.options.heuristic = h,
            QuestOption::Strategy(s) => self.options.strategy = s,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::State;

    fn empty_quest() -> Arc<Quest> {
        Arc::new(Quest::new(
            "Main",
            0,
            vec![],
            vec![vec![]],
            vec![],
            vec![],
            vec![],
            false,
        ))
    }

    fn plan_with(quest: &Arc<Quest>, substate: i64, status: QuestStatus) -> Arc<QuestPlan> {
        Arc::new(QuestPlan {
            substate_id: substate,
            given_state: Arc::new(State::new()),
            quest: quest.clone(),
            goal_index: 0,
            status,
            steps: vec![],
        })
    }

    #[test]
    fn test_activation_is_one_way() {
        let mut qm = QuestManager::new(empty_quest());
        assert_eq!(qm.status(), QuestStatus::Inactive);
        qm.activate();
        assert_eq!(qm.status(), QuestStatus::Unknown);
        qm.activate();
        assert_eq!(qm.status(), QuestStatus::Unknown);
    }

    #[test]
    fn test_outdated_plans_are_rejected() {
        let quest = empty_quest();
        let mut qm = QuestManager::new(quest.clone());
        qm.activate();
        assert!(qm.set_plan(plan_with(&quest, 5, QuestStatus::Reachable)));
        assert!(!qm.set_plan(plan_with(&quest, 3, QuestStatus::Unreachable)));
        assert_eq!(qm.status(), QuestStatus::Reachable);
    }

    #[test]
    fn test_terminal_statuses_reject_plans() {
        let quest = empty_quest();
        let mut qm = QuestManager::new(quest.clone());
        qm.activate();
        assert!(qm.set_plan(plan_with(&quest, 1, QuestStatus::Done)));
        assert!(!qm.set_plan(plan_with(&quest, 2, QuestStatus::Reachable)));
        assert_eq!(qm.status(), QuestStatus::Done);
    }

    #[test]
    fn test_force_status_keeps_terminal() {
        let mut qm = QuestManager::new(empty_quest());
        qm.force_status(QuestStatus::Unreachable, 0);
        qm.force_status(QuestStatus::Unknown, 1);
        assert_eq!(qm.status(), QuestStatus::Unreachable);
    }

    #[test]
    fn test_parent_link_sets_once_after_activation() {
        let quest = empty_quest();
        let other = Arc::new(Quest::new(
            "Other",
            1,
            vec![],
            vec![vec![]],
            vec![],
            vec![],
            vec![],
            false,
        ));
        let mut qm = QuestManager::new(quest.clone());
        qm.set_parent(quest.clone(), 0);
        // Still inactive: the link may be overwritten.
        qm.set_parent(other.clone(), 1);
        assert_eq!(qm.parent().unwrap().1, 1);
        qm.activate();
        qm.set_parent(quest, 2);
        assert_eq!(qm.parent().unwrap().1, 1);
    }

    #[test]
    fn test_needs_planning() {
        let quest = empty_quest();
        let mut qm = QuestManager::new(quest.clone());
        assert!(!qm.needs_planning()); // inactive
        qm.activate();
        assert!(qm.needs_planning()); // substate 0 > last planned -1
        assert!(qm.set_plan(plan_with(&quest, 0, QuestStatus::Reachable)));
        assert!(!qm.needs_planning());
        qm.bump_substate();
        assert!(qm.needs_planning());
    }
}
