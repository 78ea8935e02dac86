//! The quest planner: heuristic graph search over action-induced state
//! transitions.
//!
//! For a quest and a snapshot state, the planner walks the quest's goal
//! list from the current active goal upward and returns the first goal's
//! plan whose search does not come back `Unreachable`. Search is A* with a
//! FIFO tie-break among equal f-scores, or plain depth-first when the quest
//! opts into the `Dfs` strategy. Either way the expansion order is fully
//! deterministic, so identical inputs always produce identical plans.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ahash::AHashSet;
use tracing::debug;

use crate::internal::model::{Quest, State, Statement, StatementRef};
use crate::server::message::{Message, MessageSink};

use super::heuristic;
use super::manager::{QuestManager, QuestOptions, QuestStatus, SearchStrategy};
use super::plan::{PlanStep, QuestPlan};

/// A node in the state graph.
struct StateNode {
    state: Arc<State>,
    /// Preceding node on the cheapest known path from the snapshot.
    preceding: Option<Arc<StateNode>>,
    /// The grounded action that produced this state from `preceding`.
    step: Option<PlanStep>,
    /// Path length from the snapshot.
    g: usize,
    /// `g + h`.
    f: usize,
}

/// Heap entry: smallest f first, FIFO among equal f via the monotone
/// insertion sequence number.
struct OpenEntry {
    f: usize,
    seq: u64,
    node: Arc<StateNode>,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.seq == other.seq
    }
}
impl Eq for OpenEntry {}
impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert both keys.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Open set under either strategy.
enum OpenSet {
    AStar(BinaryHeap<OpenEntry>),
    /// Reversed insertion order: most recently pushed pops first.
    Dfs(Vec<Arc<StateNode>>),
}

impl OpenSet {
    fn new(strategy: SearchStrategy) -> Self {
        match strategy {
            SearchStrategy::AStar => OpenSet::AStar(BinaryHeap::new()),
            SearchStrategy::Dfs => OpenSet::Dfs(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            OpenSet::AStar(heap) => heap.len(),
            OpenSet::Dfs(stack) => stack.len(),
        }
    }

    fn push(&mut self, node: Arc<StateNode>, seq: u64) {
        match self {
            OpenSet::AStar(heap) => heap.push(OpenEntry {
                f: node.f,
                seq,
                node,
            }),
            OpenSet::Dfs(stack) => stack.push(node),
        }
    }

    fn pop(&mut self) -> Option<Arc<StateNode>> {
        match self {
            OpenSet::AStar(heap) => heap.pop().map(|e| e.node),
            OpenSet::Dfs(stack) => stack.pop(),
        }
    }
}

/// Planner for a single quest over a single snapshot.
pub struct QuestPlanner {
    substate_id: i64,
    given_state: Arc<State>,
    quest: Arc<Quest>,
    first_goal: usize,
    options: QuestOptions,
    /// Precondition buffers (one per permitted action, definition order)
    /// reused across every substitution of the expansion.
    buffers: Vec<Vec<Statement>>,
    /// A second buffer set for the relaxed heuristic, which enumerates
    /// actions while the expansion's own buffers are in use.
    heuristic_buffers: Vec<Vec<Statement>>,
}

impl QuestPlanner {
    /// `snapshot` must be the quest-filtered duplicate of the world state
    /// whose version is `substate_id`.
    pub fn new(substate_id: i64, snapshot: State, manager: &QuestManager) -> Self {
        let quest = manager.quest().clone();
        let buffers: Vec<Vec<Statement>> = quest
            .actions()
            .iter()
            .map(|a| a.preconditions().materialize_buffer())
            .collect();
        let heuristic_buffers = buffers.clone();
        Self {
            substate_id,
            given_state: Arc::new(snapshot),
            quest,
            first_goal: manager.last_active_goal(),
            options: manager.options().clone(),
            buffers,
            heuristic_buffers,
        }
    }

    pub fn substate_id(&self) -> i64 {
        self.substate_id
    }

    /// Walk goal indices from the active goal upward; the first goal whose
    /// search returns anything but `Unreachable` wins.
    pub fn find_plan(&mut self, world_name: &str, sink: &dyn MessageSink) -> QuestPlan {
        let goal_count = self.quest.goals().len();
        let mut last = self.unreachable_plan(self.first_goal.min(goal_count.saturating_sub(1)));
        for goal_index in self.first_goal..goal_count {
            last = self.find_goal_plan(goal_index, world_name, sink);
            if last.status != QuestStatus::Unreachable {
                break;
            }
        }
        debug!(
            quest = self.quest.name(),
            goal = last.goal_index,
            status = %last.status,
            steps = last.steps.len(),
            "planning finished"
        );
        last
    }

    fn unreachable_plan(&self, goal_index: usize) -> QuestPlan {
        QuestPlan {
            substate_id: self.substate_id,
            given_state: self.given_state.clone(),
            quest: self.quest.clone(),
            goal_index,
            status: QuestStatus::Unreachable,
            steps: vec![],
        }
    }

    fn finished_plan(&self, goal_index: usize, status: QuestStatus, steps: Vec<PlanStep>) -> QuestPlan {
        QuestPlan {
            substate_id: self.substate_id,
            given_state: self.given_state.clone(),
            quest: self.quest.clone(),
            goal_index,
            status,
            steps,
        }
    }

    fn find_goal_plan(
        &mut self,
        goal_index: usize,
        world_name: &str,
        sink: &dyn MessageSink,
    ) -> QuestPlan {
        let goal = self.quest.goals()[goal_index].clone();
        if self.given_state.has_substate(goal.iter().map(|st| &**st)) {
            // The snapshot already satisfies this goal.
            return self.finished_plan(goal_index, QuestStatus::Done, vec![]);
        }

        let search_limit = self.options.search_limit;
        let space_limit = self.options.space_limit;

        let mut open = OpenSet::new(self.options.strategy);
        let mut seq: u64 = 0;
        open.push(
            Arc::new(StateNode {
                state: self.given_state.clone(),
                preceding: None,
                step: None,
                g: 0,
                f: 0,
            }),
            seq,
        );

        // States discovered so far; keyed by XOR hash with full
        // set-equality tie-break, so collisions never prune falsely.
        let mut known: AHashSet<Arc<State>> = AHashSet::new();
        let mut search_step: usize = 0;

        let mut final_node = None;
        loop {
            if open.len() == 0 {
                break;
            }
            search_step += 1;
            let search_limit_hit = search_step > search_limit;
            let space_limit_hit = open.len() > space_limit;
            if search_limit_hit || space_limit_hit {
                if search_limit_hit {
                    sink.push(Message::SearchLimitReached {
                        world: world_name.to_string(),
                        quest: self.quest.name().to_string(),
                        limit: search_limit,
                    });
                }
                if space_limit_hit {
                    sink.push(Message::SpaceLimitReached {
                        world: world_name.to_string(),
                        quest: self.quest.name().to_string(),
                        limit: space_limit,
                    });
                }
                return self.finished_plan(goal_index, QuestStatus::Unknown, vec![]);
            }

            let Some(node) = open.pop() else {
                break;
            };

            if node.state.has_substate(goal.iter().map(|st| &**st)) {
                final_node = Some(node);
                break;
            }

            self.expand(&node, &goal, &mut known, &mut open, &mut seq, space_limit);
        }

        let Some(mut cursor) = final_node else {
            return self.unreachable_plan(goal_index);
        };

        // Reconstruct by walking the predecessor chain backwards.
        let mut steps: Vec<PlanStep> = Vec::with_capacity(cursor.g);
        while let Some(step) = cursor.step.clone() {
            steps.push(step);
            let Some(prev) = cursor.preceding.clone() else {
                break;
            };
            cursor = prev;
        }
        steps.reverse();
        self.finished_plan(goal_index, QuestStatus::Reachable, steps)
    }

    /// Push every applicable successor of `node` that leads to an unseen
    /// state.
    fn expand(
        &mut self,
        node: &Arc<StateNode>,
        goal: &[StatementRef],
        known: &mut AHashSet<Arc<State>>,
        open: &mut OpenSet,
        seq: &mut u64,
        space_limit: usize,
    ) {
        let quest = self.quest.clone();
        let options = self.options.clone();
        let buffers = &mut self.buffers;
        let heuristic_buffers = &mut self.heuristic_buffers;
        let goal_vec: Vec<_> = goal.to_vec();
        quest.for_each_applicable_action(&node.state, buffers, &mut |action, args| {
            if open.len() > space_limit {
                return false; // stop enumerating, the outer loop will halt
            }

            let mut successor = (*node.state).clone();
            action.apply_unchecked(args, &mut successor);
            if known.contains(&successor) {
                return true;
            }
            let successor = Arc::new(successor);

            let h = heuristic::estimate(
                options.heuristic,
                &quest,
                &goal_vec,
                &successor,
                options.omega,
                heuristic_buffers,
            );
            let g = node.g + 1;
            let step = PlanStep {
                action: action.clone(),
                arguments: args.to_vec(),
            };
            let next = Arc::new(StateNode {
                state: successor.clone(),
                preceding: Some(node.clone()),
                step: Some(step),
                g,
                f: g + h,
            });

            known.insert(successor);
            *seq += 1;
            open.push(next, *seq);
            true
        });
    }
}
