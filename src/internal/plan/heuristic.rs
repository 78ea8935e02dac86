//! Search heuristics.
//!
//! Both heuristics return 0 when the goal already holds, never go
//! negative, and agree on the holds/not-holds boundary.

use ahash::AHashMap;

use crate::internal::model::{Goal, Quest, State, Statement, StatementRef};

use super::manager::QuestHeuristic;

/// Upper bound on relaxed layers; search spaces here are small and plans
/// past this depth gain nothing from a tighter estimate.
const MAX_RELAXED_LAYERS: usize = 64;

/// `h = Σ (arity + omega)` over goal statements not present in `state`.
pub fn simple(goal: &Goal, state: &State, omega: usize) -> usize {
    goal.iter()
        .filter(|st| !state.contains(st))
        .map(|st| st.arguments().len() + omega)
        .sum()
}

/// Additive ignore-delete relaxation.
///
/// Grows a relaxed state layer by layer: each layer unions the add-effects
/// of every permitted action applicable in the relaxed state so far.
/// `h = Σ` over goal statements of the first layer containing the
/// statement; statements never reached at the fixpoint fall back to
/// `max(1, arity + omega)`, which keeps the estimate non-zero exactly when
/// the goal does not hold.
///
/// `buffers` must be a precondition buffer set for `quest` (one per
/// action), separate from the one driving the main expansion.
pub fn relaxed_additive(
    quest: &Quest,
    goal: &Goal,
    state: &State,
    omega: usize,
    buffers: &mut [Vec<Statement>],
) -> usize {
    if state.has_substate(goal.iter().map(|st| &**st)) {
        return 0;
    }

    let mut relaxed = state.clone();
    let mut first_layer: AHashMap<StatementRef, usize> = AHashMap::new();
    for layer in 1..=MAX_RELAXED_LAYERS {
        if goal.iter().all(|st| relaxed.contains(st)) {
            break;
        }
        let mut additions: Vec<StatementRef> = Vec::new();
        quest.for_each_applicable_action(&relaxed, buffers, &mut |action, args| {
            for st in action.add_list().substitute(args) {
                if !relaxed.contains(&st) {
                    additions.push(st);
                }
            }
            true
        });
        if additions.is_empty() {
            break; // fixpoint
        }
        for st in additions {
            if !relaxed.contains(&st) {
                first_layer.entry(st.clone()).or_insert(layer);
                relaxed.add_one(st);
            }
        }
    }

    goal.iter()
        .map(|st| {
            if state.contains(st) {
                0
            } else {
                match first_layer.get(st) {
                    Some(layer) => *layer,
                    None => (st.arguments().len() + omega).max(1),
                }
            }
        })
        .sum()
}

/// Dispatch on the quest's configured heuristic.
pub fn estimate(
    which: QuestHeuristic,
    quest: &Quest,
    goal: &Goal,
    state: &State,
    omega: usize,
    buffers: &mut [Vec<Statement>],
) -> usize {
    match which {
        QuestHeuristic::Simple => simple(goal, state, omega),
        QuestHeuristic::Hsp => relaxed_additive(quest, goal, state, omega, buffers),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{
        Action, ObjectRef, QuestType, Relation, StatementRef, TypeIdSet, WorldObject,
    };

    struct Fixture {
        quest: Quest,
        goal: Goal,
        has_key: StatementRef,
    }

    /// `Pick(i: Item)` adds `Has(i)`; goal is `Has(key)`.
    fn fixture() -> Fixture {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item]));
        let param: ObjectRef = Arc::new(WorldObject::new("i", -1, [0].into_iter().collect()));
        let key: ObjectRef = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));

        let add = vec![StatementRef::new(Statement::new(
            has.clone(),
            vec![param.clone()],
        ))];
        let pick = Arc::new(Action::new("Pick", 0, false, vec![param], vec![], vec![], add));

        let has_key = StatementRef::new(Statement::new(has, vec![key.clone()]));
        let goal = vec![has_key.clone()];
        let quest = Quest::new(
            "Main",
            0,
            vec![],
            vec![goal.clone()],
            vec![pick],
            vec![key],
            vec![],
            false,
        );
        Fixture {
            quest,
            goal,
            has_key,
        }
    }

    fn buffers(quest: &Quest) -> Vec<Vec<Statement>> {
        quest
            .actions()
            .iter()
            .map(|a| a.preconditions().materialize_buffer())
            .collect()
    }

    #[test]
    fn test_simple_counts_unmet_statements() {
        let fx = fixture();
        let empty = State::new();
        assert_eq!(simple(&fx.goal, &empty, 0), 1); // arity 1 + omega 0
        assert_eq!(simple(&fx.goal, &empty, 3), 4);

        let mut done = State::new();
        done.add_one(fx.has_key.clone());
        assert_eq!(simple(&fx.goal, &done, 3), 0);
    }

    #[test]
    fn test_relaxed_zero_iff_goal_holds() {
        let fx = fixture();
        let mut bufs = buffers(&fx.quest);

        let empty = State::new();
        assert!(relaxed_additive(&fx.quest, &fx.goal, &empty, 0, &mut bufs) > 0);

        let mut done = State::new();
        done.add_one(fx.has_key.clone());
        assert_eq!(relaxed_additive(&fx.quest, &fx.goal, &done, 0, &mut bufs), 0);
    }

    #[test]
    fn test_relaxed_one_layer_goal() {
        let fx = fixture();
        let mut bufs = buffers(&fx.quest);
        let empty = State::new();
        // Has(key) appears in the first relaxed layer via Pick.
        assert_eq!(relaxed_additive(&fx.quest, &fx.goal, &empty, 0, &mut bufs), 1);
    }
}
