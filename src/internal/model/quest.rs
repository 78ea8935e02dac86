//! Quests: goals, permitted actions, relevant objects, and sub-quests.
//!
//! A quest outlines player goals and the means of reaching them. Goals are
//! ordered by priority; the quest manager designates the first reachable
//! one as active. The quest also scopes the planner: only its permitted
//! (local) actions are expanded, only its relevant objects may fill
//! parameter slots, and the planner searches a state filtered down to its
//! relevant relations and objects.

use std::sync::Arc;

use ahash::AHashSet;

use super::Id;
use super::action::ActionRef;
use super::object::ObjectRef;
use super::state::State;
use super::statement::{Statement, StatementRef};
use super::types::typeset_contains;

/// One goal: a statement vector that must become a substate of the world.
pub type Goal = Vec<StatementRef>;

/// An immutable quest definition.
#[derive(Debug)]
pub struct Quest {
    name: String,
    id: Id,
    preconditions: Vec<StatementRef>,
    goals: Vec<Goal>,
    actions: Vec<ActionRef>,
    objects: Vec<ObjectRef>,
    subquests: Vec<Arc<Quest>>,
    /// Accepted for `.quest` format compatibility; candidate enumeration is
    /// precomputed per slot either way.
    use_action_tree: bool,

    /// `[action_index][slot_index]` = relevant objects whose type set
    /// satisfies that slot. An entry is the empty vector when some slot of
    /// the action has no candidates at all (the action can never fire).
    slot_candidates: Vec<Vec<Vec<ObjectRef>>>,
    relevant_actions: AHashSet<Id>,
    relevant_objects: AHashSet<Id>,
    relevant_relations: AHashSet<Id>,
}

impl Quest {
    pub fn new(
        name: impl Into<String>,
        id: Id,
        preconditions: Vec<StatementRef>,
        goals: Vec<Goal>,
        actions: Vec<ActionRef>,
        objects: Vec<ObjectRef>,
        subquests: Vec<Arc<Quest>>,
        use_action_tree: bool,
    ) -> Self {
        let slot_candidates = build_slot_candidates(&actions, &objects);
        let relevant_actions = actions.iter().map(|a| a.id()).collect();
        let relevant_objects = objects.iter().map(|o| o.id()).collect();
        let relevant_relations = build_relevant_relations(&actions, &preconditions, &goals);
        Self {
            name: name.into(),
            id,
            preconditions,
            goals,
            actions,
            objects,
            subquests,
            use_action_tree,
            slot_candidates,
            relevant_actions,
            relevant_objects,
            relevant_relations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn preconditions(&self) -> &[StatementRef] {
        &self.preconditions
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn actions(&self) -> &[ActionRef] {
        &self.actions
    }

    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }

    pub fn subquests(&self) -> &[Arc<Quest>] {
        &self.subquests
    }

    pub fn uses_action_tree(&self) -> bool {
        self.use_action_tree
    }

    pub fn action_by_id(&self, id: Id) -> Option<&ActionRef> {
        self.actions.iter().find(|a| a.id() == id)
    }

    pub fn is_action_relevant(&self, id: Id) -> bool {
        self.relevant_actions.contains(&id)
    }

    pub fn is_object_relevant(&self, id: Id) -> bool {
        self.relevant_objects.contains(&id)
    }

    pub fn is_relation_relevant(&self, id: Id) -> bool {
        self.relevant_relations.contains(&id)
    }

    /// Enumerate every applicable grounded action in `state`, calling
    /// `visit(action, arguments)` for each. Returning `false` from the
    /// callback halts the enumeration.
    ///
    /// Determinism contract: the outer loop walks the permitted action list
    /// in definition order, the inner loops walk each slot's candidates in
    /// the quest object list order, and within one substitution no two
    /// slots bind the same object.
    ///
    /// `buffers` holds one precondition buffer per action, created from
    /// `action.preconditions().materialize_buffer()` in action-list order.
    pub fn for_each_applicable_action(
        &self,
        state: &State,
        buffers: &mut [Vec<Statement>],
        visit: &mut dyn FnMut(&ActionRef, &[ObjectRef]) -> bool,
    ) {
        debug_assert_eq!(buffers.len(), self.actions.len());
        let mut chosen: Vec<ObjectRef> = Vec::new();
        let mut used: AHashSet<Id> = AHashSet::new();
        for (index, action) in self.actions.iter().enumerate() {
            if self.slot_candidates[index].is_empty() && !action.parameters().is_empty() {
                continue; // some slot has no candidates at all
            }
            chosen.clear();
            used.clear();
            if !self.bind_next_slot(state, buffers, index, &mut chosen, &mut used, visit) {
                break;
            }
        }
    }

    fn bind_next_slot(
        &self,
        state: &State,
        buffers: &mut [Vec<Statement>],
        action_index: usize,
        chosen: &mut Vec<ObjectRef>,
        used: &mut AHashSet<Id>,
        visit: &mut dyn FnMut(&ActionRef, &[ObjectRef]) -> bool,
    ) -> bool {
        let slots = &self.slot_candidates[action_index];
        if chosen.len() == slots.len() {
            // Types are satisfied by construction; preconditions remain.
            let action = &self.actions[action_index];
            if action.preconditions_hold(chosen, state, &mut buffers[action_index]) {
                return visit(action, chosen);
            }
            return true;
        }
        let slot = chosen.len();
        for candidate_index in 0..slots[slot].len() {
            let obj = self.slot_candidates[action_index][slot][candidate_index].clone();
            if used.contains(&obj.id()) {
                continue;
            }
            used.insert(obj.id());
            chosen.push(obj.clone());
            let keep_going =
                self.bind_next_slot(state, buffers, action_index, chosen, used, visit);
            chosen.pop();
            used.remove(&obj.id());
            if !keep_going {
                return false;
            }
        }
        true
    }
}

fn build_slot_candidates(
    actions: &[ActionRef],
    objects: &[ObjectRef],
) -> Vec<Vec<Vec<ObjectRef>>> {
    let mut result = Vec::with_capacity(actions.len());
    for action in actions {
        let mut slots: Vec<Vec<ObjectRef>> = Vec::with_capacity(action.parameters().len());
        let mut viable = true;
        for param in action.parameters() {
            let candidates: Vec<ObjectRef> = objects
                .iter()
                .filter(|obj| typeset_contains(obj.types(), param.types()))
                .cloned()
                .collect();
            if candidates.is_empty() {
                viable = false;
                break;
            }
            slots.push(candidates);
        }
        result.push(if viable { slots } else { Vec::new() });
    }
    result
}

fn build_relevant_relations(
    actions: &[ActionRef],
    preconditions: &[StatementRef],
    goals: &[Goal],
) -> AHashSet<Id> {
    let mut out = AHashSet::new();
    for action in actions {
        for list in [action.preconditions(), action.rem_list(), action.add_list()] {
            for st in list.statements() {
                out.insert(st.relation().id());
            }
        }
    }
    for st in preconditions {
        out.insert(st.relation().id());
    }
    for goal in goals {
        for st in goal {
            out.insert(st.relation().id());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{Action, QuestType, Relation, TypeIdSet, WorldObject};

    struct Fixture {
        quest: Quest,
        key: ObjectRef,
        door: ObjectRef,
    }

    /// Two Item objects, one `Swap(a: Item, b: Item)` action requiring
    /// nothing, so every ordered pair of distinct objects is applicable.
    fn fixture() -> Fixture {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item]));

        let a: ObjectRef = Arc::new(WorldObject::new("a", -1, [0].into_iter().collect()));
        let b: ObjectRef = Arc::new(WorldObject::new("b", -2, [0].into_iter().collect()));
        let swap = Arc::new(Action::new(
            "Swap",
            0,
            false,
            vec![a.clone(), b.clone()],
            vec![],
            vec![],
            vec![],
        ));

        let key: ObjectRef = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));
        let door: ObjectRef = Arc::new(WorldObject::new("door", 1, [0].into_iter().collect()));

        let goal = vec![StatementRef::new(Statement::new(has, vec![key.clone()]))];
        let quest = Quest::new(
            "Main",
            0,
            vec![],
            vec![goal],
            vec![swap],
            vec![key.clone(), door.clone()],
            vec![],
            false,
        );
        Fixture { quest, key, door }
    }

    fn buffers(quest: &Quest) -> Vec<Vec<Statement>> {
        quest
            .actions()
            .iter()
            .map(|a| a.preconditions().materialize_buffer())
            .collect()
    }

    #[test]
    fn test_distinct_binding_enumeration() {
        let fx = fixture();
        let state = State::new();
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut bufs = buffers(&fx.quest);
        fx.quest
            .for_each_applicable_action(&state, &mut bufs, &mut |_, args| {
                seen.push((args[0].name().to_string(), args[1].name().to_string()));
                true
            });
        // No slot binds the same object twice, and order is deterministic:
        // outer slot candidates in quest-object order.
        assert_eq!(
            seen,
            vec![
                ("key".to_string(), "door".to_string()),
                ("door".to_string(), "key".to_string()),
            ]
        );
    }

    #[test]
    fn test_enumeration_halts_on_false() {
        let fx = fixture();
        let state = State::new();
        let mut count = 0;
        let mut bufs = buffers(&fx.quest);
        fx.quest
            .for_each_applicable_action(&state, &mut bufs, &mut |_, _| {
                count += 1;
                false
            });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_relevance_sets() {
        let fx = fixture();
        assert!(fx.quest.is_object_relevant(fx.key.id()));
        assert!(fx.quest.is_object_relevant(fx.door.id()));
        assert!(!fx.quest.is_object_relevant(99));
        assert!(fx.quest.is_relation_relevant(0)); // Has, via the goal
        assert!(fx.quest.is_action_relevant(0));
    }
}
