//! Actions: the operators that transform world state.
//!
//! An action has typed parameters, preconditions, and remove/add effects.
//! It first removes, then adds. Actions are pure state transformers; all
//! message emission happens in the orchestrator, which keeps them safe to
//! run inside the planner.

use std::sync::Arc;

use crate::errors::{ActionErrorKind, QuestError};

use super::object::ObjectRef;
use super::rlist::RelationList;
use super::state::State;
use super::statement::{Statement, StatementRef};
use super::types::typeset_contains;
use super::Id;

/// Why an action could not be applied, paired with the host-facing kind so
/// the orchestrator can report both.
#[derive(Debug)]
pub struct ActionFailure {
    pub kind: ActionErrorKind,
    pub error: QuestError,
}

/// A named operator: parameters, preconditions, remove list, add list.
///
/// `not_applicable` actions may never be applied by player or planner; they
/// exist solely to mark the hand-off point between a quest's plan and a
/// sub-quest. A *global* action mentions a non-parameter object or a
/// zero-arity relation somewhere in its lists; only local actions may be
/// listed by quests.
#[derive(Debug)]
pub struct Action {
    name: String,
    id: Id,
    not_applicable: bool,
    parameters: Vec<ObjectRef>,
    pre: RelationList,
    rem: RelationList,
    add: RelationList,
    global: bool,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        id: Id,
        not_applicable: bool,
        parameters: Vec<ObjectRef>,
        pre: Vec<StatementRef>,
        rem: Vec<StatementRef>,
        add: Vec<StatementRef>,
    ) -> Self {
        let name = name.into();
        let pre = RelationList::new("_pre", -1, parameters.clone(), pre);
        let rem = RelationList::new("_rem", -1, parameters.clone(), rem);
        let add = RelationList::new("_add", -1, parameters.clone(), add);
        let global = [&pre, &rem, &add]
            .into_iter()
            .any(|list| list.statements().iter().any(|st| st.is_global()));
        Self {
            name,
            id,
            not_applicable,
            parameters,
            pre,
            rem,
            add,
            global,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn is_not_applicable(&self) -> bool {
        self.not_applicable
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn parameters(&self) -> &[ObjectRef] {
        &self.parameters
    }

    pub fn preconditions(&self) -> &RelationList {
        &self.pre
    }

    pub fn rem_list(&self) -> &RelationList {
        &self.rem
    }

    pub fn add_list(&self) -> &RelationList {
        &self.add
    }

    /// Validate an argument vector against this action: arity, per-slot
    /// type inclusion, and (unless skipped) preconditions in `state`.
    pub fn check_applicability(
        &self,
        world_name: &str,
        skip_preconditions: bool,
        arguments: &[ObjectRef],
        state: &State,
    ) -> Result<(), ActionFailure> {
        if arguments.len() != self.parameters.len() {
            return Err(ActionFailure {
                kind: ActionErrorKind::Arity,
                error: QuestError::Arity {
                    name: self.name.clone(),
                    expected: self.parameters.len(),
                    given: arguments.len(),
                },
            });
        }
        for (index, (arg, param)) in arguments.iter().zip(&self.parameters).enumerate() {
            if !typeset_contains(arg.types(), param.types()) {
                return Err(ActionFailure {
                    kind: ActionErrorKind::Type,
                    error: QuestError::ArgumentType {
                        name: self.name.clone(),
                        index,
                        object: arg.name().to_string(),
                        expected: param.name().to_string(),
                    },
                });
            }
        }
        if !skip_preconditions {
            let preconditions = self.pre.substitute(arguments);
            if !state.has_substate(preconditions.iter().map(|st| &**st)) {
                return Err(ActionFailure {
                    kind: ActionErrorKind::Preconditions,
                    error: QuestError::PreconditionsNotMet(
                        world_name.to_string(),
                        self.name.clone(),
                    ),
                });
            }
        }
        Ok(())
    }

    /// Apply to `state` after full validation. On error the state is left
    /// untouched.
    pub fn apply(
        &self,
        world_name: &str,
        arguments: &[ObjectRef],
        state: &mut State,
    ) -> Result<(), ActionFailure> {
        self.check_applicability(world_name, false, arguments, state)?;
        self.apply_unchecked(arguments, state);
        Ok(())
    }

    /// Remove-then-add without any validation. The argument vector must be
    /// fully compatible and the preconditions must already hold; the
    /// planner guarantees both when expanding nodes.
    pub fn apply_unchecked(&self, arguments: &[ObjectRef], state: &mut State) {
        let rem = self.rem.substitute(arguments);
        state.remove(&rem);
        let add = self.add.substitute(arguments);
        state.add(&add);
    }

    /// Hot-path precondition test through a reusable buffer created by
    /// `self.preconditions().materialize_buffer()`.
    pub fn preconditions_hold(
        &self,
        arguments: &[ObjectRef],
        state: &State,
        buffer: &mut [Statement],
    ) -> bool {
        self.pre.substitute_into(buffer, arguments);
        state.has_substate(buffer.iter())
    }
}

/// Shared handle to an immutable action.
pub type ActionRef = Arc<Action>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{
        Arguments, QuestType, Relation, Statement, TypeIdSet, WorldObject,
    };

    struct Fixture {
        pick: Action,
        key: ObjectRef,
        has_key: StatementRef,
    }

    /// `Pick(i: Item): pre ¬Has(i), add Has(i)` modelled with an empty
    /// precondition list (negations are expressed by absence).
    fn fixture() -> Fixture {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item]));
        let param: ObjectRef = Arc::new(WorldObject::new("i", -1, [0].into_iter().collect()));
        let key: ObjectRef = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));

        let add = vec![StatementRef::new(Statement::new(
            has.clone(),
            vec![param.clone()],
        ))];
        let pick = Action::new("Pick", 0, false, vec![param], vec![], vec![], add);
        let has_key = StatementRef::new(Statement::new(has, vec![key.clone()]));
        Fixture { pick, key, has_key }
    }

    #[test]
    fn test_apply_adds_effect() {
        let fx = fixture();
        let mut state = State::new();
        fx.pick
            .apply("w", std::slice::from_ref(&fx.key), &mut state)
            .unwrap();
        assert!(state.contains(&fx.has_key));
    }

    #[test]
    fn test_arity_failure_leaves_state_untouched() {
        let fx = fixture();
        let mut state = State::new();
        let err = fx.pick.apply("w", &[], &mut state).unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::Arity);
        assert!(state.is_empty());
        assert_eq!(state.hash_value(), crate::hash::StateHash::EMPTY);
    }

    #[test]
    fn test_type_failure() {
        let fx = fixture();
        let rock: ObjectRef = Arc::new(WorldObject::new("rock", 1, TypeIdSet::new()));
        let mut state = State::new();
        let err = fx.pick.apply("w", &[rock], &mut state).unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::Type);
    }

    #[test]
    fn test_locality() {
        let fx = fixture();
        // Pick mentions only its own parameter.
        assert!(!fx.pick.is_global());

        // An action whose add list mentions a real object is global.
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item]));
        let add = vec![StatementRef::new(Statement::new(
            has,
            vec![fx.key.clone()],
        ))];
        let grab_key = Action::new("GrabKey", 1, false, vec![], vec![], vec![], add);
        assert!(grab_key.is_global());

        // So is one that mentions a zero-arity relation.
        let night = Arc::new(Relation::new("Night", 1, vec![]));
        let add = vec![StatementRef::new(Statement::new(night, Arguments::new()))];
        let dusk = Action::new("Dusk", 2, false, vec![], vec![], vec![], add);
        assert!(dusk.is_global());
    }

    #[test]
    fn test_preconditions_hold_via_buffer() {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item]));
        let param: ObjectRef = Arc::new(WorldObject::new("i", -1, [0].into_iter().collect()));
        let key: ObjectRef = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));

        let pre = vec![StatementRef::new(Statement::new(
            has.clone(),
            vec![param.clone()],
        ))];
        let drop = Action::new("Drop", 0, false, vec![param], pre, vec![], vec![]);

        let mut buffer = drop.preconditions().materialize_buffer();
        let mut state = State::new();
        assert!(!drop.preconditions_hold(std::slice::from_ref(&key), &state, &mut buffer));

        state.add_one(StatementRef::new(Statement::new(has, vec![key.clone()])));
        assert!(drop.preconditions_hold(std::slice::from_ref(&key), &state, &mut buffer));
    }
}
