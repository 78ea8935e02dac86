//! The world orchestrator.
//!
//! A world is the complete named model: definitions (types, objects,
//! relations, relation lists, actions, action groups, quests), the current
//! state, and one quest manager per quest. Definitions are write-once; the
//! state changes only through [`World::apply_action`]. The orchestrator,
//! not the actions, emits every message, which keeps actions pure and
//! reusable inside the planner.

pub mod save;

use std::sync::Arc;

use ahash::AHashMap;
use tracing::{debug, info};

use crate::errors::{ActionErrorKind, QuestError};
use crate::internal::model::{
    Action, ActionFailure, ActionRef, Arguments, Goal, ObjectRef, Quest, QuestType, Relation,
    RelationList, State, Statement, StatementRef, TypeIdSet, typeset_contains,
};
use crate::internal::model::relation::RelationRef;
use crate::internal::model::types::TypeRef;
use crate::internal::plan::{
    QuestManager, QuestOption, QuestPlan, QuestPlanner, QuestStatus,
};
use crate::server::message::{Message, MessageSink};

/// Addresses one quest manager inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestSlot {
    Main(usize),
    Sub(usize),
}

/// A forced quest-status command attached to an action, executed after the
/// action applies.
#[derive(Debug, Clone)]
struct StatusHook {
    quest: QuestSlot,
    status: QuestStatus,
    goal: usize,
    /// `(parent manager, parent goal index)` for sub-quest hooks.
    parent: Option<(QuestSlot, usize)>,
}

/// A complete named quest world.
#[derive(Debug)]
pub struct World {
    server_name: String,
    world_name: String,
    /// Combined `server:world`, used in error payloads.
    server_world_name: String,

    state: State,
    /// Incremented by every successful action application.
    state_version: u64,

    types: Vec<TypeRef>,
    objects: Vec<ObjectRef>,
    relations: Vec<RelationRef>,
    relation_lists: Vec<Arc<RelationList>>,
    actions: Vec<ActionRef>,
    action_groups: AHashMap<String, Vec<ActionRef>>,
    main_quests: Vec<QuestManager>,
    sub_quests: Vec<QuestManager>,

    type_ids: AHashMap<String, usize>,
    object_ids: AHashMap<String, usize>,
    relation_ids: AHashMap<String, usize>,
    relation_list_ids: AHashMap<String, usize>,
    action_ids: AHashMap<String, usize>,
    main_quest_ids: AHashMap<String, usize>,
    sub_quest_ids: AHashMap<String, usize>,

    /// Status hooks per action id, in declaration order.
    status_hooks: AHashMap<i32, Vec<StatusHook>>,
}

impl World {
    pub fn new(server_name: impl Into<String>, world_name: impl Into<String>) -> Self {
        let server_name = server_name.into();
        let world_name = world_name.into();
        let server_world_name = format!("{server_name}:{world_name}");
        Self {
            server_name,
            world_name,
            server_world_name,
            state: State::new(),
            state_version: 0,
            types: Vec::new(),
            objects: Vec::new(),
            relations: Vec::new(),
            relation_lists: Vec::new(),
            actions: Vec::new(),
            action_groups: AHashMap::new(),
            main_quests: Vec::new(),
            sub_quests: Vec::new(),
            type_ids: AHashMap::new(),
            object_ids: AHashMap::new(),
            relation_ids: AHashMap::new(),
            relation_list_ids: AHashMap::new(),
            action_ids: AHashMap::new(),
            main_quest_ids: AHashMap::new(),
            sub_quest_ids: AHashMap::new(),
            status_hooks: AHashMap::new(),
        }
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn server_world_name(&self) -> &str {
        &self.server_world_name
    }

    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    fn fail<T>(
        &self,
        make: impl FnOnce(String, String) -> QuestError,
        name: &str,
    ) -> Result<T, QuestError> {
        Err(make(self.server_world_name.clone(), name.to_string()))
    }

    /// Define a new type with previously defined supertypes.
    pub fn add_type(&mut self, name: &str, supertypes: &[String]) -> Result<(), QuestError> {
        if self.has_type(name) {
            return self.fail(QuestError::TypeAlreadyExists, name);
        }
        let mut closure = TypeIdSet::new();
        self.collect_type_closure(supertypes, &mut closure)?;
        let id = self.types.len();
        self.type_ids.insert(name.to_string(), id);
        self.types
            .push(Arc::new(QuestType::new(name, id as i32, closure)));
        Ok(())
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.type_ids.contains_key(name)
    }

    fn get_type(&self, name: &str) -> Option<&TypeRef> {
        self.type_ids.get(name).map(|&i| &self.types[i])
    }

    /// The "full type" of a list of type names: every type in the list plus
    /// all their transitive supertypes.
    fn collect_type_closure(
        &self,
        names: &[String],
        out: &mut TypeIdSet,
    ) -> Result<(), QuestError> {
        for name in names {
            let Some(ty) = self.get_type(name) else {
                return self.fail(QuestError::UndefinedType, name);
            };
            out.insert(ty.id());
            out.extend(ty.supertypes().iter().copied());
        }
        Ok(())
    }

    fn resolve_types(&self, names: &[String]) -> Result<Vec<TypeRef>, QuestError> {
        names
            .iter()
            .map(|name| {
                self.get_type(name)
                    .cloned()
                    .ok_or_else(|| {
                        QuestError::UndefinedType(self.server_world_name.clone(), name.clone())
                    })
            })
            .collect()
    }

    /// Define a new object with previously defined types.
    pub fn add_object(&mut self, name: &str, types: &[String]) -> Result<(), QuestError> {
        if self.has_object(name) {
            return self.fail(QuestError::ObjectAlreadyExists, name);
        }
        let mut closure = TypeIdSet::new();
        self.collect_type_closure(types, &mut closure)
            .map_err(|e| e.context(format!("while defining object `{name}`")))?;
        let id = self.objects.len();
        self.object_ids.insert(name.to_string(), id);
        self.objects
            .push(Arc::new(crate::internal::model::WorldObject::new(
                name, id as i32, closure,
            )));
        Ok(())
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.object_ids.contains_key(name)
    }

    fn get_object(&self, name: &str) -> Option<&ObjectRef> {
        self.object_ids.get(name).map(|&i| &self.objects[i])
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name().to_string()).collect()
    }

    /// Names of every type the object can be treated as; empty when the
    /// object is undefined.
    pub fn object_types(&self, name: &str) -> Vec<String> {
        let Some(obj) = self.get_object(name) else {
            return vec![];
        };
        self.types
            .iter()
            .filter(|ty| obj.types().contains(&ty.id()))
            .map(|ty| ty.name().to_string())
            .collect()
    }

    /// Build the ephemeral parameter objects of an action or relation list:
    /// the i-th entry (1-based) gets id `-i`. Each entry is
    /// `[name, TypeName, TypeName, ...]`. A parameter may not shadow a
    /// defined object name.
    fn construct_parameters(&self, entries: &[Vec<String>]) -> Result<Vec<ObjectRef>, QuestError> {
        let mut out = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let name = &entry[0];
            if self.has_object(name) {
                return self.fail(QuestError::ObjectAlreadyExists, name);
            }
            let mut closure = TypeIdSet::new();
            self.collect_type_closure(&entry[1..], &mut closure)?;
            out.push(ObjectRef::new(crate::internal::model::WorldObject::new(
                name.clone(),
                -(i as i32) - 1,
                closure,
            )));
        }
        Ok(out)
    }

    /// Define a new relation; argument order is preserved and arity zero is
    /// allowed.
    pub fn add_relation(&mut self, name: &str, arg_types: &[String]) -> Result<(), QuestError> {
        if self.has_relation(name) {
            return self.fail(QuestError::RelationAlreadyExists, name);
        }
        let types = self
            .resolve_types(arg_types)
            .map_err(|e| e.context(format!("while defining relation `{name}`")))?;
        let id = self.relations.len();
        self.relation_ids.insert(name.to_string(), id);
        self.relations
            .push(Arc::new(Relation::new(name, id as i32, types)));
        Ok(())
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relation_ids.contains_key(name)
    }

    fn get_relation(&self, name: &str) -> Option<&RelationRef> {
        self.relation_ids.get(name).map(|&i| &self.relations[i])
    }

    /// Resolve `[Name, arg, arg, ...]` entries into statements. `Name` may
    /// be a relation or a previously defined relation list (expanded
    /// recursively at construction). Arguments resolve against `locals`
    /// first (action/rlist parameters), then world objects.
    fn construct_statements(
        &self,
        entries: &[Vec<String>],
        locals: &[ObjectRef],
        out: &mut Vec<StatementRef>,
    ) -> Result<(), QuestError> {
        for (index, entry) in entries.iter().enumerate() {
            let name = &entry[0];
            let is_relation = self.has_relation(name);
            let is_rlist = self.has_relation_list(name);
            if !is_relation && !is_rlist {
                return self.fail(QuestError::UndefinedRelation, name);
            }

            let mut args: Arguments = Arguments::new();
            for arg_name in &entry[1..] {
                let obj = locals
                    .iter()
                    .find(|o| o.name() == arg_name)
                    .cloned()
                    .or_else(|| self.get_object(arg_name).cloned());
                let Some(obj) = obj else {
                    return Err(QuestError::UndefinedObject(
                        self.server_world_name.clone(),
                        arg_name.clone(),
                    )
                    .context(format!(
                        "in `{name}(...)` ({} statement of the list)",
                        index + 1
                    )));
                };
                args.push(obj);
            }

            if is_relation {
                let relation = self.get_relation(name).cloned().expect("checked above");
                relation.check_arguments(&args)?;
                out.push(StatementRef::new(Statement::new(relation, args)));
            } else {
                let rlist = self
                    .relation_list_ids
                    .get(name)
                    .map(|&i| self.relation_lists[i].clone())
                    .expect("checked above");
                rlist.check_arguments(&args)?;
                out.extend(rlist.substitute(&args));
            }
        }
        Ok(())
    }

    /// Define a new relation list. Statement entries may reference earlier
    /// relation lists; those expand immediately, so the stored list only
    /// mentions plain relations.
    pub fn add_relation_list(
        &mut self,
        name: &str,
        parameters: &[Vec<String>],
        statements: &[Vec<String>],
    ) -> Result<(), QuestError> {
        if self.has_relation_list(name) {
            return self.fail(QuestError::RelationListAlreadyExists, name);
        }
        let params = self
            .construct_parameters(parameters)
            .map_err(|e| e.context(format!("while defining relation list `{name}`")))?;
        let mut stmts = Vec::new();
        self.construct_statements(statements, &params, &mut stmts)
            .map_err(|e| e.context(format!("while defining relation list `{name}`")))?;
        let id = self.relation_lists.len();
        self.relation_list_ids.insert(name.to_string(), id);
        self.relation_lists
            .push(Arc::new(RelationList::new(name, id as i32, params, stmts)));
        Ok(())
    }

    pub fn has_relation_list(&self, name: &str) -> bool {
        self.relation_list_ids.contains_key(name)
    }

    /// Declare a named, initially empty bag of actions.
    pub fn add_action_group(&mut self, name: &str) -> Result<(), QuestError> {
        if self.has_action_group(name) {
            return self.fail(QuestError::ActionGroupAlreadyExists, name);
        }
        self.action_groups.insert(name.to_string(), Vec::new());
        Ok(())
    }

    pub fn has_action_group(&self, name: &str) -> bool {
        self.action_groups.contains_key(name)
    }

    /// Define a new action. `pre`/`rem`/`add` entries expand exactly like
    /// relation-list statements.
    #[allow(clippy::too_many_arguments)]
    pub fn add_action(
        &mut self,
        name: &str,
        groups: &[String],
        not_applicable: bool,
        parameters: &[Vec<String>],
        pre: &[Vec<String>],
        rem: &[Vec<String>],
        add: &[Vec<String>],
    ) -> Result<(), QuestError> {
        if self.has_action(name) {
            return self.fail(QuestError::ActionAlreadyExists, name);
        }
        for group in groups {
            if !self.has_action_group(group) {
                return self
                    .fail::<()>(QuestError::UndefinedActionGroup, group)
                    .map_err(|e| e.context(format!("while defining action `{name}`")));
            }
        }
        let params = self
            .construct_parameters(parameters)
            .map_err(|e| e.context(format!("while defining action `{name}`")))?;

        let mut lists: [Vec<StatementRef>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (entries, (out, what)) in [pre, rem, add]
            .into_iter()
            .zip(lists.iter_mut().zip(["pre", "rem", "add"]))
        {
            self.construct_statements(entries, &params, out)
                .map_err(|e| e.context(format!("in the `{what}` list of action `{name}`")))?;
        }
        let [pre, rem, add] = lists;

        let id = self.actions.len();
        self.action_ids.insert(name.to_string(), id);
        let action = Arc::new(Action::new(
            name,
            id as i32,
            not_applicable,
            params,
            pre,
            rem,
            add,
        ));
        for group in groups {
            self.action_groups
                .get_mut(group)
                .expect("checked above")
                .push(action.clone());
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.action_ids.contains_key(name)
    }

    fn get_action(&self, name: &str) -> Option<&ActionRef> {
        self.action_ids.get(name).map(|&i| &self.actions[i])
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    /// `true` also for undefined actions, which cannot be applied either.
    pub fn is_action_not_applicable(&self, name: &str) -> bool {
        self.get_action(name).is_none_or(|a| a.is_not_applicable())
    }

    /// Parameter signature of an action as `[name, type, type, ...]` rows;
    /// empty when the action is undefined.
    pub fn action_parameters(&self, name: &str) -> Vec<Vec<String>> {
        let Some(action) = self.get_action(name) else {
            return vec![];
        };
        action
            .parameters()
            .iter()
            .map(|p| {
                let mut row = vec![p.name().to_string()];
                row.extend(
                    self.types
                        .iter()
                        .filter(|ty| p.types().contains(&ty.id()))
                        .map(|ty| ty.name().to_string()),
                );
                row
            })
            .collect()
    }

    /// Attach a forced status command to an action. Validates every name
    /// and both goal indices at definition time.
    pub fn add_status_hook(
        &mut self,
        action_name: &str,
        quest_name: &str,
        status: QuestStatus,
        goal: usize,
        parent: Option<(&str, usize)>,
    ) -> Result<(), QuestError> {
        if !self.has_action(action_name) {
            return self.fail(QuestError::UndefinedAction, action_name);
        }
        let Some(slot) = self.quest_slot(quest_name) else {
            return self.fail(QuestError::UndefinedQuest, quest_name);
        };
        let parent_slot = match parent {
            None => None,
            Some((parent_name, parent_goal)) => {
                let Some(parent_slot) = self.quest_slot(parent_name) else {
                    return self.fail(QuestError::UndefinedQuest, parent_name);
                };
                if !matches!(slot, QuestSlot::Sub(_)) {
                    return self.fail(QuestError::UndefinedSubQuest, quest_name);
                }
                let parent_goals = self.manager(parent_slot).quest().goals().len();
                if parent_goal >= parent_goals {
                    return Err(QuestError::StatusHookGoal {
                        world: self.server_world_name.clone(),
                        action: action_name.to_string(),
                        quest: parent_name.to_string(),
                        goal: parent_goal,
                    });
                }
                Some((parent_slot, parent_goal))
            }
        };
        if goal >= self.manager(slot).quest().goals().len() {
            return Err(QuestError::StatusHookGoal {
                world: self.server_world_name.clone(),
                action: action_name.to_string(),
                quest: quest_name.to_string(),
                goal,
            });
        }
        let action_id = self.get_action(action_name).expect("checked above").id();
        self.status_hooks
            .entry(action_id)
            .or_default()
            .push(StatusHook {
                quest: slot,
                status,
                goal,
                parent: parent_slot,
            });
        Ok(())
    }

    /// Apply an action by name to the world state. On any failure the
    /// state, the version counter and every quest manager are unchanged and
    /// nothing is emitted.
    pub fn apply_action(
        &mut self,
        action_name: &str,
        argument_names: &[String],
        sink: &dyn MessageSink,
    ) -> Result<(), ActionFailure> {
        let Some(action) = self.get_action(action_name).cloned() else {
            return Err(ActionFailure {
                kind: ActionErrorKind::UndefinedAction,
                error: QuestError::UndefinedAction(
                    self.server_world_name.clone(),
                    action_name.to_string(),
                ),
            });
        };
        if action.is_not_applicable() {
            return Err(ActionFailure {
                kind: ActionErrorKind::NotApplicable,
                error: QuestError::NotApplicableAction(
                    self.server_world_name.clone(),
                    action_name.to_string(),
                ),
            });
        }
        let mut arguments: Vec<ObjectRef> = Vec::with_capacity(argument_names.len());
        for name in argument_names {
            let Some(obj) = self.get_object(name).cloned() else {
                return Err(ActionFailure {
                    kind: ActionErrorKind::UndefinedObject,
                    error: QuestError::UndefinedObject(
                        self.server_world_name.clone(),
                        name.clone(),
                    ),
                });
            };
            arguments.push(obj);
        }

        action.apply(&self.server_world_name, &arguments, &mut self.state)?;
        self.state_version += 1;
        debug!(
            world = %self.world_name,
            action = action_name,
            version = self.state_version,
            "action applied"
        );

        self.run_status_hooks(&action, sink);
        self.bump_relevant_substates(&action, &arguments, sink);
        self.activate_ready_main_quests(sink);
        Ok(())
    }

    /// Validate an action call without applying it.
    pub fn check_action(
        &self,
        skip_preconditions: bool,
        action_name: &str,
        argument_names: &[String],
    ) -> Result<(), QuestError> {
        let Some(action) = self.get_action(action_name) else {
            return self.fail(QuestError::UndefinedAction, action_name);
        };
        let mut arguments: Vec<ObjectRef> = Vec::with_capacity(argument_names.len());
        for name in argument_names {
            let Some(obj) = self.get_object(name).cloned() else {
                return self.fail(QuestError::UndefinedObject, name);
            };
            arguments.push(obj);
        }
        action
            .check_applicability(
                &self.server_world_name,
                skip_preconditions,
                &arguments,
                &self.state,
            )
            .map_err(|f| f.error)
    }

    /// Execute the forced status commands of a just-applied action, in
    /// declaration order, with the activation/status/goal message protocol.
    fn run_status_hooks(&mut self, action: &Action, sink: &dyn MessageSink) {
        let Some(hooks) = self.status_hooks.get(&action.id()).cloned() else {
            return;
        };
        for hook in hooks {
            let previous = self.manager(hook.quest).status();
            let activating = previous == QuestStatus::Inactive && hook.status != QuestStatus::Inactive;

            // Activation announcements always precede the status message.
            if let Some((parent_slot, parent_goal)) = hook.parent {
                if activating {
                    let parent_quest = self.manager(parent_slot).quest().clone();
                    let quest_name = {
                        let manager = self.manager_mut(hook.quest);
                        manager.set_parent(parent_quest.clone(), parent_goal);
                        manager.quest().name().to_string()
                    };
                    sink.push(Message::NewSubQuest {
                        world: self.world_name.clone(),
                        quest: quest_name,
                        parent: parent_quest.name().to_string(),
                        goal: parent_goal,
                    });
                }
            } else if activating {
                sink.push(Message::NewMainQuest {
                    world: self.world_name.clone(),
                    quest: self.manager(hook.quest).quest().name().to_string(),
                });
            }

            let (quest_name, old_goal) = {
                let manager = self.manager_mut(hook.quest);
                manager.bump_substate();
                let old_goal = manager.last_active_goal();
                manager.force_status(hook.status, hook.goal);
                (manager.quest().name().to_string(), old_goal)
            };

            let stayed_inactive =
                previous == QuestStatus::Inactive && hook.status == QuestStatus::Inactive;
            if !stayed_inactive {
                sink.push(Message::NewQuestStatus {
                    world: self.world_name.clone(),
                    quest: quest_name.clone(),
                    status: hook.status,
                });
            }
            // A goal message accompanies a changed goal index, or a fresh
            // activation that lands directly on a decided goal.
            let fresh_decided = previous == QuestStatus::Inactive
                && hook.status != QuestStatus::Inactive
                && hook.status != QuestStatus::Unknown;
            if old_goal != hook.goal || fresh_decided {
                sink.push(Message::NewQuestGoal {
                    world: self.world_name.clone(),
                    quest: quest_name,
                    goal: hook.goal,
                    old_goal,
                });
            }
        }
    }

    /// Advance the substate version of every live quest the action may
    /// have touched: all of them for a global action, otherwise the quests
    /// holding any argument object as relevant.
    fn bump_relevant_substates(
        &mut self,
        action: &Action,
        arguments: &[ObjectRef],
        sink: &dyn MessageSink,
    ) {
        let world = self.world_name.clone();
        for slot in self.all_slots() {
            let manager = self.manager_mut(slot);
            let status = manager.status();
            if !status.is_active() || status.is_terminal() {
                continue;
            }
            let relevant = action.is_global()
                || arguments
                    .iter()
                    .any(|obj| manager.quest().is_object_relevant(obj.id()));
            if relevant {
                manager.bump_substate();
                let quest = manager.quest().name().to_string();
                sink.push(Message::NewQuestState {
                    world: world.clone(),
                    quest,
                });
            }
        }
    }

    /// Activate every inactive main quest whose preconditions now hold.
    fn activate_ready_main_quests(&mut self, sink: &dyn MessageSink) {
        let world = self.world_name.clone();
        for index in 0..self.main_quests.len() {
            let manager = &self.main_quests[index];
            if manager.status() != QuestStatus::Inactive {
                continue;
            }
            let preconditions = manager.quest().preconditions().to_vec();
            if self
                .state
                .has_substate(preconditions.iter().map(|st| &**st))
            {
                let manager = &mut self.main_quests[index];
                manager.activate();
                sink.push(Message::NewMainQuest {
                    world: world.clone(),
                    quest: manager.quest().name().to_string(),
                });
            }
        }
    }

    /// Define a new quest.
    ///
    /// Action entries may name actions or action groups (expanded and
    /// deduplicated in order); object entries may name objects or types
    /// (every object of the type, in definition order). Global actions are
    /// rejected: quest action lists are local by construction, which keeps
    /// planner branching bounded and the relevant-objects filter sound.
    #[allow(clippy::too_many_arguments)]
    pub fn add_quest(
        &mut self,
        name: &str,
        is_main: bool,
        preconditions: &[Vec<String>],
        goals: &[Vec<Vec<String>>],
        action_names: &[String],
        object_names: &[String],
        subquest_names: &[String],
        use_action_tree: bool,
    ) -> Result<(), QuestError> {
        if self.has_main_quest(name) || self.has_sub_quest(name) {
            return self.fail(QuestError::QuestAlreadyExists, name);
        }

        let mut pre = Vec::new();
        self.construct_statements(preconditions, &[], &mut pre)
            .map_err(|e| e.context(format!("in the preconditions of quest `{name}`")))?;

        let mut goal_vec: Vec<Goal> = Vec::with_capacity(goals.len());
        for (i, entries) in goals.iter().enumerate() {
            let mut goal = Vec::new();
            self.construct_statements(entries, &[], &mut goal)
                .map_err(|e| e.context(format!("in goal {i} of quest `{name}`")))?;
            goal_vec.push(goal);
        }

        let mut actions: Vec<ActionRef> = Vec::new();
        for entry in action_names {
            let named_action = entry.starts_with(|c: char| c.is_ascii_uppercase());
            if named_action {
                let Some(action) = self.get_action(entry).cloned() else {
                    return self
                        .fail::<()>(QuestError::UndefinedAction, entry)
                        .map_err(|e| e.context(format!("in the actions of quest `{name}`")));
                };
                if !actions.iter().any(|a| a.id() == action.id()) {
                    actions.push(action);
                }
            } else {
                let Some(group) = self.action_groups.get(entry) else {
                    return self
                        .fail::<()>(QuestError::UndefinedActionGroup, entry)
                        .map_err(|e| e.context(format!("in the actions of quest `{name}`")));
                };
                for action in group {
                    if !actions.iter().any(|a| a.id() == action.id()) {
                        actions.push(action.clone());
                    }
                }
            }
        }
        for action in &actions {
            if action.is_global() {
                return Err(QuestError::GlobalQuestAction(
                    name.to_string(),
                    action.name().to_string(),
                ));
            }
        }

        let mut objects: Vec<ObjectRef> = Vec::new();
        for entry in object_names {
            let named_type = entry.starts_with(|c: char| c.is_ascii_uppercase());
            if named_type {
                let Some(ty) = self.get_type(entry) else {
                    return self
                        .fail::<()>(QuestError::UndefinedType, entry)
                        .map_err(|e| e.context(format!("in the objects of quest `{name}`")));
                };
                let wanted: TypeIdSet = [ty.id()].into_iter().collect();
                for obj in &self.objects {
                    if typeset_contains(obj.types(), &wanted)
                        && !objects.iter().any(|o| o.id() == obj.id())
                    {
                        objects.push(obj.clone());
                    }
                }
            } else {
                let Some(obj) = self.get_object(entry).cloned() else {
                    return self
                        .fail::<()>(QuestError::UndefinedObject, entry)
                        .map_err(|e| e.context(format!("in the objects of quest `{name}`")));
                };
                if !objects.iter().any(|o| o.id() == obj.id()) {
                    objects.push(obj);
                }
            }
        }

        let mut subquests: Vec<Arc<Quest>> = Vec::with_capacity(subquest_names.len());
        for sub in subquest_names {
            let Some(&index) = self.sub_quest_ids.get(sub) else {
                return self
                    .fail::<()>(QuestError::UndefinedQuest, sub)
                    .map_err(|e| e.context(format!("in the subquests of quest `{name}`")));
            };
            subquests.push(self.sub_quests[index].quest().clone());
        }

        let (table, ids) = if is_main {
            (&mut self.main_quests, &mut self.main_quest_ids)
        } else {
            (&mut self.sub_quests, &mut self.sub_quest_ids)
        };
        let id = table.len();
        ids.insert(name.to_string(), id);
        let quest = Arc::new(Quest::new(
            name,
            id as i32,
            pre,
            goal_vec,
            actions,
            objects,
            subquests,
            use_action_tree,
        ));
        table.push(QuestManager::new(quest));
        info!(world = %self.world_name, quest = name, main = is_main, "quest defined");
        Ok(())
    }

    pub fn has_main_quest(&self, name: &str) -> bool {
        self.main_quest_ids.contains_key(name)
    }

    pub fn has_sub_quest(&self, name: &str) -> bool {
        self.sub_quest_ids.contains_key(name)
    }

    /// `Inactive` for undefined quests.
    pub fn quest_status(&self, name: &str) -> QuestStatus {
        self.quest_slot(name)
            .map(|slot| self.manager(slot).status())
            .unwrap_or(QuestStatus::Inactive)
    }

    pub fn set_quest_option(&mut self, name: &str, option: QuestOption) -> Result<(), QuestError> {
        let Some(slot) = self.quest_slot(name) else {
            return self.fail(QuestError::UndefinedQuest, name);
        };
        self.manager_mut(slot).set_option(option);
        Ok(())
    }

    fn quest_slot(&self, name: &str) -> Option<QuestSlot> {
        if let Some(&i) = self.main_quest_ids.get(name) {
            return Some(QuestSlot::Main(i));
        }
        self.sub_quest_ids.get(name).map(|&i| QuestSlot::Sub(i))
    }

    fn all_slots(&self) -> Vec<QuestSlot> {
        (0..self.main_quests.len())
            .map(QuestSlot::Main)
            .chain((0..self.sub_quests.len()).map(QuestSlot::Sub))
            .collect()
    }

    fn manager(&self, slot: QuestSlot) -> &QuestManager {
        match slot {
            QuestSlot::Main(i) => &self.main_quests[i],
            QuestSlot::Sub(i) => &self.sub_quests[i],
        }
    }

    fn manager_mut(&mut self, slot: QuestSlot) -> &mut QuestManager {
        match slot {
            QuestSlot::Main(i) => &mut self.main_quests[i],
            QuestSlot::Sub(i) => &mut self.sub_quests[i],
        }
    }

    /// Activate any main quest whose preconditions already hold, then
    /// re-plan every live quest whose substate moved past its last plan.
    pub fn perform_planning(&mut self, sink: &dyn MessageSink) {
        self.activate_ready_main_quests(sink);
        for slot in self.all_slots() {
            if self.manager(slot).needs_planning() {
                self.perform_quest_planning(slot, sink);
            }
        }
    }

    fn perform_quest_planning(&mut self, slot: QuestSlot, sink: &dyn MessageSink) {
        let manager = self.manager(slot);
        let snapshot = self.state.filtered(manager.quest());
        let substate_id = manager.current_substate();
        let old_status = manager.status();
        let old_goal = manager.last_active_goal();

        let mut planner = QuestPlanner::new(substate_id, snapshot, manager);
        let plan = Arc::new(planner.find_plan(&self.world_name, sink));

        if !self.manager_mut(slot).set_plan(plan.clone()) {
            return;
        }

        let quest_name = plan.quest.name().to_string();
        if plan.status != old_status {
            sink.push(Message::NewQuestStatus {
                world: self.world_name.clone(),
                quest: quest_name.clone(),
                status: plan.status,
            });
        }
        if plan.goal_index != old_goal {
            sink.push(Message::NewQuestGoal {
                world: self.world_name.clone(),
                quest: quest_name.clone(),
                goal: plan.goal_index,
                old_goal,
            });
        }
        // Only decided outcomes carry a plan message: `Reachable` with its
        // steps, `Done` with an empty list. Inconclusive searches already
        // announced their limit.
        if matches!(plan.status, QuestStatus::Reachable | QuestStatus::Done) {
            sink.push(Message::NewQuestPlan {
                world: self.world_name.clone(),
                quest: quest_name,
                actions: plan.steps.iter().map(|s| s.action.name().to_string()).collect(),
                arguments: plan.steps.iter().map(|s| s.argument_names()).collect(),
            });
        }

        self.discover_subquests(&plan, sink);
    }

    /// Sub-quest discovery at the N/A boundary: when a fresh plan opens
    /// with an N/A action, any inactive sub-quest of this quest whose
    /// preconditions hold before the marker and one of whose goals holds
    /// after it is the quest that marker hands off to.
    fn discover_subquests(&mut self, plan: &QuestPlan, sink: &dyn MessageSink) {
        if plan.quest.subquests().is_empty() || plan.steps.is_empty() {
            return;
        }
        let first = &plan.steps[0];
        if !first.action.is_not_applicable() {
            return;
        }

        let mut post = (*plan.given_state).clone();
        first.action.apply_unchecked(&first.arguments, &mut post);

        for subquest in plan.quest.subquests() {
            let Some(slot) = self.quest_slot(subquest.name()) else {
                continue;
            };
            if self.manager(slot).status() != QuestStatus::Inactive {
                continue;
            }
            if !plan
                .given_state
                .has_substate(subquest.preconditions().iter().map(|st| &**st))
            {
                continue;
            }
            let fulfilled = subquest
                .goals()
                .iter()
                .any(|goal| post.has_substate(goal.iter().map(|st| &**st)));
            if !fulfilled {
                continue;
            }

            {
                let manager = self.manager_mut(slot);
                manager.set_parent(plan.quest.clone(), plan.goal_index);
                manager.activate();
            }
            sink.push(Message::NewSubQuest {
                world: self.world_name.clone(),
                quest: subquest.name().to_string(),
                parent: plan.quest.name().to_string(),
                goal: plan.goal_index,
            });
            self.perform_quest_planning(slot, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::message::MessageQueue;

    fn world_with_items() -> World {
        let mut w = World::new("srv", "w");
        w.add_type("Item", &[]).unwrap();
        w.add_type("Key", &["Item".into()]).unwrap();
        w.add_object("key", &["Key".into()]).unwrap();
        w.add_object("coin", &["Item".into()]).unwrap();
        w.add_relation("Has", &["Item".into()]).unwrap();
        w.add_relation("Free", &["Item".into()]).unwrap();
        w.add_action(
            "Pick",
            &[],
            false,
            &[vec!["i".into(), "Item".into()]],
            &[vec!["Free".into(), "i".into()]],
            &[vec!["Free".into(), "i".into()]],
            &[vec!["Has".into(), "i".into()]],
        )
        .unwrap();
        w
    }

    #[test]
    fn test_duplicate_definitions_are_rejected() {
        let mut w = world_with_items();
        assert!(matches!(
            w.add_type("Item", &[]),
            Err(QuestError::TypeAlreadyExists(..))
        ));
        assert!(matches!(
            w.add_object("key", &["Item".into()]),
            Err(QuestError::ObjectAlreadyExists(..))
        ));
        assert!(matches!(
            w.add_relation("Has", &[]),
            Err(QuestError::RelationAlreadyExists(..))
        ));
    }

    #[test]
    fn test_subtype_closure() {
        let w = world_with_items();
        let mut types = w.object_types("key");
        types.sort();
        assert_eq!(types, vec!["Item", "Key"]);
    }

    /// An action parameter may not shadow a defined object name.
    #[test]
    fn test_parameter_shadowing_rejected() {
        let mut w = world_with_items();
        let err = w
            .add_action(
                "Steal",
                &[],
                false,
                &[vec!["key".into(), "Item".into()]],
                &[],
                &[],
                &[],
            )
            .unwrap_err();
        assert!(err.describe().contains("`key` is already defined"));
    }

    /// Failed applications leave state, version and managers untouched.
    #[test]
    fn test_apply_action_is_atomic() {
        crate::internal::tests::init_test_logging();
        let queue = MessageQueue::new();
        let mut w = world_with_items();
        let version = w.state_version();
        let hash = w.state().hash_value();

        let err = w
            .apply_action("Pick", &["key".into()], &queue)
            .unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::Preconditions);
        assert_eq!(w.state_version(), version);
        assert_eq!(w.state().hash_value(), hash);
        assert!(queue.is_empty());

        let err = w.apply_action("Pick", &[], &queue).unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::Arity);
        let err = w
            .apply_action("Vanish", &["key".into()], &queue)
            .unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::UndefinedAction);
        let err = w
            .apply_action("Pick", &["ghost".into()], &queue)
            .unwrap_err();
        assert_eq!(err.kind, ActionErrorKind::UndefinedObject);
        assert!(queue.is_empty());
    }

    /// Quest action lists must be local; global actions are rejected at
    /// definition time.
    #[test]
    fn test_global_quest_action_rejected() {
        let mut w = world_with_items();
        // GrabKey names a real object, which makes it global.
        w.add_action(
            "GrabKey",
            &[],
            false,
            &[],
            &[],
            &[],
            &[vec!["Has".into(), "key".into()]],
        )
        .unwrap();
        let err = w
            .add_quest(
                "Main",
                true,
                &[],
                &[vec![vec!["Has".into(), "key".into()]]],
                &["GrabKey".into()],
                &["key".into()],
                &[],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, QuestError::GlobalQuestAction(..)));
    }

    /// Type entries in a quest's object list pull in every object of that
    /// type; duplicates collapse.
    #[test]
    fn test_quest_object_expansion() {
        let mut w = world_with_items();
        w.add_quest(
            "Main",
            true,
            &[],
            &[vec![vec!["Has".into(), "key".into()]]],
            &["Pick".into()],
            &["Item".into(), "key".into()],
            &[],
            false,
        )
        .unwrap();
        let slot = w.quest_slot("Main").unwrap();
        let quest = w.manager(slot).quest().clone();
        let names: Vec<_> = quest.objects().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["key", "coin"]);
    }

    #[test]
    fn test_status_hook_validation() {
        let mut w = world_with_items();
        w.add_quest(
            "Main",
            true,
            &[],
            &[vec![vec!["Has".into(), "key".into()]]],
            &["Pick".into()],
            &["key".into()],
            &[],
            false,
        )
        .unwrap();
        assert!(matches!(
            w.add_status_hook("Vanish", "Main", QuestStatus::Done, 0, None),
            Err(QuestError::UndefinedAction(..))
        ));
        assert!(matches!(
            w.add_status_hook("Pick", "Nope", QuestStatus::Done, 0, None),
            Err(QuestError::UndefinedQuest(..))
        ));
        assert!(matches!(
            w.add_status_hook("Pick", "Main", QuestStatus::Done, 5, None),
            Err(QuestError::StatusHookGoal { .. })
        ));
        // A main quest cannot take a PARENT clause.
        assert!(matches!(
            w.add_status_hook("Pick", "Main", QuestStatus::Done, 0, Some(("Main", 0))),
            Err(QuestError::UndefinedSubQuest(..))
        ));
        w.add_status_hook("Pick", "Main", QuestStatus::Done, 0, None)
            .unwrap();
    }

    /// Zero-arity relations are global, and so is any action touching one.
    #[test]
    fn test_zero_arity_relation_makes_actions_global() {
        let mut w = world_with_items();
        w.add_relation("Night", &[]).unwrap();
        w.add_action("Dusk", &[], false, &[], &[], &[], &[vec!["Night".into()]])
            .unwrap();
        let err = w
            .add_quest(
                "Main",
                true,
                &[],
                &[vec![vec!["Night".into()]]],
                &["Dusk".into()],
                &[],
                &[],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, QuestError::GlobalQuestAction(..)));
    }
}
