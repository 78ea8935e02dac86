//! Outgoing messages: the engine's event stream to the host.
//!
//! The orchestrator and planner push typed messages as they work (they run
//! on the worker thread); the host drains them whenever it likes through a
//! [`MessageProcessor`]. The queue is a plain mutex-guarded FIFO; all
//! ordering guarantees are established at *push* time by the orchestrator,
//! the queue never reorders. No lock is held while a processor callback
//! runs.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::errors::{ActionErrorKind, QuestError};
use crate::internal::plan::QuestStatus;

/// One event from a quest world.
///
/// Delivery order within the queue is logically consistent:
/// 1. `NewMainQuest`/`NewSubQuest` for a quest precedes any other message
///    about it.
/// 2. `NewQuestState` precedes the `NewQuestPlan` that reacts to it.
/// 3. Quests in `DONE`/`UNREACHABLE` never emit `NewQuestState`.
/// 4. When a new plan changes status, `NewQuestStatus` precedes
///    `NewQuestPlan`.
/// 5. A parent's announcement precedes its children's `NewSubQuest`.
/// 6. `NewQuestGoal` follows `NewQuestStatus` and precedes `NewQuestPlan`
///    within one planning event.
#[derive(Debug)]
pub enum Message {
    /// A queued action failed; `data` is the host's tag from `push_action`.
    ActionError {
        world: String,
        action: String,
        arguments: Vec<String>,
        error: QuestError,
        kind: ActionErrorKind,
        data: i64,
    },
    /// A main quest activated.
    NewMainQuest { world: String, quest: String },
    /// A sub-quest was discovered under `parent` while it pursued `goal`.
    NewSubQuest {
        world: String,
        quest: String,
        parent: String,
        goal: usize,
    },
    /// The world changed in a way relevant to this quest.
    NewQuestState { world: String, quest: String },
    /// The quest's status changed.
    NewQuestStatus {
        world: String,
        quest: String,
        status: QuestStatus,
    },
    /// The quest's active goal moved from `old_goal` to `goal`.
    NewQuestGoal {
        world: String,
        quest: String,
        goal: usize,
        old_goal: usize,
    },
    /// A planning pass produced a plan (empty for `DONE`).
    NewQuestPlan {
        world: String,
        quest: String,
        actions: Vec<String>,
        arguments: Vec<Vec<String>>,
    },
    /// Search gave up after `limit` expansions; status becomes `UNKNOWN`.
    SearchLimitReached {
        world: String,
        quest: String,
        limit: usize,
    },
    /// The open set outgrew `limit`; status becomes `UNKNOWN`.
    SpaceLimitReached {
        world: String,
        quest: String,
        limit: usize,
    },
}

impl Message {
    /// Dispatch to the matching processor callback.
    pub fn deliver(&self, processor: &mut dyn MessageProcessor) {
        match self {
            Message::ActionError {
                world,
                action,
                arguments,
                error,
                kind,
                data,
            } => processor.on_action_error(world, action, arguments, error, *kind, *data),
            Message::NewMainQuest { world, quest } => processor.on_new_main_quest(world, quest),
            Message::NewSubQuest {
                world,
                quest,
                parent,
                goal,
            } => processor.on_new_sub_quest(world, quest, parent, *goal),
            Message::NewQuestState { world, quest } => processor.on_new_quest_state(world, quest),
            Message::NewQuestStatus {
                world,
                quest,
                status,
            } => processor.on_new_quest_status(world, quest, *status),
            Message::NewQuestGoal {
                world,
                quest,
                goal,
                old_goal,
            } => processor.on_new_quest_goal(world, quest, *goal, *old_goal),
            Message::NewQuestPlan {
                world,
                quest,
                actions,
                arguments,
            } => processor.on_new_quest_plan(world, quest, actions, arguments),
            Message::SearchLimitReached {
                world,
                quest,
                limit,
            } => processor.on_search_limit_reached(world, quest, *limit),
            Message::SpaceLimitReached {
                world,
                quest,
                limit,
            } => processor.on_space_limit_reached(world, quest, *limit),
        }
    }
}

/// Per-kind message callbacks, all default no-op, so hosts implement only
/// what they care about.
#[allow(unused_variables)]
pub trait MessageProcessor {
    /// An error occurred while applying a queued action.
    fn on_action_error(
        &mut self,
        world: &str,
        action: &str,
        arguments: &[String],
        error: &QuestError,
        kind: ActionErrorKind,
        data: i64,
    ) {
    }

    /// A new main quest activated.
    fn on_new_main_quest(&mut self, world: &str, quest: &str) {}

    /// A new sub-quest was discovered during planning.
    fn on_new_sub_quest(&mut self, world: &str, quest: &str, parent: &str, goal: usize) {}

    /// An applied action changed the state in a way relevant to the quest.
    fn on_new_quest_state(&mut self, world: &str, quest: &str) {}

    /// The quest received a new status.
    fn on_new_quest_status(&mut self, world: &str, quest: &str, status: QuestStatus) {}

    /// The active goal of the quest changed. Quests activating on their
    /// default goal 0 do not trigger this.
    fn on_new_quest_goal(&mut self, world: &str, quest: &str, goal: usize, old_goal: usize) {}

    /// A new plan was constructed during planning.
    fn on_new_quest_plan(
        &mut self,
        world: &str,
        quest: &str,
        actions: &[String],
        arguments: &[Vec<String>],
    ) {
    }

    /// Search hit the quest's `searchLimit`.
    fn on_search_limit_reached(&mut self, world: &str, quest: &str, limit: usize) {}

    /// Search hit the quest's `spaceLimit`.
    fn on_space_limit_reached(&mut self, world: &str, quest: &str, limit: usize) {}
}

/// Where the engine pushes messages as it works. Implemented by
/// [`MessageQueue`] for normal operation and by collecting sinks in tests.
pub trait MessageSink {
    fn push(&self, message: Message);
}

/// Thread-safe FIFO of pending messages: multi-producer on the worker
/// side, single consumer on the host side.
#[derive(Default)]
pub struct MessageQueue {
    queue: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Deliver the next message, if any. The queue lock is released before
    /// the processor runs.
    pub fn process_next(&self, processor: &mut dyn MessageProcessor) -> bool {
        let message = self.queue.lock().pop_front();
        match message {
            Some(message) => {
                message.deliver(processor);
                true
            }
            None => false,
        }
    }

    /// Deliver every pending message.
    pub fn process_all(&self, processor: &mut dyn MessageProcessor) {
        while self.process_next(processor) {}
    }
}

impl MessageSink for MessageQueue {
    fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
    }
}
