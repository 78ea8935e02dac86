//! The action server: the process-facing facade of the engine.
//!
//! A server owns named worlds, a FIFO message queue the host drains at its
//! own cadence, and an action queue serviced by one dedicated worker
//! thread. The worker is the sole writer of world state while it runs;
//! every other mutation is rejected until it stops. `push_action` is the
//! one call accepted in that state and never blocks.

pub mod message;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::errors::QuestError;
use crate::internal::plan::{QuestOption, QuestStatus};
use crate::internal::world::World;
use crate::script::filesystem::FileSystem;
use crate::script::{project, qsf};

use message::{Message, MessageProcessor, MessageQueue, MessageSink};

/// One worker tick: how long the worker sleeps on an empty action queue
/// before running another planning sweep. 1/25 of a second.
const ONE_TICK: Duration = Duration::from_millis(40);

/// Host-visible applicability of an action name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Undefined,
    NotApplicable,
    Applicable,
}

/// An action waiting in the server's queue.
struct QueuedAction {
    world: String,
    action: String,
    arguments: Vec<String>,
    /// Opaque host tag, returned verbatim with any resulting error.
    data: i64,
}

/// The action queue: mutex-guarded FIFO plus a condvar the worker parks on
/// between ticks.
#[derive(Default)]
struct ActionQueue {
    queue: Mutex<VecDeque<QueuedAction>>,
    ready: Condvar,
}

impl ActionQueue {
    fn push(&self, cmd: QueuedAction) {
        self.queue.lock().push_back(cmd);
        self.ready.notify_all();
    }

    /// Pop the next action, waiting up to `timeout` for one to arrive.
    fn wait_pop(&self, timeout: Duration) -> Option<QueuedAction> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.ready.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// The engine's front door. See the module docs for the threading model.
pub struct QuestServer {
    name: String,
    worlds: Arc<Mutex<Vec<(String, World)>>>,
    messages: Arc<MessageQueue>,
    actions: Arc<ActionQueue>,
    worker: Option<JoinHandle<()>>,
    stop_worker: Arc<AtomicBool>,
    worker_running: Arc<AtomicBool>,
}

impl QuestServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worlds: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(MessageQueue::new()),
            actions: Arc::new(ActionQueue::default()),
            worker: None,
            stop_worker: Arc::new(AtomicBool::new(false)),
            worker_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_worker_stopped(&self) -> Result<(), QuestError> {
        if self.worker.is_some() {
            return Err(QuestError::WorkerRunning(self.name.clone()));
        }
        Ok(())
    }

    pub fn create_world(&mut self, world_name: &str) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        let mut worlds = self.worlds.lock();
        if worlds.iter().any(|(name, _)| name == world_name) {
            return Err(QuestError::WorldAlreadyExists(
                self.name.clone(),
                world_name.to_string(),
            ));
        }
        worlds.push((world_name.to_string(), World::new(self.name.as_str(), world_name)));
        Ok(())
    }

    pub fn delete_world(&mut self, world_name: &str) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        let mut worlds = self.worlds.lock();
        let Some(index) = worlds.iter().position(|(name, _)| name == world_name) else {
            return Err(QuestError::UndefinedWorld(
                self.name.clone(),
                world_name.to_string(),
            ));
        };
        worlds.remove(index);
        Ok(())
    }

    pub fn has_world(&self, world_name: &str) -> bool {
        self.worlds.lock().iter().any(|(name, _)| name == world_name)
    }

    pub fn world_names(&self) -> Vec<String> {
        self.worlds.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Run a closure against one world, under the world-table lock.
    fn with_world<T>(
        &self,
        world_name: &str,
        f: impl FnOnce(&mut World) -> T,
    ) -> Result<T, QuestError> {
        let mut worlds = self.worlds.lock();
        let Some((_, world)) = worlds.iter_mut().find(|(name, _)| name == world_name) else {
            return Err(QuestError::UndefinedWorld(
                self.name.clone(),
                world_name.to_string(),
            ));
        };
        Ok(f(world))
    }

    /// Parse `.quest` source into a world. Definition errors abort the
    /// parse without rollback; discard the world on failure.
    pub fn add_project(
        &mut self,
        world_name: &str,
        file_name: &str,
        source: &str,
    ) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        self.with_world(world_name, |world| {
            project::parse_project(world, file_name, source)
        })?
    }

    /// Load a `.qsf` script: create its worlds, read their projects
    /// through `fs`, and (optionally) apply the `init:` actions.
    pub fn load_script(
        &mut self,
        fs: &dyn FileSystem,
        file_name: &str,
        source: &str,
        apply_init_actions: bool,
    ) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        qsf::parse_script(self, fs, file_name, source, apply_init_actions)
    }

    pub fn has_object(&self, world_name: &str, object_name: &str) -> bool {
        self.with_world(world_name, |w| w.has_object(object_name))
            .unwrap_or(false)
    }

    pub fn object_names(&self, world_name: &str) -> Vec<String> {
        self.with_world(world_name, |w| w.object_names())
            .unwrap_or_default()
    }

    pub fn object_types(&self, world_name: &str, object_name: &str) -> Vec<String> {
        self.with_world(world_name, |w| w.object_types(object_name))
            .unwrap_or_default()
    }

    pub fn action_names(&self, world_name: &str) -> Vec<String> {
        self.with_world(world_name, |w| w.action_names())
            .unwrap_or_default()
    }

    pub fn action_parameters(&self, world_name: &str, action_name: &str) -> Vec<Vec<String>> {
        self.with_world(world_name, |w| w.action_parameters(action_name))
            .unwrap_or_default()
    }

    pub fn action_status(&self, world_name: &str, action_name: &str) -> ActionStatus {
        self.with_world(world_name, |w| {
            if !w.has_action(action_name) {
                ActionStatus::Undefined
            } else if w.is_action_not_applicable(action_name) {
                ActionStatus::NotApplicable
            } else {
                ActionStatus::Applicable
            }
        })
        .unwrap_or(ActionStatus::Undefined)
    }

    /// Validate an action call against the current state without applying
    /// it.
    pub fn check_action(
        &self,
        skip_preconditions: bool,
        world_name: &str,
        action_name: &str,
        arguments: &[String],
    ) -> Result<(), QuestError> {
        self.with_world(world_name, |w| {
            w.check_action(skip_preconditions, action_name, arguments)
        })?
    }

    pub fn has_main_quest(&self, world_name: &str, quest_name: &str) -> bool {
        self.with_world(world_name, |w| w.has_main_quest(quest_name))
            .unwrap_or(false)
    }

    pub fn has_sub_quest(&self, world_name: &str, quest_name: &str) -> bool {
        self.with_world(world_name, |w| w.has_sub_quest(quest_name))
            .unwrap_or(false)
    }

    pub fn quest_status(&self, world_name: &str, quest_name: &str) -> QuestStatus {
        self.with_world(world_name, |w| w.quest_status(quest_name))
            .unwrap_or(QuestStatus::Inactive)
    }

    pub fn set_quest_option(
        &mut self,
        world_name: &str,
        quest_name: &str,
        option: QuestOption,
    ) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        self.with_world(world_name, |w| w.set_quest_option(quest_name, option))?
    }

    /// Apply an action synchronously. Rejected while the worker runs; use
    /// [`push_action`](Self::push_action) then.
    pub fn apply_action(
        &mut self,
        world_name: &str,
        action_name: &str,
        arguments: &[String],
    ) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        let messages = self.messages.clone();
        self.with_world(world_name, |world| {
            world
                .apply_action(action_name, arguments, &*messages)
                .map_err(|f| f.error)
        })?
    }

    /// Enqueue an action for the worker. Non-blocking; failures surface
    /// asynchronously as [`Message::ActionError`] carrying `data`.
    pub fn push_action(
        &self,
        world_name: &str,
        action_name: &str,
        arguments: Vec<String>,
        data: i64,
    ) -> Result<(), QuestError> {
        if !self.has_world(world_name) {
            return Err(QuestError::UndefinedWorld(
                self.name.clone(),
                world_name.to_string(),
            ));
        }
        self.actions.push(QueuedAction {
            world: world_name.to_string(),
            action: action_name.to_string(),
            arguments,
            data,
        });
        Ok(())
    }

    /// Run one synchronous planning sweep over all worlds. Rejected while
    /// the worker runs (it plans on its own).
    pub fn perform_planning(&mut self) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        let messages = self.messages.clone();
        for (_, world) in self.worlds.lock().iter_mut() {
            world.perform_planning(&*messages);
        }
        Ok(())
    }

    /// Deliver the next pending message to `processor`. Returns `false`
    /// when the queue is empty. Safe to call from any thread at any time.
    pub fn process_next_message(&self, processor: &mut dyn MessageProcessor) -> bool {
        self.messages.process_next(processor)
    }

    /// Start the worker thread: a loop of planning sweep, tick-bounded
    /// wait on the action queue, and action application.
    pub fn start_worker_thread(&mut self) -> Result<(), QuestError> {
        self.ensure_worker_stopped()?;
        self.stop_worker.store(false, Ordering::SeqCst);
        self.worker_running.store(true, Ordering::SeqCst);

        let worlds = self.worlds.clone();
        let messages = self.messages.clone();
        let actions = self.actions.clone();
        let stop = self.stop_worker.clone();
        let running = self.worker_running.clone();
        let server_name = self.name.clone();

        self.worker = Some(std::thread::spawn(move || {
            info!(server = %server_name, "worker thread started");
            loop {
                {
                    let mut worlds = worlds.lock();
                    for (_, world) in worlds.iter_mut() {
                        world.perform_planning(&*messages);
                    }
                }

                let Some(cmd) = actions.wait_pop(ONE_TICK) else {
                    if stop.load(Ordering::SeqCst) && actions.is_empty() {
                        break;
                    }
                    continue;
                };

                let mut worlds = worlds.lock();
                let result = match worlds.iter_mut().find(|(name, _)| *name == cmd.world) {
                    Some((_, world)) => world
                        .apply_action(&cmd.action, &cmd.arguments, &*messages)
                        .map_err(|f| (f.kind, f.error)),
                    None => Err((
                        crate::errors::ActionErrorKind::Other,
                        QuestError::UndefinedWorld(server_name.clone(), cmd.world.clone()),
                    )),
                };
                if let Err((kind, error)) = result {
                    warn!(world = %cmd.world, action = %cmd.action, %error, "queued action failed");
                    messages.push(Message::ActionError {
                        world: cmd.world,
                        action: cmd.action,
                        arguments: cmd.arguments,
                        error,
                        kind,
                        data: cmd.data,
                    });
                }
            }
            running.store(false, Ordering::SeqCst);
            info!(server = %server_name, "worker thread stopped");
        }));
        Ok(())
    }

    /// Request the worker to stop. The worker finishes draining queued
    /// actions first; poll until this returns `true`.
    pub fn stop_worker_thread(&mut self) -> bool {
        self.stop_worker.store(true, Ordering::SeqCst);
        // Wake the worker so an idle tick doesn't delay shutdown.
        self.actions.ready.notify_all();
        if self.worker_running.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        true
    }

    /// Render a world as a loadable `.quest` project. Refused while the
    /// worker runs or while undrained messages could describe state the
    /// save would not contain.
    pub fn generate_save_file(&self, world_name: &str) -> Result<String, QuestError> {
        self.ensure_worker_stopped()?;
        if !self.messages.is_empty() {
            return Err(QuestError::MessagesPending(self.name.clone()));
        }
        self.with_world(world_name, |w| w.generate_save_file())
    }
}

impl Drop for QuestServer {
    fn drop(&mut self) {
        self.stop_worker.store(true, Ordering::SeqCst);
        self.actions.ready.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_lifecycle() {
        let mut server = QuestServer::new("srv");
        server.create_world("w").unwrap();
        assert!(server.has_world("w"));
        assert!(matches!(
            server.create_world("w"),
            Err(QuestError::WorldAlreadyExists(..))
        ));
        server.delete_world("w").unwrap();
        assert!(!server.has_world("w"));
        assert!(matches!(
            server.delete_world("w"),
            Err(QuestError::UndefinedWorld(..))
        ));
    }

    #[test]
    fn test_introspection() {
        let mut server = QuestServer::new("srv");
        server.create_world("w").unwrap();
        let src = "version 1 0\nproject w\n\ntype Item\nobject key : Item\nrel Has(Item)\n\naction Pick:\n    i : Item\n    pre\n    rem\n    add Has(i)\n\naction N/A Marker:\n    pre\n    rem\n    add\n";
        server.add_project("w", "w.quest", src).unwrap();

        assert_eq!(server.world_names(), vec!["w"]);
        assert!(server.has_object("w", "key"));
        assert!(!server.has_object("w", "door"));
        assert_eq!(server.object_names("w"), vec!["key"]);
        assert_eq!(server.object_types("w", "key"), vec!["Item"]);
        assert_eq!(server.action_names("w"), vec!["Pick", "Marker"]);
        assert_eq!(
            server.action_parameters("w", "Pick"),
            vec![vec!["i".to_string(), "Item".to_string()]]
        );
        assert_eq!(server.action_status("w", "Pick"), ActionStatus::Applicable);
        assert_eq!(
            server.action_status("w", "Marker"),
            ActionStatus::NotApplicable
        );
        assert_eq!(server.action_status("w", "Nope"), ActionStatus::Undefined);
        assert!(server.check_action(false, "w", "Pick", &["key".into()]).is_ok());
        assert!(server.check_action(false, "w", "Pick", &[]).is_err());
        assert!(!server.has_main_quest("w", "Anything"));
        assert_eq!(server.quest_status("w", "Anything"), QuestStatus::Inactive);
    }

    #[test]
    fn test_push_action_requires_world() {
        let server = QuestServer::new("srv");
        assert!(matches!(
            server.push_action("nope", "A", vec![], 0),
            Err(QuestError::UndefinedWorld(..))
        ));
    }

    #[test]
    fn test_mutations_rejected_while_worker_runs() {
        let mut server = QuestServer::new("srv");
        server.create_world("w").unwrap();
        server.start_worker_thread().unwrap();
        assert!(matches!(
            server.create_world("other"),
            Err(QuestError::WorkerRunning(..))
        ));
        assert!(matches!(
            server.apply_action("w", "A", &[]),
            Err(QuestError::WorkerRunning(..))
        ));
        assert!(matches!(
            server.perform_planning(),
            Err(QuestError::WorkerRunning(..))
        ));
        // push_action stays legal.
        server.push_action("w", "A", vec![], 7).unwrap();
        while !server.stop_worker_thread() {
            std::thread::sleep(Duration::from_millis(5));
        }
        // The queued action failed (undefined) and reported our tag.
        struct Grab(Option<i64>);
        impl MessageProcessor for Grab {
            fn on_action_error(
                &mut self,
                _world: &str,
                _action: &str,
                _arguments: &[String],
                _error: &QuestError,
                _kind: crate::errors::ActionErrorKind,
                data: i64,
            ) {
                self.0 = Some(data);
            }
        }
        let mut grab = Grab(None);
        while server.process_next_message(&mut grab) {}
        assert_eq!(grab.0, Some(7));
    }
}
