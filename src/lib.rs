//! Questline is an embeddable non-linear quest engine for narrative games.
//!
//! A host program authors a declarative world (typed objects, typed
//! relations, parameterised actions with preconditions and effects, and
//! quests with alternative goals), then pushes player actions at runtime.
//! The engine maintains the world state, re-plans each live quest, tracks
//! main/sub-quest activation, and emits an ordered message stream
//! describing what the player should now see.
//!
//! The usual flow:
//!
//! ```no_run
//! use questline::{MessageProcessor, QuestServer};
//!
//! struct Printer;
//! impl MessageProcessor for Printer {
//!     fn on_new_quest_plan(
//!         &mut self,
//!         world: &str,
//!         quest: &str,
//!         actions: &[String],
//!         _arguments: &[Vec<String>],
//!     ) {
//!         println!("[{world}] {quest}: {}", actions.join(", "));
//!     }
//! }
//!
//! # fn main() -> Result<(), questline::QuestError> {
//! # let island_quest_src = "version 1 0\nproject island\n";
//! let mut server = QuestServer::new("game");
//! server.create_world("island")?;
//! server.add_project("island", "island.quest", island_quest_src)?;
//! server.start_worker_thread()?;
//!
//! // The game loop pushes actions and drains messages at its own pace.
//! server.push_action("island", "Pick", vec!["key".into()], 0)?;
//! let mut printer = Printer;
//! while server.process_next_message(&mut printer) {}
//! # Ok(())
//! # }
//! ```
//!
//! Worlds, quests and actions are defined through `.quest` project sources
//! (see [`script`]); the planner, state store and quest lifecycle live in
//! [`internal`]; the host-facing queue and worker thread in [`server`].

pub mod errors;
pub mod hash;
pub mod internal;
pub mod script;
pub mod server;

pub use errors::{ActionErrorKind, QuestError};
pub use internal::plan::{QuestHeuristic, QuestOption, QuestStatus, SearchStrategy};
pub use script::filesystem::{FileSystem, NullFileSystem, StdFileSystem};
pub use server::message::{Message, MessageProcessor, MessageQueue};
pub use server::{ActionStatus, QuestServer};
