//! Error types for the questline crate.
//!
//! This module defines a unified error enumeration used across world
//! definition, script parsing, action application, planning, and the server
//! front-end. It integrates with `thiserror` to provide rich `Display`
//! implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Parse errors carry `file:line:col` positions.
//! - `QuestError::describe` renders the full source chain as a single
//!   bounded description, suitable for host-side display.

use thiserror::Error;

/// Upper bound on a rendered error description. Chains longer than this are
/// truncated with an ellipsis marker so runaway contexts stay readable.
const MAX_DESCRIPTION_LEN: usize = 10_000;

#[derive(Error, Debug)]
/// Unified error enumeration for the questline library.
///
/// - Used across world definition, `.quest`/`.qsf` parsing, action
///   application and the server facade.
/// - Implements `std::error::Error` via `thiserror`.
pub enum QuestError {
    /// A type with this name was already defined.
    #[error("[{0}] type `{1}` is already defined")]
    TypeAlreadyExists(String, String),

    /// Reference to a type that was never defined.
    #[error("[{0}] undefined type `{1}`")]
    UndefinedType(String, String),

    /// An object with this name was already defined.
    #[error("[{0}] object `{1}` is already defined")]
    ObjectAlreadyExists(String, String),

    /// Reference to an object that was never defined.
    #[error("[{0}] undefined object `{1}`")]
    UndefinedObject(String, String),

    /// A relation with this name was already defined.
    #[error("[{0}] relation `{1}` is already defined")]
    RelationAlreadyExists(String, String),

    /// Reference to a relation (or relation list) that was never defined.
    #[error("[{0}] undefined relation or relation list `{1}`")]
    UndefinedRelation(String, String),

    /// A relation list with this name was already defined.
    #[error("[{0}] relation list `{1}` is already defined")]
    RelationListAlreadyExists(String, String),

    /// An action with this name was already defined.
    #[error("[{0}] action `{1}` is already defined")]
    ActionAlreadyExists(String, String),

    /// Reference to an action that was never defined.
    #[error("[{0}] undefined action `{1}`")]
    UndefinedAction(String, String),

    /// An action group with this name was already defined.
    #[error("[{0}] action group `{1}` is already defined")]
    ActionGroupAlreadyExists(String, String),

    /// Reference to an action group that was never defined.
    #[error("[{0}] undefined action group `{1}`")]
    UndefinedActionGroup(String, String),

    /// A quest with this name was already defined.
    #[error("[{0}] quest `{1}` is already defined")]
    QuestAlreadyExists(String, String),

    /// Reference to a quest that was never defined.
    #[error("[{0}] undefined quest `{1}`")]
    UndefinedQuest(String, String),

    /// Reference to a sub-quest that was never defined as one.
    #[error("[{0}] `{1}` is not a defined sub-quest")]
    UndefinedSubQuest(String, String),

    /// Wrong number of arguments for a relation, relation list or action.
    #[error("`{name}` expects {expected} argument(s), {given} given")]
    Arity {
        name: String,
        expected: usize,
        given: usize,
    },

    /// An argument object does not satisfy the declared slot type.
    #[error(
        "argument {index} of `{name}`: object `{object}` does not satisfy the required type `{expected}`"
    )]
    ArgumentType {
        name: String,
        index: usize,
        object: String,
        expected: String,
    },

    /// Preconditions of an action do not hold in the current state.
    #[error("[{0}] preconditions of action `{1}` do not hold")]
    PreconditionsNotMet(String, String),

    /// N/A actions mark sub-quest boundaries and can never be applied.
    #[error("[{0}] action `{1}` is marked N/A and cannot be applied")]
    NotApplicableAction(String, String),

    /// Quest action lists accept local actions only.
    #[error("global action `{1}` cannot be listed as an action of quest `{0}`")]
    GlobalQuestAction(String, String),

    /// Goal index out of range in a forced status hook.
    #[error("[{world}] status hook on `{action}`: quest `{quest}` has no goal {goal}")]
    StatusHookGoal {
        world: String,
        action: String,
        quest: String,
        goal: usize,
    },

    /// A world with this name already exists on the server.
    #[error("server `{0}` already has a world named `{1}`")]
    WorldAlreadyExists(String, String),

    /// Reference to a world the server does not own.
    #[error("server `{0}` has no world named `{1}`")]
    UndefinedWorld(String, String),

    /// Mutating calls are rejected while the worker thread runs.
    #[error("server `{0}`: operation is not allowed while the worker thread is running")]
    WorkerRunning(String),

    /// Saving is rejected until the host drains pending messages.
    #[error("server `{0}`: cannot generate a save file while messages are pending")]
    MessagesPending(String),

    /// Malformed `.quest` / `.qsf` source.
    #[error("{file}:{line}:{col}: {message}")]
    Parse {
        file: String,
        line: usize,
        col: usize,
        message: String,
    },

    /// Source file declares a format version this reader does not support.
    #[error(
        "{file}:{line}:{col}: unsupported format version {got_major}.{got_minor}, expected {major}.{minor}"
    )]
    UnsupportedVersion {
        file: String,
        line: usize,
        col: usize,
        major: u32,
        minor: u32,
        got_major: u32,
        got_minor: u32,
    },

    /// I/O error from a host `FileSystem` implementation.
    #[error("file system error: {0}")]
    FileSystem(String),

    /// An outer description wrapping an inner error.
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: Box<QuestError>,
    },

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    Custom(String),
}

impl QuestError {
    /// Wrap this error with an outer description. The inner error stays
    /// reachable through `std::error::Error::source` and `describe`.
    pub fn context(self, message: impl Into<String>) -> QuestError {
        QuestError::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Render the whole source chain as one newline-separated description,
    /// outermost context first, truncated at a fixed bound.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mut cur: Option<&dyn std::error::Error> = Some(self);
        while let Some(err) = cur {
            if out.len() > MAX_DESCRIPTION_LEN {
                out.push_str("...\n... [description truncated]\n");
                break;
            }
            out.push_str("error: ");
            out.push_str(&err.to_string());
            out.push('\n');
            cur = err.source();
        }
        out
    }
}

/// Host-facing classification of `apply_action` failures, delivered with
/// `Message::ActionError` so UIs can localise without parsing descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionErrorKind {
    /// The action name is not defined in the world.
    UndefinedAction,
    /// Wrong number of arguments.
    Arity,
    /// An argument name is not a defined object.
    UndefinedObject,
    /// An argument object fails a slot's type requirement.
    Type,
    /// Preconditions do not hold in the global state.
    Preconditions,
    /// The action is flagged N/A.
    NotApplicable,
    /// Anything else (unknown world, internal failures).
    Other,
}

impl std::fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionErrorKind::UndefinedAction => "undefined_action",
            ActionErrorKind::Arity => "arity_error",
            ActionErrorKind::UndefinedObject => "undefined_object",
            ActionErrorKind::Type => "type_error",
            ActionErrorKind::Preconditions => "preconditions_error",
            ActionErrorKind::NotApplicable => "na_action",
            ActionErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Context wrapping keeps the inner error reachable via source().
    #[test]
    fn test_context_chain() {
        let err = QuestError::UndefinedType("srv:w".into(), "Key".into())
            .context("while defining object `door`");
        assert!(err.to_string().contains("door"));
        let desc = err.describe();
        assert!(desc.contains("while defining object `door`"));
        assert!(desc.contains("undefined type `Key`"));
    }

    /// describe() is bounded even for absurdly deep chains.
    #[test]
    fn test_describe_truncates() {
        let mut err = QuestError::Custom("x".repeat(512));
        for _ in 0..200 {
            err = err.context("y".repeat(512));
        }
        let desc = err.describe();
        assert!(desc.len() < MAX_DESCRIPTION_LEN + 2048);
        assert!(desc.contains("[description truncated]"));
    }

    #[test]
    fn test_action_error_kind_display() {
        assert_eq!(
            ActionErrorKind::Preconditions.to_string(),
            "preconditions_error"
        );
        assert_eq!(ActionErrorKind::NotApplicable.to_string(), "na_action");
    }
}
