//! The typed world model.
//!
//! A quest world is defined once and then stays immutable for its lifetime:
//! types form a subtype lattice, objects carry transitively-closed type
//! sets, relations are typed n-ary predicate schemas, and statements apply
//! a relation to an argument vector. The only mutable value is [`State`],
//! the set of statements currently true, which actions transform.
//!
//! Identifier scheme: every definition kind (type, object, relation,
//! relation list, action, quest) receives a dense non-negative id in
//! definition order, within its own namespace. Formal parameters of actions
//! and relation lists are *objects with negative ids*: the i-th parameter
//! (1-based) has id `-i`. Substitution dispatches on the sign of the id, so
//! one argument vector can mix real objects and placeholders with an O(1)
//! distinction and no separate variable type.

pub mod action;
pub mod object;
pub mod quest;
pub mod relation;
pub mod rlist;
pub mod state;
pub mod statement;
pub mod types;

pub use action::{Action, ActionFailure, ActionRef};
pub use object::{ObjectRef, WorldObject};
pub use quest::{Goal, Quest};
pub use relation::{Relation, RelationRef};
pub use rlist::RelationList;
pub use state::State;
pub use statement::{Arguments, Statement, StatementRef};
pub use types::{QuestType, TypeIdSet, TypeRef, typeset_contains};

/// Dense per-kind identifier. Negative values denote formal parameters.
pub type Id = i32;
