//! World state: an unordered set of statements with an XOR-combinable hash.
//!
//! Invariants kept by every public mutation:
//! - no duplicate statements;
//! - the stored hash equals the XOR of the member statements' hashes;
//! - `add` followed by `remove` of the same statements restores both the
//!   set and the hash.

use std::hash::{Hash, Hasher};

use ahash::AHashSet;

use crate::hash::StateHash;

use super::quest::Quest;
use super::statement::{Statement, StatementRef};

/// The set of statements currently true.
///
/// Statements are shared immutable records, so a full duplicate is a set of
/// pointer copies rather than a deep rebuild.
#[derive(Debug, Clone, Default)]
pub struct State {
    statements: AHashSet<StatementRef>,
    hash: StateHash,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn hash_value(&self) -> StateHash {
        self.hash
    }

    pub fn statements(&self) -> impl Iterator<Item = &StatementRef> {
        self.statements.iter()
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.statements.contains(statement)
    }

    /// Universal containment: every given statement is in the state.
    pub fn has_substate<'a, I>(&self, statements: I) -> bool
    where
        I: IntoIterator<Item = &'a Statement>,
    {
        statements.into_iter().all(|st| self.contains(st))
    }

    /// Insert one statement, updating the hash. Idempotent.
    pub fn add_one(&mut self, statement: StatementRef) {
        if !self.statements.contains(&*statement) {
            self.hash.toggle(statement.hash_value());
            self.statements.insert(statement);
        }
    }

    /// Remove one statement, updating the hash. Idempotent.
    pub fn remove_one(&mut self, statement: &Statement) {
        if let Some(found) = self.statements.take(statement) {
            self.hash.toggle(found.hash_value());
        }
    }

    pub fn add(&mut self, statements: &[StatementRef]) {
        for st in statements {
            self.add_one(st.clone());
        }
    }

    pub fn remove(&mut self, statements: &[StatementRef]) {
        for st in statements {
            self.remove_one(st);
        }
    }

    /// The quest's view of this state: only statements whose relation is in
    /// the quest's relevant relation set and all of whose arguments are in
    /// the quest's relevant object set. This is the snapshot the planner
    /// searches over.
    pub fn filtered(&self, quest: &Quest) -> State {
        let mut out = State::new();
        for st in &self.statements {
            if !quest.is_relation_relevant(st.relation().id()) {
                continue;
            }
            if st
                .arguments()
                .iter()
                .all(|obj| quest.is_object_relevant(obj.id()))
            {
                out.add_one(st.clone());
            }
        }
        out
    }
}

/// Equality is set equality; the hash is compared first as a cheap filter.
/// Hash collisions must never cause false pruning in the planner's closed
/// set, hence the full comparison.
impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash || self.statements.len() != other.statements.len() {
            return false;
        }
        self.statements
            .iter()
            .all(|st| other.statements.contains(&**st))
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash.0);
    }
}
