//! Statements: a relation applied to an argument vector.
//!
//! Statements are the atoms of world state. Each one carries a precomputed
//! XOR-combinable hash (see [`crate::hash`]) so that states can maintain
//! their hash incrementally and the planner's closed set stays cheap.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::errors::QuestError;
use crate::hash::{StateHash, statement_hash};

use super::object::ObjectRef;
use super::relation::RelationRef;

/// Argument vector. Most relations have small arity, so arguments live
/// inline up to four entries.
pub type Arguments = SmallVec<[ObjectRef; 4]>;

/// A relation applied to objects and/or parameter placeholders.
#[derive(Debug, Clone)]
pub struct Statement {
    relation: RelationRef,
    arguments: Arguments,
    /// No argument is a parameter placeholder.
    is_constant: bool,
    /// Zero arity, or at least one non-parameter argument.
    is_global: bool,
    hash: StateHash,
}

impl Statement {
    pub fn new(relation: RelationRef, arguments: impl Into<Arguments>) -> Self {
        let arguments = arguments.into();
        let is_constant = arguments.iter().all(|a| !a.is_parameter());
        let is_global = arguments.is_empty() || arguments.iter().any(|a| !a.is_parameter());
        let hash = statement_hash(relation.id(), arguments.iter().map(|a| a.id()));
        Self {
            relation,
            arguments,
            is_constant,
            is_global,
            hash,
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn arguments(&self) -> &[ObjectRef] {
        &self.arguments
    }

    /// `true` when no argument is a parameter placeholder.
    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    /// `true` when the statement pins down world-level truth: zero arity,
    /// or at least one real (non-parameter) argument.
    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn hash_value(&self) -> StateHash {
        self.hash
    }

    /// Check arity and slot types of an argument vector against this
    /// statement's relation.
    pub fn check_arguments(&self, arguments: &[ObjectRef]) -> Result<(), QuestError> {
        self.relation.check_arguments(arguments)
    }

    /// Build a new statement with parameter positions filled from
    /// `arguments`. Position `-1 - id` of the vector replaces the
    /// placeholder with id `id`; real objects pass through unchanged.
    ///
    /// The argument vector must be fully compatible with the statement.
    pub fn substitute(&self, arguments: &[ObjectRef]) -> Statement {
        let args: Arguments = self
            .arguments
            .iter()
            .map(|a| {
                if a.is_parameter() {
                    arguments[a.parameter_index()].clone()
                } else {
                    a.clone()
                }
            })
            .collect();
        Statement::new(self.relation.clone(), args)
    }

    /// In-place variant of [`substitute`](Self::substitute) used by hot
    /// planner buffers: `self` must share relation and constant argument
    /// positions with `template`; only the template's parameter positions
    /// are overwritten, then the hash is refreshed.
    pub fn overwrite_parameters(&mut self, template: &Statement, arguments: &[ObjectRef]) {
        for (slot, templ_arg) in self.arguments.iter_mut().zip(template.arguments.iter()) {
            if templ_arg.is_parameter() {
                *slot = arguments[templ_arg.parameter_index()].clone();
            }
        }
        self.recompute_hash();
    }

    fn recompute_hash(&mut self) {
        self.hash = statement_hash(self.relation.id(), self.arguments.iter().map(|a| a.id()));
    }
}

/// Two statements are equal iff the relations match and the arguments match
/// positionally, all by id.
impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash {
            return false;
        }
        if self.relation.id() != other.relation.id() {
            return false;
        }
        if self.arguments.len() != other.arguments.len() {
            return false;
        }
        self.arguments
            .iter()
            .zip(&other.arguments)
            .all(|(a, b)| a.id() == b.id())
    }
}

impl Eq for Statement {}

impl Hash for Statement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash.0);
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.relation.name())?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg.name())?;
        }
        write!(f, ")")
    }
}

/// Shared handle to an immutable statement.
pub type StatementRef = Arc<Statement>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{QuestType, Relation, TypeIdSet, WorldObject};

    fn item_relation() -> RelationRef {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        Arc::new(Relation::new("Has", 0, vec![item]))
    }

    fn obj(name: &str, id: i32) -> ObjectRef {
        Arc::new(WorldObject::new(name, id, [0].into_iter().collect()))
    }

    #[test]
    fn test_flags() {
        let rel = item_relation();
        let constant = Statement::new(rel.clone(), vec![obj("key", 0)]);
        assert!(constant.is_constant());
        assert!(constant.is_global());

        let with_param = Statement::new(rel.clone(), vec![obj("i", -1)]);
        assert!(!with_param.is_constant());
        assert!(!with_param.is_global());

        let flag = Statement::new(Arc::new(Relation::new("Night", 1, vec![])), Arguments::new());
        assert!(flag.is_constant());
        assert!(flag.is_global());
    }

    #[test]
    fn test_substitute() {
        let rel = item_relation();
        let templ = Statement::new(rel.clone(), vec![obj("i", -1)]);
        let key = obj("key", 0);
        let grounded = templ.substitute(std::slice::from_ref(&key));
        assert_eq!(grounded.arguments()[0].id(), 0);
        assert_eq!(grounded, Statement::new(rel, vec![key]));
    }

    #[test]
    fn test_overwrite_parameters_matches_substitute() {
        let rel = item_relation();
        let templ = Statement::new(rel, vec![obj("i", -1)]);
        let key = obj("key", 7);

        let slow = templ.substitute(std::slice::from_ref(&key));
        let mut fast = templ.clone();
        fast.overwrite_parameters(&templ, std::slice::from_ref(&key));

        assert_eq!(slow, fast);
        assert_eq!(slow.hash_value(), fast.hash_value());
    }

    #[test]
    fn test_display() {
        let rel = item_relation();
        let st = Statement::new(rel, vec![obj("key", 0)]);
        assert_eq!(st.to_string(), "Has(key)");
    }
}
