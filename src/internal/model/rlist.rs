//! Relation lists: parameterised statement-vector macros.
//!
//! A relation list names a parameter vector and a statement template; in
//! `.quest` sources they keep action definitions compact. Actions reuse the
//! same machinery for their `pre`/`rem`/`add` lists, so the fast in-place
//! substitution here is on the planner's hottest path.

use crate::errors::QuestError;

use super::object::ObjectRef;
use super::statement::{Statement, StatementRef};
use super::types::typeset_contains;
use super::Id;

/// A named, parameterised macro expanding to a statement vector.
///
/// The n-th parameter (1-based) is an ephemeral object with id `-n`. Nested
/// relation lists are expanded at construction, so `statements` only ever
/// mentions plain relations.
#[derive(Debug)]
pub struct RelationList {
    name: String,
    id: Id,
    parameters: Vec<ObjectRef>,
    statements: Vec<StatementRef>,
}

impl RelationList {
    pub fn new(
        name: impl Into<String>,
        id: Id,
        parameters: Vec<ObjectRef>,
        statements: Vec<StatementRef>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            parameters,
            statements,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parameters(&self) -> &[ObjectRef] {
        &self.parameters
    }

    pub fn statements(&self) -> &[StatementRef] {
        &self.statements
    }

    /// Check arity, then per-slot compatibility: each argument's type set
    /// must contain the parameter's full declared type set.
    pub fn check_arguments(&self, arguments: &[ObjectRef]) -> Result<(), QuestError> {
        if arguments.len() != self.parameters.len() {
            return Err(QuestError::Arity {
                name: self.name.clone(),
                expected: self.parameters.len(),
                given: arguments.len(),
            });
        }
        for (index, (arg, param)) in arguments.iter().zip(&self.parameters).enumerate() {
            if !typeset_contains(arg.types(), param.types()) {
                return Err(QuestError::ArgumentType {
                    name: self.name.clone(),
                    index,
                    object: arg.name().to_string(),
                    expected: param.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build a substituted statement vector. Constant statements are shared
    /// as-is; parameterised ones are rebuilt with arguments filled in.
    pub fn substitute(&self, arguments: &[ObjectRef]) -> Vec<StatementRef> {
        self.statements
            .iter()
            .map(|st| {
                if st.is_constant() {
                    st.clone()
                } else {
                    StatementRef::new(st.substitute(arguments))
                }
            })
            .collect()
    }

    /// Materialise an owned buffer compatible with
    /// [`substitute_into`](Self::substitute_into): same relations, same
    /// constant arguments, parameter slots still holding placeholders.
    pub fn materialize_buffer(&self) -> Vec<Statement> {
        self.statements.iter().map(|st| (**st).clone()).collect()
    }

    /// Fast path: overwrite only the parameter positions of `out` (a buffer
    /// produced by [`materialize_buffer`](Self::materialize_buffer)) and
    /// refresh hashes, avoiding any allocation per substitution.
    pub fn substitute_into(&self, out: &mut [Statement], arguments: &[ObjectRef]) {
        debug_assert_eq!(out.len(), self.statements.len());
        for (slot, templ) in out.iter_mut().zip(&self.statements) {
            if !templ.is_constant() {
                slot.overwrite_parameters(templ, arguments);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{QuestType, Relation, TypeIdSet, WorldObject};

    fn fixture() -> (RelationList, ObjectRef, ObjectRef) {
        let item = Arc::new(QuestType::new("Item", 0, TypeIdSet::new()));
        let has = Arc::new(Relation::new("Has", 0, vec![item.clone()]));
        let lost = Arc::new(Relation::new("Lost", 1, vec![item]));

        let param: ObjectRef = Arc::new(WorldObject::new("i", -1, [0].into_iter().collect()));
        let key: ObjectRef = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));

        let statements = vec![
            StatementRef::new(Statement::new(has, vec![param.clone()])),
            StatementRef::new(Statement::new(lost, vec![param.clone()])),
        ];
        (
            RelationList::new("Carrying", 0, vec![param], statements),
            key,
            Arc::new(WorldObject::new("rock", 1, TypeIdSet::new())),
        )
    }

    #[test]
    fn test_substitute() {
        let (rlist, key, _) = fixture();
        let grounded = rlist.substitute(std::slice::from_ref(&key));
        assert_eq!(grounded.len(), 2);
        assert!(grounded.iter().all(|st| st.is_constant()));
        assert_eq!(grounded[0].arguments()[0].id(), 0);
    }

    #[test]
    fn test_substitute_into_matches_slow_path() {
        let (rlist, key, _) = fixture();
        let slow = rlist.substitute(std::slice::from_ref(&key));
        let mut buffer = rlist.materialize_buffer();
        rlist.substitute_into(&mut buffer, std::slice::from_ref(&key));
        for (a, b) in slow.iter().zip(&buffer) {
            assert_eq!(&**a, b);
            assert_eq!(a.hash_value(), b.hash_value());
        }
    }

    #[test]
    fn test_check_arguments() {
        let (rlist, key, rock) = fixture();
        assert!(rlist.check_arguments(&[key.clone()]).is_ok());
        assert!(matches!(
            rlist.check_arguments(&[rock]),
            Err(QuestError::ArgumentType { .. })
        ));
        assert!(matches!(
            rlist.check_arguments(&[key.clone(), key]),
            Err(QuestError::Arity { .. })
        ));
    }
}
