//! Typed n-ary predicate schemas.

use std::sync::Arc;

use crate::errors::QuestError;

use super::{Id, object::ObjectRef, types::TypeRef};

/// A relation between objects, e.g. `Has(Player, Item)`. Arity zero is
/// allowed and acts as a global flag.
///
/// Unlike first-order predicates, relations are typed: each argument slot
/// names a single required type, and an object fits the slot iff its type
/// set contains that type.
#[derive(Debug)]
pub struct Relation {
    name: String,
    id: Id,
    arg_types: Vec<TypeRef>,
}

impl Relation {
    pub fn new(name: impl Into<String>, id: Id, arg_types: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            id,
            arg_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_types(&self) -> &[TypeRef] {
        &self.arg_types
    }

    /// Check arity and per-slot type compatibility of an argument vector.
    pub fn check_arguments(&self, arguments: &[ObjectRef]) -> Result<(), QuestError> {
        if arguments.len() != self.arg_types.len() {
            return Err(QuestError::Arity {
                name: self.name.clone(),
                expected: self.arg_types.len(),
                given: arguments.len(),
            });
        }
        for (index, (arg, slot)) in arguments.iter().zip(&self.arg_types).enumerate() {
            if !arg.types().contains(&slot.id()) {
                return Err(QuestError::ArgumentType {
                    name: self.name.clone(),
                    index,
                    object: arg.name().to_string(),
                    expected: slot.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Shared handle to an immutable relation.
pub type RelationRef = Arc<Relation>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::internal::model::{QuestType, WorldObject};

    #[test]
    fn test_check_arguments() {
        let item = Arc::new(QuestType::new("Item", 0, Default::default()));
        let rel = Relation::new("Has", 0, vec![item.clone()]);

        let key = Arc::new(WorldObject::new("key", 0, [0].into_iter().collect()));
        let stone = Arc::new(WorldObject::new("stone", 1, [1].into_iter().collect()));

        assert!(rel.check_arguments(&[key.clone()]).is_ok());
        assert!(matches!(
            rel.check_arguments(&[stone]),
            Err(QuestError::ArgumentType { .. })
        ));
        assert!(matches!(
            rel.check_arguments(&[key.clone(), key]),
            Err(QuestError::Arity { .. })
        ));
    }

    #[test]
    fn test_zero_arity() {
        let rel = Relation::new("NightTime", 1, vec![]);
        assert_eq!(rel.arity(), 0);
        assert!(rel.check_arguments(&[]).is_ok());
    }
}
