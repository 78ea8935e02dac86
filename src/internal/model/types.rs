//! Types of world objects, with subtyping.
//!
//! An object can belong to several types at once; compatibility checks are
//! set inclusion over *transitively closed* type-id sets, so the lattice is
//! walked once at definition time and never during play or search.

use std::sync::Arc;

use ahash::AHashSet;

use super::Id;

/// A transitively-closed set of type ids.
pub type TypeIdSet = AHashSet<Id>;

/// A named node in the subtype lattice.
///
/// `supertypes` holds the transitive closure of the declared parents (each
/// parent contributes itself plus its own closure), so subtype questions
/// never recurse.
#[derive(Debug)]
pub struct QuestType {
    name: String,
    id: Id,
    supertypes: TypeIdSet,
}

impl QuestType {
    pub fn new(name: impl Into<String>, id: Id, supertypes: TypeIdSet) -> Self {
        Self {
            name: name.into(),
            id,
            supertypes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Closure of declared parents, not including this type itself.
    pub fn supertypes(&self) -> &TypeIdSet {
        &self.supertypes
    }
}

/// `true` when the bigger set contains every id of the smaller.
///
/// An object fits a parameter slot iff the object's type set is a superset
/// of the slot's declared type set.
pub fn typeset_contains(bigger: &TypeIdSet, smaller: &TypeIdSet) -> bool {
    if smaller.len() > bigger.len() {
        return false;
    }
    smaller.iter().all(|id| bigger.contains(id))
}

/// Shared handle to an immutable type definition.
pub type TypeRef = Arc<QuestType>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeset_contains() {
        let bigger: TypeIdSet = [0, 1, 2].into_iter().collect();
        let smaller: TypeIdSet = [1, 2].into_iter().collect();
        assert!(typeset_contains(&bigger, &smaller));
        assert!(!typeset_contains(&smaller, &bigger));
        assert!(typeset_contains(&bigger, &TypeIdSet::new()));
    }

    #[test]
    fn test_supertypes_exclude_self() {
        let t = QuestType::new("Key", 3, [0, 1].into_iter().collect());
        assert!(!t.supertypes().contains(&3));
        assert_eq!(t.name(), "Key");
    }
}
