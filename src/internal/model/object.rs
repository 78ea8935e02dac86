//! World objects: the "nouns" of a quest world.
//!
//! Real objects (players, keys, doors) have non-negative ids. Formal
//! parameters of actions and relation lists are ephemeral objects with
//! negative ids, created per definition and never stored in the world's
//! object table.

use std::sync::Arc;

use super::{Id, types::TypeIdSet};

/// A named, typed entity referenced by statements.
#[derive(Debug)]
pub struct WorldObject {
    name: String,
    id: Id,
    /// Every type this object can be treated as (declared types plus their
    /// transitive supertypes).
    types: TypeIdSet,
}

impl WorldObject {
    pub fn new(name: impl Into<String>, id: Id, types: TypeIdSet) -> Self {
        Self {
            name: name.into(),
            id,
            types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn types(&self) -> &TypeIdSet {
        &self.types
    }

    /// Formal parameters carry negative ids.
    pub fn is_parameter(&self) -> bool {
        self.id < 0
    }

    /// The 0-based argument-vector position a parameter stands for.
    ///
    /// Only meaningful when `is_parameter()`.
    pub fn parameter_index(&self) -> usize {
        debug_assert!(self.id < 0);
        (-1 - self.id) as usize
    }
}

/// Shared handle to an immutable object.
pub type ObjectRef = Arc<WorldObject>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_index() {
        let p1 = WorldObject::new("item", -1, TypeIdSet::new());
        let p2 = WorldObject::new("place", -2, TypeIdSet::new());
        assert!(p1.is_parameter());
        assert_eq!(p1.parameter_index(), 0);
        assert_eq!(p2.parameter_index(), 1);

        let real = WorldObject::new("key", 0, TypeIdSet::new());
        assert!(!real.is_parameter());
    }
}
