//! Entity trait: identity + continuity across recomputations.
//!
//! WBS nodes, milestones, measurements and cost records are entities: the
//! roll-up engine only ever references them by id.

use std::collections::HashMap;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Index a batch of entities by id.
///
/// Returns the first duplicated id if two entities share one.
pub fn index_by_id<E, I>(items: I) -> Result<HashMap<E::Id, E>, E::Id>
where
    E: Entity,
    I: IntoIterator<Item = E>,
{
    let mut map = HashMap::new();
    for item in items {
        let id = item.id().clone();
        if map.contains_key(&id) {
            return Err(id);
        }
        map.insert(id, item);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        label: &'static str,
    }

    impl Entity for Row {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    #[test]
    fn indexes_unique_entities() {
        let map = index_by_id(vec![Row { id: 1, label: "a" }, Row { id: 2, label: "b" }]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&2].label, "b");
    }

    #[test]
    fn reports_first_duplicate() {
        let err = index_by_id(vec![
            Row { id: 7, label: "a" },
            Row { id: 8, label: "b" },
            Row { id: 7, label: "c" },
        ])
        .unwrap_err();
        assert_eq!(err, 7);
    }
}
