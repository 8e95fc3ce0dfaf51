use std::fmt;
use std::fmt::Display;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static ENTITY_ID_HEAD: AtomicU64 = AtomicU64::new(1);

/// An `EntityId` uniquely identifies a single entity
///
/// Ids are allocated from a process-wide counter and never reused, so an id
/// keeps naming the same entity even after that entity is destroyed. Consuming
/// code uses `EntityId` values to key lookups such as the entity-to-node index
/// inside a [crate::FamilyCache]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn next() -> Self {
        EntityId(ENTITY_ID_HEAD.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::EntityId;

    #[test]
    fn ids_are_unique() {
        let a = EntityId::next();
        let b = EntityId::next();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
