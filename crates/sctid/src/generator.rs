//! In-process SCTID allocation.
//!
//! The generator mirrors the reserve/register/release vocabulary of a SNOMED
//! CT component identifier service: ids are *reserved* ahead of the commit
//! that embeds them, *registered* (permanently assigned) when that commit
//! succeeds, and *released* when the editing session is abandoned. A released
//! id goes back to being unknown, but an id that was ever registered is never
//! issued again, so concurrent sessions cannot observe the same id with two
//! different meanings.

use crate::sctid::{
    MAX_LONG_ITEM_ID, MAX_SHORT_ITEM_ID, MIN_LONG_ITEM_ID, MIN_SHORT_ITEM_ID,
};
use crate::{Namespace, PartitionCategory, SctId, SctIdError, SctIdResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One item-id space: a single namespace (or the International short-format
/// partition) crossed with a component category.
#[derive(Default)]
struct ItemIdSpace {
    /// Next candidate item id; item ids are probed sequentially.
    next: u64,
    reserved: HashSet<u64>,
    assigned: HashSet<u64>,
}

/// Thread-safe SCTID allocator.
///
/// A single generator is shared per store; all methods take `&self` and
/// serialize on an internal lock so concurrent reservations never overlap.
pub struct SctIdGenerator {
    spaces: Mutex<HashMap<(Option<Namespace>, PartitionCategory), ItemIdSpace>>,
}

impl Default for SctIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SctIdGenerator {
    pub fn new() -> Self {
        Self {
            spaces: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves `quantity` fresh identifiers in the given namespace and category.
    ///
    /// The returned ids are unique across all concurrent callers. They stay
    /// reserved until either [`register`](Self::register) or
    /// [`release`](Self::release) is called for them.
    ///
    /// # Errors
    ///
    /// [`SctIdError::NamespaceExhausted`] when the item-id space has no
    /// `quantity` free ids left; in that case nothing is reserved.
    pub fn reserve(
        &self,
        namespace: Option<Namespace>,
        category: PartitionCategory,
        quantity: usize,
    ) -> SctIdResult<Vec<SctId>> {
        if quantity == 0 {
            return Err(SctIdError::EmptyReservation);
        }

        let (min, max) = item_id_bounds(namespace);
        if quantity as u64 > max - min + 1 {
            return Err(SctIdError::NamespaceExhausted {
                namespace: namespace
                    .map(|ns| ns.to_string())
                    .unwrap_or_else(|| "INT".to_owned()),
                category,
            });
        }
        let mut spaces = self.spaces.lock().expect("sctid generator lock poisoned");
        let space = spaces.entry((namespace, category)).or_insert_with(|| ItemIdSpace {
            next: min,
            ..ItemIdSpace::default()
        });

        let mut picked = Vec::with_capacity(quantity);
        let mut candidate = space.next;
        while picked.len() < quantity {
            if candidate > max {
                // Roll back: the ids picked so far were never visible outside
                // the lock, so dropping them is safe.
                for id in &picked {
                    space.reserved.remove(id);
                }
                return Err(SctIdError::NamespaceExhausted {
                    namespace: namespace
                        .map(|ns| ns.to_string())
                        .unwrap_or_else(|| "INT".to_owned()),
                    category,
                });
            }
            if !space.reserved.contains(&candidate) && !space.assigned.contains(&candidate) {
                space.reserved.insert(candidate);
                picked.push(candidate);
            }
            candidate += 1;
        }
        space.next = candidate;

        picked
            .into_iter()
            .map(|item_id| match namespace {
                Some(ns) => SctId::new_long(item_id, ns, category),
                None => SctId::new_short(item_id, category),
            })
            .collect()
    }

    /// Marks previously reserved ids as permanently assigned.
    ///
    /// Ids the generator has never seen are accepted too, so that content
    /// loaded from elsewhere (for example the International edition itself)
    /// blocks its item ids from future reservation.
    pub fn register<'a>(&self, ids: impl IntoIterator<Item = &'a SctId>) {
        let mut spaces = self.spaces.lock().expect("sctid generator lock poisoned");
        for id in ids {
            let (min, _) = item_id_bounds(id.namespace());
            let space = spaces
                .entry((id.namespace(), id.category()))
                .or_insert_with(|| ItemIdSpace {
                    next: min,
                    ..ItemIdSpace::default()
                });
            space.reserved.remove(&id.item_id());
            space.assigned.insert(id.item_id());
        }
    }

    /// Releases reservations that will not be committed.
    ///
    /// Assigned ids are untouched; releasing an id that was never reserved is
    /// a no-op.
    pub fn release<'a>(&self, ids: impl IntoIterator<Item = &'a SctId>) {
        let mut spaces = self.spaces.lock().expect("sctid generator lock poisoned");
        for id in ids {
            if let Some(space) = spaces.get_mut(&(id.namespace(), id.category())) {
                space.reserved.remove(&id.item_id());
            }
        }
    }

    /// True if the id is currently reserved but not yet registered.
    pub fn is_reserved(&self, id: &SctId) -> bool {
        let spaces = self.spaces.lock().expect("sctid generator lock poisoned");
        spaces
            .get(&(id.namespace(), id.category()))
            .is_some_and(|space| space.reserved.contains(&id.item_id()))
    }
}

fn item_id_bounds(namespace: Option<Namespace>) -> (u64, u64) {
    match namespace {
        Some(_) => (MIN_LONG_ITEM_ID, MAX_LONG_ITEM_ID),
        None => (MIN_SHORT_ITEM_ID, MAX_SHORT_ITEM_ID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_namespace() -> Namespace {
        Namespace::new(1000154).unwrap()
    }

    #[test]
    fn reserves_distinct_ids() {
        let generator = SctIdGenerator::new();
        let ids = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 5)
            .unwrap();
        assert_eq!(ids.len(), 5);
        let unique: HashSet<_> = ids.iter().map(|id| id.as_str().to_owned()).collect();
        assert_eq!(unique.len(), 5);
        for id in &ids {
            assert!(generator.is_reserved(id));
            assert_eq!(id.namespace(), Some(test_namespace()));
        }
    }

    #[test]
    fn categories_do_not_share_item_id_spaces() {
        let generator = SctIdGenerator::new();
        let concept = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 1)
            .unwrap();
        let description = generator
            .reserve(Some(test_namespace()), PartitionCategory::Description, 1)
            .unwrap();
        // Same item id, different partition digits.
        assert_eq!(concept[0].item_id(), description[0].item_id());
        assert_ne!(concept[0].as_str(), description[0].as_str());
    }

    #[test]
    fn released_ids_are_not_reissued_but_registered_ids_stay_blocked() {
        let generator = SctIdGenerator::new();
        let first = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 1)
            .unwrap();
        generator.release(&first);
        assert!(!generator.is_reserved(&first[0]));

        let second = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 1)
            .unwrap();
        // Sequential probing has moved past the released id.
        assert_ne!(first[0], second[0]);

        generator.register(&second);
        assert!(!generator.is_reserved(&second[0]));
    }

    #[test]
    fn registering_external_ids_blocks_them() {
        let generator = SctIdGenerator::new();
        let external =
            SctId::new_long(1, test_namespace(), PartitionCategory::Concept).unwrap();
        generator.register([&external]);
        let reserved = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 1)
            .unwrap();
        assert_ne!(reserved[0], external);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let generator = SctIdGenerator::new();
        assert!(matches!(
            generator.reserve(None, PartitionCategory::Concept, 0),
            Err(SctIdError::EmptyReservation)
        ));
    }

    #[test]
    fn exhausted_namespace_reports_resource_exhaustion() {
        let generator = SctIdGenerator::new();
        // Asking for more ids than the 8-digit item-id space holds.
        let result = generator.reserve(
            Some(test_namespace()),
            PartitionCategory::Concept,
            (MAX_LONG_ITEM_ID as usize) + 1,
        );
        assert!(matches!(result, Err(SctIdError::NamespaceExhausted { .. })));
        // The failed bulk reservation must not leak partial reservations.
        let retry = generator
            .reserve(Some(test_namespace()), PartitionCategory::Concept, 1)
            .unwrap();
        assert_eq!(retry[0].item_id(), MIN_LONG_ITEM_ID);
    }

    #[test]
    fn concurrent_reservations_never_overlap() {
        let generator = Arc::new(SctIdGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                generator
                    .reserve(Some(test_namespace()), PartitionCategory::Concept, 50)
                    .unwrap()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id.as_str().to_owned()), "duplicate id issued");
            }
        }
        assert_eq!(seen.len(), 8 * 50);
    }
}
