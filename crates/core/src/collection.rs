use crate::{Item, ItemId, Predicate, RngState};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("no item with id {0}")]
    Missing(ItemId),
    #[error("duplicate item id {0}")]
    Duplicate(ItemId),
}

/// The item store the pickers query. Implementations own the items; the core
/// only reads attributes and toggles the deletion mark.
pub trait Collection {
    /// Items satisfying every predicate, evaluated against current state.
    fn query(&self, predicates: &[Predicate]) -> Vec<&Item>;

    fn get(&self, id: ItemId) -> Option<&Item>;

    fn len(&self) -> usize;

    fn mark_for_deletion(&mut self, id: ItemId, marked: bool) -> Result<(), CollectionError>;

    fn delete(&mut self, id: ItemId) -> Result<Item, CollectionError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uniform draw over the current query result.
    fn draw_random(&self, predicates: &[Predicate], rng: &mut RngState) -> Option<Item> {
        let view = self.query(predicates);
        let idx = rng.index(view.len())?;
        view.get(idx).map(|item| (*item).clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    items: BTreeMap<ItemId, Item>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self, CollectionError> {
        let mut collection = Self::new();
        for item in items {
            collection.insert(item)?;
        }
        Ok(collection)
    }

    pub fn insert(&mut self, item: Item) -> Result<(), CollectionError> {
        if self.items.contains_key(&item.id) {
            return Err(CollectionError::Duplicate(item.id));
        }
        self.items.insert(item.id, item);
        Ok(())
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn next_id(&self) -> ItemId {
        self.items
            .keys()
            .next_back()
            .map(|id| id.saturating_add(1))
            .unwrap_or(1)
    }
}

impl Collection for MemoryCollection {
    fn query(&self, predicates: &[Predicate]) -> Vec<&Item> {
        self.items
            .values()
            .filter(|item| Predicate::matches_all(predicates, item))
            .collect()
    }

    fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn mark_for_deletion(&mut self, id: ItemId, marked: bool) -> Result<(), CollectionError> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(CollectionError::Missing(id))?;
        item.marked_for_deletion = marked;
        Ok(())
    }

    fn delete(&mut self, id: ItemId) -> Result<Item, CollectionError> {
        self.items.remove(&id).ok_or(CollectionError::Missing(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    fn sample() -> MemoryCollection {
        MemoryCollection::from_items((1..=4).map(|id| {
            Item::new(id, "jpg").with_attr("favorite", AttrValue::Flag(id % 2 == 0))
        }))
        .expect("collection")
    }

    #[test]
    fn query_reflects_live_marks() {
        let mut store = sample();
        let marked = [Predicate::MarkedForDeletion];
        assert!(store.query(&marked).is_empty());
        store.mark_for_deletion(3, true).expect("mark");
        let ids: Vec<ItemId> = store.query(&marked).iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn draw_random_respects_predicates() {
        let store = sample();
        let mut rng = RngState::from_seed(5);
        let favorites = [Predicate::FlagSet("favorite".to_string())];
        for _ in 0..50 {
            let item = store.draw_random(&favorites, &mut rng).expect("item");
            assert_eq!(item.id % 2, 0);
        }
    }

    #[test]
    fn duplicate_and_missing_ids_error() {
        let mut store = sample();
        assert_eq!(
            store.insert(Item::new(2, "png")),
            Err(CollectionError::Duplicate(2))
        );
        assert_eq!(store.delete(9), Err(CollectionError::Missing(9)));
        assert_eq!(store.delete(2).map(|item| item.id), Ok(2));
        assert_eq!(store.len(), 3);
        assert_eq!(store.next_id(), 5);
    }
}
