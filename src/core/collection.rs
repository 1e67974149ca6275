//! Ordered, observable collection
//!
//! Every mutation is reported through [`BindableCollection::changed`]
//! synchronously, after the mutation is applied and in the order mutations
//! happen. Collection conductors rely on this to keep parent links in sync.

use std::sync::Mutex;

use super::events::{lock, EventChannel};

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    Added { index: usize, items: Vec<T> },
    Removed { index: usize, items: Vec<T> },
    Replaced { index: usize, old: T, new: T },
    /// The collection was rebuilt; `items` is its full new content.
    Reset { items: Vec<T> },
}

pub struct BindableCollection<T> {
    items: Mutex<Vec<T>>,
    changed: EventChannel<CollectionChange<T>>,
}

impl<T> Default for BindableCollection<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BindableCollection<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            changed: EventChannel::new(),
        }
    }

    pub fn changed(&self) -> &EventChannel<CollectionChange<T>> {
        &self.changed
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.items).get(index).cloned()
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        lock(&self.items).iter().position(|candidate| candidate == item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.position(item).is_some()
    }

    pub fn push(&self, item: T) {
        let index = {
            let mut items = lock(&self.items);
            items.push(item.clone());
            items.len() - 1
        };
        self.changed.emit(&CollectionChange::Added {
            index,
            items: vec![item],
        });
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, item: T) {
        let index = {
            let mut items = lock(&self.items);
            let index = index.min(items.len());
            items.insert(index, item.clone());
            index
        };
        self.changed.emit(&CollectionChange::Added {
            index,
            items: vec![item],
        });
    }

    pub fn remove(&self, item: &T) -> bool {
        match self.position(item) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    pub fn remove_at(&self, index: usize) -> Option<T> {
        let removed = {
            let mut items = lock(&self.items);
            (index < items.len()).then(|| items.remove(index))
        }?;
        self.changed.emit(&CollectionChange::Removed {
            index,
            items: vec![removed.clone()],
        });
        Some(removed)
    }

    /// Remove each of `targets` that is present, one notification per item.
    pub fn remove_all(&self, targets: &[T]) -> usize {
        targets.iter().filter(|target| self.remove(target)).count()
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn replace(&self, index: usize, item: T) -> Option<T> {
        let old = {
            let mut items = lock(&self.items);
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item.clone())
        };
        self.changed.emit(&CollectionChange::Replaced {
            index,
            old: old.clone(),
            new: item,
        });
        Some(old)
    }

    pub fn reset(&self, items: Vec<T>) {
        *lock(&self.items) = items.clone();
        self.changed.emit(&CollectionChange::Reset { items });
    }

    pub fn clear(&self) {
        self.reset(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recorded() -> (BindableCollection<&'static str>, Arc<Mutex<Vec<CollectionChange<&'static str>>>>) {
        let collection = BindableCollection::new();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        collection
            .changed()
            .subscribe(move |change| sink.lock().unwrap().push(change.clone()));
        (collection, changes)
    }

    #[test]
    fn test_mutations_are_reported_in_order() {
        let (collection, changes) = recorded();
        collection.push("a");
        collection.push("c");
        collection.insert(1, "b");
        assert_eq!(collection.snapshot(), vec!["a", "b", "c"]);

        assert!(collection.remove(&"a"));
        assert!(!collection.remove(&"missing"));
        assert_eq!(collection.replace(0, "B"), Some("b"));
        collection.clear();

        assert_eq!(
            *changes.lock().unwrap(),
            vec![
                CollectionChange::Added { index: 0, items: vec!["a"] },
                CollectionChange::Added { index: 1, items: vec!["c"] },
                CollectionChange::Added { index: 1, items: vec!["b"] },
                CollectionChange::Removed { index: 0, items: vec!["a"] },
                CollectionChange::Replaced { index: 0, old: "b", new: "B" },
                CollectionChange::Reset { items: vec![] },
            ]
        );
    }

    #[test]
    fn test_out_of_range_operations() {
        let (collection, changes) = recorded();
        collection.insert(10, "tail");
        assert_eq!(collection.position(&"tail"), Some(0));
        assert_eq!(collection.remove_at(5), None);
        assert_eq!(collection.replace(5, "x"), None);
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_all_skips_missing() {
        let (collection, _changes) = recorded();
        collection.reset(vec!["a", "b", "c"]);
        assert_eq!(collection.remove_all(&["c", "z", "a"]), 2);
        assert_eq!(collection.snapshot(), vec!["b"]);
    }
}
