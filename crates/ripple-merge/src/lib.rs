//! Sorted, duplicate-free merging of message timelines and channel lists.
//!
//! Everything here is pure and synchronous. The left-to-right scan order of
//! [`merge::uniquely_merged`] is load-bearing, so none of it is parallelised.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub mod channels;
pub mod merge;
pub mod messages;

pub use merge::uniquely_merged;

/// One incremental change to an ordered list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange<T> {
    /// Insert, or replace the element with the same identity.
    Upsert(T),
    Remove(T),
}

impl<T> ListChange<T> {
    pub fn item(&self) -> &T {
        match self {
            Self::Upsert(item) | Self::Remove(item) => item,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove(_))
    }
}

/// Splits a batch into removed keys and the surviving upserts.
///
/// Changes apply in batch order: a later change to the same key overrides an
/// earlier one, and the upsert keeps the slot of the key's first appearance.
pub(crate) fn partition_changes<T, K, F>(changes: Vec<ListChange<T>>, key: F) -> (HashSet<K>, Vec<T>)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut removed = HashSet::new();
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(changes.len());

    for change in changes {
        match change {
            ListChange::Upsert(item) => {
                let k = key(&item);
                removed.remove(&k);
                match positions.get(&k) {
                    Some(&slot) => slots[slot] = Some(item),
                    None => {
                        positions.insert(k, slots.len());
                        slots.push(Some(item));
                    }
                }
            }
            ListChange::Remove(item) => {
                let k = key(&item);
                if let Some(&slot) = positions.get(&k) {
                    slots[slot] = None;
                }
                removed.insert(k);
            }
        }
    }

    (removed, slots.into_iter().flatten().collect())
}

/// Keeps the last occurrence of every key, in order of first appearance.
pub(crate) fn dedup_last_wins<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let changes = items.into_iter().map(ListChange::Upsert).collect();
    partition_changes(changes, key).1
}
