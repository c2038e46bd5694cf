//! Shared filter slots of a dataset
//!
//! Every dimension owns one slot holding its current filter as SQL text.
//! Queries AND together every non-empty slot, except the ones they choose
//! to exclude (their own slot, and the target slot of a multi-aggregate).

pub mod value;

pub use value::{AppliedFilter, FilterItem, FilterKey, FilterOptions, FilterValue, RangeKey};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stable handle to a filter slot. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(u64);

impl SlotId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// How a write changed a slot, seen from the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTransition {
    /// Empty before and after
    Unchanged,
    /// Empty before, non-empty after
    Applied,
    /// Non-empty before, non-empty after
    Replaced,
    /// Non-empty before, empty after
    Cleared,
}

impl SlotTransition {
    fn between(before: &str, after: &str) -> Self {
        match (before.is_empty(), after.is_empty()) {
            (true, true) => SlotTransition::Unchanged,
            (true, false) => SlotTransition::Applied,
            (false, false) => SlotTransition::Replaced,
            (false, true) => SlotTransition::Cleared,
        }
    }
}

/// Ordered filter slots plus the optional target slot
#[derive(Debug, Default)]
pub struct FilterStore {
    slots: IndexMap<SlotId, String>,
    next_id: u64,
    target: Option<SlotId>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new empty slot
    pub fn allocate(&mut self) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, String::new());
        id
    }

    pub fn get(&self, slot: SlotId) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Overwrite a live slot. Writes to retired slots are ignored.
    pub fn set(&mut self, slot: SlotId, text: String) -> SlotTransition {
        match self.slots.get_mut(&slot) {
            Some(current) => {
                let transition = SlotTransition::between(current, &text);
                *current = text;
                transition
            }
            None => {
                tracing::debug!("ignoring write to retired {}", slot);
                SlotTransition::Unchanged
            }
        }
    }

    pub fn clear(&mut self, slot: SlotId) -> SlotTransition {
        self.set(slot, String::new())
    }

    /// Remove a slot for good, keeping the order of the others
    pub fn retire(&mut self, slot: SlotId) -> SlotTransition {
        if self.target == Some(slot) {
            self.target = None;
        }
        match self.slots.shift_remove(&slot) {
            Some(text) => SlotTransition::between(&text, ""),
            None => SlotTransition::Unchanged,
        }
    }

    /// Empty every slot, returning the ones that held a filter
    pub fn clear_all(&mut self) -> Vec<SlotId> {
        let mut cleared = Vec::new();
        for (id, text) in self.slots.iter_mut() {
            if !text.is_empty() {
                text.clear();
                cleared.push(*id);
            }
        }
        cleared
    }

    pub fn target(&self) -> Option<SlotId> {
        self.target
    }

    /// Designate the slot whose filter multi-aggregates substitute into
    /// their target measure
    pub fn set_target(&mut self, slot: Option<SlotId>) {
        self.target = slot.filter(|s| self.slots.contains_key(s));
    }

    /// Current text of the target slot, when set and non-empty
    pub fn target_filter(&self) -> Option<&str> {
        self.target
            .and_then(|t| self.get(t))
            .filter(|text| !text.is_empty())
    }

    /// Non-empty filters in slot order, skipping `exclude`
    pub fn active_filters(&self, exclude: &[SlotId]) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(id, text)| !text.is_empty() && !exclude.contains(id))
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &str)> {
        self.slots.iter().map(|(id, text)| (*id, text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_filters_skip_empty_and_excluded() {
        let mut store = FilterStore::new();
        let a = store.allocate();
        let b = store.allocate();
        let c = store.allocate();
        store.set(a, "x = 1".into());
        store.set(c, "z = 3".into());

        assert_eq!(store.active_filters(&[]), vec!["x = 1", "z = 3"]);
        assert_eq!(store.active_filters(&[a]), vec!["z = 3"]);
        assert_eq!(store.get(b), Some(""));
    }

    #[test]
    fn test_transitions() {
        let mut store = FilterStore::new();
        let a = store.allocate();
        assert_eq!(store.clear(a), SlotTransition::Unchanged);
        assert_eq!(store.set(a, "x = 1".into()), SlotTransition::Applied);
        assert_eq!(store.set(a, "x = 2".into()), SlotTransition::Replaced);
        assert_eq!(store.clear(a), SlotTransition::Cleared);
    }

    #[test]
    fn test_retired_slots_are_never_reused() {
        let mut store = FilterStore::new();
        let a = store.allocate();
        let b = store.allocate();
        store.set(a, "x = 1".into());
        store.set_target(Some(a));

        assert_eq!(store.retire(a), SlotTransition::Cleared);
        assert_eq!(store.target(), None);
        assert_eq!(store.set(a, "x = 9".into()), SlotTransition::Unchanged);

        let c = store.allocate();
        assert_ne!(c, a);
        assert_eq!(store.slots().map(|(id, _)| id).collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn test_target_filter_requires_text() {
        let mut store = FilterStore::new();
        let a = store.allocate();
        store.set_target(Some(a));
        assert_eq!(store.target_filter(), None);
        store.set(a, "dest_state = 'CA'".into());
        assert_eq!(store.target_filter(), Some("dest_state = 'CA'"));
    }
}
