//! In-memory list state. Every mutation is synchronous and visible to the
//! next read; the reconciler is the only writer.

use std::fmt;

use shared::domain::{Item, ItemId, ItemName};

use crate::error::StoreError;

/// Store key of an entry. Provisional keys belong to items whose creation has
/// not been confirmed and never leave the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Provisional(u64),
    Remote(ItemId),
}

impl EntryKey {
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(n) => write!(f, "provisional#{n}"),
            Self::Remote(id) => write!(f, "{id}"),
        }
    }
}

impl From<ItemId> for EntryKey {
    fn from(value: ItemId) -> Self {
        Self::Remote(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub key: EntryKey,
    pub name: ItemName,
    pub checked: bool,
}

impl ListEntry {
    pub fn provisional(n: u64, name: ItemName) -> Self {
        Self {
            key: EntryKey::Provisional(n),
            name,
            checked: false,
        }
    }

    /// The confirmed item, if this entry has a server id.
    pub fn item(&self) -> Option<Item> {
        self.key.item_id().map(|id| Item {
            id: id.clone(),
            name: self.name.clone(),
            checked: self.checked,
        })
    }
}

impl From<Item> for ListEntry {
    fn from(value: Item) -> Self {
        Self {
            key: EntryKey::Remote(value.id),
            name: value.name,
            checked: value.checked,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<ItemName>,
    pub checked: Option<bool>,
}

impl ItemPatch {
    pub fn checked(checked: bool) -> Self {
        Self {
            name: None,
            checked: Some(checked),
        }
    }
}

/// Where a removed entry sat: its predecessor at removal time and its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub after: Option<EntryKey>,
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    entries: Vec<ListEntry>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, key: &EntryKey) -> bool {
        self.position(key).is_some()
    }

    pub fn position(&self, key: &EntryKey) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.key == key)
    }

    pub fn get(&self, key: &EntryKey) -> Option<&ListEntry> {
        self.entries.iter().find(|entry| &entry.key == key)
    }

    /// Appends at the end of the display order.
    pub fn insert(&mut self, entry: ListEntry) -> Result<(), StoreError> {
        if self.has(&entry.key) {
            return Err(StoreError::Conflict(entry.key));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Reinserts after the anchor's predecessor, falling back to its old
    /// index (clamped) when the predecessor is gone.
    pub fn insert_at(&mut self, anchor: &Anchor, entry: ListEntry) -> Result<usize, StoreError> {
        if self.has(&entry.key) {
            return Err(StoreError::Conflict(entry.key));
        }
        let index = match &anchor.after {
            None => 0,
            Some(prev) => match self.position(prev) {
                Some(pos) => pos + 1,
                None => anchor.index.min(self.entries.len()),
            },
        };
        self.entries.insert(index, entry);
        Ok(index)
    }

    pub fn remove(&mut self, key: &EntryKey) -> Result<(Anchor, ListEntry), StoreError> {
        let index = self
            .position(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let after = index
            .checked_sub(1)
            .map(|prev| self.entries[prev].key.clone());
        let entry = self.entries.remove(index);
        Ok((Anchor { after, index }, entry))
    }

    /// Applies the patch and returns the entry as it was before.
    pub fn update(&mut self, key: &EntryKey, patch: ItemPatch) -> Result<ListEntry, StoreError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| &entry.key == key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let previous = entry.clone();
        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(checked) = patch.checked {
            entry.checked = checked;
        }
        Ok(previous)
    }

    /// Swaps the entry under `key` for `entry`, keeping its position.
    pub fn replace(&mut self, key: &EntryKey, entry: ListEntry) -> Result<ListEntry, StoreError> {
        let index = self
            .position(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if &entry.key != key && self.has(&entry.key) {
            return Err(StoreError::Conflict(entry.key));
        }
        Ok(std::mem::replace(&mut self.entries[index], entry))
    }

    /// Replaces the whole collection. Later duplicates of a key are dropped.
    pub fn reset(&mut self, entries: impl IntoIterator<Item = ListEntry>) {
        self.entries.clear();
        for entry in entries {
            if !self.has(&entry.key) {
                self.entries.push(entry);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
