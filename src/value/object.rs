use indexmap::IndexMap;

use super::Cell;

/// An object value: a mapping from string key to cell, plus insertion
/// order for iteration and JSON emission. Backed by an `IndexMap` so that
/// re-assigning an existing key leaves its position untouched and
/// deletion (`shift_remove`) preserves the order of the keys that remain.
#[derive(Clone, Default)]
pub struct ObjectValue {
    entries: IndexMap<String, Cell>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Cell) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Cell> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cell)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, Cell)> for ObjectValue {
    fn from_iter<T: IntoIterator<Item = (String, Cell)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
