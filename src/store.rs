#[cfg(feature = "bincode")]
use bincode;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::normalize::normalize_in_place;
use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// One image of the dataset: canonical file name plus its descriptor.
pub struct DatasetEntry {
    pub identifier: String,
    pub descriptor: Descriptor,
}

impl DatasetEntry {
    pub fn new<S: Into<String>>(identifier: S, descriptor: Descriptor) -> Self {
        Self {
            identifier: identifier.into(),
            descriptor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// Static, in-memory dataset. Can be:
/// 1. Built entry by entry or from a feature table.
/// 2. Saved to a file & loaded from a file (requires bincode feature, enabled by default).
/// 3. Queried by identifier or scanned in insertion order by the ranker.
pub struct DatasetStore {
    entries: Vec<DatasetEntry>,
    index: HashMap<String, usize>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate identifiers.
    pub fn from_entries<I: IntoIterator<Item = DatasetEntry>>(entries: I) -> HbowResult<Self> {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry)?;
        }
        Ok(store)
    }

    /// Add an entry. A second entry with the same identifier is an error, never a silent
    /// replacement.
    pub fn insert(&mut self, entry: DatasetEntry) -> HbowResult<()> {
        if self.index.contains_key(&entry.identifier) {
            return Err(HbowErr::DuplicateIdentifier(entry.identifier));
        }
        self.index.insert(entry.identifier.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<&Descriptor> {
        self.index.get(identifier).map(|&i| &self.entries[i].descriptor)
    }

    /// Like `get`, failing with `UnknownIdentifier`.
    pub fn require(&self, identifier: &str) -> HbowResult<&Descriptor> {
        self.get(identifier)
            .ok_or_else(|| HbowErr::UnknownIdentifier(identifier.to_string()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize every entry in place. Entries with an all-zero histogram are dropped
    /// with a warning. Returns the number of dropped entries.
    pub fn normalize_all(&mut self) -> usize {
        let before = self.entries.len();
        let mut kept = Vec::with_capacity(before);
        for mut entry in self.entries.drain(..) {
            match normalize_in_place(&mut entry.descriptor) {
                Ok(()) => kept.push(entry),
                Err(e) => warn!(target: "hbow::store", "dropping `{}`: {}", entry.identifier, e),
            }
        }
        self.entries = kept;
        self.reindex();
        before - self.entries.len()
    }

    /// Append each entry's embedding (looked up by identifier in `embeddings`) after its
    /// existing fields. Entries with no embedding are skipped with a warning.
    pub fn attach(&self, embeddings: &DatasetStore) -> DatasetStore {
        let mut out = DatasetStore::new();
        for entry in &self.entries {
            match embeddings.get(&entry.identifier) {
                Some(extra) => {
                    let descriptor = entry.descriptor.clone().concat(extra.clone());
                    out.index.insert(entry.identifier.clone(), out.entries.len());
                    out.entries.push(DatasetEntry::new(entry.identifier.clone(), descriptor));
                }
                None => warn!(target: "hbow::store", "no embedding for `{}`, skipping", entry.identifier),
            }
        }
        debug!(target: "hbow::store", "attached embeddings to {} of {} entries", out.len(), self.len());
        out
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.identifier.clone(), i))
            .collect();
    }

    /// Load a dataset snapshot from a file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> HbowResult<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        let entries: Vec<DatasetEntry> = bincode::deserialize(&buffer)?;
        Self::from_entries(entries)
    }

    /// Save dataset snapshot to a file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> HbowResult<()> {
        let serialized = bincode::serialize(&self.entries)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DatasetStore {
    type Item = &'a DatasetEntry;
    type IntoIter = std::slice::Iter<'a, DatasetEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
