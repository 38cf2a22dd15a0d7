// src/backend/memory.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! In-memory `ImageBackend` fixture used by this crate's own test suite.
//! Lets the resolver, extractor and dispatcher be exercised deterministically
//! without an installed sleuthkit toolchain or a real disk image.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{BackendError, BackendOptions, Entry, EntryKind, ImageBackend, ImageSource, Partition};

#[derive(Default)]
pub struct MemoryBackend {
    partitions: Vec<Partition>,
    entries: HashMap<u32, Vec<Entry>>,
    contents: HashMap<(u32, u64), Vec<u8>>,
    extract_calls: Vec<(u32, u64)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_partition(&mut self, partition: Partition) -> &mut Self {
        self.entries.entry(partition.slot).or_default();
        self.partitions.push(partition);
        self
    }

    /// Adds a directory entry under `parent_path` (`""` for partition root).
    pub fn add_dir(&mut self, slot: u32, inode: u64, parent_path: &str, name: &str) -> &mut Self {
        self.entries.entry(slot).or_default().push(Entry {
            inode,
            kind: EntryKind::Directory,
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            size: None,
        });
        self
    }

    /// Adds a file entry with literal byte content.
    pub fn add_file(
        &mut self,
        slot: u32,
        inode: u64,
        parent_path: &str,
        name: &str,
        content: &[u8],
    ) -> &mut Self {
        self.entries.entry(slot).or_default().push(Entry {
            inode,
            kind: EntryKind::File,
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            size: Some(content.len() as u64),
        });
        self.contents.insert((slot, inode), content.to_vec());
        self
    }

    /// How many times `extract` was actually invoked for `(partition, inode)`
    /// -- used by the idempotence test in the extractor module.
    pub fn extract_call_count(&self, slot: u32, inode: u64) -> usize {
        self.extract_calls
            .iter()
            .filter(|(s, i)| *s == slot && *i == inode)
            .count()
    }
}

impl ImageBackend for MemoryBackend {
    fn list_partitions(
        &self,
        _image: &ImageSource,
        _opts: &BackendOptions,
    ) -> Result<Vec<Partition>, BackendError> {
        Ok(self.partitions.clone())
    }

    fn list_entries(&mut self, partition: &Partition) -> Result<&[Entry], BackendError> {
        self.entries
            .get(&partition.slot)
            .map(Vec::as_slice)
            .ok_or_else(|| BackendError::EntryList {
                partition: partition.slot,
                reason: "unknown partition slot".to_string(),
            })
    }

    fn extract(
        &mut self,
        partition: &Partition,
        entry: &Entry,
        dest: &Path,
    ) -> Result<(), BackendError> {
        self.extract_calls.push((partition.slot, entry.inode));
        match entry.kind {
            EntryKind::Directory => {
                fs::create_dir_all(dest).map_err(|e| BackendError::Extract {
                    partition: partition.slot,
                    entry: entry.path(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }
            EntryKind::File => {
                let bytes = self
                    .contents
                    .get(&(partition.slot, entry.inode))
                    .ok_or_else(|| BackendError::Extract {
                        partition: partition.slot,
                        entry: entry.path(),
                        reason: "no content registered for inode".to_string(),
                    })?;
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| BackendError::Extract {
                        partition: partition.slot,
                        entry: entry.path(),
                        reason: e.to_string(),
                    })?;
                }
                fs::write(dest, bytes).map_err(|e| BackendError::Extract {
                    partition: partition.slot,
                    entry: entry.path(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
