// src/extractor.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Extractor
//!
//! Materializes resolved `Entry` values onto the host filesystem under a
//! per-partition `OUTDIR`, honoring the `overwrite` policy and caching by
//! `(partition, entry-id)` so a given entry is only ever pulled through the
//! backend once per run regardless of how many patterns matched it.
//! Partial-write safety (sibling temp file, renamed into place on success)
//! lives in the `ImageBackend::extract` implementations themselves, since
//! both ship with the final destination path already in hand.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::backend::{BackendError, Entry, EntryKind, ImageBackend, Partition};
use crate::path::split_components;

#[derive(Debug)]
pub struct ExtractError(pub BackendError);

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for ExtractError {}

impl From<BackendError> for ExtractError {
    fn from(e: BackendError) -> Self {
        ExtractError(e)
    }
}

/// The on-host materialized form of one matched entry, plus derived metadata
/// used for command-template binding.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub host_path: PathBuf,
    pub entry_path: String,
    pub leaf_name: String,
    pub parent_host_path: PathBuf,
    pub username: String,
}

#[derive(Default)]
pub struct Extractor {
    /// `(partition slot, inode)` -> host path already materialized this run.
    cache: HashMap<(u32, u64), PathBuf>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts `entry` (and, if it is a directory, everything under it)
    /// into `outdir`, returning the top-level `Artifact`.
    pub fn extract(
        &mut self,
        backend: &mut dyn ImageBackend,
        partition: &Partition,
        entry: &Entry,
        outdir: &Path,
        overwrite: bool,
    ) -> Result<Artifact, ExtractError> {
        let rel = entry.path();
        let host_path = host_path_for(outdir, &rel);

        if let Some(cached) = self.cache.get(&(partition.slot, entry.inode)) {
            return Ok(build_artifact(cached.clone(), &rel));
        }

        if !overwrite && host_path.exists() {
            self.cache.insert((partition.slot, entry.inode), host_path.clone());
            return Ok(build_artifact(host_path, &rel));
        }

        match entry.kind {
            EntryKind::File => {
                backend.extract(partition, entry, &host_path)?;
            }
            EntryKind::Directory => {
                backend.extract(partition, entry, &host_path)?;
                self.extract_children(backend, partition, &rel, outdir, overwrite)?;
            }
        }

        self.cache.insert((partition.slot, entry.inode), host_path.clone());
        Ok(build_artifact(host_path, &rel))
    }

    fn extract_children(
        &mut self,
        backend: &mut dyn ImageBackend,
        partition: &Partition,
        parent_rel: &str,
        outdir: &Path,
        overwrite: bool,
    ) -> Result<(), ExtractError> {
        let children: Vec<Entry> = backend
            .list_entries(partition)?
            .iter()
            .filter(|e| e.parent_path == parent_rel)
            .cloned()
            .collect();
        for child in children {
            self.extract(backend, partition, &child, outdir, overwrite)?;
        }
        Ok(())
    }
}

/// Joins a partition-relative, `/`-separated path onto `outdir` using the
/// host's native path component convention.
fn host_path_for(outdir: &Path, rel: &str) -> PathBuf {
    let mut path = outdir.to_path_buf();
    for component in split_components(rel) {
        path.push(component);
    }
    path
}

fn build_artifact(host_path: PathBuf, rel: &str) -> Artifact {
    let leaf_name = host_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent_host_path = host_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| host_path.clone());
    let username = derive_username(rel);
    Artifact {
        host_path,
        entry_path: rel.to_string(),
        leaf_name,
        parent_host_path,
        username,
    }
}

/// A path matching `Users/<X>/...` or `home/<X>/...` (case-insensitively on
/// the prefix) binds `USERNAME` to `<X>`; a path rooted at `root` binds it
/// to `root`; anything else binds it to the empty string.
fn derive_username(rel: &str) -> String {
    let components = split_components(rel);
    match components.as_slice() {
        [first, ..] if first.eq_ignore_ascii_case("root") => "root".to_string(),
        [first, user, ..]
            if first.eq_ignore_ascii_case("users") || first.eq_ignore_ascii_case("home") =>
        {
            user.to_string()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn fixture() -> (MemoryBackend, Partition) {
        let mut backend = MemoryBackend::new();
        let partition = Partition {
            slot: 0,
            fs_type: "NTFS".to_string(),
            start_sector: 2048,
            num_sectors: 1024000,
        };
        backend.add_partition(partition.clone());
        backend.add_dir(0, 1, "", "Users");
        backend.add_dir(0, 2, "Users", "alice");
        backend.add_dir(0, 3, "Users/alice", "Desktop");
        backend.add_file(0, 4, "Users/alice/Desktop", "notes.ini", b"hello");
        (backend, partition)
    }

    #[test]
    fn extracts_file_and_derives_username() {
        let (mut backend, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry {
            inode: 4,
            kind: EntryKind::File,
            parent_path: "Users/alice/Desktop".to_string(),
            name: "notes.ini".to_string(),
            size: Some(5),
        };
        let mut extractor = Extractor::new();
        let artifact = extractor
            .extract(&mut backend, &partition, &entry, dir.path(), true)
            .unwrap();
        assert_eq!(artifact.username, "alice");
        assert_eq!(artifact.leaf_name, "notes.ini");
        assert!(artifact.host_path.exists());
        assert_eq!(std::fs::read(&artifact.host_path).unwrap(), b"hello");
    }

    #[test]
    fn overwrite_false_skips_second_pass_extraction() {
        let (mut backend, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry {
            inode: 4,
            kind: EntryKind::File,
            parent_path: "Users/alice/Desktop".to_string(),
            name: "notes.ini".to_string(),
            size: Some(5),
        };
        let mut extractor = Extractor::new();
        extractor
            .extract(&mut backend, &partition, &entry, dir.path(), false)
            .unwrap();
        assert_eq!(backend.extract_call_count(0, 4), 1);

        // A fresh Extractor (no in-process cache) still must not re-extract
        // because the host file already exists and overwrite=false.
        let mut extractor2 = Extractor::new();
        extractor2
            .extract(&mut backend, &partition, &entry, dir.path(), false)
            .unwrap();
        assert_eq!(backend.extract_call_count(0, 4), 1);
    }

    #[test]
    fn directory_extraction_recurses_into_children() {
        let (mut backend, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry {
            inode: 3,
            kind: EntryKind::Directory,
            parent_path: "Users/alice".to_string(),
            name: "Desktop".to_string(),
            size: None,
        };
        let mut extractor = Extractor::new();
        extractor
            .extract(&mut backend, &partition, &entry, dir.path(), true)
            .unwrap();
        assert!(dir.path().join("Users/alice/Desktop/notes.ini").exists());
    }

    #[test]
    fn root_prefix_derives_root_username() {
        assert_eq!(derive_username("root/.bash_history"), "root");
        assert_eq!(derive_username("Windows/System32/config/SAM"), "");
        assert_eq!(derive_username("home/bob/.ssh/id_rsa"), "bob");
    }
}
