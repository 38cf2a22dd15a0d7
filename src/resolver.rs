// src/resolver.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Selector Resolver
//!
//! Turns a `PathPattern` into the concrete `Entry` set it matches within one
//! partition. Walks the pattern segment by segment from the partition root,
//! narrowing the candidate set at each step; a pattern ending on a directory
//! resolves to that directory entry itself, not its contents (the Extractor
//! handles recursive materialization separately). Results are cached per
//! `(partition, pattern)` so a pattern reused across `FileSpec`s or dispatch
//! retries does not re-walk the entry list.

use std::collections::HashMap;

use crate::backend::{BackendError, Entry, ImageBackend, Partition};
use crate::path::PathPattern;

#[derive(Default)]
pub struct Resolver {
    cache: HashMap<(u32, String), Vec<Entry>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `pattern` against `partition`, returning matched entries in
    /// deterministic order (sorted by partition-relative path).
    pub fn resolve(
        &mut self,
        backend: &mut dyn ImageBackend,
        partition: &Partition,
        pattern: &PathPattern,
    ) -> Result<Vec<Entry>, BackendError> {
        let cache_key = (partition.slot, pattern.raw().to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached.clone());
        }

        let entries = backend.list_entries(partition)?;
        let mut result = walk(entries, pattern);
        result.sort_by(|a, b| a.path().cmp(&b.path()));

        self.cache.insert(cache_key, result.clone());
        Ok(result)
    }
}

fn walk(entries: &[Entry], pattern: &PathPattern) -> Vec<Entry> {
    if pattern.is_empty() {
        return Vec::new();
    }

    let mut by_parent: HashMap<&str, Vec<&Entry>> = HashMap::new();
    for e in entries {
        by_parent.entry(e.parent_path.as_str()).or_default().push(e);
    }

    // Each live path is the partition-relative path of a candidate matched
    // so far; seeded with the root ("").
    let mut frontier: Vec<String> = vec![String::new()];
    for segment in &pattern.segments {
        let mut next = Vec::new();
        for parent in &frontier {
            let Some(children) = by_parent.get(parent.as_str()) else {
                continue;
            };
            for child in children {
                if segment.matches(&child.name) {
                    next.push(child.path());
                }
            }
        }
        frontier = next;
    }

    let mut by_path: HashMap<String, &Entry> = HashMap::new();
    for e in entries {
        by_path.insert(e.path(), e);
    }
    frontier
        .into_iter()
        .filter_map(|p| by_path.get(&p).map(|e| (*e).clone()))
        .collect()
}
