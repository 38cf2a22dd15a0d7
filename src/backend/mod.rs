// src/backend/mod.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Image Backend Adapter
//!
//! A thin facade over the partition lister / directory lister / content
//! extractor. The real implementation shells out to a sleuthkit-style
//! toolchain (`mmls`, `fls`, `icat`); an in-memory fixture is used by this
//! crate's own tests so the rest of the engine can be exercised without an
//! installed toolchain or a real disk image.

mod memory;
mod tsk;

pub use memory::MemoryBackend;
pub use tsk::TskBackend;

use std::fmt;
use std::path::{Path, PathBuf};

/// A 1:1 analogue of `-t`'s enumerated volume-system types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSystemType {
    Bsd,
    Mac,
    Gpt,
    Dos,
    Sun,
}

impl VolumeSystemType {
    pub fn as_tsk_arg(self) -> &'static str {
        match self {
            Self::Bsd => "bsd",
            Self::Mac => "mac",
            Self::Gpt => "gpt",
            Self::Dos => "dos",
            Self::Sun => "sun",
        }
    }

    pub const ALL: &'static [&'static str] = &["bsd", "mac", "gpt", "dos", "sun"];
}

/// A 1:1 analogue of `-i`'s enumerated image format types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Afm,
    Vhd,
    Vmdk,
    Aff,
    Afflib,
    Ewf,
    Afd,
    Raw,
}

impl ImageFormat {
    pub fn as_tsk_arg(self) -> &'static str {
        match self {
            Self::Afm => "afm",
            Self::Vhd => "vhd",
            Self::Vmdk => "vmdk",
            Self::Aff => "aff",
            Self::Afflib => "afflib",
            Self::Ewf => "ewf",
            Self::Afd => "afd",
            Self::Raw => "raw",
        }
    }

    pub const ALL: &'static [&'static str] = &[
        "afm", "vhd", "vmdk", "aff", "afflib", "ewf", "afd", "raw",
    ];
}

/// Options threaded through to the backend for opening an image.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub tool_dir: Option<PathBuf>,
    pub vstype: Option<VolumeSystemType>,
    pub imgtype: Option<ImageFormat>,
    pub sector_size: Option<u32>,
    pub offset: Option<u64>,
}

/// A file or image path set the backend treats as one logical image (split
/// images are concatenated by the backend itself).
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub paths: Vec<PathBuf>,
}

impl ImageSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// A volume within the image, identified by its slot in the volume system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub slot: u32,
    pub fs_type: String,
    pub start_sector: u64,
    pub num_sectors: u64,
}

impl Partition {
    /// Whether this partition's filesystem type is one of the eligible
    /// types for defaulted-all-partitions mode. Comparison is ASCII
    /// case-insensitive since backends vary in how they capitalize `NTFS`.
    pub fn is_eligible(&self, eligible_types: &[String]) -> bool {
        eligible_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&self.fs_type))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A name inside a partition's filesystem tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub inode: u64,
    pub kind: EntryKind,
    /// Partition-relative path to this entry's parent directory, `""` for
    /// entries directly under the partition root.
    pub parent_path: String,
    pub name: String,
    pub size: Option<u64>,
}

impl Entry {
    /// The full partition-relative path to this entry.
    pub fn path(&self) -> String {
        if self.parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent_path, self.name)
        }
    }
}

#[derive(Debug)]
pub enum BackendError {
    Unavailable(String),
    PartitionList(String),
    EntryList { partition: u32, reason: String },
    Extract { partition: u32, entry: String, reason: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "image backend unavailable: {msg}"),
            Self::PartitionList(msg) => write!(f, "failed to list partitions: {msg}"),
            Self::EntryList { partition, reason } => {
                write!(f, "failed to list entries on partition {partition}: {reason}")
            }
            Self::Extract {
                partition,
                entry,
                reason,
            } => write!(
                f,
                "failed to extract {entry} from partition {partition}: {reason}"
            ),
        }
    }
}
impl std::error::Error for BackendError {}

/// Facade over the partition lister / directory lister / content
/// extractor. `list_entries` must memoize its result per partition for the
/// lifetime of the backend handle (the Selector Resolver relies on this to
/// avoid redundant expensive image reads).
pub trait ImageBackend {
    fn list_partitions(
        &self,
        image: &ImageSource,
        opts: &BackendOptions,
    ) -> Result<Vec<Partition>, BackendError>;

    fn list_entries(&mut self, partition: &Partition) -> Result<&[Entry], BackendError>;

    fn extract(
        &mut self,
        partition: &Partition,
        entry: &Entry,
        dest: &Path,
    ) -> Result<(), BackendError>;
}
