// src/backend/tsk.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Production `ImageBackend`: shells out to a sleuthkit-style toolchain
//! (`mmls`, `fls`, `icat`) and parses their line-oriented textual output.
//! Binaries are resolved from a configurable tool directory (`-T PATH`)
//! when set, falling back to `PATH` lookup otherwise.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;

use super::{
    BackendError, BackendOptions, Entry, EntryKind, ImageBackend, ImageSource, Partition,
};

pub struct TskBackend {
    image: ImageSource,
    opts: BackendOptions,
    entry_cache: HashMap<u32, Vec<Entry>>,
}

impl TskBackend {
    pub fn new(image: ImageSource, opts: BackendOptions) -> Self {
        Self {
            image,
            opts,
            entry_cache: HashMap::new(),
        }
    }

    fn tool_dir(&self) -> &Option<PathBuf> {
        &self.opts.tool_dir
    }

    fn tool_path(&self, name: &str) -> PathBuf {
        match self.tool_dir() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn run_capture(&self, tool: &str, args: &[String]) -> Result<String, String> {
        let output = Command::new(self.tool_path(tool))
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("failed to spawn {tool}: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "{tool} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn mmls_args(image: &ImageSource, opts: &BackendOptions) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(vstype) = opts.vstype {
            args.push("-t".to_string());
            args.push(vstype.as_tsk_arg().to_string());
        }
        if let Some(sector_size) = opts.sector_size {
            args.push("-b".to_string());
            args.push(sector_size.to_string());
        }
        if let Some(offset) = opts.offset {
            args.push("-o".to_string());
            args.push(offset.to_string());
        }
        for path in &image.paths {
            args.push(path.display().to_string());
        }
        args
    }

    /// `mmls -o N` reports each partition's start sector relative to that
    /// offset, but `fls`/`icat` take a single `-o` pointing at the start of
    /// the filesystem within the whole image, so the image-level offset has
    /// to be folded back in here.
    fn volume_offset(&self, partition: &Partition) -> u64 {
        self.opts.offset.unwrap_or(0) + partition.start_sector
    }

    fn fls_args(&self, partition: &Partition) -> Vec<String> {
        let mut args = vec!["-r".to_string(), "-p".to_string()];
        if let Some(imgtype) = self.opts.imgtype {
            args.push("-i".to_string());
            args.push(imgtype.as_tsk_arg().to_string());
        }
        args.push("-o".to_string());
        args.push(self.volume_offset(partition).to_string());
        for path in &self.image.paths {
            args.push(path.display().to_string());
        }
        args
    }

    fn icat_args(&self, partition: &Partition) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(imgtype) = self.opts.imgtype {
            args.push("-i".to_string());
            args.push(imgtype.as_tsk_arg().to_string());
        }
        args.push("-o".to_string());
        args.push(self.volume_offset(partition).to_string());
        for path in &self.image.paths {
            args.push(path.display().to_string());
        }
        args
    }
}

fn parse_mmls(text: &str) -> Result<Vec<Partition>, BackendError> {
    let line_re = Regex::new(
        r"^(?P<slot>\d+):\s+\S+\s+(?P<start>\d+)\s+\d+\s+(?P<len>\d+)\s+(?P<desc>.+?)\s*$",
    )
    .expect("static mmls regex");

    let mut partitions = Vec::new();
    for line in text.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let desc = &caps["desc"];
        if desc.eq_ignore_ascii_case("unallocated") || desc.starts_with("Primary Table") {
            continue;
        }
        let slot: u32 = caps["slot"].parse().map_err(|_| {
            BackendError::PartitionList(format!("unparsable slot in mmls line \"{line}\""))
        })?;
        let start_sector: u64 = caps["start"].parse().map_err(|_| {
            BackendError::PartitionList(format!("unparsable start sector in mmls line \"{line}\""))
        })?;
        let num_sectors: u64 = caps["len"].parse().map_err(|_| {
            BackendError::PartitionList(format!("unparsable length in mmls line \"{line}\""))
        })?;
        partitions.push(Partition {
            slot,
            fs_type: extract_fs_type(desc),
            start_sector,
            num_sectors,
        });
    }
    Ok(partitions)
}

/// `mmls` description fields look like `NTFS (0x07)` or `Linux (0x83)`; the
/// filesystem name is the text before the trailing parenthesized code.
fn extract_fs_type(desc: &str) -> String {
    desc.split('(').next().unwrap_or(desc).trim().to_string()
}

fn parse_fls(text: &str) -> Result<Vec<Entry>, BackendError> {
    let line_re = Regex::new(r"^(?P<meta>[dlrcbs\-])/[dlrcbs\-]\s+(?P<inode>\d+)(?:-\d+)*:\s+(?P<path>.+)$")
        .expect("static fls regex");

    let mut entries = Vec::new();
    for line in text.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let path = caps["path"].trim();
        // fls marks deleted entries with a leading '*'; skip those, this
        // backend surfaces allocated entries only.
        if path.starts_with('*') {
            continue;
        }
        let inode: u64 = caps["inode"].parse().map_err(|_| {
            BackendError::EntryList {
                partition: 0,
                reason: format!("unparsable inode in fls line \"{line}\""),
            }
        })?;
        let kind = if &caps["meta"] == "d" {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), path.to_string()),
        };
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        entries.push(Entry {
            inode,
            kind,
            parent_path,
            name,
            size: None,
        });
    }
    Ok(entries)
}

impl ImageBackend for TskBackend {
    fn list_partitions(
        &self,
        image: &ImageSource,
        opts: &BackendOptions,
    ) -> Result<Vec<Partition>, BackendError> {
        let args = Self::mmls_args(image, opts);
        let output = self
            .run_capture("mmls", &args)
            .map_err(BackendError::PartitionList)?;
        parse_mmls(&output)
    }

    fn list_entries(&mut self, partition: &Partition) -> Result<&[Entry], BackendError> {
        if !self.entry_cache.contains_key(&partition.slot) {
            let args = self.fls_args(partition);
            let output = self
                .run_capture("fls", &args)
                .map_err(|reason| BackendError::EntryList {
                    partition: partition.slot,
                    reason,
                })?;
            let entries = parse_fls(&output)?;
            self.entry_cache.insert(partition.slot, entries);
        }
        Ok(self.entry_cache.get(&partition.slot).map(Vec::as_slice).unwrap())
    }

    fn extract(
        &mut self,
        partition: &Partition,
        entry: &Entry,
        dest: &Path,
    ) -> Result<(), BackendError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BackendError::Extract {
                partition: partition.slot,
                entry: entry.path(),
                reason: e.to_string(),
            })?;
        }
        if entry.kind == EntryKind::Directory {
            return fs::create_dir_all(dest).map_err(|e| BackendError::Extract {
                partition: partition.slot,
                entry: entry.path(),
                reason: e.to_string(),
            });
        }

        let tmp = dest.with_extension(format!(
            "{}.part",
            dest.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
        ));
        let output = Command::new(self.tool_path("icat"))
            .args(self.icat_args(partition))
            .arg(entry.inode.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BackendError::Extract {
                partition: partition.slot,
                entry: entry.path(),
                reason: format!("failed to spawn icat: {e}"),
            })?;
        if !output.status.success() {
            return Err(BackendError::Extract {
                partition: partition.slot,
                entry: entry.path(),
                reason: format!(
                    "icat exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        let mut file = fs::File::create(&tmp).map_err(|e| BackendError::Extract {
            partition: partition.slot,
            entry: entry.path(),
            reason: e.to_string(),
        })?;
        file.write_all(&output.stdout).map_err(|e| BackendError::Extract {
            partition: partition.slot,
            entry: entry.path(),
            reason: e.to_string(),
        })?;
        drop(file);
        fs::rename(&tmp, dest).map_err(|e| BackendError::Extract {
            partition: partition.slot,
            entry: entry.path(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dos_mmls_table() {
        let text = "\
DOS Partition Table
Offset Sector: 0
Units are in 512-byte sectors

     Slot      Start        End          Length       Description
000:  Meta      0000000000   0000000000   0000000001   Primary Table (#0)
001:  -------   0000000000   0000002047   0000002048   Unallocated
002:  000:000   0000002048   0001026047   0001024000   NTFS (0x07)
";
        let partitions = parse_mmls(text).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].slot, 2);
        assert_eq!(partitions[0].fs_type, "NTFS");
        assert_eq!(partitions[0].start_sector, 2048);
        assert_eq!(partitions[0].num_sectors, 1024000);
    }

    #[test]
    fn parses_fls_recursive_paths() {
        let text = "\
d/d 36-144-3:\tDocuments
r/r 36-128-4:\tDocuments/file.txt
r/r 40-128-1:\t* deleted.txt
";
        let entries = parse_fls(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].name, "Documents");
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(entries[1].parent_path, "Documents");
        assert_eq!(entries[1].name, "file.txt");
    }

    #[test]
    fn extracts_fs_type_from_description() {
        assert_eq!(extract_fs_type("NTFS (0x07)"), "NTFS");
        assert_eq!(extract_fs_type("Linux (0x83)"), "Linux");
    }

    #[test]
    fn icat_args_pass_image_path_not_destination() {
        let image = ImageSource::new(vec![PathBuf::from("/images/disk.raw")]);
        let mut opts = BackendOptions::default();
        opts.imgtype = Some(crate::backend::ImageFormat::Raw);
        let backend = TskBackend::new(image, opts);
        let partition = Partition {
            slot: 2,
            fs_type: "NTFS".to_string(),
            start_sector: 2048,
            num_sectors: 1024000,
        };
        let args = backend.icat_args(&partition);
        assert_eq!(
            args,
            vec!["-i", "raw", "-o", "2048", "/images/disk.raw"]
        );
    }

    #[test]
    fn image_level_offset_is_folded_into_fls_and_icat_o() {
        let image = ImageSource::new(vec![PathBuf::from("/images/disk.raw")]);
        let mut opts = BackendOptions::default();
        opts.offset = Some(63);
        let backend = TskBackend::new(image, opts);
        let partition = Partition {
            slot: 2,
            fs_type: "NTFS".to_string(),
            start_sector: 2048,
            num_sectors: 1024000,
        };

        assert_eq!(
            backend.icat_args(&partition),
            vec!["-o", "2111", "/images/disk.raw"]
        );
        assert_eq!(
            backend.fls_args(&partition),
            vec!["-r", "-p", "-o", "2111", "/images/disk.raw"]
        );
    }

    #[test]
    fn mmls_args_pass_through_image_level_offset() {
        let image = ImageSource::new(vec![PathBuf::from("/images/disk.raw")]);
        let mut opts = BackendOptions::default();
        opts.offset = Some(63);
        let args = TskBackend::mmls_args(&image, &opts);
        assert_eq!(args, vec!["-o", "63", "/images/disk.raw"]);
    }
}
