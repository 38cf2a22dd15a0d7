// src/driver.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Driver
//!
//! The top-level sequence: open the backend, list partitions, select the
//! ones to process, then for each selected partition stream
//! resolve/extract/dispatch across every `FileSpec` in declaration order.
//! Multiple partitions may run on independent `std::thread::scope` workers;
//! each worker owns its own backend handle and `RunContext`, so no cache,
//! guard, or successful-extraction state crosses workers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{BackendOptions, ImageBackend, ImageSource, Partition};
use crate::config::{FileList, ToolConfig};
use crate::dispatch::{self, RunContext};
use crate::error::EngineError;
use crate::extractor::Extractor;
use crate::host::HostOs;
use crate::resolver::Resolver;

pub enum PartitionSelection {
    Explicit(Vec<u32>),
    AllEligible,
}

pub struct DriverOptions {
    pub backend_opts: BackendOptions,
    pub partition_selection: PartitionSelection,
    pub eligible_fs_types: Vec<String>,
    pub outdir: PathBuf,
    pub case_sensitive: bool,
    pub list_only: bool,
    pub save_all: bool,
    pub parallel: bool,
    pub suppress_stdout: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub partitions_processed: u32,
    pub artifacts_extracted: usize,
    pub had_failures: bool,
}

/// Runs the whole pipeline. `backend_factory` builds a fresh, independent
/// backend handle on demand -- called once up front to list partitions and
/// once per selected partition worker, since `ImageBackend::list_entries`/
/// `extract` require exclusive access and neither implementation is shared
/// safely across threads.
pub fn run<F>(
    image: &ImageSource,
    opts: &DriverOptions,
    file_lists: &[FileList],
    tool_config: &ToolConfig,
    backend_factory: F,
    cancel: Arc<std::sync::atomic::AtomicBool>,
) -> Result<RunSummary, EngineError>
where
    F: Fn() -> Box<dyn ImageBackend + Send> + Sync,
{
    let opener = backend_factory();
    let all_partitions = opener.list_partitions(image, &opts.backend_opts)?;
    drop(opener);

    let selected = select_partitions(&all_partitions, &opts.partition_selection, &opts.eligible_fs_types)?;
    if selected.is_empty() {
        return Ok(RunSummary::default());
    }

    let os = HostOs::detect();
    let tool_dirs = tool_config.directories.clone();
    let multi = selected.len() > 1;

    let run_one = |partition: &Partition| -> Result<(usize, bool), EngineError> {
        run_partition(
            partition,
            &backend_factory,
            opts,
            file_lists,
            tool_config,
            os,
            &tool_dirs,
            multi,
            Arc::clone(&cancel),
        )
    };

    let results: Vec<Result<(usize, bool), EngineError>> = if opts.parallel && multi {
        std::thread::scope(|scope| {
            let handles: Vec<_> = selected.iter().map(|p| scope.spawn(|| run_one(p))).collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(EngineError::Dispatch("partition worker panicked".to_string())))
                })
                .collect()
        })
    } else {
        selected.iter().map(run_one).collect()
    };

    let mut summary = RunSummary {
        partitions_processed: selected.len() as u32,
        ..RunSummary::default()
    };
    for result in results {
        let (extracted, had_failures) = result?;
        summary.artifacts_extracted += extracted;
        summary.had_failures |= had_failures;
    }
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn run_partition<F>(
    partition: &Partition,
    backend_factory: &F,
    opts: &DriverOptions,
    file_lists: &[FileList],
    tool_config: &ToolConfig,
    os: HostOs,
    tool_dirs: &std::collections::HashMap<String, String>,
    multi: bool,
    cancel: Arc<std::sync::atomic::AtomicBool>,
) -> Result<(usize, bool), EngineError>
where
    F: Fn() -> Box<dyn ImageBackend + Send> + Sync,
{
    let mut backend = backend_factory();
    let partition_outdir = if multi {
        opts.outdir.join(format!("_{}", partition.slot))
    } else {
        opts.outdir.clone()
    };
    std::fs::create_dir_all(&partition_outdir)
        .map_err(|e| EngineError::Extraction(partition_outdir.clone(), e))?;

    let mut resolver = Resolver::new();
    let mut extractor = Extractor::new();
    let mut ctx = RunContext::new(
        partition_outdir.clone(),
        opts.case_sensitive,
        tool_dirs.clone(),
        opts.suppress_stdout,
        cancel,
    );

    let mut extracted = 0usize;
    let mut had_failures = false;

    // A flat counter across every FileSpec in every loaded YAML, not per
    // document: the run-once guard key is (FileSpec index, ToolInvocation
    // index), and two FileSpecs sharing a document must not collide.
    let mut next_spec_index = 0usize;
    for list in file_lists {
        for spec in &list.specs {
            let spec_index = next_spec_index;
            next_spec_index += 1;
            if ctx.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let entries = resolver.resolve(backend.as_mut(), partition, &spec.pattern)?;

            if opts.list_only {
                for entry in &entries {
                    println!("{}:{}", partition.slot, entry.path());
                }
                continue;
            }

            for entry in &entries {
                let artifact = match extractor.extract(
                    backend.as_mut(),
                    partition,
                    entry,
                    &partition_outdir,
                    spec.overwrite,
                ) {
                    Ok(a) => a,
                    Err(e) => {
                        log::warn!("extraction failed for {}: {e}", entry.path());
                        had_failures = true;
                        continue;
                    }
                };
                ctx.record_success(&artifact.entry_path);
                extracted += 1;

                if opts.save_all {
                    continue;
                }

                for (invocation_index, invocation) in spec.tools.iter().enumerate() {
                    match dispatch::dispatch_one(
                        &mut ctx,
                        tool_config,
                        os,
                        spec_index,
                        invocation_index,
                        invocation,
                        &artifact,
                    ) {
                        Ok(_) => {}
                        Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                        Err(e) => {
                            // Remaining tools for this artifact are abandoned (we
                            // never reach them), and the error propagates out of
                            // the partition worker and the run itself: a
                            // disallowed non-zero exit aborts the whole run,
                            // not just this artifact.
                            log::error!("{e}");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    Ok((extracted, had_failures))
}

fn select_partitions(
    all: &[Partition],
    selection: &PartitionSelection,
    eligible: &[String],
) -> Result<Vec<Partition>, EngineError> {
    match selection {
        PartitionSelection::Explicit(slots) => {
            let mut out = Vec::with_capacity(slots.len());
            for slot in slots {
                let found = all
                    .iter()
                    .find(|p| p.slot == *slot)
                    .ok_or_else(|| EngineError::Configuration(format!("no partition with slot {slot}")))?;
                out.push(found.clone());
            }
            Ok(out)
        }
        PartitionSelection::AllEligible => {
            Ok(all.iter().filter(|p| p.is_eligible(eligible)).cloned().collect())
        }
    }
}

/// Presents the interactive partition picker over stdin/stdout, returning
/// the user's chosen slots. Kept outside `select_partitions` (and thus
/// outside `run`) so it can be exercised once at the CLI layer, before the
/// driver ever touches a backend handle.
pub fn prompt_partition_selection(
    partitions: &[Partition],
    mut prompt: impl FnMut(&[Partition]) -> Vec<u32>,
) -> Vec<u32> {
    if partitions.is_empty() {
        return Vec::new();
    }
    prompt(partitions)
}
