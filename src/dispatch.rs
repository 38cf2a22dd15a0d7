// src/dispatch.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Dispatcher
//!
//! Orchestrates one `(Artifact, ToolInvocation)` pair through enablement,
//! filter, `requires` gating, run-once scheduling, template expansion,
//! output routing and process execution, in that order. All state scoped to
//! one run -- the successful-extraction set, run-once guard, and the set of
//! output paths already truncated -- lives in `RunContext`, owned by a
//! single partition worker so parallel partitions never share it.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock;
use crate::config::{ToolConfig, ToolInvocation, ToolOutput};
use crate::error::EngineError;
use crate::expand::{expand, Environment};
use crate::extractor::Artifact;
use crate::host::HostOs;
use crate::path::matches_leaf;
use crate::registry::{self, Resolved};

/// Per-partition state threaded explicitly through the run rather than kept
/// as a process singleton, so multi-partition parallelism stays sound.
pub struct RunContext {
    pub outdir: PathBuf,
    pub case_sensitive: bool,
    pub tool_dirs: HashMap<String, String>,
    pub suppress_stdout: bool,
    successful_paths: HashSet<String>,
    run_once_fired: HashSet<(usize, usize)>,
    truncated_outputs: HashSet<PathBuf>,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(
        outdir: PathBuf,
        case_sensitive: bool,
        tool_dirs: HashMap<String, String>,
        suppress_stdout: bool,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            outdir,
            case_sensitive,
            tool_dirs,
            suppress_stdout,
            successful_paths: HashSet::new(),
            run_once_fired: HashSet::new(),
            truncated_outputs: HashSet::new(),
            cancel,
        }
    }

    /// Records that `entry_path` produced a successfully extracted artifact,
    /// feeding the `requires` gate for invocations dispatched afterward.
    pub fn record_success(&mut self, entry_path: &str) {
        self.successful_paths.insert(entry_path.to_string());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn requires_satisfied(&self, invocation: &ToolInvocation) -> bool {
        invocation
            .requires
            .iter()
            .all(|pattern| self.successful_paths.iter().any(|p| pattern.matches_path(p)))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Disabled,
    FilteredOut,
    RequiresUnmet,
    RunOnceAlreadyFired,
    Ran { exit_success: bool },
}

/// Runs one invocation against one artifact, mutating `ctx`'s run-once guard
/// as a side effect. Returns `Err` only for a hard abort: process spawn
/// failure, template expansion failure, or a disallowed non-zero exit.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_one(
    ctx: &mut RunContext,
    tool_config: &ToolConfig,
    os: HostOs,
    spec_index: usize,
    invocation_index: usize,
    invocation: &ToolInvocation,
    artifact: &Artifact,
) -> Result<DispatchOutcome, EngineError> {
    if ctx.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let resolved = registry::resolve(tool_config, os, invocation)
        .map_err(|e| EngineError::Configuration(e.0))?;
    let template = match resolved {
        Resolved::Disabled => return Ok(DispatchOutcome::Disabled),
        Resolved::Template(t) => t,
    };

    if let Some(filter) = &invocation.filter {
        let matched = matches_leaf(filter, &artifact.leaf_name, ctx.case_sensitive)
            .map_err(|e| EngineError::Pattern(e.0))?;
        if !matched {
            return Ok(DispatchOutcome::FilteredOut);
        }
    }

    if !ctx.requires_satisfied(invocation) {
        log::warn!(
            "skipping tool for {}: a `requires` pattern has no successful extraction yet",
            artifact.entry_path
        );
        return Ok(DispatchOutcome::RequiresUnmet);
    }

    let guard_key = (spec_index, invocation_index);
    if invocation.run_once {
        if ctx.run_once_fired.contains(&guard_key) {
            return Ok(DispatchOutcome::RunOnceAlreadyFired);
        }
        // Set before launch: a failed run-once invocation still "fired".
        ctx.run_once_fired.insert(guard_key);
    }

    let env = build_environment(ctx, artifact, invocation);
    let expanded = expand(&template, &env).map_err(|e| EngineError::Configuration(e.0))?;
    log::debug!("expanded command for {}: {expanded}", artifact.entry_path);
    log::info!("running tool for {}", artifact.entry_path);

    let exit_success = run_process(ctx, os, &expanded, &invocation.output)?;

    if !exit_success && ctx.is_cancelled() {
        // The process was killed because a cancellation arrived mid-run,
        // not because the tool itself chose to fail: report cancellation,
        // not a dispatch failure subject to `allow_fail`.
        return Err(EngineError::Cancelled);
    }

    let allow_fail = registry::effective_allow_fail(tool_config, invocation);
    if !exit_success {
        if allow_fail {
            log::warn!(
                "tool for {} exited non-zero; continuing (allow_fail)",
                artifact.entry_path
            );
        } else {
            return Err(EngineError::Dispatch(format!(
                "tool for {} exited non-zero",
                artifact.entry_path
            )));
        }
    }

    Ok(DispatchOutcome::Ran { exit_success })
}

fn build_environment(ctx: &RunContext, artifact: &Artifact, invocation: &ToolInvocation) -> Environment {
    let mut env = Environment::new()
        .with("FILE", artifact.host_path.to_string_lossy().into_owned())
        .with("OUTDIR", ctx.outdir.to_string_lossy().into_owned())
        .with("PARENT", artifact.parent_host_path.to_string_lossy().into_owned())
        .with("ENTRYPATH", artifact.entry_path.clone())
        .with("FILENAME", artifact.leaf_name.clone())
        .with("USERNAME", artifact.username.clone())
        .with("TIME", clock::time_string())
        .with("DATE", clock::date_string());

    for (tool, dir) in &ctx.tool_dirs {
        env.set(&format!("DIR_{}", tool.to_uppercase()), dir.clone());
    }
    for (key, value) in &invocation.extra {
        env.set(key, value.clone());
    }
    env
}

fn run_process(
    ctx: &mut RunContext,
    os: HostOs,
    expanded: &str,
    output: &ToolOutput,
) -> Result<bool, EngineError> {
    let mut command = match os {
        HostOs::Windows => {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(expanded);
            c
        }
        HostOs::Linux | HostOs::Macos => {
            let mut c = Command::new("sh");
            c.arg("-c").arg(expanded);
            c
        }
    };
    command.current_dir(&ctx.outdir);

    match output {
        ToolOutput::Inherit => {
            command.stdout(if ctx.suppress_stdout {
                Stdio::null()
            } else {
                Stdio::inherit()
            });
            command.stderr(Stdio::inherit());
        }
        ToolOutput::Path { path, append, stderr } => {
            let out_path = ctx.outdir.join(path);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::Extraction(out_path.clone(), e))?;
            }
            let truncate_now = !append && !ctx.truncated_outputs.contains(&out_path);
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append || !truncate_now)
                .truncate(truncate_now)
                .open(&out_path)
                .map_err(|e| EngineError::Extraction(out_path.clone(), e))?;
            if truncate_now {
                ctx.truncated_outputs.insert(out_path.clone());
            }
            command.stdout(Stdio::from(file.try_clone().map_err(|e| {
                EngineError::Extraction(out_path.clone(), e)
            })?));
            if *stderr {
                command.stderr(Stdio::from(file));
            } else {
                command.stderr(Stdio::inherit());
            }
        }
    }

    let mut child = command
        .spawn()
        .map_err(|e| EngineError::Dispatch(format!("failed to spawn process: {e}")))?;

    let status = wait_with_cancellation(&mut child, ctx)?;
    Ok(status.success())
}

/// Polls the child for completion rather than blocking on `wait()` outright,
/// so a cancellation flag raised mid-run can still reach it: on the first
/// poll that observes `ctx.is_cancelled()`, the child is sent a terminate
/// signal and given a short grace window to exit before a final `wait()`.
fn wait_with_cancellation(
    child: &mut std::process::Child,
    ctx: &RunContext,
) -> Result<std::process::ExitStatus, EngineError> {
    const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);
    const GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(2);

    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| EngineError::Dispatch(format!("failed to poll process: {e}")))?
        {
            return Ok(status);
        }
        if ctx.is_cancelled() {
            let _ = child.kill();
            let deadline = std::time::Instant::now() + GRACE_PERIOD;
            loop {
                if let Some(status) = child
                    .try_wait()
                    .map_err(|e| EngineError::Dispatch(format!("failed to poll process: {e}")))?
                {
                    return Ok(status);
                }
                if std::time::Instant::now() >= deadline {
                    return child
                        .wait()
                        .map_err(|e| EngineError::Dispatch(format!("failed to await killed process: {e}")));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
