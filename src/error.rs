// src/error.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Unified error type for the engine.
//!
//! Mirrors the error kinds named by the design: configuration problems abort
//! before any extraction happens, backend and extraction failures are
//! per-entry recoverable, dispatch failures obey the effective `allow_fail`,
//! and cancellation propagates immediately. `main` maps each variant to an
//! exit code.

use std::fmt;
use std::path::PathBuf;

use crate::backend::BackendError;

#[derive(Debug)]
pub enum EngineError {
    /// YAML shape errors, unknown tool names, unknown extra-arg keys,
    /// undecodable templates, bad CLI flag combinations.
    Configuration(String),
    /// Image open, partition enumeration, or per-entry extraction failure
    /// surfaced from the Image Backend Adapter.
    Backend(BackendError),
    /// A `-f` pattern (or a FileSpec pattern) matched nothing. Diagnostic
    /// only -- never escalated to a hard failure by itself.
    Pattern(String),
    /// Host I/O failure while materializing an entry.
    Extraction(PathBuf, std::io::Error),
    /// A dispatched tool exited non-zero and `allow_fail` was false.
    Dispatch(String),
    /// The run was interrupted by the user.
    Cancelled,
}

impl EngineError {
    /// Maps to the process exit code described in the CLI's external
    /// interface section.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Configuration(_) => 2,
            EngineError::Backend(_) => 3,
            EngineError::Pattern(_) => 2,
            EngineError::Extraction(..) => 2,
            EngineError::Dispatch(_) => 4,
            EngineError::Cancelled => 130,
        }
    }
}

impl std::error::Error for EngineError {}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Backend(err) => write!(f, "backend error: {err}"),
            Self::Pattern(pat) => write!(f, "no match for pattern \"{pat}\""),
            Self::Extraction(path, err) => {
                write!(f, "extraction failed for {}: {err}", path.display())
            }
            Self::Dispatch(msg) => write!(f, "tool dispatch failed: {msg}"),
            Self::Cancelled => write!(f, "run cancelled by user"),
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Backend(err)
    }
}
