// src/config/file_list.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Deserialization shapes for the file-list YAML document (`files`), plus
//! the lowered, validated types the rest of the engine consumes.

use std::collections::HashMap;

use serde::Deserialize;

use crate::path::PathPattern;

/// Raw `output` field: a bare string is sugar for `{path: it}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawToolOutput {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        append: bool,
        #[serde(default)]
        stderr: bool,
    },
}

#[derive(Debug, Clone)]
pub enum ToolOutput {
    Inherit,
    Path { path: String, append: bool, stderr: bool },
}

impl From<RawToolOutput> for ToolOutput {
    fn from(raw: RawToolOutput) -> Self {
        match raw {
            RawToolOutput::Path(path) => ToolOutput::Path {
                path,
                append: false,
                stderr: false,
            },
            RawToolOutput::Detailed { path, append, stderr } => {
                ToolOutput::Path { path, append, stderr }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToolInvocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub output: Option<RawToolOutput>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub allow_fail: Option<bool>,
    #[serde(default)]
    pub run_once: bool,
}

/// A fully resolved invocation: validated to have a `name` or `cmd`, its
/// `requires` patterns pre-compiled against the run's case-sensitivity flag.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: Option<String>,
    pub cmd: Option<String>,
    pub extra: HashMap<String, String>,
    pub filter: Option<String>,
    pub output: ToolOutput,
    pub requires: Vec<PathPattern>,
    pub allow_fail: Option<bool>,
    pub run_once: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileSpecEntry {
    Shorthand(String),
    Full(RawFileSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFileSpec {
    pub path: String,
    #[serde(default)]
    pub tool: Option<RawToolInvocation>,
    #[serde(default)]
    pub tools: Vec<RawToolInvocation>,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

/// A fully resolved declaration: pattern compiled, `tool`/`tools` merged
/// (when both are present, `tool` is appended before `tools`).
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub pattern: PathPattern,
    pub tools: Vec<ToolInvocation>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawFileList {
    #[serde(default)]
    pub files: Vec<FileSpecEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct FileList {
    pub specs: Vec<FileSpec>,
}
