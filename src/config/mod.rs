// src/config/mod.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Configuration Loader
//!
//! Two independent YAML documents -- the tool-config (`tools`,
//! `directories`) and one-or-more file-list documents (`files`) -- are
//! deserialized with `serde` + `serde_yaml` into tagged-variant shapes, then
//! lowered into validated, ready-to-use types. Validation happens once,
//! immediately after deserialization, so every downstream component can
//! assume a validated shape and never re-checks it.

mod file_list;
mod tool_config;

pub use file_list::{FileList, FileSpec, ToolInvocation, ToolOutput};
pub use tool_config::{CmdTemplate, ToolConfig, ToolDef};

use std::fs;
use std::path::Path;

use file_list::{RawFileList, RawToolInvocation};

use crate::path::PathPattern;

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}

pub fn load_tool_config(path: &Path) -> Result<ToolConfig, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("reading {}: {e}", path.display())))?;
    let config: ToolConfig = serde_yaml::from_str(&text)
        .map_err(|e| ConfigError(format!("parsing {}: {e}", path.display())))?;
    for tool in &config.tools {
        if tool.name.trim().is_empty() {
            return Err(ConfigError("tool definition with empty name".to_string()));
        }
    }
    Ok(config)
}

pub fn load_file_list(path: &Path, case_sensitive: bool) -> Result<FileList, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("reading {}: {e}", path.display())))?;
    let raw: RawFileList = serde_yaml::from_str(&text)
        .map_err(|e| ConfigError(format!("parsing {}: {e}", path.display())))?;
    lower_file_list(raw, case_sensitive)
}

/// Builds a `FileList` directly from a set of ad-hoc `-f` patterns (shorthand
/// entries with no tools, matching the CLI's "extract only" mode).
pub fn file_list_from_patterns(
    patterns: &[String],
    case_sensitive: bool,
) -> Result<FileList, ConfigError> {
    let mut specs = Vec::with_capacity(patterns.len());
    for raw in patterns {
        let pattern = PathPattern::normalize(raw, case_sensitive)
            .map_err(|e| ConfigError(format!("{}: {e}", raw)))?;
        specs.push(FileSpec {
            pattern,
            tools: Vec::new(),
            overwrite: true,
        });
    }
    Ok(FileList { specs })
}

fn lower_file_list(raw: RawFileList, case_sensitive: bool) -> Result<FileList, ConfigError> {
    let mut specs = Vec::with_capacity(raw.files.len());
    for entry in raw.files {
        specs.push(lower_file_spec(entry, case_sensitive)?);
    }
    Ok(FileList { specs })
}

fn lower_file_spec(
    entry: file_list::FileSpecEntry,
    case_sensitive: bool,
) -> Result<FileSpec, ConfigError> {
    use file_list::FileSpecEntry;
    let raw = match entry {
        FileSpecEntry::Shorthand(path) => file_list::RawFileSpec {
            path,
            tool: None,
            tools: Vec::new(),
            overwrite: true,
        },
        FileSpecEntry::Full(spec) => spec,
    };

    let pattern = PathPattern::normalize(&raw.path, case_sensitive)
        .map_err(|e| ConfigError(format!("{}: {e}", raw.path)))?;

    // Open Question: a FileSpec may carry both `tool` and `tools`. Accepted
    // here rather than rejected: `tool` is appended before `tools`.
    let mut tools = Vec::with_capacity(raw.tools.len() + 1);
    if let Some(tool) = raw.tool {
        log::debug!(
            "FileSpec \"{}\" has both `tool` and `tools`; appending `tool` first",
            raw.path
        );
        tools.push(lower_tool_invocation(tool, case_sensitive)?);
    }
    for tool in raw.tools {
        tools.push(lower_tool_invocation(tool, case_sensitive)?);
    }

    Ok(FileSpec {
        pattern,
        tools,
        overwrite: raw.overwrite,
    })
}

fn lower_tool_invocation(
    raw: RawToolInvocation,
    case_sensitive: bool,
) -> Result<ToolInvocation, ConfigError> {
    if raw.name.is_none() && raw.cmd.is_none() {
        return Err(ConfigError(
            "tool invocation must set at least one of `name` or `cmd`".to_string(),
        ));
    }
    let mut requires = Vec::with_capacity(raw.requires.len());
    for pattern in &raw.requires {
        requires.push(
            PathPattern::normalize(pattern, case_sensitive)
                .map_err(|e| ConfigError(format!("{}: {e}", pattern)))?,
        );
    }
    Ok(ToolInvocation {
        name: raw.name,
        cmd: raw.cmd,
        extra: raw.extra,
        filter: raw.filter,
        output: raw.output.map(Into::into).unwrap_or(ToolOutput::Inherit),
        requires,
        allow_fail: raw.allow_fail,
        run_once: raw.run_once,
    })
}

/// Cross-document validation: every `name`-referencing invocation must
/// resolve in `tool_config`, and every `extra` key it supplies must be a
/// known `args_extra` key on that tool.
pub fn validate_references(
    tool_config: &ToolConfig,
    file_lists: &[FileList],
) -> Result<(), ConfigError> {
    for list in file_lists {
        for spec in &list.specs {
            for invocation in &spec.tools {
                let Some(name) = &invocation.name else {
                    continue;
                };
                let def = tool_config
                    .find(name)
                    .ok_or_else(|| ConfigError(format!("unknown tool \"{name}\"")))?;
                for key in invocation.extra.keys() {
                    if !def.args_extra.contains_key(key) {
                        return Err(ConfigError(format!(
                            "tool \"{name}\" has no extra-arg \"{key}\""
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_entry_has_no_tools() {
        let raw: RawFileList = serde_yaml::from_str("files:\n  - \"$MFT\"\n").unwrap();
        let list = lower_file_list(raw, true).unwrap();
        assert_eq!(list.specs.len(), 1);
        assert!(list.specs[0].tools.is_empty());
        assert!(list.specs[0].overwrite);
    }

    #[test]
    fn both_tool_and_tools_appends_tool_first() {
        let yaml = "\
files:
  - path: \"$MFT\"
    tool:
      cmd: \"echo first\"
    tools:
      - cmd: \"echo second\"
";
        let raw: RawFileList = serde_yaml::from_str(yaml).unwrap();
        let list = lower_file_list(raw, true).unwrap();
        assert_eq!(list.specs[0].tools.len(), 2);
        assert_eq!(list.specs[0].tools[0].cmd.as_deref(), Some("echo first"));
        assert_eq!(list.specs[0].tools[1].cmd.as_deref(), Some("echo second"));
    }

    #[test]
    fn invocation_requires_name_or_cmd() {
        let yaml = "\
files:
  - path: \"$MFT\"
    tools:
      - filter: \"*.ini\"
";
        let raw: RawFileList = serde_yaml::from_str(yaml).unwrap();
        assert!(lower_file_list(raw, true).is_err());
    }

    #[test]
    fn validate_references_rejects_unknown_tool() {
        let tool_config = ToolConfig::default();
        let yaml = "files:\n  - path: \"$MFT\"\n    tools:\n      - name: rm\n";
        let raw: RawFileList = serde_yaml::from_str(yaml).unwrap();
        let list = lower_file_list(raw, true).unwrap();
        let err = validate_references(&tool_config, std::slice::from_ref(&list)).unwrap_err();
        assert!(err.0.contains("unknown tool"));
    }

    #[test]
    fn output_string_shorthand_means_truncate_no_stderr() {
        let yaml = "files:\n  - path: \"$MFT\"\n    tools:\n      - cmd: echo\n        output: \"out.txt\"\n";
        let raw: RawFileList = serde_yaml::from_str(yaml).unwrap();
        let list = lower_file_list(raw, true).unwrap();
        match &list.specs[0].tools[0].output {
            ToolOutput::Path { path, append, stderr } => {
                assert_eq!(path, "out.txt");
                assert!(!append);
                assert!(!stderr);
            }
            ToolOutput::Inherit => panic!("expected Path"),
        }
    }
}
