// src/config/tool_config.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Deserialization shapes for the tool-config YAML document (`tools` +
//! `directories`).

use std::collections::HashMap;

use serde::Deserialize;

use crate::host::HostOs;

/// A command template, either a single string shared by every host OS or a
/// per-OS mapping. macOS falls back to the `linux` entry when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CmdTemplate {
    Single(String),
    PerOs {
        #[serde(default)]
        windows: Option<String>,
        #[serde(default)]
        linux: Option<String>,
        #[serde(default)]
        macos: Option<String>,
    },
}

impl CmdTemplate {
    pub fn resolve(&self, os: HostOs) -> Option<&str> {
        match self {
            CmdTemplate::Single(s) => Some(s.as_str()),
            CmdTemplate::PerOs {
                windows,
                linux,
                macos,
            } => match os {
                HostOs::Windows => windows.as_deref(),
                HostOs::Linux => linux.as_deref(),
                HostOs::Macos => macos.as_deref().or(linux.as_deref()),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub cmd: CmdTemplate,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub args_extra: HashMap<String, String>,
    #[serde(default)]
    pub allow_fail: bool,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

impl ToolDef {
    /// `disabled: true` always overrides `enabled: true`; the default with
    /// neither field set is enabled.
    pub fn is_enabled(&self) -> bool {
        if self.disabled == Some(true) {
            return false;
        }
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub tools: Vec<ToolDef>,
    #[serde(default)]
    pub directories: HashMap<String, String>,
}

impl ToolConfig {
    pub fn find(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.name == name)
    }
}
