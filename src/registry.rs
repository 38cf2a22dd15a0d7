// src/registry.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Tool Registry
//!
//! Resolves a `ToolInvocation`'s `name` (when present) against the loaded
//! `ToolConfig`, picking the command template for the current host OS
//! (macOS falls back to `linux`) and concatenating `cmd + args +` any
//! `args_extra` fragment whose key the invocation actually supplies. An
//! inline `cmd` invocation bypasses the registry entirely. A disabled
//! `ToolDef` resolves to `Resolved::Disabled`, which the Dispatcher treats
//! as a no-op success.

use crate::config::{ConfigError, ToolConfig, ToolInvocation};
use crate::host::HostOs;

pub enum Resolved {
    Disabled,
    Template(String),
}

pub fn resolve(
    tool_config: &ToolConfig,
    os: HostOs,
    invocation: &ToolInvocation,
) -> Result<Resolved, ConfigError> {
    if let Some(name) = &invocation.name {
        let def = tool_config
            .find(name)
            .ok_or_else(|| ConfigError(format!("unknown tool \"{name}\"")))?;
        if !def.is_enabled() {
            return Ok(Resolved::Disabled);
        }
        let base = def.cmd.resolve(os).ok_or_else(|| {
            ConfigError(format!(
                "tool \"{name}\" has no command template for this host OS"
            ))
        })?;

        let mut template = base.to_string();
        for arg in &def.args {
            template.push(' ');
            template.push_str(arg);
        }
        for (key, fragment) in &def.args_extra {
            if invocation.extra.contains_key(key) {
                template.push(' ');
                template.push_str(fragment);
            }
        }
        Ok(Resolved::Template(template))
    } else if let Some(cmd) = &invocation.cmd {
        Ok(Resolved::Template(cmd.clone()))
    } else {
        Err(ConfigError(
            "tool invocation has neither `name` nor `cmd`".to_string(),
        ))
    }
}

/// Effective `allow_fail`: the invocation's override if set, else the
/// referenced `ToolDef`'s default, else `false`.
pub fn effective_allow_fail(tool_config: &ToolConfig, invocation: &ToolInvocation) -> bool {
    if let Some(override_value) = invocation.allow_fail {
        return override_value;
    }
    if let Some(name) = &invocation.name {
        if let Some(def) = tool_config.find(name) {
            return def.allow_fail;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CmdTemplate;
    use std::collections::HashMap;

    fn def(name: &str) -> crate::config::ToolDef {
        crate::config::ToolDef {
            name: name.to_string(),
            cmd: CmdTemplate::Single("tool.exe $FILE".to_string()),
            args: vec!["--quiet".to_string()],
            args_extra: {
                let mut m = HashMap::new();
                m.insert("path".to_string(), "--path $path".to_string());
                m
            },
            allow_fail: true,
            enabled: None,
            disabled: None,
        }
    }

    fn invocation(name: &str) -> ToolInvocation {
        ToolInvocation {
            name: Some(name.to_string()),
            cmd: None,
            extra: HashMap::new(),
            filter: None,
            output: crate::config::ToolOutput::Inherit,
            requires: Vec::new(),
            allow_fail: None,
            run_once: false,
        }
    }

    #[test]
    fn resolves_named_tool_with_args() {
        let config = ToolConfig {
            tools: vec![def("rm")],
            directories: HashMap::new(),
        };
        let inv = invocation("rm");
        match resolve(&config, HostOs::Linux, &inv).unwrap() {
            Resolved::Template(t) => assert_eq!(t, "tool.exe $FILE --quiet"),
            Resolved::Disabled => panic!("expected template"),
        }
    }

    #[test]
    fn extra_arg_fragment_appended_only_when_supplied() {
        let config = ToolConfig {
            tools: vec![def("rm")],
            directories: HashMap::new(),
        };
        let mut inv = invocation("rm");
        inv.extra.insert("path".to_string(), "/out/x".to_string());
        match resolve(&config, HostOs::Linux, &inv).unwrap() {
            Resolved::Template(t) => assert_eq!(t, "tool.exe $FILE --quiet --path $path"),
            Resolved::Disabled => panic!("expected template"),
        }
    }

    #[test]
    fn disabled_tool_resolves_to_noop() {
        let mut tool = def("rm");
        tool.disabled = Some(true);
        let config = ToolConfig {
            tools: vec![tool],
            directories: HashMap::new(),
        };
        let inv = invocation("rm");
        assert!(matches!(resolve(&config, HostOs::Linux, &inv).unwrap(), Resolved::Disabled));
    }

    #[test]
    fn inline_cmd_bypasses_registry() {
        let config = ToolConfig::default();
        let mut inv = invocation("nonexistent");
        inv.name = None;
        inv.cmd = Some("echo hi".to_string());
        match resolve(&config, HostOs::Linux, &inv).unwrap() {
            Resolved::Template(t) => assert_eq!(t, "echo hi"),
            Resolved::Disabled => panic!("expected template"),
        }
    }

    #[test]
    fn effective_allow_fail_prefers_invocation_override() {
        let config = ToolConfig {
            tools: vec![def("rm")],
            directories: HashMap::new(),
        };
        let mut inv = invocation("rm");
        assert!(effective_allow_fail(&config, &inv)); // falls back to ToolDef default (true)
        inv.allow_fail = Some(false);
        assert!(!effective_allow_fail(&config, &inv)); // override wins
    }
}
