// src/cli.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # CLI / Argument Parsing
//!
//! Parsed by hand with `lexopt`, following the same
//! `while let Some(arg) = parser.next()?` loop this codebase has always
//! used rather than a declarative derive macro. `-t list` / `-i list`
//! short-circuit before any image path is touched; `-p`/`-P` and `-l`/`-a`
//! are validated as mutually exclusive once parsing completes.

use std::path::PathBuf;

use lexopt::prelude::*;

use crate::backend::{BackendOptions, ImageFormat, VolumeSystemType};
use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Silent,
    Warn,
    Info,
    Debug,
}

pub struct Cli {
    pub images: Vec<PathBuf>,
    pub backend_opts: BackendOptions,
    pub partitions: Option<Vec<u32>>,
    pub interactive: bool,
    pub list_only: bool,
    pub save_all: bool,
    pub adhoc_patterns: Vec<String>,
    pub file_lists: Vec<PathBuf>,
    pub outdir: PathBuf,
    pub tool_config_path: PathBuf,
    pub case_sensitive: bool,
    pub verbosity: Verbosity,
}

pub enum CliOutcome {
    Run(Box<Cli>),
    ListVolumeSystemTypes,
    ListImageFormats,
    Help,
}

pub fn parse<I>(args: I) -> Result<CliOutcome, ConfigError>
where
    I: IntoIterator<Item = std::ffi::OsString>,
{
    let mut parser = lexopt::Parser::from_args(args);

    let mut images = Vec::new();
    let mut backend_opts = BackendOptions::default();
    let mut partitions: Option<Vec<u32>> = None;
    let mut interactive = false;
    let mut list_only = false;
    let mut save_all = false;
    let mut adhoc_patterns = Vec::new();
    let mut file_lists = Vec::new();
    let mut outdir = PathBuf::from("extracted");
    let mut tool_config_path = PathBuf::from("config.yaml");
    let mut case_sensitive = false;
    let mut verbose_count: u32 = 0;
    let mut silent = false;

    while let Some(arg) = parser.next().map_err(|e| ConfigError(e.to_string()))? {
        match arg {
            Short('h') | Long("help") => return Ok(CliOutcome::Help),
            Short('T') => {
                backend_opts.tool_dir = Some(PathBuf::from(value_of(&mut parser)?));
            }
            Short('t') => {
                let value = value_of(&mut parser)?;
                if value == "list" {
                    return Ok(CliOutcome::ListVolumeSystemTypes);
                }
                backend_opts.vstype = Some(parse_vstype(&value)?);
            }
            Short('i') => {
                let value = value_of(&mut parser)?;
                if value == "list" {
                    return Ok(CliOutcome::ListImageFormats);
                }
                backend_opts.imgtype = Some(parse_imgtype(&value)?);
            }
            Short('b') => {
                let value = value_of(&mut parser)?;
                backend_opts.sector_size = Some(
                    value
                        .parse()
                        .map_err(|_| ConfigError(format!("invalid sector size \"{value}\"")))?,
                );
            }
            Short('o') => {
                let value = value_of(&mut parser)?;
                backend_opts.offset = Some(
                    value
                        .parse()
                        .map_err(|_| ConfigError(format!("invalid offset \"{value}\"")))?,
                );
            }
            Short('p') => {
                let mut slots = partitions.take().unwrap_or_default();
                // `values()` yields consecutive plain arguments and stops at
                // the next option-looking token, so `-p 1 2 -d out` doesn't
                // swallow `-d` as a slot number.
                for value in parser.values().map_err(|e| ConfigError(e.to_string()))? {
                    let slot: u32 = value
                        .to_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| ConfigError("invalid partition slot".to_string()))?;
                    slots.push(slot);
                }
                partitions = Some(slots);
            }
            Short('P') => interactive = true,
            Short('l') => list_only = true,
            Short('a') => save_all = true,
            Short('f') => {
                adhoc_patterns.push(value_of(&mut parser)?);
            }
            Short('F') => {
                file_lists.push(PathBuf::from(value_of(&mut parser)?));
            }
            Short('d') => {
                outdir = PathBuf::from(value_of(&mut parser)?);
            }
            Short('c') => {
                tool_config_path = PathBuf::from(value_of(&mut parser)?);
            }
            Short('S') => case_sensitive = true,
            Short('s') => silent = true,
            Short('v') => verbose_count += 1,
            Value(value) => images.push(PathBuf::from(value)),
            _ => return Err(ConfigError(arg.unexpected().to_string())),
        }
    }

    if partitions.is_some() && interactive {
        return Err(ConfigError("-p and -P are mutually exclusive".to_string()));
    }
    if list_only && save_all {
        return Err(ConfigError("-l and -a are mutually exclusive".to_string()));
    }

    let verbosity = if silent {
        Verbosity::Silent
    } else {
        match verbose_count {
            0 => Verbosity::Warn,
            1 => Verbosity::Info,
            _ => Verbosity::Debug,
        }
    };

    Ok(CliOutcome::Run(Box::new(Cli {
        images,
        backend_opts,
        partitions,
        interactive,
        list_only,
        save_all,
        adhoc_patterns,
        file_lists,
        outdir,
        tool_config_path,
        case_sensitive,
        verbosity,
    })))
}

fn value_of(parser: &mut lexopt::Parser) -> Result<String, ConfigError> {
    parser
        .value()
        .map_err(|e| ConfigError(e.to_string()))?
        .into_string()
        .map_err(|_| ConfigError("argument value is not valid unicode".to_string()))
}

fn parse_vstype(value: &str) -> Result<VolumeSystemType, ConfigError> {
    match value {
        "bsd" => Ok(VolumeSystemType::Bsd),
        "mac" => Ok(VolumeSystemType::Mac),
        "gpt" => Ok(VolumeSystemType::Gpt),
        "dos" => Ok(VolumeSystemType::Dos),
        "sun" => Ok(VolumeSystemType::Sun),
        other => Err(ConfigError(format!("unknown volume system type \"{other}\""))),
    }
}

fn parse_imgtype(value: &str) -> Result<ImageFormat, ConfigError> {
    match value {
        "afm" => Ok(ImageFormat::Afm),
        "vhd" => Ok(ImageFormat::Vhd),
        "vmdk" => Ok(ImageFormat::Vmdk),
        "aff" => Ok(ImageFormat::Aff),
        "afflib" => Ok(ImageFormat::Afflib),
        "ewf" => Ok(ImageFormat::Ewf),
        "afd" => Ok(ImageFormat::Afd),
        "raw" => Ok(ImageFormat::Raw),
        other => Err(ConfigError(format!("unknown image format \"{other}\""))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<std::ffi::OsString> {
        v.iter().map(std::ffi::OsString::from).collect()
    }

    #[test]
    fn parses_image_paths_and_flags() {
        let outcome = parse(args(&["image.raw", "-S", "-v", "-d", "out"])).unwrap();
        let CliOutcome::Run(cli) = outcome else { panic!("expected Run") };
        assert_eq!(cli.images, vec![PathBuf::from("image.raw")]);
        assert!(cli.case_sensitive);
        assert_eq!(cli.verbosity, Verbosity::Info);
        assert_eq!(cli.outdir, PathBuf::from("out"));
    }

    #[test]
    fn dash_p_and_dash_cap_p_are_mutually_exclusive() {
        let err = parse(args(&["image.raw", "-p", "1", "-P"])).unwrap_err();
        assert!(err.0.contains("mutually exclusive"));
    }

    #[test]
    fn dash_l_and_dash_a_are_mutually_exclusive() {
        let err = parse(args(&["image.raw", "-l", "-a"])).unwrap_err();
        assert!(err.0.contains("mutually exclusive"));
    }

    #[test]
    fn t_list_short_circuits() {
        let outcome = parse(args(&["-t", "list"])).unwrap();
        assert!(matches!(outcome, CliOutcome::ListVolumeSystemTypes));
    }

    #[test]
    fn i_list_short_circuits() {
        let outcome = parse(args(&["-i", "list"])).unwrap();
        assert!(matches!(outcome, CliOutcome::ListImageFormats));
    }

    #[test]
    fn silent_wins_over_verbose_count() {
        let outcome = parse(args(&["image.raw", "-v", "-v", "-s"])).unwrap();
        let CliOutcome::Run(cli) = outcome else { panic!("expected Run") };
        assert_eq!(cli.verbosity, Verbosity::Silent);
    }

    #[test]
    fn dash_p_stops_at_the_next_flag_instead_of_swallowing_it() {
        let outcome = parse(args(&["image.raw", "-p", "1", "2", "-d", "out"])).unwrap();
        let CliOutcome::Run(cli) = outcome else { panic!("expected Run") };
        assert_eq!(cli.partitions, Some(vec![1, 2]));
        assert_eq!(cli.outdir, PathBuf::from("out"));
    }
}
