// src/main.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # triagekit
//!
//! Top-level sequence: parse the CLI, load the tool-config and file-list
//! YAML documents, open the Image Backend, pick partitions (explicit,
//! interactive, or all-eligible), then stream resolve/extract/dispatch per
//! `FileSpec` across the selected partitions. See [`triagekit::driver`] for
//! the orchestration itself; this binary is wiring.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use triagekit::backend::{ImageBackend, ImageSource, Partition, TskBackend, VolumeSystemType};
use triagekit::cli::{self, Cli, CliOutcome, Verbosity};
use triagekit::config::{self, FileList, ToolConfig};
use triagekit::driver::{self, DriverOptions, PartitionSelection};
use triagekit::error::EngineError;

const DEFAULT_ELIGIBLE_FS_TYPES: &[&str] = &["NTFS"];

fn main() -> ExitCode {
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();
    match cli::parse(args) {
        Ok(CliOutcome::Help) => {
            print_help();
            ExitCode::from(0)
        }
        Ok(CliOutcome::ListVolumeSystemTypes) => {
            for t in VolumeSystemType::ALL {
                println!("{t}");
            }
            ExitCode::from(0)
        }
        Ok(CliOutcome::ListImageFormats) => {
            for t in triagekit::backend::ImageFormat::ALL {
                println!("{t}");
            }
            ExitCode::from(0)
        }
        Ok(CliOutcome::Run(cli)) => {
            init_logging(cli.verbosity);
            match run(*cli) {
                Ok(()) => ExitCode::from(0),
                Err(err) => {
                    log::error!("{err}");
                    ExitCode::from(err.exit_code() as u8)
                }
            }
        }
        Err(err) => {
            eprintln!("triagekit: {err}");
            ExitCode::from(2)
        }
    }
}

fn print_help() {
    println!(
        r#"triagekit: forensic acquisition and analysis-tool dispatch engine

USAGE:
    triagekit [OPTIONS] <IMAGE>...

OPTIONS:
    -T PATH           Image-backend binary directory.
    -t TYPE           Volume-system type: bsd, mac, gpt, dos, sun, or `list`.
    -i TYPE           Image format: afm, vhd, vmdk, aff, afflib, ewf, afd, raw, or `list`.
    -b N              Sector size in bytes (multiple of 512).
    -o N              Offset in sectors.
    -p N...           Partition slot numbers (repeatable); mutually exclusive with -P.
    -P                Interactive partition selection.
    -l                List-only: print resolved entries, extract nothing.
    -a                Save-all: extract every entry, skip tool dispatch.
    -f PATH...        Ad-hoc pattern(s) to extract, no tools run.
    -F PATH...        YAML file-list path(s).
    -d PATH           Output root (default: extracted).
    -c PATH           Tool-config YAML (default: config.yaml).
    -S                Case-sensitive matching.
    -s                Silent: suppress warnings and child stdout.
    -v                Verbose (repeatable, caps at debug).
    -h, --help        Print this help message.
"#
    );
}

fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Silent => log::LevelFilter::Off,
        Verbosity::Warn => log::LevelFilter::Warn,
        Verbosity::Info => log::LevelFilter::Info,
        Verbosity::Debug => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<(), EngineError> {
    if cli.images.is_empty() && !cli.interactive {
        return Err(EngineError::Configuration(
            "at least one image path is required".to_string(),
        ));
    }

    let tool_config = load_tool_config(&cli)?;
    let file_lists = load_file_lists(&cli)?;
    config::validate_references(&tool_config, &file_lists)
        .map_err(|e| EngineError::Configuration(e.0))?;

    let image = ImageSource::new(cli.images.clone());
    let cancel = install_cancellation_handler();

    let partition_selection = if cli.interactive {
        let opener = TskBackend::new(image.clone(), cli.backend_opts.clone());
        let all = opener
            .list_partitions(&image, &cli.backend_opts)
            .map_err(EngineError::from)?;
        PartitionSelection::Explicit(prompt_for_partitions(&all))
    } else if let Some(slots) = cli.partitions.clone() {
        PartitionSelection::Explicit(slots)
    } else {
        PartitionSelection::AllEligible
    };

    let opts = DriverOptions {
        backend_opts: cli.backend_opts.clone(),
        partition_selection,
        eligible_fs_types: DEFAULT_ELIGIBLE_FS_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect(),
        outdir: cli.outdir.clone(),
        case_sensitive: cli.case_sensitive,
        list_only: cli.list_only,
        save_all: cli.save_all,
        parallel: true,
        suppress_stdout: cli.verbosity == Verbosity::Silent,
    };

    let backend_opts = cli.backend_opts.clone();
    let image_for_workers = image.clone();
    let summary = driver::run(
        &image,
        &opts,
        &file_lists,
        &tool_config,
        move || -> Box<dyn ImageBackend + Send> {
            Box::new(TskBackend::new(image_for_workers.clone(), backend_opts.clone()))
        },
        Arc::clone(&cancel),
    )?;

    log::info!(
        "processed {} partition(s), extracted {} artifact(s){}",
        summary.partitions_processed,
        summary.artifacts_extracted,
        if summary.had_failures {
            " (with allowed failures)"
        } else {
            ""
        }
    );

    Ok(())
}

fn load_tool_config(cli: &Cli) -> Result<ToolConfig, EngineError> {
    if cli.tool_config_path.exists() {
        config::load_tool_config(&cli.tool_config_path).map_err(|e| EngineError::Configuration(e.0))
    } else {
        log::debug!(
            "tool config {} not found; proceeding with an empty registry",
            cli.tool_config_path.display()
        );
        Ok(ToolConfig::default())
    }
}

fn load_file_lists(cli: &Cli) -> Result<Vec<FileList>, EngineError> {
    let mut lists = Vec::new();

    if !cli.adhoc_patterns.is_empty() {
        let list = config::file_list_from_patterns(&cli.adhoc_patterns, cli.case_sensitive)
            .map_err(|e| EngineError::Configuration(e.0))?;
        lists.push(list);
    }

    for path in &cli.file_lists {
        let list = config::load_file_list(path, cli.case_sensitive)
            .map_err(|e| EngineError::Configuration(e.0))?;
        lists.push(list);
    }

    if lists.is_empty() {
        return Err(EngineError::Configuration(
            "no file specs: supply -f patterns or -F file-list YAML".to_string(),
        ));
    }
    Ok(lists)
}

/// Registers the `ctrlc`-style interrupt handler: on first Ctrl-C, flips
/// the shared flag the driver polls between dispatch steps rather than
/// tearing anything down from within the signal handler itself.
fn install_cancellation_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let _ = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    });
    cancel
}

/// The `-P` interactive partition picker: lists eligible-looking partitions
/// and reads a whitespace-separated list of slot numbers from stdin.
fn prompt_for_partitions(partitions: &[Partition]) -> Vec<u32> {
    driver::prompt_partition_selection(partitions, |all| {
        println!("Partitions:");
        for p in all {
            println!(
                "  {:>3}  {:<8}  start={:<12} sectors={}",
                p.slot, p.fs_type, p.start_sector, p.num_sectors
            );
        }
        print!("Select slot(s) to process (space-separated): ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        let stdin = io::stdin();
        if stdin.lock().read_line(&mut line).is_err() {
            return Vec::new();
        }
        line.split_whitespace()
            .filter_map(|tok| tok.parse::<u32>().ok())
            .collect()
    })
}
