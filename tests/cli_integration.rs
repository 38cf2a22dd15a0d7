// tests/cli_integration.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! End-to-end exercises of the `triagekit` binary against a fake
//! sleuthkit-style toolchain: `mmls`/`fls`/`icat` are replaced with small
//! shell scripts under a temporary `-T` directory so the test never needs a
//! real disk image. Unix-only: the fixtures are `sh` scripts, and `icat`'s
//! stand-in matters more than its Windows `cmd` counterpart would.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;

const MMLS_SCRIPT: &str = "\
#!/bin/sh
cat <<'EOF'
     Slot      Start        End          Length       Description
000:  Meta      0000000000   0000000000   0000000001   Primary Table (#0)
001:  -------   0000000000   0000002047   0000002048   Unallocated
002:  000:000   0000002048   0001026047   0001024000   NTFS (0x07)
EOF
";

const FLS_SCRIPT: &str = "\
#!/bin/sh
cat <<'EOF'
d/d 36-144-3:	Users
d/d 37-144-3:	Users/alice
d/d 38-144-3:	Users/alice/Desktop
r/r 39-128-4:	Users/alice/Desktop/notes.ini
r/r 40-128-4:	Users/alice/Desktop/readme.txt
EOF
";

// icat is invoked as: icat -o <offset> <image> <inode>. Content is keyed off
// the inode so each extracted file gets distinguishable bytes.
const ICAT_SCRIPT: &str = "\
#!/bin/sh
for inode; do :; done
case \"$inode\" in
  39) printf 'notes-content\\n' ;;
  40) printf 'readme-content\\n' ;;
  *) printf 'unknown\\n' ;;
esac
";

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
}

fn fixture_tool_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "mmls", MMLS_SCRIPT);
    write_script(dir.path(), "fls", FLS_SCRIPT);
    write_script(dir.path(), "icat", ICAT_SCRIPT);
    dir
}

#[test]
fn save_all_extracts_matched_files_to_outdir() {
    let tool_dir = fixture_tool_dir();
    let work = tempfile::tempdir().unwrap();
    let image = work.path().join("image.raw");
    fs::write(&image, b"not a real image, just needs to exist").unwrap();
    let outdir = work.path().join("extracted");

    let mut cmd = Command::cargo_bin("triagekit").unwrap();
    cmd.arg("-T")
        .arg(tool_dir.path())
        .arg("-a")
        .arg("-f")
        .arg("Users/alice/Desktop/*")
        .arg("-d")
        .arg(&outdir)
        .arg(&image);
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(outdir.join("Users/alice/Desktop/notes.ini")).unwrap(),
        "notes-content\n"
    );
    assert_eq!(
        fs::read_to_string(outdir.join("Users/alice/Desktop/readme.txt")).unwrap(),
        "readme-content\n"
    );
}

#[test]
fn list_only_prints_matches_without_touching_icat() {
    let tool_dir = fixture_tool_dir();
    let work = tempfile::tempdir().unwrap();
    let image = work.path().join("image.raw");
    fs::write(&image, b"placeholder").unwrap();
    let outdir = work.path().join("extracted");

    let mut cmd = Command::cargo_bin("triagekit").unwrap();
    cmd.arg("-T")
        .arg(tool_dir.path())
        .arg("-l")
        .arg("-f")
        .arg("Users/alice/Desktop/notes.ini")
        .arg("-d")
        .arg(&outdir)
        .arg(&image);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Users/alice/Desktop/notes.ini"));

    assert!(!outdir.exists());
}

#[test]
fn tool_config_is_dispatched_against_extracted_artifact() {
    let tool_dir = fixture_tool_dir();
    let work = tempfile::tempdir().unwrap();
    let image = work.path().join("image.raw");
    fs::write(&image, b"placeholder").unwrap();
    let outdir = work.path().join("extracted");

    let config_path = work.path().join("config.yaml");
    fs::write(
        &config_path,
        "\
tools:
  - name: catit
    cmd: \"cat $FILE > $OUTDIR/catit.out\"
",
    )
    .unwrap();

    let filelist_path = work.path().join("files.yaml");
    fs::write(
        &filelist_path,
        "\
files:
  - path: \"Users/alice/Desktop/notes.ini\"
    tool:
      name: catit
",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("triagekit").unwrap();
    cmd.arg("-T")
        .arg(tool_dir.path())
        .arg("-c")
        .arg(&config_path)
        .arg("-F")
        .arg(&filelist_path)
        .arg("-d")
        .arg(&outdir)
        .arg(&image);
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(outdir.join("catit.out")).unwrap(),
        "notes-content\n"
    );
}

#[test]
fn unknown_partition_slot_is_a_configuration_error() {
    let tool_dir = fixture_tool_dir();
    let work = tempfile::tempdir().unwrap();
    let image = work.path().join("image.raw");
    fs::write(&image, b"placeholder").unwrap();

    let mut cmd = Command::cargo_bin("triagekit").unwrap();
    cmd.arg("-T")
        .arg(tool_dir.path())
        .arg("-p")
        .arg("99")
        .arg("-f")
        .arg("Users/*")
        .arg(&image);
    cmd.assert().code(2);
}

#[test]
fn no_file_spec_supplied_is_a_configuration_error() {
    let work = tempfile::tempdir().unwrap();
    let image = work.path().join("image.raw");
    fs::write(&image, b"placeholder").unwrap();

    let mut cmd = Command::cargo_bin("triagekit").unwrap();
    cmd.arg(&image);
    cmd.assert().code(2);
}
