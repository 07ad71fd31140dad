//! Common test utilities for end-to-end tests.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

/// Write `contents` to a temporary file with the given suffix.
#[allow(dead_code)]
pub fn temp_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

/// Run the `selkie` binary with the given arguments.
#[allow(dead_code)]
pub fn run_selkie<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_selkie"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute selkie")
}

/// Run `selkie` and return its stdout, panicking with stderr on failure.
#[allow(dead_code)]
pub fn run_selkie_ok<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = run_selkie(args);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("selkie failed: {}", stderr);
    }
    String::from_utf8(output.stdout).expect("stdout is not UTF-8")
}
