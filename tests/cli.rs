//! Tests for the `selkie` command-line driver.

mod common;

use std::ffi::OsStr;

use common::{run_selkie, run_selkie_ok, temp_file};
use insta::assert_snapshot;

#[test]
fn test_select_prints_selected_function() {
    let output = run_selkie_ok(["select", "mir-examples/add.mir"]);
    assert!(
        output.contains("%3:gpr32(s32) = INC %0"),
        "Expected the increment to be folded, got:\n{}",
        output
    );
}

#[test]
fn test_select_with_custom_table() {
    let table = temp_file(".gisel", include_str!("../mir-examples/add_only.gisel"));
    let source = temp_file(
        ".mir",
        "func @f {\nbb.0:\n  %0:gprb(s32) = COPY $w0\n  %1:gprb(s32) = G_ADD %0, %0\n  $w0 = COPY %1\n}\n",
    );
    let output = run_selkie_ok([
        OsStr::new("select"),
        source.path().as_os_str(),
        OsStr::new("--table"),
        table.path().as_os_str(),
    ]);
    assert_snapshot!(output, @r"
    func @f {
    bb.0:
      %0:gpr32(s32) = COPY $w0
      %1:gpr32(s32) = ADDrr %0, %0
      $w0 = COPY %1
    }
    ");
}

#[test]
fn test_abort_fails_with_message() {
    let output = run_selkie(["select", "--abort", "--no-mul", "mir-examples/misc.mir"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("cannot select `%2:gpr32(s32) = G_MUL %1, %1` in function `misc`"),
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_table_json_round_trips_through_check() {
    let json = run_selkie_ok(["table", "--format", "json"]);
    let text = run_selkie_ok(["table"]);

    let file = temp_file(".json", &json);
    let checked = run_selkie_ok([OsStr::new("check-table"), file.path().as_os_str()]);
    assert_eq!(checked, text);
}

#[test]
fn test_check_table_reports_errors() {
    let file = temp_file(".gisel", "    GIM_Try @missing\n    GIR_Done\n");
    let output = run_selkie([OsStr::new("check-table"), file.path().as_os_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("label `missing` is used but never bound"),
        "unexpected stderr: {}",
        stderr
    );
}
