//! End-to-end tests for selecting whole functions for the toy target.

use insta::assert_snapshot;
use selkie::toy::{ToySelector, ToyTarget};
use selkie::{DriverError, select_source};
use selkie_isel::{FallbackPolicy, FeatureBitset, SelectError, SelectOptions, SelectStats};

fn selector() -> ToySelector {
    ToySelector::new(ToyTarget::new())
}

#[test]
fn test_add_folds_constants() {
    let source = include_str!("../mir-examples/add.mir");
    let (output, stats) =
        select_source(&selector(), source, SelectOptions::default()).expect("selection failed");

    // Both constants are folded into their users and then erased as dead.
    assert_eq!(
        stats,
        SelectStats {
            selected: 6,
            erased_dead: 2,
            unselected: 0,
        }
    );
    assert_snapshot!(output, @r"
    func @add {
    bb.0:
      %0:gpr32(s32) = COPY $w0
      %1:gpr32(s32) = COPY $w1
      %3:gpr32(s32) = INC %0
      %5:gpr32(s32) = ADDri %3, 100
      %6:gpr32(s32) = ADDrr %5, %1
      $w0 = COPY %6
      RET implicit $w0
    }
    ");
}

#[test]
fn test_memory_folds_address_arithmetic() {
    let source = include_str!("../mir-examples/memory.mir");
    let (output, stats) =
        select_source(&selector(), source, SelectOptions::default()).expect("selection failed");

    assert_eq!(stats.erased_dead, 2, "G_GEP and its offset should be dead");
    assert_snapshot!(output, @r"
    func @memory {
    bb.0:
      %0:gpr64(p0) = COPY $x0
      %3:gpr32(s32) = LDRWui %0, 2 :: (load 4)
      %4:gpr32(s32) = COPY $wzr
      STRWui %4, %0, 0 :: (store 4)
      $w0 = COPY %3
      RET implicit $w0
    }
    ");
}

#[test]
fn test_unaligned_offset_is_not_folded() {
    let source = "\
func @gep {
bb.0:
  %0:gprb(p0) = COPY $x0
  %1:gprb(s64) = G_CONSTANT i64 6
  %2:gprb(p0) = G_GEP %0, %1
  %3:gprb(s32) = G_LOAD %2 :: (load 4)
  $w0 = COPY %3
  RET implicit $w0
}
";
    let (output, _) =
        select_source(&selector(), source, SelectOptions::default()).expect("selection failed");
    assert_snapshot!(output, @r"
    func @gep {
    bb.0:
      %0:gpr64(p0) = COPY $x0
      %1:gpr64(s64) = MOVXi 6
      %2:gpr64(p0) = ADDXrr %0, %1
      %3:gpr32(s32) = LDRWui %2, 0 :: (load 4)
      $w0 = COPY %3
      RET implicit $w0
    }
    ");
}

#[test]
fn test_misc_selects_every_block() {
    let source = include_str!("../mir-examples/misc.mir");
    let (output, stats) =
        select_source(&selector(), source, SelectOptions::default()).expect("selection failed");

    assert_eq!(stats.selected, 7);
    assert_eq!(stats.unselected, 0);
    assert_snapshot!(output, @r"
    func @misc {
    bb.0:
      %0:gpr64(s64) = RDCYCLE implicit-def $cc
      %1:gpr32(s32) = COPY %0.sub_32
      %2:gpr32(s32) = MUL %1, %1
      %3:gpr32(s32) = IMPLICIT_DEF
      %4:gpr32(s32) = ADDrr %2, %3
      B %bb.1
    bb.1:
      $w0 = COPY %4
      RET implicit $w0
    }
    ");
}

#[test]
fn test_missing_feature_leaves_instruction_generic() {
    let source = include_str!("../mir-examples/misc.mir");
    let selector = selector().with_features(FeatureBitset::EMPTY);

    let (output, stats) =
        select_source(&selector, source, SelectOptions::default()).expect("selection failed");
    assert_eq!(stats.unselected, 1);
    assert!(
        output.contains("%2:gpr32(s32) = G_MUL %1, %1"),
        "G_MUL should survive without the multiplier:\n{output}"
    );

    let options = SelectOptions {
        fallback: FallbackPolicy::Abort,
        ..SelectOptions::default()
    };
    let err = match select_source(&selector, source, options) {
        Err(DriverError::Select(err)) => err,
        other => panic!("expected a selection error, got {other:?}"),
    };
    assert_eq!(
        err,
        SelectError::CannotSelect {
            function: "misc".to_owned(),
            inst: "%2:gpr32(s32) = G_MUL %1, %1".to_owned(),
        }
    );
}

#[test]
fn test_keeping_dead_code() {
    let source = "\
func @dead {
bb.0:
  %0:gprb(s32) = G_CONSTANT i32 7
  RET
}
";
    let options = SelectOptions {
        eliminate_dead: false,
        ..SelectOptions::default()
    };
    let (output, stats) = select_source(&selector(), source, options).expect("selection failed");
    assert_eq!(stats.selected, 1);
    assert!(output.contains("%0:gpr32(s32) = MOVi 7"), "{output}");

    let (output, stats) =
        select_source(&selector(), source, SelectOptions::default()).expect("selection failed");
    assert_eq!(stats.erased_dead, 1);
    assert!(!output.contains("MOVi"), "{output}");
}

#[test]
fn test_parse_errors_are_reported() {
    let source = "func @f {\nbb.0:\n  %0 = FROB\n}\n";
    let err = select_source(&selector(), source, SelectOptions::default()).unwrap_err();
    assert!(matches!(err, DriverError::Parse(_)), "{err}");
}
