//! The instruction-selector interface and the pass that drives it over a
//! whole function.

use selkie_mir::{
    BlockRef, InstRef, MachineFunction, Register, TargetInfo, generic, print_inst,
};
use tracing::{debug, trace, warn};

use crate::error::SelectError;
use crate::executor::MatchTableExecutor;
use crate::info::{FeatureBitset, MatcherInfo};
use crate::legality::LegalityOracle;
use crate::table::MatchTable;
use crate::utils::is_trivially_dead;

/// Target-specific instruction selection.
pub trait InstructionSelector {
    fn target(&self) -> &TargetInfo;

    /// Register class and bank queries. Defaults to the target description.
    fn oracle(&self) -> &dyn LegalityOracle {
        self.target()
    }

    /// Features available when selecting `func`.
    fn available_features(&self, _func: &MachineFunction) -> FeatureBitset {
        FeatureBitset::EMPTY
    }

    /// Select `inst`, replacing it with target instructions. Returns
    /// `false` when no selection applies; the function must then be left
    /// as it was, except for register class constraints.
    fn select(&self, func: &mut MachineFunction, inst: InstRef) -> bool;

    /// Run a generated match table on `root`.
    fn select_with_table(
        &self,
        func: &mut MachineFunction,
        table: &MatchTable,
        info: &MatcherInfo<Self>,
        root: InstRef,
    ) -> bool
    where
        Self: Sized,
    {
        let features = self.available_features(func);
        MatchTableExecutor::new(self.target(), info, self, features)
            .with_oracle(self.oracle())
            .select(func, table, root)
    }
}

/// What the pass does with an instruction no selection applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Stop and report the instruction.
    Abort,
    /// Log a warning and leave the instruction generic.
    #[default]
    Continue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectOptions {
    pub fallback: FallbackPolicy,
    /// Erase instructions whose results are unused before selecting them.
    pub eliminate_dead: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            eliminate_dead: true,
        }
    }
}

/// Counters reported by [`InstructionSelect::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectStats {
    pub selected: usize,
    pub erased_dead: usize,
    pub unselected: usize,
}

/// Selects every generic instruction of a function.
///
/// Blocks are visited last to first and instructions bottom-up, so the
/// users of a value are selected before its definition. A definition that
/// was folded into all of its users is then trivially dead and erased
/// instead of selected. Instructions created during selection are not
/// visited.
pub struct InstructionSelect<'s, S> {
    selector: &'s S,
    options: SelectOptions,
}

impl<'s, S: InstructionSelector> InstructionSelect<'s, S> {
    pub fn new(selector: &'s S, options: SelectOptions) -> Self {
        Self { selector, options }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(function = %func.name))]
    pub fn run(&self, func: &mut MachineFunction) -> Result<SelectStats, SelectError> {
        let target = self.selector.target();
        let mut stats = SelectStats::default();

        let blocks: Vec<BlockRef> = func.block_order().rev().collect();
        for block in blocks {
            let insts: Vec<InstRef> = func.block_insts(block).iter().rev().copied().collect();
            for inst in insts {
                // Erased or moved by an earlier selection.
                if func.is_erased(inst) || func.inst(inst).parent != Some(block) {
                    continue;
                }

                if self.options.eliminate_dead && is_trivially_dead(target, func, inst) {
                    debug!(inst = %print_inst(target, func, inst), "erasing dead instruction");
                    func.erase_inst(inst);
                    stats.erased_dead += 1;
                    continue;
                }

                let opcode = func.opcode(inst);
                if !target.instr(opcode).generic && opcode != generic::COPY {
                    continue;
                }

                let text = print_inst(target, func, inst);
                if self.selector.select(func, inst) {
                    trace!(inst = %text, "selected");
                    stats.selected += 1;
                    continue;
                }

                match self.options.fallback {
                    FallbackPolicy::Abort => {
                        return Err(SelectError::CannotSelect {
                            function: func.name.clone(),
                            inst: text,
                        });
                    }
                    FallbackPolicy::Continue => {
                        warn!(function = %func.name, inst = %text, "cannot select instruction");
                        stats.unselected += 1;
                    }
                }
            }
        }

        if self.options.fallback == FallbackPolicy::Abort {
            check_reg_classes(func)?;
        }
        debug!(?stats, "selection finished");
        Ok(stats)
    }
}

/// Every virtual register still referenced must have a class.
fn check_reg_classes(func: &MachineFunction) -> Result<(), SelectError> {
    for inst in func.insts_in_layout() {
        for op in func.operands(inst) {
            let Some(Register::Virt(v)) = op.reg() else {
                continue;
            };
            if func.vreg(v).class.is_none() {
                return Err(SelectError::MissingRegClass {
                    function: func.name.clone(),
                    vreg: v,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MatchTableBuilder;
    use crate::utils::constrain_operand_reg_to_class;
    use insta::assert_snapshot;
    use selkie_mir::{
        InstrDesc, Opcode, RegClassId, TargetInfoBuilder, parse_test_function, print_function,
    };

    struct MiniSelector {
        target: TargetInfo,
        table: MatchTable,
        info: MatcherInfo<MiniSelector>,
        gpr32: RegClassId,
    }

    impl MiniSelector {
        fn new() -> Self {
            let mut b = TargetInfoBuilder::new("mini");
            let gprb = b.reg_bank("gprb");
            let w0 = b.phys_reg("w0");
            let gpr32 = b.reg_class("gpr32", gprb, 32, &[w0]);
            let addrr = b.instr(
                InstrDesc::new("ADDrr")
                    .defs(1)
                    .reg(gpr32)
                    .reg(gpr32)
                    .reg(gpr32),
            );
            let movi = b.instr(InstrDesc::new("MOVi").defs(1).reg(gpr32).untyped());
            let target = b.finish();
            Self {
                table: Self::table(addrr, movi),
                target,
                info: MatcherInfo::new(),
                gpr32,
            }
        }

        fn table(addrr: Opcode, movi: Opcode) -> MatchTable {
            let mut b = MatchTableBuilder::new();
            let not_add = b.label("not_add");
            let not_constant = b.label("not_constant");
            b.try_block(not_add)
                .check_opcode(0, generic::G_ADD)
                .mutate_opcode(0, 0, addrr)
                .constrain_selected_inst_operands(0)
                .done();
            b.bind(not_add)
                .try_block(not_constant)
                .check_opcode(0, generic::G_CONSTANT)
                .build_mi(0, movi)
                .copy(0, 0, 0)
                .copy_constant_as_simm(0, 0)
                .constrain_selected_inst_operands(0)
                .erase_from_parent(0)
                .done();
            b.bind(not_constant).reject();
            b.finish().unwrap()
        }
    }

    impl InstructionSelector for MiniSelector {
        fn target(&self) -> &TargetInfo {
            &self.target
        }

        fn select(&self, func: &mut MachineFunction, inst: InstRef) -> bool {
            if func.opcode(inst) == generic::COPY {
                let Some(Register::Virt(_)) = func.operand(inst, 0).reg() else {
                    return true;
                };
                constrain_operand_reg_to_class(func, self.oracle(), inst, 0, self.gpr32);
                return true;
            }
            self.select_with_table(func, &self.table, &self.info, inst)
        }
    }

    const INPUT: &str = "\
func @f {
bb.0:
  %0:gprb(s32) = COPY $w0
  %1:gprb(s32) = G_CONSTANT i32 3
  %2:gprb(s32) = G_CONSTANT i32 9
  %3:gprb(s32) = G_ADD %0, %1
  $w0 = COPY %3
}
";

    #[test]
    fn selects_bottom_up_and_drops_dead_code() {
        let selector = MiniSelector::new();
        let mut func = parse_test_function(&selector.target, INPUT);
        let stats = InstructionSelect::new(&selector, SelectOptions::default())
            .run(&mut func)
            .unwrap();
        assert_eq!(
            stats,
            SelectStats {
                selected: 4,
                erased_dead: 1,
                unselected: 0,
            }
        );
        assert_snapshot!(print_function(&selector.target, &func), @r"
        func @f {
        bb.0:
          %0:gpr32(s32) = COPY $w0
          %1:gpr32(s32) = MOVi 3
          %3:gpr32(s32) = ADDrr %0, %1
          $w0 = COPY %3
        }
        ");
    }

    #[test]
    fn abort_reports_the_instruction() {
        let selector = MiniSelector::new();
        let mut func = parse_test_function(
            &selector.target,
            "func @g {\nbb.0:\n  %0:gprb(s32) = COPY $w0\n  %1:gprb(s32) = G_MUL %0, %0\n  $w0 = COPY %1\n}\n",
        );
        let options = SelectOptions {
            fallback: FallbackPolicy::Abort,
            ..SelectOptions::default()
        };
        let err = InstructionSelect::new(&selector, options)
            .run(&mut func)
            .unwrap_err();
        assert_eq!(
            err,
            SelectError::CannotSelect {
                function: "g".to_owned(),
                inst: "%1:gprb(s32) = G_MUL %0, %0".to_owned(),
            }
        );
    }

    #[test]
    fn continue_leaves_unselectable_instructions() {
        let selector = MiniSelector::new();
        let mut func = parse_test_function(
            &selector.target,
            "func @g {\nbb.0:\n  %0:gprb(s32) = COPY $w0\n  %1:gprb(s32) = G_MUL %0, %0\n  $w0 = COPY %1\n}\n",
        );
        let stats = InstructionSelect::new(&selector, SelectOptions::default())
            .run(&mut func)
            .unwrap();
        assert_eq!(stats.unselected, 1);
        assert_eq!(stats.selected, 2);
        assert_eq!(func.insts_in_layout().count(), 3);
    }

    #[test]
    fn abort_requires_register_classes() {
        let selector = MiniSelector::new();
        // Nothing to select, but %0 never gets a class.
        let mut func = parse_test_function(
            &selector.target,
            "func @h {\nbb.0:\n  %0:gprb(s32) = MOVi 1\n  $w0 = COPY %0\n}\n",
        );
        let options = SelectOptions {
            fallback: FallbackPolicy::Abort,
            ..SelectOptions::default()
        };
        let err = InstructionSelect::new(&selector, options)
            .run(&mut func)
            .unwrap_err();
        assert!(matches!(err, SelectError::MissingRegClass { .. }));
    }
}
