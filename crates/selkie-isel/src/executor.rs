//! The match-table interpreter.
//!
//! Execution starts at index 0 with the root bound to slot 0 and runs
//! until `GIR_Done` (success) or a rejection with no pending `GIM_Try`
//! (failure). A rejection jumps to the most recent try's resume point and
//! erases the instructions built since that try was entered. Nothing else
//! is restored: slot bindings, renderer captures and in-place side effects
//! made before the rejection stay as they are.
//!
//! Malformed tables are programming errors and panic with the index of
//! the offending opcode. Run [`MatchTable::validate`] on tables from
//! outside the process before interpreting them.

use selkie_mir::{
    InstRef, MachineFunction, MachineOperand, Opcode, PhysReg, RegClassId, Register, TargetInfo,
    generic,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::info::{FeatureBitset, MatcherInfo};
use crate::legality::LegalityOracle;
use crate::opcode::{LIST_END, MatchOpcode};
use crate::state::{MatcherState, NewInstVector, OutputKind};
use crate::table::MatchTable;
use crate::utils::{
    constrain_operand_reg_to_class, constrain_selected_inst_reg_operands,
    is_obviously_safe_to_fold, is_operand_imm_equal,
};

/// Everything an interpretation reads besides the function being
/// selected.
pub struct MatchTableExecutor<'a, S> {
    pub target: &'a TargetInfo,
    pub oracle: &'a dyn LegalityOracle,
    pub info: &'a MatcherInfo<S>,
    /// Handed to complex-pattern callbacks.
    pub selector: &'a S,
    pub available_features: FeatureBitset,
}

impl<'a, S> MatchTableExecutor<'a, S> {
    /// An executor answering legality questions from `target` itself.
    pub fn new(
        target: &'a TargetInfo,
        info: &'a MatcherInfo<S>,
        selector: &'a S,
        available_features: FeatureBitset,
    ) -> Self {
        Self {
            target,
            oracle: target,
            info,
            selector,
            available_features,
        }
    }

    pub fn with_oracle(mut self, oracle: &'a dyn LegalityOracle) -> Self {
        self.oracle = oracle;
        self
    }

    /// Run `table` against the root of `state` with fresh outputs.
    pub fn select(&self, func: &mut MachineFunction, table: &MatchTable, root: InstRef) -> bool {
        let mut state = MatcherState::new(root);
        let mut outputs = NewInstVector::new();
        self.execute(func, table, &mut state, &mut outputs)
    }

    /// Interpret `table`.
    ///
    /// On success `outputs` holds the replacement instructions. On failure
    /// every instruction built during the attempt has been erased again
    /// and `outputs` is empty.
    ///
    /// # Panics
    ///
    /// Panics when the table is malformed or references an unbound slot,
    /// output or renderer.
    pub fn execute(
        &self,
        func: &mut MachineFunction,
        table: &MatchTable,
        state: &mut MatcherState,
        outputs: &mut NewInstVector,
    ) -> bool {
        let entries = table.as_slice();
        let mut on_fail_resume_at: SmallVec<[Alternative; 8]> = SmallVec::new();
        let mut pc = 0;

        loop {
            let index = pc;
            let Some(&tag) = entries.get(index) else {
                panic!("match table ran off the end at index {index}");
            };
            let opcode = MatchOpcode::try_from(tag)
                .unwrap_or_else(|err| panic!("match table index {index}: {err}"));
            trace!(index, opcode = opcode.mnemonic(), "executing");

            let mut ops = Operands {
                entries,
                index,
                pos: index + 1,
                mnemonic: opcode.mnemonic(),
            };
            let step = self.step(opcode, &mut ops, func, state, outputs, &mut on_fail_resume_at);
            pc = ops.pos;

            match step {
                Step::Continue => {}
                Step::Accept => {
                    debug!(index, outputs = outputs.len(), "match accepted");
                    return true;
                }
                Step::Reject => match on_fail_resume_at.pop() {
                    Some(Alternative { resume, outputs: mark }) => {
                        debug!(index, resume, "rejected, resuming at next alternative");
                        outputs.rollback_to(func, mark);
                        pc = resume;
                    }
                    None => {
                        debug!(index, "rejected, no alternatives left");
                        outputs.rollback(func);
                        return false;
                    }
                },
            }
        }
    }

    fn step(
        &self,
        opcode: MatchOpcode,
        ops: &mut Operands<'_>,
        func: &mut MachineFunction,
        state: &mut MatcherState,
        outputs: &mut NewInstVector,
        on_fail_resume_at: &mut SmallVec<[Alternative; 8]>,
    ) -> Step {
        let index = ops.index;
        match opcode {
            MatchOpcode::Try => {
                let resume = ops.id("resume target");
                trace!(index, resume, "pushing alternative");
                on_fail_resume_at.push(Alternative {
                    resume,
                    outputs: outputs.len(),
                });
                Step::Continue
            }
            MatchOpcode::RecordInsn => {
                let new_id = ops.id("slot");
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let Some(Register::Virt(v)) = op.reg() else {
                    trace!(index, "operand is not a virtual register");
                    return Step::Reject;
                };
                let Some(def) = func.vreg_def(v) else {
                    trace!(index, vreg = %v, "register has no definition");
                    return Step::Reject;
                };
                state.bind_insn(new_id, def);
                trace!(index, slot = new_id, inst = %def, "recorded instruction");
                Step::Continue
            }
            MatchOpcode::CheckFeatures => {
                let id = ops.id("feature bitset");
                let required = *lookup(&self.info.feature_bitsets, id, "feature bitset", index);
                check(self.available_features.contains_all(required))
            }
            MatchOpcode::CheckOpcode => {
                let inst = state.insn(ops.id("slot"));
                let expected = ops.opcode();
                check(func.opcode(inst) == expected)
            }
            MatchOpcode::CheckNumOperands => {
                let inst = state.insn(ops.id("slot"));
                let expected = ops.id("operand count");
                check(func.num_operands(inst) == expected)
            }
            MatchOpcode::CheckImmPredicate => {
                let inst = state.insn(ops.id("slot"));
                let pred_id = ops.id("predicate");
                let value = constant_operand_value(func, inst, index);
                let pred = *lookup(&self.info.imm_predicates, pred_id, "immediate predicate", index);
                check(pred(value))
            }
            MatchOpcode::CheckType => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let expected = *lookup(&self.info.types, ops.id("type"), "type", index);
                let actual = op.reg().and_then(|reg| func.reg_type(reg));
                check(actual == Some(expected))
            }
            MatchOpcode::CheckRegBankForClass => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let rc = ops.reg_class();
                let Some(reg) = op.reg() else {
                    return Step::Reject;
                };
                check(self.oracle.reg_bank(func, reg) == Some(self.oracle.bank_of_class(rc)))
            }
            MatchOpcode::CheckComplexPattern => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let renderer_id = ops.id("renderer");
                let predicate = *lookup(
                    &self.info.complex_predicates,
                    ops.id("complex predicate"),
                    "complex predicate",
                    index,
                );
                state.set_renderer(renderer_id, predicate(self.selector, func, &op));
                check(state.has_renderer(renderer_id))
            }
            MatchOpcode::CheckConstantInt => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let value = ops.next();
                check(is_operand_imm_equal(func, &op, value))
            }
            MatchOpcode::CheckLiteralInt => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let value = ops.next();
                check(matches!(op, MachineOperand::CImm(c) if c.equals_int(value)))
            }
            MatchOpcode::CheckIntrinsicId => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let value = ops.next();
                check(matches!(op, MachineOperand::IntrinsicId(id) if i64::from(id) == value))
            }
            MatchOpcode::CheckIsMbb => {
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                check(op.is_mbb())
            }
            MatchOpcode::CheckIsSafeToFold => {
                let inst = state.insn(ops.id("slot"));
                check(is_obviously_safe_to_fold(self.target, func, inst))
            }
            MatchOpcode::Reject => Step::Reject,

            MatchOpcode::MutateOpcode => {
                let inst = state.insn(ops.id("slot"));
                let new_id = ops.id("output");
                let new_opcode = ops.opcode();
                let original = func.opcode(inst);
                func.set_opcode(inst, new_opcode);
                outputs.push(new_id, inst, OutputKind::Mutated { original });
                trace!(index, output = new_id, %inst, "mutated opcode in place");
                Step::Continue
            }
            MatchOpcode::BuildMi => {
                let new_id = ops.id("output");
                let new_opcode = ops.opcode();
                let inst = func.create_inst(new_opcode);
                func.insert_before(state.root(), inst);
                outputs.push(new_id, inst, OutputKind::Built);
                trace!(index, output = new_id, %inst, "built instruction");
                Step::Continue
            }
            MatchOpcode::Copy => {
                let out = outputs.get(ops.id("output"));
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                func.add_operand(out, op);
                Step::Continue
            }
            MatchOpcode::CopySubReg => {
                let out = outputs.get(ops.id("output"));
                let inst = state.insn(ops.id("slot"));
                let op = operand(func, inst, ops.id("operand index"), index);
                let sub_reg = ops.u32("sub-register index");
                let Some(reg) = op.reg() else {
                    panic!("match table index {index}: sub-register copy of non-register {op:?}");
                };
                func.build(out).add_sub_reg(reg, sub_reg);
                Step::Continue
            }
            MatchOpcode::AddImplicitDef => {
                let out = outputs.get(ops.id("output"));
                let reg = ops.phys_reg();
                func.build(out).add_implicit_def(reg);
                Step::Continue
            }
            MatchOpcode::AddImplicitUse => {
                let out = outputs.get(ops.id("output"));
                let reg = ops.phys_reg();
                func.build(out).add_implicit_use(reg);
                Step::Continue
            }
            MatchOpcode::AddRegister => {
                let out = outputs.get(ops.id("output"));
                let reg = ops.phys_reg();
                func.build(out).add_reg(reg);
                Step::Continue
            }
            MatchOpcode::AddImm => {
                let out = outputs.get(ops.id("output"));
                let imm = ops.next();
                func.build(out).add_imm(imm);
                Step::Continue
            }
            MatchOpcode::ComplexRenderer => {
                let out = outputs.get(ops.id("output"));
                let renderer = state.renderer(ops.id("renderer"));
                renderer(&mut func.build(out));
                Step::Continue
            }
            MatchOpcode::CopyConstantAsSImm => {
                let out = outputs.get(ops.id("output"));
                let inst = state.insn(ops.id("slot"));
                let value = constant_operand_value(func, inst, index);
                func.build(out).add_imm(value);
                Step::Continue
            }
            MatchOpcode::ConstrainOperandRc => {
                let out = outputs.get(ops.id("output"));
                let op_idx = ops.id("operand index");
                let rc = ops.reg_class();
                constrain_operand_reg_to_class(func, self.oracle, out, op_idx, rc);
                Step::Continue
            }
            MatchOpcode::ConstrainSelectedInstOperands => {
                let out = outputs.get(ops.id("output"));
                constrain_selected_inst_reg_operands(func, self.oracle, out);
                Step::Continue
            }
            MatchOpcode::MergeMemOperands => {
                let out = outputs.get(ops.id("output"));
                loop {
                    let id = ops.next();
                    if id == LIST_END {
                        break;
                    }
                    let id = usize::try_from(id).unwrap_or_else(|_| {
                        panic!("match table index {index}: negative slot {id} in merge list")
                    });
                    let source = state.insn(id);
                    let mems = func.mem_operands(source).to_vec();
                    for mem in mems {
                        func.add_mem_operand(out, mem);
                    }
                }
                Step::Continue
            }
            MatchOpcode::EraseFromParent => {
                let inst = state.insn(ops.id("slot"));
                trace!(index, %inst, "erasing matched instruction");
                func.erase_inst(inst);
                Step::Continue
            }
            MatchOpcode::Done => Step::Accept,
        }
    }
}

/// A pending `GIM_Try`: where to resume and how many outputs existed
/// when it was entered.
struct Alternative {
    resume: usize,
    outputs: usize,
}

enum Step {
    Continue,
    Reject,
    Accept,
}

fn check(cond: bool) -> Step {
    if cond { Step::Continue } else { Step::Reject }
}

fn operand(func: &MachineFunction, inst: InstRef, op_idx: usize, index: usize) -> MachineOperand {
    match func.operands(inst).get(op_idx) {
        Some(op) => *op,
        None => panic!(
            "match table index {index}: operand {op_idx} out of range for {inst} with {} operand(s)",
            func.num_operands(inst)
        ),
    }
}

/// The value of the `G_CONSTANT` in `inst`.
fn constant_operand_value(func: &MachineFunction, inst: InstRef, index: usize) -> i64 {
    assert!(
        func.opcode(inst) == generic::G_CONSTANT,
        "match table index {index}: {inst} is not a G_CONSTANT"
    );
    match operand(func, inst, 1, index) {
        MachineOperand::CImm(c) => c.sext_value(),
        MachineOperand::Imm(imm) => imm,
        other => panic!("match table index {index}: {inst} has no constant operand: {other:?}"),
    }
}

fn lookup<'t, T>(items: &'t [T], id: usize, what: &str, index: usize) -> &'t T {
    items.get(id).unwrap_or_else(|| {
        panic!(
            "match table index {index}: {what} {id} out of range ({} defined)",
            items.len()
        )
    })
}

/// Cursor over the operands of one table entry.
struct Operands<'t> {
    entries: &'t [i64],
    index: usize,
    pos: usize,
    mnemonic: &'static str,
}

impl Operands<'_> {
    fn next(&mut self) -> i64 {
        let Some(&value) = self.entries.get(self.pos) else {
            panic!(
                "{} at match table index {} runs past the end of the table",
                self.mnemonic, self.index
            );
        };
        self.pos += 1;
        value
    }

    fn id(&mut self, what: &str) -> usize {
        let value = self.next();
        usize::try_from(value).unwrap_or_else(|_| {
            panic!(
                "{} at match table index {}: negative {what} {value}",
                self.mnemonic, self.index
            )
        })
    }

    fn u32(&mut self, what: &str) -> u32 {
        let value = self.next();
        u32::try_from(value).unwrap_or_else(|_| {
            panic!(
                "{} at match table index {}: {what} {value} out of range",
                self.mnemonic, self.index
            )
        })
    }

    fn opcode(&mut self) -> Opcode {
        Opcode::from_u32(self.u32("opcode"))
    }

    fn reg_class(&mut self) -> RegClassId {
        RegClassId::from_u32(self.u32("register class"))
    }

    fn phys_reg(&mut self) -> PhysReg {
        PhysReg::from_u32(self.u32("physical register"))
    }
}
