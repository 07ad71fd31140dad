//! Helpers shared by the interpreter, hand-written selection code and the
//! pass driver.

use selkie_mir::{
    InstRef, MachineFunction, MachineOperand, RegClassId, RegOperand, Register, TargetInfo, VReg,
    generic,
};
use tracing::trace;

use crate::legality::LegalityOracle;

/// Constrain the register of operand `op_idx` of `inst` to `rc`.
///
/// Physical registers are left alone. A virtual register that cannot be
/// constrained in place is replaced by a fresh register of class `rc`,
/// joined to the old one by a `COPY`: inserted before `inst` for a use and
/// after it for a def. Returns the register the operand ends up with.
///
/// # Panics
///
/// Panics if the operand is not a register or `inst` is not in a block
/// when a copy is needed.
pub fn constrain_operand_reg_to_class(
    func: &mut MachineFunction,
    oracle: &dyn LegalityOracle,
    inst: InstRef,
    op_idx: usize,
    rc: RegClassId,
) -> Register {
    let op = match *func.operand(inst, op_idx) {
        MachineOperand::Reg(op) => op,
        ref other => panic!("operand {op_idx} of {inst} is not a register: {other:?}"),
    };
    let old = match op.reg {
        Register::Phys(_) => return op.reg,
        Register::Virt(v) => v,
    };
    if oracle.constrain_vreg(func, old, rc) {
        return op.reg;
    }

    let new = func.create_vreg(None);
    func.set_vreg_class(new, rc);
    func.set_vreg_bank(new, oracle.bank_of_class(rc));

    let copy = func.create_inst(generic::COPY);
    if op.is_def {
        func.build(copy).add_def(old).add_reg(new);
        func.insert_after(inst, copy);
        func.set_operand(
            inst,
            op_idx,
            MachineOperand::Reg(RegOperand {
                reg: Register::Virt(new),
                ..op
            }),
        );
    } else {
        func.build(copy).add_def(new).add_sub_reg(old, op.sub_reg);
        func.insert_before(inst, copy);
        func.set_operand(
            inst,
            op_idx,
            MachineOperand::Reg(RegOperand {
                reg: Register::Virt(new),
                sub_reg: 0,
                ..op
            }),
        );
    }
    trace!(%inst, op_idx, %old, %new, %copy, "inserted copy to satisfy register class");
    Register::Virt(new)
}

/// Constrain every explicit virtual register operand of `inst` to the
/// class its instruction description asks for.
pub fn constrain_selected_inst_reg_operands(
    func: &mut MachineFunction,
    oracle: &dyn LegalityOracle,
    inst: InstRef,
) {
    let opcode = func.opcode(inst);
    for op_idx in 0..func.num_operands(inst) {
        let op = *func.operand(inst, op_idx);
        if op.is_implicit() || !matches!(op.reg(), Some(Register::Virt(_))) {
            continue;
        }
        if let Some(rc) = oracle.operand_reg_class(opcode, op_idx) {
            constrain_operand_reg_to_class(func, oracle, inst, op_idx, rc);
        }
    }
}

/// The value of `v` if it is defined by a `G_CONSTANT`.
pub fn constant_vreg_value(func: &MachineFunction, v: VReg) -> Option<i64> {
    let def = func.vreg_def(v)?;
    if func.opcode(def) != generic::G_CONSTANT || func.num_operands(def) < 2 {
        return None;
    }
    match *func.operand(def, 1) {
        MachineOperand::CImm(c) => Some(c.sext_value()),
        MachineOperand::Imm(imm) => Some(imm),
        _ => None,
    }
}

/// Whether `op` is, or is a virtual register holding, the integer `value`.
pub fn is_operand_imm_equal(func: &MachineFunction, op: &MachineOperand, value: i64) -> bool {
    match *op {
        MachineOperand::Imm(imm) => imm == value,
        MachineOperand::CImm(c) => c.equals_int(value),
        MachineOperand::Reg(RegOperand {
            reg: Register::Virt(v),
            ..
        }) => constant_vreg_value(func, v) == Some(value),
        _ => false,
    }
}

/// Whether `inst` can be folded into its user without further analysis.
pub fn is_obviously_safe_to_fold(
    target: &TargetInfo,
    func: &MachineFunction,
    inst: InstRef,
) -> bool {
    let desc = target.instr(func.opcode(inst));
    !desc.may_load
        && !desc.may_store
        && !desc.has_side_effects
        && !func.inst(inst).has_implicit_operands()
}

/// Whether `inst` can be deleted: it has no effects beyond its results and
/// none of the virtual registers it defines is used.
pub fn is_trivially_dead(target: &TargetInfo, func: &MachineFunction, inst: InstRef) -> bool {
    let desc = target.instr(func.opcode(inst));
    if desc.may_store || desc.has_side_effects || desc.is_terminator {
        return false;
    }
    func.operands(inst)
        .iter()
        .filter_map(MachineOperand::as_reg)
        .filter(|op| op.is_def)
        .all(|op| match op.reg {
            Register::Virt(v) => !func.has_uses(v),
            Register::Phys(_) => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_mir::{InstrDesc, LowLevelType, MemOperand, TargetInfoBuilder, print_function};

    struct Fixture {
        target: TargetInfo,
        gpr32: RegClassId,
        gpr64: RegClassId,
    }

    fn fixture() -> Fixture {
        let mut b = TargetInfoBuilder::new("t");
        let gprb = b.reg_bank("gprb");
        let w0 = b.phys_reg("w0");
        let x0 = b.phys_reg("x0");
        let flags = b.phys_reg("flags");
        let gpr32 = b.reg_class("gpr32", gprb, 32, &[w0]);
        let gpr64 = b.reg_class("gpr64", gprb, 64, &[x0]);
        b.reg_class("ccr", gprb, 32, &[flags]);
        b.sub_reg_index("sub_32");
        b.instr(InstrDesc::new("OP32").defs(1).reg(gpr32).reg(gpr32));
        Fixture {
            target: b.finish(),
            gpr32,
            gpr64,
        }
    }

    #[test]
    fn constant_lookup() {
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let c = func.create_vreg(Some(LowLevelType::scalar(8)));
        let k = func.create_inst(generic::G_CONSTANT);
        func.build(k).add_def(c).add_cimm(0xff, 8);
        func.append_inst(bb, k);

        assert_eq!(constant_vreg_value(&func, c), Some(-1));
        assert!(is_operand_imm_equal(&func, &MachineOperand::reg_use(c), -1));
        assert!(is_operand_imm_equal(&func, &MachineOperand::Imm(3), 3));
        assert!(!is_operand_imm_equal(&func, &MachineOperand::Imm(3), 4));

        let undefined = func.create_vreg(None);
        assert_eq!(constant_vreg_value(&func, undefined), None);
    }

    #[test]
    fn compatible_operand_is_constrained_in_place() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let a = func.create_vreg(Some(LowLevelType::scalar(32)));
        let inst = func.create_inst(generic::G_ANYEXT);
        func.build(inst).add_reg(a);
        func.append_inst(bb, inst);

        let reg = constrain_operand_reg_to_class(&mut func, &fx.target, inst, 0, fx.gpr32);
        assert_eq!(reg, Register::Virt(a));
        assert_eq!(func.vreg(a).class, Some(fx.gpr32));
        assert_eq!(func.block_insts(bb).len(), 1);
    }

    #[test]
    fn incompatible_use_gets_copy_before() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let wide = func.create_vreg(Some(LowLevelType::scalar(64)));
        func.set_vreg_class(wide, fx.gpr64);
        let inst = func.create_inst(generic::G_ANYEXT);
        func.build(inst).add_sub_reg(wide, 1);
        func.append_inst(bb, inst);

        let reg = constrain_operand_reg_to_class(&mut func, &fx.target, inst, 0, fx.gpr32);
        let new = reg.as_virtual().unwrap();
        assert_ne!(new, wide);
        assert_eq!(func.vreg(new).class, Some(fx.gpr32));

        let insts = func.block_insts(bb).to_vec();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[1], inst);
        assert_eq!(func.opcode(insts[0]), generic::COPY);
        assert_eq!(
            func.operands(insts[0]),
            &[
                MachineOperand::reg_def(new),
                MachineOperand::Reg(RegOperand::use_of(wide).with_sub_reg(1)),
            ]
        );
        assert_eq!(func.operand(inst, 0), &MachineOperand::reg_use(new));
        assert_eq!(func.vreg_uses(wide), &[insts[0]]);
    }

    #[test]
    fn incompatible_def_gets_copy_after() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let wide = func.create_vreg(Some(LowLevelType::scalar(64)));
        let inst = func.create_inst(generic::G_ANYEXT);
        func.build(inst).add_def(wide);
        func.append_inst(bb, inst);

        let new = constrain_operand_reg_to_class(&mut func, &fx.target, inst, 0, fx.gpr32)
            .as_virtual()
            .unwrap();
        let insts = func.block_insts(bb).to_vec();
        assert_eq!(insts[0], inst);
        assert_eq!(
            func.operands(insts[1]),
            &[MachineOperand::reg_def(wide), MachineOperand::reg_use(new)]
        );
        assert_eq!(func.vreg_def(new), Some(inst));
    }

    #[test]
    fn selected_operands_follow_description() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let d = func.create_vreg(Some(LowLevelType::scalar(32)));
        let s = func.create_vreg(Some(LowLevelType::scalar(32)));
        let op32 = fx.target.lookup_opcode("OP32").unwrap();
        let flags = fx.target.lookup_phys_reg("flags").unwrap();
        let inst = func.create_inst(op32);
        func.build(inst).add_def(d).add_reg(s).add_implicit_def(flags);
        func.append_inst(bb, inst);

        constrain_selected_inst_reg_operands(&mut func, &fx.target, inst);
        assert_eq!(func.vreg(d).class, Some(fx.gpr32));
        assert_eq!(func.vreg(s).class, Some(fx.gpr32));
        insta::assert_snapshot!(print_function(&fx.target, &func), @r"
        func @f {
        bb.0:
          %0:gpr32(s32) = OP32 %1, implicit-def $flags
        }
        ");
    }

    #[test]
    fn folding_and_deadness() {
        let mut b = TargetInfoBuilder::new("t");
        let gprb = b.reg_bank("gprb");
        let w0 = b.phys_reg("w0");
        b.reg_class("gpr32", gprb, 32, &[w0]);
        let target = b.finish();

        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let p = func.create_vreg(Some(LowLevelType::pointer(0, 64)));
        let v = func.create_vreg(Some(LowLevelType::scalar(32)));
        let load = func.create_inst(generic::G_LOAD);
        func.build(load)
            .add_def(v)
            .add_reg(p)
            .add_mem_operand(MemOperand::load(4));
        func.append_inst(bb, load);
        let store = func.create_inst(generic::G_STORE);
        func.build(store)
            .add_reg(v)
            .add_reg(p)
            .add_mem_operand(MemOperand::store(4));
        func.append_inst(bb, store);

        assert!(!is_obviously_safe_to_fold(&target, &func, load));
        assert!(!is_trivially_dead(&target, &func, load));
        assert!(!is_trivially_dead(&target, &func, store));

        func.erase_inst(store);
        assert!(is_trivially_dead(&target, &func, load));

        let x = func.create_vreg(Some(LowLevelType::scalar(32)));
        let add = func.create_inst(generic::G_ADD);
        func.build(add).add_def(x).add_reg(v).add_reg(v);
        func.append_inst(bb, add);
        assert!(is_obviously_safe_to_fold(&target, &func, add));
        assert!(!is_trivially_dead(&target, &func, load));
        assert!(is_trivially_dead(&target, &func, add));

        let phys_def = func.create_inst(generic::COPY);
        func.build(phys_def).add_def(w0).add_reg(v);
        func.append_inst(bb, phys_def);
        assert!(!is_trivially_dead(&target, &func, phys_def));
    }
}
