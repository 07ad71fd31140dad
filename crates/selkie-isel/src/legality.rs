//! Register class / register bank legality queries.

use selkie_mir::{MachineFunction, Opcode, RegBankId, RegClassId, Register, TargetInfo, VReg};

/// Answers register class and bank questions for the interpreter.
pub trait LegalityOracle {
    /// The bank a register class belongs to.
    fn bank_of_class(&self, rc: RegClassId) -> RegBankId;

    /// The bank currently assigned to `reg`, if any.
    fn reg_bank(&self, func: &MachineFunction, reg: Register) -> Option<RegBankId>;

    /// Constrain `v` to `rc` in place. Returns `false` when the register's
    /// current class, bank or type is incompatible with `rc`; the register
    /// is left unchanged in that case.
    fn constrain_vreg(&self, func: &mut MachineFunction, v: VReg, rc: RegClassId) -> bool;

    /// The class required for explicit operand `op_idx` of `opcode`.
    fn operand_reg_class(&self, opcode: Opcode, op_idx: usize) -> Option<RegClassId>;
}

impl LegalityOracle for TargetInfo {
    fn bank_of_class(&self, rc: RegClassId) -> RegBankId {
        self.reg_class(rc).bank
    }

    fn reg_bank(&self, func: &MachineFunction, reg: Register) -> Option<RegBankId> {
        match reg {
            Register::Virt(v) => {
                let data = func.vreg(v);
                data.class.map(|rc| self.reg_class(rc).bank).or(data.bank)
            }
            Register::Phys(p) => self.min_class_of(p).map(|rc| self.reg_class(rc).bank),
        }
    }

    fn constrain_vreg(&self, func: &mut MachineFunction, v: VReg, rc: RegClassId) -> bool {
        let wanted = self.reg_class(rc);
        let data = func.vreg(v).clone();

        if data
            .ty
            .is_some_and(|ty| ty.size_in_bits() > wanted.size_bits)
        {
            return false;
        }

        match data.class {
            Some(current) if current == rc => true,
            Some(current) => {
                let current_data = self.reg_class(current);
                if current_data.is_subclass_of(wanted) {
                    true
                } else if wanted.is_subclass_of(current_data) {
                    func.set_vreg_class(v, rc);
                    true
                } else {
                    false
                }
            }
            None => {
                if data.bank.is_some_and(|bank| bank != wanted.bank) {
                    return false;
                }
                func.set_vreg_class(v, rc);
                func.set_vreg_bank(v, wanted.bank);
                true
            }
        }
    }

    fn operand_reg_class(&self, opcode: Opcode, op_idx: usize) -> Option<RegClassId> {
        self.instr(opcode)
            .operands
            .get(op_idx)
            .and_then(|info| info.reg_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_mir::{InstrDesc, LowLevelType, TargetInfoBuilder};

    struct Fixture {
        target: TargetInfo,
        gpr32: RegClassId,
        gpr32_lo: RegClassId,
        gpr64: RegClassId,
        fpr32: RegClassId,
        gprb: RegBankId,
    }

    fn fixture() -> Fixture {
        let mut b = TargetInfoBuilder::new("t");
        let gprb = b.reg_bank("gprb");
        let fprb = b.reg_bank("fprb");
        let w0 = b.phys_reg("w0");
        let w1 = b.phys_reg("w1");
        let x0 = b.phys_reg("x0");
        let s0 = b.phys_reg("s0");
        let gpr32 = b.reg_class("gpr32", gprb, 32, &[w0, w1]);
        let gpr32_lo = b.reg_class("gpr32_lo", gprb, 32, &[w0]);
        let gpr64 = b.reg_class("gpr64", gprb, 64, &[x0]);
        let fpr32 = b.reg_class("fpr32", fprb, 32, &[s0]);
        b.instr(InstrDesc::new("OP").defs(1).reg(gpr32).untyped());
        Fixture {
            target: b.finish(),
            gpr32,
            gpr32_lo,
            gpr64,
            fpr32,
            gprb,
        }
    }

    #[test]
    fn unconstrained_vreg_takes_class() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let v = func.create_vreg(Some(LowLevelType::scalar(32)));
        assert!(fx.target.constrain_vreg(&mut func, v, fx.gpr32));
        assert_eq!(func.vreg(v).class, Some(fx.gpr32));
        assert_eq!(func.vreg(v).bank, Some(fx.gprb));
    }

    #[test]
    fn class_narrows_but_never_widens() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let v = func.create_vreg(None);
        func.set_vreg_class(v, fx.gpr32);
        assert!(fx.target.constrain_vreg(&mut func, v, fx.gpr32_lo));
        assert_eq!(func.vreg(v).class, Some(fx.gpr32_lo));
        // Already tighter than requested.
        assert!(fx.target.constrain_vreg(&mut func, v, fx.gpr32));
        assert_eq!(func.vreg(v).class, Some(fx.gpr32_lo));
    }

    #[test]
    fn incompatible_requests_leave_vreg_unchanged() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");

        let banked = func.create_vreg(Some(LowLevelType::scalar(32)));
        func.set_vreg_bank(banked, fx.gprb);
        assert!(!fx.target.constrain_vreg(&mut func, banked, fx.fpr32));
        assert_eq!(func.vreg(banked).class, None);

        let classed = func.create_vreg(None);
        func.set_vreg_class(classed, fx.gpr32);
        assert!(!fx.target.constrain_vreg(&mut func, classed, fx.gpr64));
        assert_eq!(func.vreg(classed).class, Some(fx.gpr32));

        let wide = func.create_vreg(Some(LowLevelType::scalar(64)));
        assert!(!fx.target.constrain_vreg(&mut func, wide, fx.gpr32));
    }

    #[test]
    fn banks_of_registers() {
        let fx = fixture();
        let mut func = MachineFunction::new("f");
        let v = func.create_vreg(None);
        assert_eq!(fx.target.reg_bank(&func, Register::Virt(v)), None);
        func.set_vreg_bank(v, fx.gprb);
        assert_eq!(fx.target.reg_bank(&func, Register::Virt(v)), Some(fx.gprb));

        let w0 = fx.target.lookup_phys_reg("w0").unwrap();
        assert_eq!(fx.target.reg_bank(&func, Register::Phys(w0)), Some(fx.gprb));
        assert_eq!(fx.target.bank_of_class(fx.gpr64), fx.gprb);
    }

    #[test]
    fn operand_classes_come_from_descriptions() {
        let fx = fixture();
        let op = fx.target.lookup_opcode("OP").unwrap();
        assert_eq!(fx.target.operand_reg_class(op, 0), Some(fx.gpr32));
        assert_eq!(fx.target.operand_reg_class(op, 1), None);
        assert_eq!(fx.target.operand_reg_class(op, 5), None);
    }
}
