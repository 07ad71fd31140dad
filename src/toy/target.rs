//! Description of the toy target: eight 32-bit and eight 64-bit general
//! purpose registers in one bank, a zero register and a cycle-counter
//! flag register.

use selkie_mir::{
    InstrDesc, Opcode, PhysReg, RegBankId, RegClassId, TargetInfo, TargetInfoBuilder,
};

/// Feature bit of the hardware multiplier.
pub const FEATURE_HAS_MUL: u32 = 0;

/// Intrinsic id of `rdcycle`.
pub const INTRINSIC_RDCYCLE: u32 = 1;

/// The toy target and handles to the parts selection refers to.
pub struct ToyTarget {
    pub info: TargetInfo,
    pub gprb: RegBankId,
    pub gpr32: RegClassId,
    pub gpr64: RegClassId,
    pub wzr: PhysReg,
    pub cc: PhysReg,
    pub sub_32: u32,

    pub inc: Opcode,
    pub addri: Opcode,
    pub addrr: Opcode,
    pub addxrr: Opcode,
    pub mul: Opcode,
    pub movi: Opcode,
    pub movxi: Opcode,
    pub ldrwui: Opcode,
    pub strwui: Opcode,
    pub b: Opcode,
    pub rdcycle: Opcode,
    pub ret: Opcode,
}

impl ToyTarget {
    pub fn new() -> Self {
        let mut b = TargetInfoBuilder::new("toy").pointer_bits(64);

        let gprb = b.reg_bank("gprb");
        let ccb = b.reg_bank("ccb");

        let mut w = Vec::new();
        let mut x = Vec::new();
        for i in 0..8 {
            w.push(b.phys_reg(&format!("w{i}")));
        }
        for i in 0..8 {
            x.push(b.phys_reg(&format!("x{i}")));
        }
        let wzr = b.phys_reg("wzr");
        let cc = b.phys_reg("cc");

        let mut gpr32_members = w.clone();
        gpr32_members.push(wzr);
        let gpr32 = b.reg_class("gpr32", gprb, 32, &gpr32_members);
        let gpr64 = b.reg_class("gpr64", gprb, 64, &x);
        b.reg_class("ccr", ccb, 32, &[cc]);

        let sub_32 = b.sub_reg_index("sub_32");

        let inc = b.instr(InstrDesc::new("INC").defs(1).reg(gpr32).reg(gpr32));
        let addri = b.instr(
            InstrDesc::new("ADDri")
                .defs(1)
                .reg(gpr32)
                .reg(gpr32)
                .untyped(),
        );
        let addrr = b.instr(
            InstrDesc::new("ADDrr")
                .defs(1)
                .reg(gpr32)
                .reg(gpr32)
                .reg(gpr32),
        );
        let addxrr = b.instr(
            InstrDesc::new("ADDXrr")
                .defs(1)
                .reg(gpr64)
                .reg(gpr64)
                .reg(gpr64),
        );
        let mul = b.instr(
            InstrDesc::new("MUL")
                .defs(1)
                .reg(gpr32)
                .reg(gpr32)
                .reg(gpr32),
        );
        let movi = b.instr(InstrDesc::new("MOVi").defs(1).reg(gpr32).untyped());
        let movxi = b.instr(InstrDesc::new("MOVXi").defs(1).reg(gpr64).untyped());
        let ldrwui = b.instr(
            InstrDesc::new("LDRWui")
                .defs(1)
                .reg(gpr32)
                .reg(gpr64)
                .untyped()
                .may_load(),
        );
        let strwui = b.instr(
            InstrDesc::new("STRWui")
                .reg(gpr32)
                .reg(gpr64)
                .untyped()
                .may_store(),
        );
        let br = b.instr(InstrDesc::new("B").untyped().terminator());
        let rdcycle = b.instr(
            InstrDesc::new("RDCYCLE")
                .defs(1)
                .reg(gpr64)
                .side_effects(),
        );
        let ret = b.instr(InstrDesc::new("RET").terminator().variadic());

        Self {
            info: b.finish(),
            gprb,
            gpr32,
            gpr64,
            wzr,
            cc,
            sub_32,
            inc,
            addri,
            addrr,
            addxrr,
            mul,
            movi,
            movxi,
            ldrwui,
            strwui,
            b: br,
            rdcycle,
            ret,
        }
    }
}

impl Default for ToyTarget {
    fn default() -> Self {
        Self::new()
    }
}
