//! Machine operands and memory operands.

use crate::refs::{BlockRef, PhysReg, VReg};

/// A register reference: either a virtual register or a pre-colored
/// physical register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    Virt(VReg),
    Phys(PhysReg),
}

impl Register {
    pub fn is_virtual(self) -> bool {
        matches!(self, Register::Virt(_))
    }

    pub fn is_physical(self) -> bool {
        matches!(self, Register::Phys(_))
    }

    pub fn as_virtual(self) -> Option<VReg> {
        match self {
            Register::Virt(v) => Some(v),
            Register::Phys(_) => None,
        }
    }

    pub fn as_physical(self) -> Option<PhysReg> {
        match self {
            Register::Phys(p) => Some(p),
            Register::Virt(_) => None,
        }
    }
}

impl From<VReg> for Register {
    fn from(v: VReg) -> Self {
        Register::Virt(v)
    }
}

impl From<PhysReg> for Register {
    fn from(p: PhysReg) -> Self {
        Register::Phys(p)
    }
}

/// Register operand with its def/use flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegOperand {
    pub reg: Register,
    pub is_def: bool,
    pub is_implicit: bool,
    /// Sub-register index; 0 means the full register.
    pub sub_reg: u32,
}

impl RegOperand {
    pub fn use_of(reg: impl Into<Register>) -> Self {
        Self {
            reg: reg.into(),
            is_def: false,
            is_implicit: false,
            sub_reg: 0,
        }
    }

    pub fn def_of(reg: impl Into<Register>) -> Self {
        Self {
            is_def: true,
            ..Self::use_of(reg)
        }
    }

    pub fn implicit(mut self) -> Self {
        self.is_implicit = true;
        self
    }

    pub fn with_sub_reg(mut self, sub_reg: u32) -> Self {
        self.sub_reg = sub_reg;
        self
    }
}

/// Arbitrary-width integer constant, as carried by `G_CONSTANT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstantInt {
    pub value: i64,
    pub bits: u16,
}

impl ConstantInt {
    pub fn new(value: i64, bits: u16) -> Self {
        Self { value, bits }
    }

    /// The value sign-extended from `bits` to 64 bits.
    pub fn sext_value(self) -> i64 {
        if self.bits == 0 || self.bits >= 64 {
            return self.value;
        }
        let shift = 64 - self.bits as u32;
        (self.value << shift) >> shift
    }

    pub fn equals_int(self, value: i64) -> bool {
        self.sext_value() == value
    }
}

/// A single operand of a machine instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MachineOperand {
    Reg(RegOperand),
    Imm(i64),
    CImm(ConstantInt),
    Mbb(BlockRef),
    IntrinsicId(u32),
}

impl MachineOperand {
    pub fn reg_use(reg: impl Into<Register>) -> Self {
        MachineOperand::Reg(RegOperand::use_of(reg))
    }

    pub fn reg_def(reg: impl Into<Register>) -> Self {
        MachineOperand::Reg(RegOperand::def_of(reg))
    }

    pub fn is_reg(&self) -> bool {
        matches!(self, MachineOperand::Reg(_))
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, MachineOperand::Imm(_))
    }

    pub fn is_cimm(&self) -> bool {
        matches!(self, MachineOperand::CImm(_))
    }

    pub fn is_mbb(&self) -> bool {
        matches!(self, MachineOperand::Mbb(_))
    }

    pub fn is_intrinsic_id(&self) -> bool {
        matches!(self, MachineOperand::IntrinsicId(_))
    }

    pub fn as_reg(&self) -> Option<&RegOperand> {
        match self {
            MachineOperand::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// The register of a register operand.
    pub fn reg(&self) -> Option<Register> {
        self.as_reg().map(|r| r.reg)
    }

    pub fn is_def(&self) -> bool {
        self.as_reg().is_some_and(|r| r.is_def)
    }

    pub fn is_implicit(&self) -> bool {
        self.as_reg().is_some_and(|r| r.is_implicit)
    }
}

/// Direction of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemAccess {
    Load,
    Store,
}

/// Description of a memory access performed by an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemOperand {
    pub access: MemAccess,
    /// Access size in bytes.
    pub size: u32,
    /// Alignment in bytes; 0 means naturally aligned.
    pub align: u32,
}

impl MemOperand {
    pub fn load(size: u32) -> Self {
        Self {
            access: MemAccess::Load,
            size,
            align: 0,
        }
    }

    pub fn store(size: u32) -> Self {
        Self {
            access: MemAccess::Store,
            size,
            align: 0,
        }
    }

    pub fn with_align(mut self, align: u32) -> Self {
        self.align = align;
        self
    }
}
