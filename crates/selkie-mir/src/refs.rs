//! Entity references for the machine IR.
//!
//! Each ref type is a thin `u32` wrapper providing type-safe indexing
//! into `PrimaryMap` storage in `MachineFunction` or `TargetInfo`.

use cranelift_entity::entity_impl;

/// Reference to a machine instruction in a function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstRef(u32);
entity_impl!(InstRef, "inst");

/// Reference to a basic block in a function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "bb");

/// A virtual register.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "%");

/// A physical register of the target. Index 0 is reserved for `$noreg`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysReg(u32);
entity_impl!(PhysReg, "preg");

/// A register class of the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegClassId(u32);
entity_impl!(RegClassId, "rc");

/// A register bank of the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegBankId(u32);
entity_impl!(RegBankId, "bank");

/// An instruction opcode, generic or target-specific.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub(crate) u32);
entity_impl!(Opcode, "opc");

impl PhysReg {
    /// The "no register" placeholder used for optional register operands.
    pub const NONE: PhysReg = PhysReg(0);
}
