//! Target description: instruction descriptions, register banks,
//! register classes and physical registers.
//!
//! A `TargetInfo` always starts with the generic (target-independent)
//! opcode set at fixed opcode numbers, see [`generic`]. Target
//! instructions are appended after it by [`TargetInfoBuilder::instr`].

use std::collections::HashMap;

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::refs::{Opcode, PhysReg, RegBankId, RegClassId};

/// Opcodes every target understands.
pub mod generic {
    use crate::refs::Opcode;

    pub const COPY: Opcode = Opcode(0);
    pub const IMPLICIT_DEF: Opcode = Opcode(1);
    pub const G_IMPLICIT_DEF: Opcode = Opcode(2);
    pub const G_CONSTANT: Opcode = Opcode(3);
    pub const G_ADD: Opcode = Opcode(4);
    pub const G_SUB: Opcode = Opcode(5);
    pub const G_MUL: Opcode = Opcode(6);
    pub const G_AND: Opcode = Opcode(7);
    pub const G_OR: Opcode = Opcode(8);
    pub const G_XOR: Opcode = Opcode(9);
    pub const G_LOAD: Opcode = Opcode(10);
    pub const G_STORE: Opcode = Opcode(11);
    pub const G_GEP: Opcode = Opcode(12);
    pub const G_TRUNC: Opcode = Opcode(13);
    pub const G_ANYEXT: Opcode = Opcode(14);
    pub const G_BR: Opcode = Opcode(15);
    pub const G_INTRINSIC: Opcode = Opcode(16);
    pub const G_INTRINSIC_W_SIDE_EFFECTS: Opcode = Opcode(17);

    /// Number of opcodes registered before any target instruction.
    pub const NUM_OPCODES: u32 = 18;
}

// ============================================================================
// Instruction descriptions
// ============================================================================

/// Static information about one explicit operand of an instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperandInfo {
    /// Register class the operand must be constrained to, if it is a
    /// register operand with a fixed class.
    pub reg_class: Option<RegClassId>,
}

/// Static description of an opcode.
#[derive(Clone, Debug)]
pub struct InstrDesc {
    pub name: String,
    pub num_defs: u32,
    pub operands: Vec<OperandInfo>,
    pub may_load: bool,
    pub may_store: bool,
    pub has_side_effects: bool,
    pub is_terminator: bool,
    pub variadic: bool,
    /// Pre-selection generic opcode (`G_*`).
    pub generic: bool,
}

impl InstrDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_defs: 0,
            operands: Vec::new(),
            may_load: false,
            may_store: false,
            has_side_effects: false,
            is_terminator: false,
            variadic: false,
            generic: false,
        }
    }

    pub fn defs(mut self, n: u32) -> Self {
        self.num_defs = n;
        self
    }

    /// Append a register operand constrained to `rc`.
    pub fn reg(mut self, rc: RegClassId) -> Self {
        self.operands.push(OperandInfo { reg_class: Some(rc) });
        self
    }

    /// Append an operand without a register class (immediate, block, ...).
    pub fn untyped(mut self) -> Self {
        self.operands.push(OperandInfo::default());
        self
    }

    /// Append `n` operands without register classes.
    pub fn untyped_n(mut self, n: usize) -> Self {
        self.operands
            .extend(std::iter::repeat_n(OperandInfo::default(), n));
        self
    }

    pub fn may_load(mut self) -> Self {
        self.may_load = true;
        self
    }

    pub fn may_store(mut self) -> Self {
        self.may_store = true;
        self
    }

    pub fn side_effects(mut self) -> Self {
        self.has_side_effects = true;
        self
    }

    pub fn terminator(mut self) -> Self {
        self.is_terminator = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    fn generic(mut self) -> Self {
        self.generic = true;
        self
    }
}

// ============================================================================
// Registers
// ============================================================================

#[derive(Clone, Debug)]
pub struct RegBankData {
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct RegClassData {
    pub name: String,
    pub bank: RegBankId,
    pub size_bits: u32,
    pub members: SmallVec<[PhysReg; 16]>,
}

impl RegClassData {
    pub fn contains(&self, reg: PhysReg) -> bool {
        self.members.contains(&reg)
    }

    /// Whether every member of `self` is also a member of `other`.
    pub fn is_subclass_of(&self, other: &RegClassData) -> bool {
        self.members.iter().all(|r| other.contains(*r))
    }
}

#[derive(Clone, Debug)]
pub struct PhysRegData {
    pub name: String,
}

// ============================================================================
// TargetInfo
// ============================================================================

/// Everything the selector needs to know about a target.
pub struct TargetInfo {
    pub name: String,
    /// Pointer width used for `p<N>` types.
    pub pointer_bits: u16,
    instrs: PrimaryMap<Opcode, InstrDesc>,
    banks: PrimaryMap<RegBankId, RegBankData>,
    classes: PrimaryMap<RegClassId, RegClassData>,
    regs: PrimaryMap<PhysReg, PhysRegData>,
    /// Sub-register index names; index 0 is the full register.
    sub_regs: Vec<String>,

    opcode_by_name: HashMap<String, Opcode>,
    bank_by_name: HashMap<String, RegBankId>,
    class_by_name: HashMap<String, RegClassId>,
    reg_by_name: HashMap<String, PhysReg>,
}

impl TargetInfo {
    pub fn instr(&self, opcode: Opcode) -> &InstrDesc {
        &self.instrs[opcode]
    }

    pub fn has_opcode(&self, opcode: Opcode) -> bool {
        self.instrs.is_valid(opcode)
    }

    pub fn opcode_name(&self, opcode: Opcode) -> &str {
        &self.instrs[opcode].name
    }

    pub fn opcodes(&self) -> impl Iterator<Item = (Opcode, &InstrDesc)> {
        self.instrs.iter()
    }

    pub fn bank(&self, bank: RegBankId) -> &RegBankData {
        &self.banks[bank]
    }

    pub fn reg_class(&self, rc: RegClassId) -> &RegClassData {
        &self.classes[rc]
    }

    pub fn has_reg_class(&self, rc: RegClassId) -> bool {
        self.classes.is_valid(rc)
    }

    pub fn reg_classes(&self) -> impl Iterator<Item = (RegClassId, &RegClassData)> {
        self.classes.iter()
    }

    pub fn phys_reg(&self, reg: PhysReg) -> &PhysRegData {
        &self.regs[reg]
    }

    pub fn has_phys_reg(&self, reg: PhysReg) -> bool {
        self.regs.is_valid(reg)
    }

    pub fn sub_reg_name(&self, idx: u32) -> Option<&str> {
        self.sub_regs.get(idx as usize).map(String::as_str)
    }

    pub fn num_sub_regs(&self) -> u32 {
        self.sub_regs.len() as u32
    }

    /// The first (smallest) register class containing `reg`.
    pub fn min_class_of(&self, reg: PhysReg) -> Option<RegClassId> {
        self.classes
            .iter()
            .filter(|(_, data)| data.contains(reg))
            .min_by_key(|(_, data)| data.members.len())
            .map(|(rc, _)| rc)
    }

    // === Lookup by name ===

    pub fn lookup_opcode(&self, name: &str) -> Option<Opcode> {
        self.opcode_by_name.get(name).copied()
    }

    pub fn lookup_bank(&self, name: &str) -> Option<RegBankId> {
        self.bank_by_name.get(name).copied()
    }

    pub fn lookup_reg_class(&self, name: &str) -> Option<RegClassId> {
        self.class_by_name.get(name).copied()
    }

    pub fn lookup_phys_reg(&self, name: &str) -> Option<PhysReg> {
        self.reg_by_name.get(name).copied()
    }

    pub fn lookup_sub_reg(&self, name: &str) -> Option<u32> {
        self.sub_regs
            .iter()
            .position(|s| s == name)
            .map(|idx| idx as u32)
    }
}

/// Builder for [`TargetInfo`].
pub struct TargetInfoBuilder {
    info: TargetInfo,
}

impl TargetInfoBuilder {
    /// Start a target description with the generic opcodes pre-registered.
    pub fn new(name: impl Into<String>) -> Self {
        let mut builder = Self {
            info: TargetInfo {
                name: name.into(),
                pointer_bits: 64,
                instrs: PrimaryMap::new(),
                banks: PrimaryMap::new(),
                classes: PrimaryMap::new(),
                regs: PrimaryMap::new(),
                sub_regs: vec![String::new()],
                opcode_by_name: HashMap::new(),
                bank_by_name: HashMap::new(),
                class_by_name: HashMap::new(),
                reg_by_name: HashMap::new(),
            },
        };
        builder.register_generic_opcodes();
        let noreg = builder.phys_reg("noreg");
        debug_assert_eq!(noreg, PhysReg::NONE);
        builder
    }

    fn register_generic_opcodes(&mut self) {
        use generic::*;

        let descs = [
            (COPY, InstrDesc::new("COPY").defs(1).untyped_n(2)),
            (IMPLICIT_DEF, InstrDesc::new("IMPLICIT_DEF").defs(1).untyped()),
            (
                G_IMPLICIT_DEF,
                InstrDesc::new("G_IMPLICIT_DEF").defs(1).untyped().generic(),
            ),
            (
                G_CONSTANT,
                InstrDesc::new("G_CONSTANT").defs(1).untyped_n(2).generic(),
            ),
            (G_ADD, InstrDesc::new("G_ADD").defs(1).untyped_n(3).generic()),
            (G_SUB, InstrDesc::new("G_SUB").defs(1).untyped_n(3).generic()),
            (G_MUL, InstrDesc::new("G_MUL").defs(1).untyped_n(3).generic()),
            (G_AND, InstrDesc::new("G_AND").defs(1).untyped_n(3).generic()),
            (G_OR, InstrDesc::new("G_OR").defs(1).untyped_n(3).generic()),
            (G_XOR, InstrDesc::new("G_XOR").defs(1).untyped_n(3).generic()),
            (
                G_LOAD,
                InstrDesc::new("G_LOAD")
                    .defs(1)
                    .untyped_n(2)
                    .may_load()
                    .generic(),
            ),
            (
                G_STORE,
                InstrDesc::new("G_STORE").untyped_n(2).may_store().generic(),
            ),
            (G_GEP, InstrDesc::new("G_GEP").defs(1).untyped_n(3).generic()),
            (
                G_TRUNC,
                InstrDesc::new("G_TRUNC").defs(1).untyped_n(2).generic(),
            ),
            (
                G_ANYEXT,
                InstrDesc::new("G_ANYEXT").defs(1).untyped_n(2).generic(),
            ),
            (
                G_BR,
                InstrDesc::new("G_BR").untyped().terminator().generic(),
            ),
            (
                G_INTRINSIC,
                InstrDesc::new("G_INTRINSIC")
                    .defs(1)
                    .untyped_n(2)
                    .variadic()
                    .generic(),
            ),
            (
                G_INTRINSIC_W_SIDE_EFFECTS,
                InstrDesc::new("G_INTRINSIC_W_SIDE_EFFECTS")
                    .defs(1)
                    .untyped_n(2)
                    .variadic()
                    .side_effects()
                    .generic(),
            ),
        ];

        for (expected, desc) in descs {
            let opcode = self.instr(desc);
            debug_assert_eq!(opcode, expected, "generic opcode table out of order");
        }
        debug_assert_eq!(self.info.instrs.len() as u32, generic::NUM_OPCODES);
    }

    pub fn pointer_bits(mut self, bits: u16) -> Self {
        self.info.pointer_bits = bits;
        self
    }

    /// Register an instruction description.
    ///
    /// # Panics
    ///
    /// Panics if an opcode with the same name already exists.
    pub fn instr(&mut self, desc: InstrDesc) -> Opcode {
        assert!(
            !self.info.opcode_by_name.contains_key(&desc.name),
            "instr: duplicate opcode name `{}`",
            desc.name
        );
        let name = desc.name.clone();
        let opcode = self.info.instrs.push(desc);
        self.info.opcode_by_name.insert(name, opcode);
        opcode
    }

    pub fn reg_bank(&mut self, name: &str) -> RegBankId {
        let bank = self.info.banks.push(RegBankData {
            name: name.to_owned(),
        });
        self.info.bank_by_name.insert(name.to_owned(), bank);
        bank
    }

    pub fn phys_reg(&mut self, name: &str) -> PhysReg {
        let reg = self.info.regs.push(PhysRegData {
            name: name.to_owned(),
        });
        self.info.reg_by_name.insert(name.to_owned(), reg);
        reg
    }

    pub fn reg_class(
        &mut self,
        name: &str,
        bank: RegBankId,
        size_bits: u32,
        members: &[PhysReg],
    ) -> RegClassId {
        let rc = self.info.classes.push(RegClassData {
            name: name.to_owned(),
            bank,
            size_bits,
            members: members.iter().copied().collect(),
        });
        self.info.class_by_name.insert(name.to_owned(), rc);
        rc
    }

    /// Register a sub-register index name. Indices start at 1.
    pub fn sub_reg_index(&mut self, name: &str) -> u32 {
        self.info.sub_regs.push(name.to_owned());
        self.info.sub_regs.len() as u32 - 1
    }

    pub fn finish(self) -> TargetInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_target() -> TargetInfo {
        let mut b = TargetInfoBuilder::new("small");
        let gpr = b.reg_bank("gpr");
        let r0 = b.phys_reg("r0");
        let r1 = b.phys_reg("r1");
        b.reg_class("gpr", gpr, 32, &[r0, r1]);
        b.reg_class("gpr_r0", gpr, 32, &[r0]);
        b.sub_reg_index("lo");
        b.instr(InstrDesc::new("NOP").side_effects());
        b.finish()
    }

    #[test]
    fn generic_opcodes_are_registered_first() {
        let target = small_target();
        assert_eq!(target.opcode_name(generic::COPY), "COPY");
        assert_eq!(target.opcode_name(generic::G_ADD), "G_ADD");
        assert!(target.instr(generic::G_LOAD).may_load);
        assert!(target.instr(generic::G_ADD).generic);
        assert!(!target.instr(generic::COPY).generic);
        assert_eq!(
            target.lookup_opcode("NOP").map(|o| o.as_u32()),
            Some(generic::NUM_OPCODES)
        );
    }

    #[test]
    fn noreg_is_physical_register_zero() {
        let target = small_target();
        assert_eq!(target.lookup_phys_reg("noreg"), Some(PhysReg::NONE));
        assert_eq!(target.phys_reg(PhysReg::NONE).name, "noreg");
    }

    #[test]
    fn min_class_prefers_smallest() {
        let target = small_target();
        let r0 = target.lookup_phys_reg("r0").unwrap();
        let r1 = target.lookup_phys_reg("r1").unwrap();
        let narrow = target.lookup_reg_class("gpr_r0").unwrap();
        let wide = target.lookup_reg_class("gpr").unwrap();
        assert_eq!(target.min_class_of(r0), Some(narrow));
        assert_eq!(target.min_class_of(r1), Some(wide));
        assert!(target.reg_class(narrow).is_subclass_of(target.reg_class(wide)));
        assert!(!target.reg_class(wide).is_subclass_of(target.reg_class(narrow)));
    }

    #[test]
    fn sub_register_indices() {
        let target = small_target();
        assert_eq!(target.lookup_sub_reg("lo"), Some(1));
        assert_eq!(target.sub_reg_name(1), Some("lo"));
        assert_eq!(target.num_sub_regs(), 2);
    }

    #[test]
    #[should_panic(expected = "duplicate opcode name")]
    fn duplicate_opcode_panics() {
        let mut b = TargetInfoBuilder::new("dup");
        b.instr(InstrDesc::new("G_ADD"));
    }
}
