//! MachineFunction: arena-based mutable machine IR storage.
//!
//! All instructions, blocks and virtual registers are stored in
//! `PrimaryMap`s owned by the function. Def and use chains of virtual
//! registers are maintained automatically as operands are added, rewritten
//! or erased.

use cranelift_entity::{PrimaryMap, SecondaryMap};
use smallvec::{Array, SmallVec};

use crate::operand::{ConstantInt, MachineOperand, MemOperand, RegOperand, Register};
use crate::refs::*;
use crate::types::LowLevelType;

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single machine instruction.
#[derive(Clone, Debug)]
pub struct InstData {
    pub opcode: Opcode,
    operands: SmallVec<[MachineOperand; 4]>,
    pub mem_operands: SmallVec<[MemOperand; 1]>,
    pub parent: Option<BlockRef>,
    erased: bool,
}

impl InstData {
    pub fn operands(&self) -> &[MachineOperand] {
        &self.operands
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Explicit operands: everything except implicit register operands.
    pub fn explicit_operands(&self) -> impl Iterator<Item = (usize, &MachineOperand)> {
        self.operands
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.is_implicit())
    }

    /// Whether the instruction carries any implicit register operand.
    pub fn has_implicit_operands(&self) -> bool {
        self.operands.iter().any(MachineOperand::is_implicit)
    }
}

/// Data for a basic block.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub insts: Vec<InstRef>,
}

/// Per-virtual-register information.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VRegData {
    pub ty: Option<LowLevelType>,
    pub class: Option<RegClassId>,
    pub bank: Option<RegBankId>,
}

// ============================================================================
// MachineFunction
// ============================================================================

/// A function in machine IR form.
#[derive(Clone, Debug)]
pub struct MachineFunction {
    pub name: String,
    insts: PrimaryMap<InstRef, InstData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    vregs: PrimaryMap<VReg, VRegData>,

    /// Def-chain: instructions defining each virtual register.
    defs: SecondaryMap<VReg, SmallVec<[InstRef; 1]>>,
    /// Use-chain: one entry per use operand, so an instruction using a
    /// register twice appears twice.
    uses: SecondaryMap<VReg, SmallVec<[InstRef; 2]>>,
}

impl MachineFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            vregs: PrimaryMap::new(),
            defs: SecondaryMap::new(),
            uses: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new block at the end of the layout.
    pub fn create_block(&mut self) -> BlockRef {
        self.blocks.push(BlockData::default())
    }

    /// Blocks in layout order.
    pub fn block_order(&self) -> impl DoubleEndedIterator<Item = BlockRef> + '_ {
        self.blocks.keys()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn has_block(&self, block: BlockRef) -> bool {
        self.blocks.is_valid(block)
    }

    pub fn block_insts(&self, block: BlockRef) -> &[InstRef] {
        &self.blocks[block].insts
    }

    /// All live instructions in layout order.
    pub fn insts_in_layout(&self) -> impl Iterator<Item = InstRef> + '_ {
        self.blocks
            .values()
            .flat_map(|block| block.insts.iter().copied())
    }

    // ========================================================================
    // Virtual registers
    // ========================================================================

    pub fn create_vreg(&mut self, ty: Option<LowLevelType>) -> VReg {
        self.vregs.push(VRegData {
            ty,
            ..VRegData::default()
        })
    }

    pub fn vreg(&self, v: VReg) -> &VRegData {
        &self.vregs[v]
    }

    pub fn vreg_mut(&mut self, v: VReg) -> &mut VRegData {
        &mut self.vregs[v]
    }

    pub fn set_vreg_class(&mut self, v: VReg, rc: RegClassId) {
        self.vregs[v].class = Some(rc);
    }

    pub fn set_vreg_bank(&mut self, v: VReg, bank: RegBankId) {
        self.vregs[v].bank = Some(bank);
    }

    pub fn set_vreg_type(&mut self, v: VReg, ty: LowLevelType) {
        self.vregs[v].ty = Some(ty);
    }

    pub fn num_vregs(&self) -> usize {
        self.vregs.len()
    }

    pub fn vregs(&self) -> impl Iterator<Item = (VReg, &VRegData)> {
        self.vregs.iter()
    }

    /// Ensure `v` exists, creating untyped registers up to it.
    ///
    /// Used by the text parser, where register numbers are explicit.
    pub fn ensure_vreg(&mut self, v: VReg) {
        while !self.vregs.is_valid(v) {
            self.vregs.push(VRegData::default());
        }
    }

    /// The low-level type of a register; physical registers have none.
    pub fn reg_type(&self, reg: Register) -> Option<LowLevelType> {
        match reg {
            Register::Virt(v) => self.vregs[v].ty,
            Register::Phys(_) => None,
        }
    }

    // ========================================================================
    // Instruction
    // ========================================================================

    /// Create a detached instruction with no operands.
    pub fn create_inst(&mut self, opcode: Opcode) -> InstRef {
        self.insts.push(InstData {
            opcode,
            operands: SmallVec::new(),
            mem_operands: SmallVec::new(),
            parent: None,
            erased: false,
        })
    }

    pub fn inst(&self, inst: InstRef) -> &InstData {
        &self.insts[inst]
    }

    pub fn opcode(&self, inst: InstRef) -> Opcode {
        self.insts[inst].opcode
    }

    pub fn operands(&self, inst: InstRef) -> &[MachineOperand] {
        &self.insts[inst].operands
    }

    pub fn num_operands(&self, inst: InstRef) -> usize {
        self.insts[inst].operands.len()
    }

    /// Get the `idx`-th operand of `inst`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn operand(&self, inst: InstRef, idx: usize) -> &MachineOperand {
        let operands = &self.insts[inst].operands;
        assert!(
            idx < operands.len(),
            "operand: index {idx} out of range for {inst} with {} operand(s)",
            operands.len()
        );
        &operands[idx]
    }

    pub fn mem_operands(&self, inst: InstRef) -> &[MemOperand] {
        &self.insts[inst].mem_operands
    }

    pub fn is_erased(&self, inst: InstRef) -> bool {
        self.insts[inst].erased
    }

    pub fn set_opcode(&mut self, inst: InstRef, opcode: Opcode) {
        self.insts[inst].opcode = opcode;
    }

    /// Append an operand, registering it in the def/use chains.
    pub fn add_operand(&mut self, inst: InstRef, op: MachineOperand) {
        self.register_operand(inst, &op);
        self.insts[inst].operands.push(op);
    }

    /// Replace the `idx`-th operand, keeping the def/use chains in sync.
    pub fn set_operand(&mut self, inst: InstRef, idx: usize, op: MachineOperand) {
        let old = *self.operand(inst, idx);
        self.unregister_operand(inst, &old);
        self.register_operand(inst, &op);
        self.insts[inst].operands[idx] = op;
    }

    pub fn add_mem_operand(&mut self, inst: InstRef, mem: MemOperand) {
        self.insts[inst].mem_operands.push(mem);
    }

    /// Open a builder for appending operands to `inst`.
    pub fn build(&mut self, inst: InstRef) -> InstBuilder<'_> {
        InstBuilder { func: self, inst }
    }

    // ========================================================================
    // Layout
    // ========================================================================

    /// Append an instruction to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction already belongs to a block.
    pub fn append_inst(&mut self, block: BlockRef, inst: InstRef) {
        self.assert_detached("append_inst", inst);
        self.insts[inst].parent = Some(block);
        self.blocks[block].insts.push(inst);
    }

    /// Insert `inst` immediately before `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `inst` already belongs to a block or `anchor` does not.
    pub fn insert_before(&mut self, anchor: InstRef, inst: InstRef) {
        let (block, pos) = self.position("insert_before", anchor);
        self.assert_detached("insert_before", inst);
        self.insts[inst].parent = Some(block);
        self.blocks[block].insts.insert(pos, inst);
    }

    /// Insert `inst` immediately after `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `inst` already belongs to a block or `anchor` does not.
    pub fn insert_after(&mut self, anchor: InstRef, inst: InstRef) {
        let (block, pos) = self.position("insert_after", anchor);
        self.assert_detached("insert_after", inst);
        self.insts[inst].parent = Some(block);
        self.blocks[block].insts.insert(pos + 1, inst);
    }

    /// Remove an instruction from its block and drop its def/use chain
    /// entries. The arena slot stays allocated but is marked erased.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was already erased.
    pub fn erase_inst(&mut self, inst: InstRef) {
        assert!(
            !self.insts[inst].erased,
            "erase_inst: {inst} was already erased"
        );
        if let Some(block) = self.insts[inst].parent.take() {
            self.blocks[block].insts.retain(|i| *i != inst);
        }
        let operands = std::mem::take(&mut self.insts[inst].operands);
        for op in &operands {
            self.unregister_operand(inst, op);
        }
        self.insts[inst].operands = operands;
        self.insts[inst].erased = true;
    }

    fn assert_detached(&self, what: &str, inst: InstRef) {
        assert!(
            !self.insts[inst].erased,
            "{what}: {inst} was erased and cannot be reinserted"
        );
        assert!(
            self.insts[inst].parent.is_none(),
            "{what}: {inst} already belongs to {:?}; remove it first",
            self.insts[inst].parent
        );
    }

    fn position(&self, what: &str, anchor: InstRef) -> (BlockRef, usize) {
        let block = self.insts[anchor]
            .parent
            .unwrap_or_else(|| panic!("{what}: anchor {anchor} is not in a block"));
        let pos = self.blocks[block]
            .insts
            .iter()
            .position(|i| *i == anchor)
            .unwrap_or_else(|| panic!("{what}: anchor {anchor} not found in {block}"));
        (block, pos)
    }

    // ========================================================================
    // Def/use chains
    // ========================================================================

    fn register_operand(&mut self, inst: InstRef, op: &MachineOperand) {
        if let MachineOperand::Reg(RegOperand {
            reg: Register::Virt(v),
            is_def,
            ..
        }) = *op
        {
            self.ensure_vreg(v);
            if is_def {
                self.defs[v].push(inst);
            } else {
                self.uses[v].push(inst);
            }
        }
    }

    fn unregister_operand(&mut self, inst: InstRef, op: &MachineOperand) {
        if let MachineOperand::Reg(RegOperand {
            reg: Register::Virt(v),
            is_def,
            ..
        }) = *op
        {
            if is_def {
                remove_first(&mut self.defs[v], inst);
            } else {
                remove_first(&mut self.uses[v], inst);
            }
        }
    }

    /// The instruction defining `v`, if any.
    ///
    /// Machine IR is in SSA form before selection, so there is at most
    /// one live definition. While a replacement is being built the new
    /// instruction and the original may both define `v`; the earliest
    /// registered definition wins.
    pub fn vreg_def(&self, v: VReg) -> Option<InstRef> {
        self.defs.get(v).and_then(|defs| defs.first().copied())
    }

    pub fn vreg_defs(&self, v: VReg) -> &[InstRef] {
        self.defs.get(v).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Instructions using `v`, one entry per use operand.
    pub fn vreg_uses(&self, v: VReg) -> &[InstRef] {
        self.uses.get(v).map(|u| u.as_slice()).unwrap_or(&[])
    }

    pub fn has_uses(&self, v: VReg) -> bool {
        !self.vreg_uses(v).is_empty()
    }

    /// Rewrite every use operand of `old` to read `new` instead.
    pub fn replace_reg_uses(&mut self, old: VReg, new: VReg) {
        if old == new {
            return;
        }
        let users: SmallVec<[InstRef; 4]> = self.vreg_uses(old).iter().copied().collect();
        let mut seen: SmallVec<[InstRef; 4]> = SmallVec::new();
        for user in users {
            if seen.contains(&user) {
                continue;
            }
            seen.push(user);
            for idx in 0..self.num_operands(user) {
                let MachineOperand::Reg(r) = *self.operand(user, idx) else {
                    continue;
                };
                if !r.is_def && r.reg == Register::Virt(old) {
                    let new_op = MachineOperand::Reg(RegOperand {
                        reg: Register::Virt(new),
                        ..r
                    });
                    self.set_operand(user, idx, new_op);
                }
            }
        }
    }
}

// ============================================================================
// InstBuilder
// ============================================================================

/// Mutable handle for appending operands to one instruction.
pub struct InstBuilder<'f> {
    func: &'f mut MachineFunction,
    inst: InstRef,
}

impl<'f> InstBuilder<'f> {
    pub fn inst(&self) -> InstRef {
        self.inst
    }

    pub fn func(&mut self) -> &mut MachineFunction {
        self.func
    }

    pub fn add_operand(&mut self, op: MachineOperand) -> &mut Self {
        self.func.add_operand(self.inst, op);
        self
    }

    pub fn add_reg(&mut self, reg: impl Into<Register>) -> &mut Self {
        self.add_operand(MachineOperand::reg_use(reg))
    }

    pub fn add_def(&mut self, reg: impl Into<Register>) -> &mut Self {
        self.add_operand(MachineOperand::reg_def(reg))
    }

    pub fn add_sub_reg(&mut self, reg: impl Into<Register>, sub_reg: u32) -> &mut Self {
        self.add_operand(MachineOperand::Reg(
            RegOperand::use_of(reg).with_sub_reg(sub_reg),
        ))
    }

    pub fn add_implicit_def(&mut self, reg: PhysReg) -> &mut Self {
        self.add_operand(MachineOperand::Reg(RegOperand::def_of(reg).implicit()))
    }

    pub fn add_implicit_use(&mut self, reg: PhysReg) -> &mut Self {
        self.add_operand(MachineOperand::Reg(RegOperand::use_of(reg).implicit()))
    }

    pub fn add_imm(&mut self, imm: i64) -> &mut Self {
        self.add_operand(MachineOperand::Imm(imm))
    }

    pub fn add_cimm(&mut self, value: i64, bits: u16) -> &mut Self {
        self.add_operand(MachineOperand::CImm(ConstantInt::new(value, bits)))
    }

    pub fn add_mbb(&mut self, block: BlockRef) -> &mut Self {
        self.add_operand(MachineOperand::Mbb(block))
    }

    pub fn add_mem_operand(&mut self, mem: MemOperand) -> &mut Self {
        self.func.add_mem_operand(self.inst, mem);
        self
    }
}

fn remove_first<A: Array<Item = InstRef>>(chain: &mut SmallVec<A>, inst: InstRef) {
    if let Some(pos) = chain.iter().position(|i| *i == inst) {
        chain.remove(pos);
    }
}
