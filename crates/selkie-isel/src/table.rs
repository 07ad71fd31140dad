//! Match tables: storage, construction, static validation and disassembly.
//!
//! ```text
//! 0: GIM_Try @14
//! 2: GIM_CheckOpcode MI[0], G_ADD
//! 5: GIM_CheckConstantInt MI[0], op2, 1
//! 9: GIR_MutateOpcode MI[0], OutMI[0], INC
//! 13: GIR_Done
//! 14: GIM_Reject
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use selkie_mir::{Opcode, PhysReg, RegClassId, TargetInfo};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::TableError;
use crate::opcode::{LIST_END, MatchOpcode, OperandKind};

// ============================================================================
// MatchTable
// ============================================================================

/// An immutable, cheaply clonable match table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchTable {
    entries: Arc<[i64]>,
}

impl MatchTable {
    pub fn new(entries: impl Into<Arc<[i64]>>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        self.entries.get(index).copied()
    }

    /// Decode the table into entries, checking that every tag is known and
    /// every opcode has all of its operands.
    pub fn decode(&self) -> Result<Vec<DecodedEntry>, TableError> {
        let mut entries = Vec::new();
        let mut index = 0;
        while index < self.len() {
            let entry = self.decode_at(index)?;
            index += entry.len;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn decode_at(&self, index: usize) -> Result<DecodedEntry, TableError> {
        let tag = self.entries[index];
        let opcode =
            MatchOpcode::try_from(tag).map_err(|_| TableError::UnknownOpcode { index, tag })?;
        let truncated = || TableError::Truncated {
            index,
            mnemonic: opcode.mnemonic(),
        };

        let mut operands = SmallVec::new();
        let mut cursor = index + 1;
        for (operand, kind) in opcode.operand_kinds().iter().enumerate() {
            if *kind == OperandKind::InsnIdList {
                loop {
                    let value = self.get(cursor).ok_or_else(truncated)?;
                    cursor += 1;
                    if value == LIST_END {
                        break;
                    }
                    check_non_negative(index, opcode, operands.len(), value)?;
                    operands.push(value);
                }
                continue;
            }
            let value = self.get(cursor).ok_or_else(truncated)?;
            cursor += 1;
            if !matches!(kind, OperandKind::Imm | OperandKind::Label) {
                check_non_negative(index, opcode, operand, value)?;
            }
            operands.push(value);
        }

        Ok(DecodedEntry {
            index,
            len: cursor - index,
            opcode,
            operands,
        })
    }

    /// Statically validate the table: every tag known, every opcode
    /// complete, every id-like operand non-negative and every try target
    /// an opcode boundary inside the table.
    pub fn validate(&self) -> Result<(), TableError> {
        let entries = self.decode()?;
        let boundaries: HashSet<usize> = entries.iter().map(|e| e.index).collect();
        for entry in &entries {
            if entry.opcode != MatchOpcode::Try {
                continue;
            }
            let target = entry.operands[0];
            let ok = usize::try_from(target).is_ok_and(|t| boundaries.contains(&t));
            if !ok {
                return Err(TableError::BadResumeTarget {
                    index: entry.index,
                    target,
                });
            }
        }
        Ok(())
    }

    /// Disassemble the table. With a target, opcodes, register classes,
    /// physical registers and sub-register indices are printed by name.
    pub fn display<'a>(&'a self, target: Option<&'a TargetInfo>) -> DisplayTable<'a> {
        DisplayTable {
            table: self,
            target,
        }
    }
}

impl From<Vec<i64>> for MatchTable {
    fn from(entries: Vec<i64>) -> Self {
        Self::new(entries)
    }
}

impl std::ops::Index<usize> for MatchTable {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.entries[index]
    }
}

fn check_non_negative(
    index: usize,
    opcode: MatchOpcode,
    operand: usize,
    value: i64,
) -> Result<(), TableError> {
    if value < 0 {
        return Err(TableError::NegativeOperand {
            index,
            mnemonic: opcode.mnemonic(),
            operand,
            value,
        });
    }
    Ok(())
}

/// One decoded opcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedEntry {
    /// Table index of the tag.
    pub index: usize,
    /// Number of table entries used, tag and list terminator included.
    pub len: usize,
    pub opcode: MatchOpcode,
    /// Operands without the list terminator.
    pub operands: SmallVec<[i64; 4]>,
}

// ============================================================================
// Disassembly
// ============================================================================

/// Display adapter returned by [`MatchTable::display`].
pub struct DisplayTable<'a> {
    table: &'a MatchTable,
    target: Option<&'a TargetInfo>,
}

impl fmt::Display for DisplayTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = match self.table.decode() {
            Ok(entries) => entries,
            Err(err) => return write!(f, "; invalid table: {err}"),
        };
        for entry in &entries {
            write!(f, "{}: {}", entry.index, entry.opcode.mnemonic())?;
            let mut values = entry.operands.iter().copied();
            let mut first = true;
            for kind in entry.opcode.operand_kinds() {
                let run: SmallVec<[i64; 4]> = if *kind == OperandKind::InsnIdList {
                    values.by_ref().collect()
                } else {
                    values.next().into_iter().collect()
                };
                let item_kind = if *kind == OperandKind::InsnIdList {
                    OperandKind::InsnId
                } else {
                    *kind
                };
                for value in run {
                    f.write_str(if first { " " } else { ", " })?;
                    first = false;
                    write_operand(f, self.target, item_kind, value)?;
                }
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    target: Option<&TargetInfo>,
    kind: OperandKind,
    value: i64,
) -> fmt::Result {
    let id = u32::try_from(value).ok();
    match kind {
        OperandKind::Label => write!(f, "@{value}"),
        OperandKind::InsnId | OperandKind::InsnIdList => write!(f, "MI[{value}]"),
        OperandKind::OutId => write!(f, "OutMI[{value}]"),
        OperandKind::OpIdx => write!(f, "op{value}"),
        OperandKind::FeatureBitset => write!(f, "features#{value}"),
        OperandKind::Count | OperandKind::Imm => write!(f, "{value}"),
        OperandKind::ImmPredicate => write!(f, "pred#{value}"),
        OperandKind::TypeId => write!(f, "type#{value}"),
        OperandKind::RendererId => write!(f, "renderer#{value}"),
        OperandKind::ComplexPredicate => write!(f, "complex#{value}"),
        OperandKind::IntrinsicId => write!(f, "intrinsic({value})"),
        OperandKind::Opcode => {
            match (target, id.map(Opcode::from_u32)) {
                (Some(t), Some(opc)) if t.has_opcode(opc) => f.write_str(t.opcode_name(opc)),
                _ => write!(f, "opc#{value}"),
            }
        }
        OperandKind::RegClass => {
            match (target, id.map(RegClassId::from_u32)) {
                (Some(t), Some(rc)) if t.has_reg_class(rc) => f.write_str(&t.reg_class(rc).name),
                _ => write!(f, "rc#{value}"),
            }
        }
        OperandKind::PhysReg => match (target, id.map(PhysReg::from_u32)) {
            (Some(t), Some(reg)) if t.has_phys_reg(reg) => {
                write!(f, "${}", t.phys_reg(reg).name)
            }
            _ => write!(f, "preg#{value}"),
        },
        OperandKind::SubRegIdx => {
            match (target, id.and_then(|i| target?.sub_reg_name(i))) {
                (Some(_), Some(name)) if !name.is_empty() => f.write_str(name),
                _ => write!(f, "sub#{value}"),
            }
        }
    }
}

// ============================================================================
// MatchTableBuilder
// ============================================================================

/// A forward-referenceable table position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

#[derive(Debug)]
struct LabelState {
    name: String,
    bound: Option<usize>,
    bound_twice: bool,
}

/// Incremental builder for match tables, with symbolic labels for try
/// targets.
///
/// ```
/// # use selkie_isel::MatchTableBuilder;
/// # use selkie_mir::generic;
/// let mut b = MatchTableBuilder::new();
/// let next = b.label("next");
/// b.try_block(next)
///     .check_opcode(0, generic::G_IMPLICIT_DEF)
///     .done();
/// b.bind(next).reject();
/// let table = b.finish().unwrap();
/// assert_eq!(table.as_slice(), &[0, 6, 3, 0, 2, 29, 14]);
/// ```
#[derive(Debug, Default)]
pub struct MatchTableBuilder {
    data: Vec<i64>,
    labels: Vec<LabelState>,
    fixups: Vec<(usize, Label)>,
}

impl MatchTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current table index, where the next opcode will be placed.
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Create a new unbound label.
    pub fn label(&mut self, name: impl Into<String>) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(LabelState {
            name: name.into(),
            bound: None,
            bound_twice: false,
        });
        label
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let pos = self.position();
        let state = &mut self.labels[label.0 as usize];
        if state.bound.is_some() {
            state.bound_twice = true;
        } else {
            state.bound = Some(pos);
        }
        self
    }

    /// Append a raw opcode tag.
    pub fn opcode(&mut self, opcode: MatchOpcode) -> &mut Self {
        self.data.push(opcode.tag());
        self
    }

    /// Append a raw operand value.
    pub fn value(&mut self, value: i64) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Append a reference to `label`, patched in [`finish`](Self::finish).
    pub fn label_ref(&mut self, label: Label) -> &mut Self {
        self.fixups.push((self.data.len(), label));
        self.data.push(0);
        self
    }

    fn emit(&mut self, opcode: MatchOpcode, operands: &[i64]) -> &mut Self {
        debug_assert_eq!(
            opcode.fixed_len(),
            Some(operands.len() + 1),
            "{} takes {} operand(s)",
            opcode.mnemonic(),
            opcode.operand_kinds().len()
        );
        self.opcode(opcode);
        self.data.extend_from_slice(operands);
        self
    }

    // === Matchers ===

    pub fn try_block(&mut self, on_fail: Label) -> &mut Self {
        self.opcode(MatchOpcode::Try).label_ref(on_fail)
    }

    pub fn record_insn(&mut self, new_id: i64, insn_id: i64, op_idx: i64) -> &mut Self {
        self.emit(MatchOpcode::RecordInsn, &[new_id, insn_id, op_idx])
    }

    pub fn check_features(&mut self, bitset_id: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckFeatures, &[bitset_id])
    }

    pub fn check_opcode(&mut self, insn_id: i64, opcode: Opcode) -> &mut Self {
        self.emit(MatchOpcode::CheckOpcode, &[insn_id, opcode.as_u32() as i64])
    }

    pub fn check_num_operands(&mut self, insn_id: i64, count: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckNumOperands, &[insn_id, count])
    }

    pub fn check_imm_predicate(&mut self, insn_id: i64, pred_id: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckImmPredicate, &[insn_id, pred_id])
    }

    pub fn check_type(&mut self, insn_id: i64, op_idx: i64, type_id: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckType, &[insn_id, op_idx, type_id])
    }

    pub fn check_reg_bank_for_class(
        &mut self,
        insn_id: i64,
        op_idx: i64,
        rc: RegClassId,
    ) -> &mut Self {
        self.emit(
            MatchOpcode::CheckRegBankForClass,
            &[insn_id, op_idx, rc.as_u32() as i64],
        )
    }

    pub fn check_complex_pattern(
        &mut self,
        insn_id: i64,
        op_idx: i64,
        renderer_id: i64,
        pred_id: i64,
    ) -> &mut Self {
        self.emit(
            MatchOpcode::CheckComplexPattern,
            &[insn_id, op_idx, renderer_id, pred_id],
        )
    }

    pub fn check_constant_int(&mut self, insn_id: i64, op_idx: i64, value: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckConstantInt, &[insn_id, op_idx, value])
    }

    pub fn check_literal_int(&mut self, insn_id: i64, op_idx: i64, value: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckLiteralInt, &[insn_id, op_idx, value])
    }

    pub fn check_intrinsic_id(&mut self, insn_id: i64, op_idx: i64, id: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckIntrinsicId, &[insn_id, op_idx, id])
    }

    pub fn check_is_mbb(&mut self, insn_id: i64, op_idx: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckIsMbb, &[insn_id, op_idx])
    }

    pub fn check_is_safe_to_fold(&mut self, insn_id: i64) -> &mut Self {
        self.emit(MatchOpcode::CheckIsSafeToFold, &[insn_id])
    }

    pub fn reject(&mut self) -> &mut Self {
        self.emit(MatchOpcode::Reject, &[])
    }

    // === Renderers ===

    pub fn mutate_opcode(&mut self, old_id: i64, new_id: i64, opcode: Opcode) -> &mut Self {
        self.emit(
            MatchOpcode::MutateOpcode,
            &[old_id, new_id, opcode.as_u32() as i64],
        )
    }

    pub fn build_mi(&mut self, new_id: i64, opcode: Opcode) -> &mut Self {
        self.emit(MatchOpcode::BuildMi, &[new_id, opcode.as_u32() as i64])
    }

    pub fn copy(&mut self, new_id: i64, old_id: i64, op_idx: i64) -> &mut Self {
        self.emit(MatchOpcode::Copy, &[new_id, old_id, op_idx])
    }

    pub fn copy_sub_reg(
        &mut self,
        new_id: i64,
        old_id: i64,
        op_idx: i64,
        sub_reg: u32,
    ) -> &mut Self {
        self.emit(
            MatchOpcode::CopySubReg,
            &[new_id, old_id, op_idx, sub_reg as i64],
        )
    }

    pub fn add_implicit_def(&mut self, new_id: i64, reg: PhysReg) -> &mut Self {
        self.emit(MatchOpcode::AddImplicitDef, &[new_id, reg.as_u32() as i64])
    }

    pub fn add_implicit_use(&mut self, new_id: i64, reg: PhysReg) -> &mut Self {
        self.emit(MatchOpcode::AddImplicitUse, &[new_id, reg.as_u32() as i64])
    }

    pub fn add_register(&mut self, new_id: i64, reg: PhysReg) -> &mut Self {
        self.emit(MatchOpcode::AddRegister, &[new_id, reg.as_u32() as i64])
    }

    pub fn add_imm(&mut self, new_id: i64, imm: i64) -> &mut Self {
        self.emit(MatchOpcode::AddImm, &[new_id, imm])
    }

    pub fn complex_renderer(&mut self, new_id: i64, renderer_id: i64) -> &mut Self {
        self.emit(MatchOpcode::ComplexRenderer, &[new_id, renderer_id])
    }

    pub fn copy_constant_as_simm(&mut self, new_id: i64, old_id: i64) -> &mut Self {
        self.emit(MatchOpcode::CopyConstantAsSImm, &[new_id, old_id])
    }

    pub fn constrain_operand_rc(&mut self, new_id: i64, op_idx: i64, rc: RegClassId) -> &mut Self {
        self.emit(
            MatchOpcode::ConstrainOperandRc,
            &[new_id, op_idx, rc.as_u32() as i64],
        )
    }

    pub fn constrain_selected_inst_operands(&mut self, new_id: i64) -> &mut Self {
        self.emit(MatchOpcode::ConstrainSelectedInstOperands, &[new_id])
    }

    pub fn merge_mem_operands(&mut self, new_id: i64, insn_ids: &[i64]) -> &mut Self {
        self.opcode(MatchOpcode::MergeMemOperands).value(new_id);
        self.data.extend_from_slice(insn_ids);
        self.value(LIST_END)
    }

    pub fn erase_from_parent(&mut self, insn_id: i64) -> &mut Self {
        self.emit(MatchOpcode::EraseFromParent, &[insn_id])
    }

    pub fn done(&mut self) -> &mut Self {
        self.emit(MatchOpcode::Done, &[])
    }

    /// Patch label references and validate the result.
    pub fn finish(mut self) -> Result<MatchTable, TableError> {
        if let Some(state) = self.labels.iter().find(|l| l.bound_twice) {
            return Err(TableError::DuplicateLabel {
                label: state.name.clone(),
            });
        }
        for (at, label) in std::mem::take(&mut self.fixups) {
            let state = &self.labels[label.0 as usize];
            let pos = state.bound.ok_or_else(|| TableError::UnboundLabel {
                label: state.name.clone(),
            })?;
            self.data[at] = pos as i64;
        }
        let table = MatchTable::from(self.data);
        table.validate()?;
        Ok(table)
    }
}
