//! Match-table opcodes and their operand layouts.
//!
//! A match table is a flat `i64` sequence. Each entry starts with an
//! opcode tag followed by a fixed number of operands, except
//! [`MatchOpcode::MergeMemOperands`] whose instruction-id list is
//! terminated by `-1`.

use derive_more::{Display, Error};

/// Terminator of variable-length operand lists.
pub const LIST_END: i64 = -1;

/// Opcodes of the match table. Tags are the declaration order.
#[repr(i64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchOpcode {
    // === Matchers ===
    /// Push a resume point for the enclosed alternative.
    Try = 0,
    /// Bind a new instruction slot to the def of a register operand.
    RecordInsn,
    CheckFeatures,
    CheckOpcode,
    CheckNumOperands,
    /// Check a predicate on the value of a `G_CONSTANT`.
    CheckImmPredicate,
    CheckType,
    CheckRegBankForClass,
    /// Run a complex-pattern callback and capture its renderer.
    CheckComplexPattern,
    CheckConstantInt,
    CheckLiteralInt,
    CheckIntrinsicId,
    CheckIsMbb,
    CheckIsSafeToFold,
    Reject,

    // === Renderers ===
    MutateOpcode,
    BuildMi,
    Copy,
    CopySubReg,
    AddImplicitDef,
    AddImplicitUse,
    AddRegister,
    AddImm,
    ComplexRenderer,
    CopyConstantAsSImm,
    ConstrainOperandRc,
    ConstrainSelectedInstOperands,
    MergeMemOperands,
    EraseFromParent,
    /// Accept the match.
    Done,
}

/// Kind of a single opcode operand, used for validation, disassembly and
/// assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Absolute table index to resume at.
    Label,
    /// Matched-instruction slot.
    InsnId,
    /// Output-instruction slot.
    OutId,
    /// Operand index within an instruction.
    OpIdx,
    /// Index into `MatcherInfo::feature_bitsets`.
    FeatureBitset,
    Opcode,
    /// Plain count.
    Count,
    /// Index into `MatcherInfo::imm_predicates`.
    ImmPredicate,
    /// Index into `MatcherInfo::types`.
    TypeId,
    RegClass,
    /// Index into the renderer slots.
    RendererId,
    /// Index into `MatcherInfo::complex_predicates`.
    ComplexPredicate,
    /// Signed immediate value.
    Imm,
    IntrinsicId,
    PhysReg,
    SubRegIdx,
    /// Matched-instruction slots terminated by [`LIST_END`].
    InsnIdList,
}

/// Error for a tag that is not a known [`MatchOpcode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Error)]
#[display("unknown match-table opcode tag {_0}")]
pub struct UnknownOpcode(#[error(not(source))] pub i64);

impl MatchOpcode {
    pub const ALL: [MatchOpcode; 30] = [
        MatchOpcode::Try,
        MatchOpcode::RecordInsn,
        MatchOpcode::CheckFeatures,
        MatchOpcode::CheckOpcode,
        MatchOpcode::CheckNumOperands,
        MatchOpcode::CheckImmPredicate,
        MatchOpcode::CheckType,
        MatchOpcode::CheckRegBankForClass,
        MatchOpcode::CheckComplexPattern,
        MatchOpcode::CheckConstantInt,
        MatchOpcode::CheckLiteralInt,
        MatchOpcode::CheckIntrinsicId,
        MatchOpcode::CheckIsMbb,
        MatchOpcode::CheckIsSafeToFold,
        MatchOpcode::Reject,
        MatchOpcode::MutateOpcode,
        MatchOpcode::BuildMi,
        MatchOpcode::Copy,
        MatchOpcode::CopySubReg,
        MatchOpcode::AddImplicitDef,
        MatchOpcode::AddImplicitUse,
        MatchOpcode::AddRegister,
        MatchOpcode::AddImm,
        MatchOpcode::ComplexRenderer,
        MatchOpcode::CopyConstantAsSImm,
        MatchOpcode::ConstrainOperandRc,
        MatchOpcode::ConstrainSelectedInstOperands,
        MatchOpcode::MergeMemOperands,
        MatchOpcode::EraseFromParent,
        MatchOpcode::Done,
    ];

    pub fn tag(self) -> i64 {
        self as i64
    }

    /// Mnemonic used by the disassembler and the assembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            MatchOpcode::Try => "GIM_Try",
            MatchOpcode::RecordInsn => "GIM_RecordInsn",
            MatchOpcode::CheckFeatures => "GIM_CheckFeatures",
            MatchOpcode::CheckOpcode => "GIM_CheckOpcode",
            MatchOpcode::CheckNumOperands => "GIM_CheckNumOperands",
            MatchOpcode::CheckImmPredicate => "GIM_CheckImmPredicate",
            MatchOpcode::CheckType => "GIM_CheckType",
            MatchOpcode::CheckRegBankForClass => "GIM_CheckRegBankForClass",
            MatchOpcode::CheckComplexPattern => "GIM_CheckComplexPattern",
            MatchOpcode::CheckConstantInt => "GIM_CheckConstantInt",
            MatchOpcode::CheckLiteralInt => "GIM_CheckLiteralInt",
            MatchOpcode::CheckIntrinsicId => "GIM_CheckIntrinsicID",
            MatchOpcode::CheckIsMbb => "GIM_CheckIsMBB",
            MatchOpcode::CheckIsSafeToFold => "GIM_CheckIsSafeToFold",
            MatchOpcode::Reject => "GIM_Reject",
            MatchOpcode::MutateOpcode => "GIR_MutateOpcode",
            MatchOpcode::BuildMi => "GIR_BuildMI",
            MatchOpcode::Copy => "GIR_Copy",
            MatchOpcode::CopySubReg => "GIR_CopySubReg",
            MatchOpcode::AddImplicitDef => "GIR_AddImplicitDef",
            MatchOpcode::AddImplicitUse => "GIR_AddImplicitUse",
            MatchOpcode::AddRegister => "GIR_AddRegister",
            MatchOpcode::AddImm => "GIR_AddImm",
            MatchOpcode::ComplexRenderer => "GIR_ComplexRenderer",
            MatchOpcode::CopyConstantAsSImm => "GIR_CopyConstantAsSImm",
            MatchOpcode::ConstrainOperandRc => "GIR_ConstrainOperandRC",
            MatchOpcode::ConstrainSelectedInstOperands => "GIR_ConstrainSelectedInstOperands",
            MatchOpcode::MergeMemOperands => "GIR_MergeMemOperands",
            MatchOpcode::EraseFromParent => "GIR_EraseFromParent",
            MatchOpcode::Done => "GIR_Done",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<MatchOpcode> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == name)
    }

    /// Operand layout following the tag.
    pub fn operand_kinds(self) -> &'static [OperandKind] {
        use OperandKind::*;
        match self {
            MatchOpcode::Try => &[Label],
            MatchOpcode::RecordInsn => &[InsnId, InsnId, OpIdx],
            MatchOpcode::CheckFeatures => &[FeatureBitset],
            MatchOpcode::CheckOpcode => &[InsnId, Opcode],
            MatchOpcode::CheckNumOperands => &[InsnId, Count],
            MatchOpcode::CheckImmPredicate => &[InsnId, ImmPredicate],
            MatchOpcode::CheckType => &[InsnId, OpIdx, TypeId],
            MatchOpcode::CheckRegBankForClass => &[InsnId, OpIdx, RegClass],
            MatchOpcode::CheckComplexPattern => &[InsnId, OpIdx, RendererId, ComplexPredicate],
            MatchOpcode::CheckConstantInt => &[InsnId, OpIdx, Imm],
            MatchOpcode::CheckLiteralInt => &[InsnId, OpIdx, Imm],
            MatchOpcode::CheckIntrinsicId => &[InsnId, OpIdx, IntrinsicId],
            MatchOpcode::CheckIsMbb => &[InsnId, OpIdx],
            MatchOpcode::CheckIsSafeToFold => &[InsnId],
            MatchOpcode::Reject => &[],
            MatchOpcode::MutateOpcode => &[InsnId, OutId, Opcode],
            MatchOpcode::BuildMi => &[OutId, Opcode],
            MatchOpcode::Copy => &[OutId, InsnId, OpIdx],
            MatchOpcode::CopySubReg => &[OutId, InsnId, OpIdx, SubRegIdx],
            MatchOpcode::AddImplicitDef => &[OutId, PhysReg],
            MatchOpcode::AddImplicitUse => &[OutId, PhysReg],
            MatchOpcode::AddRegister => &[OutId, PhysReg],
            MatchOpcode::AddImm => &[OutId, Imm],
            MatchOpcode::ComplexRenderer => &[OutId, RendererId],
            MatchOpcode::CopyConstantAsSImm => &[OutId, InsnId],
            MatchOpcode::ConstrainOperandRc => &[OutId, OpIdx, RegClass],
            MatchOpcode::ConstrainSelectedInstOperands => &[OutId],
            MatchOpcode::MergeMemOperands => &[OutId, InsnIdList],
            MatchOpcode::EraseFromParent => &[InsnId],
            MatchOpcode::Done => &[],
        }
    }

    /// Number of table entries occupied by a fixed-size opcode, tag
    /// included. `None` for opcodes with a terminated list.
    pub fn fixed_len(self) -> Option<usize> {
        let kinds = self.operand_kinds();
        if kinds.contains(&OperandKind::InsnIdList) {
            None
        } else {
            Some(1 + kinds.len())
        }
    }
}

impl TryFrom<i64> for MatchOpcode {
    type Error = UnknownOpcode;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        usize::try_from(tag)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(UnknownOpcode(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_declaration_order() {
        for (idx, op) in MatchOpcode::ALL.iter().enumerate() {
            assert_eq!(op.tag(), idx as i64, "{}", op.mnemonic());
            assert_eq!(MatchOpcode::try_from(idx as i64), Ok(*op));
        }
        assert_eq!(MatchOpcode::Try.tag(), 0);
        assert_eq!(MatchOpcode::Reject.tag(), 14);
        assert_eq!(MatchOpcode::MutateOpcode.tag(), 15);
        assert_eq!(MatchOpcode::Done.tag(), 29);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert_eq!(MatchOpcode::try_from(30), Err(UnknownOpcode(30)));
        assert_eq!(MatchOpcode::try_from(-1), Err(UnknownOpcode(-1)));
    }

    #[test]
    fn mnemonics_are_unique_and_round_trip() {
        for op in MatchOpcode::ALL {
            assert_eq!(MatchOpcode::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(MatchOpcode::from_mnemonic("GIM_Nope"), None);
    }

    #[test]
    fn only_merge_mem_operands_is_variadic() {
        for op in MatchOpcode::ALL {
            assert_eq!(
                op.fixed_len().is_none(),
                op == MatchOpcode::MergeMemOperands,
                "{}",
                op.mnemonic()
            );
        }
        assert_eq!(MatchOpcode::CheckComplexPattern.fixed_len(), Some(5));
        assert_eq!(MatchOpcode::Done.fixed_len(), Some(1));
    }
}
