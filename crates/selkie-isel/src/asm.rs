//! Textual match-table assembler.
//!
//! Accepts the disassembly printed by [`MatchTable::display`], plus
//! symbolic labels so tables can be written by hand:
//!
//! ```text
//! ; G_ADD x, 1 -> INC x
//!     GIM_Try @next
//!     GIM_CheckOpcode MI[0], G_ADD
//!     GIM_CheckConstantInt MI[0], op2, 1
//!     GIR_MutateOpcode MI[0], OutMI[0], INC
//!     GIR_Done
//! next:
//!     GIM_Reject
//! ```
//!
//! A leading `N:` asserts the table index of the entry on that line.
//! Opcode, register class, physical register and sub-register names are
//! resolved against a [`TargetInfo`]; the numeric forms printed for
//! unknown ids (`opc#N`, `rc#N`, `preg#N`, `sub#N`) are accepted as well.

use std::collections::HashMap;

use selkie_mir::TargetInfo;
use winnow::ascii;
use winnow::combinator::{alt, delimited, eof, opt, preceded, separated, terminated};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_while};

use crate::error::TableError;
use crate::opcode::{LIST_END, MatchOpcode, OperandKind};
use crate::table::{Label, MatchTable, MatchTableBuilder};

/// Assemble a match table from text.
pub fn assemble(target: &TargetInfo, input: &str) -> Result<MatchTable, TableError> {
    let mut asm = Assembler {
        target,
        builder: MatchTableBuilder::new(),
        labels: HashMap::new(),
    };
    for (n, line) in input.lines().enumerate() {
        asm.line(n + 1, line)?;
    }
    asm.builder.finish()
}

// ============================================================================
// Raw (unresolved) structures
// ============================================================================

#[derive(Debug, Clone, Default)]
struct RawLine<'a> {
    label: Option<&'a str>,
    position: Option<usize>,
    entry: Option<RawEntry<'a>>,
}

#[derive(Debug, Clone)]
struct RawEntry<'a> {
    mnemonic: &'a str,
    /// Operands with their source text, for error messages.
    operands: Vec<(RawOperand<'a>, &'a str)>,
}

#[derive(Debug, Clone, Copy)]
enum RawOperand<'a> {
    LabelName(&'a str),
    LabelIndex(i64),
    /// `MI[0]`, `OutMI[1]`
    Slot(&'a str, i64),
    /// `features#0`, `opc#12`
    Tagged(&'a str, i64),
    Intrinsic(i64),
    Phys(&'a str),
    Int(i64),
    Ident(&'a str),
}

// ============================================================================
// Winnow parsers
// ============================================================================

fn hws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., [' ', '\t']).void().parse_next(input)
}

fn hws1(input: &mut &str) -> ModalResult<()> {
    take_while(1.., [' ', '\t']).void().parse_next(input)
}

fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn int_lit(input: &mut &str) -> ModalResult<i64> {
    (opt('-'), ascii::digit1)
        .take()
        .try_map(str::parse::<i64>)
        .parse_next(input)
}

fn raw_operand<'a>(input: &mut &'a str) -> ModalResult<RawOperand<'a>> {
    alt((
        preceded(
            '@',
            alt((
                int_lit.map(RawOperand::LabelIndex),
                ident.map(RawOperand::LabelName),
            )),
        ),
        delimited("intrinsic(", int_lit, ')').map(RawOperand::Intrinsic),
        preceded('$', ident).map(RawOperand::Phys),
        (ident, delimited('[', int_lit, ']')).map(|(name, n)| RawOperand::Slot(name, n)),
        (ident, preceded('#', int_lit)).map(|(name, n)| RawOperand::Tagged(name, n)),
        int_lit.map(RawOperand::Int),
        ident.map(RawOperand::Ident),
    ))
    .parse_next(input)
}

fn operand_list<'a>(input: &mut &'a str) -> ModalResult<Vec<(RawOperand<'a>, &'a str)>> {
    separated(1.., raw_operand.with_taken(), (hws, ',', hws)).parse_next(input)
}

fn raw_entry<'a>(input: &mut &'a str) -> ModalResult<RawEntry<'a>> {
    let mnemonic = ident.parse_next(input)?;
    let operands = opt(preceded(hws1, operand_list)).parse_next(input)?;
    Ok(RawEntry {
        mnemonic,
        operands: operands.unwrap_or_default(),
    })
}

fn raw_line<'a>(input: &mut &'a str) -> ModalResult<RawLine<'a>> {
    hws.parse_next(input)?;
    let label = opt(terminated(ident, (hws, ':', hws))).parse_next(input)?;
    let position = opt(terminated(ascii::dec_uint, (hws, ':', hws))).parse_next(input)?;
    let entry = opt(raw_entry).parse_next(input)?;
    hws.parse_next(input)?;
    opt((';', take_till(0.., ['\n']))).void().parse_next(input)?;
    eof.parse_next(input)?;
    Ok(RawLine {
        label,
        position,
        entry,
    })
}

// ============================================================================
// Assembly
// ============================================================================

struct Assembler<'t> {
    target: &'t TargetInfo,
    builder: MatchTableBuilder,
    labels: HashMap<String, Label>,
}

enum Resolved {
    Value(i64),
    Label(Label),
}

impl Assembler<'_> {
    fn line(&mut self, line: usize, text: &str) -> Result<(), TableError> {
        let raw = raw_line.parse(text).map_err(|err| TableError::Syntax {
            line,
            message: format!("unexpected input at column {}", err.offset() + 1),
        })?;

        if let Some(name) = raw.label {
            let label = self.label(name);
            self.builder.bind(label);
        }
        if let Some(expected) = raw.position {
            let actual = self.builder.position();
            if expected != actual {
                return Err(TableError::Syntax {
                    line,
                    message: format!("entry marked as index {expected} is at index {actual}"),
                });
            }
        }
        if let Some(entry) = raw.entry {
            self.entry(line, &entry)?;
        }
        Ok(())
    }

    fn label(&mut self, name: &str) -> Label {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }
        let label = self.builder.label(name);
        self.labels.insert(name.to_owned(), label);
        label
    }

    fn entry(&mut self, line: usize, entry: &RawEntry<'_>) -> Result<(), TableError> {
        let Some(opcode) = MatchOpcode::from_mnemonic(entry.mnemonic) else {
            return Err(TableError::Syntax {
                line,
                message: format!("unknown opcode `{}`", entry.mnemonic),
            });
        };
        let kinds = opcode.operand_kinds();
        let is_list = kinds.last() == Some(&OperandKind::InsnIdList);
        let fixed = if is_list { kinds.len() - 1 } else { kinds.len() };
        let count = entry.operands.len();
        if count < fixed || (!is_list && count > fixed) {
            return Err(TableError::Syntax {
                line,
                message: format!(
                    "{} takes {}{fixed} operand(s), found {count}",
                    opcode.mnemonic(),
                    if is_list { "at least " } else { "" }
                ),
            });
        }

        let mut resolved = Vec::with_capacity(count);
        for (i, (raw, text)) in entry.operands.iter().enumerate() {
            let kind = if i < fixed {
                kinds[i]
            } else {
                OperandKind::InsnId
            };
            let value = self.resolve(kind, *raw).ok_or_else(|| TableError::Syntax {
                line,
                message: format!(
                    "operand {i} of {}: expected {}, found `{text}`",
                    opcode.mnemonic(),
                    describe(kind)
                ),
            })?;
            resolved.push(value);
        }

        self.builder.opcode(opcode);
        for value in resolved {
            match value {
                Resolved::Value(v) => self.builder.value(v),
                Resolved::Label(label) => self.builder.label_ref(label),
            };
        }
        if is_list {
            self.builder.value(LIST_END);
        }
        Ok(())
    }

    fn resolve(&mut self, kind: OperandKind, raw: RawOperand<'_>) -> Option<Resolved> {
        let target = self.target;
        let value = match (kind, raw) {
            (OperandKind::Label, RawOperand::LabelName(name)) => {
                return Some(Resolved::Label(self.label(name)));
            }
            (OperandKind::Label, RawOperand::LabelIndex(n)) => n,
            (OperandKind::InsnId | OperandKind::InsnIdList, RawOperand::Slot("MI", n)) => n,
            (OperandKind::OutId, RawOperand::Slot("OutMI", n)) => n,
            (OperandKind::OpIdx, RawOperand::Ident(name)) => {
                name.strip_prefix("op")?.parse().ok()?
            }
            (OperandKind::FeatureBitset, RawOperand::Tagged("features", n)) => n,
            (OperandKind::ImmPredicate, RawOperand::Tagged("pred", n)) => n,
            (OperandKind::TypeId, RawOperand::Tagged("type", n)) => n,
            (OperandKind::RendererId, RawOperand::Tagged("renderer", n)) => n,
            (OperandKind::ComplexPredicate, RawOperand::Tagged("complex", n)) => n,
            (OperandKind::Count | OperandKind::Imm, RawOperand::Int(n)) => n,
            (OperandKind::IntrinsicId, RawOperand::Intrinsic(n) | RawOperand::Int(n)) => n,
            (OperandKind::Opcode, RawOperand::Ident(name)) => {
                i64::from(target.lookup_opcode(name)?.as_u32())
            }
            (OperandKind::Opcode, RawOperand::Tagged("opc", n)) => n,
            (OperandKind::RegClass, RawOperand::Ident(name)) => {
                i64::from(target.lookup_reg_class(name)?.as_u32())
            }
            (OperandKind::RegClass, RawOperand::Tagged("rc", n)) => n,
            (OperandKind::PhysReg, RawOperand::Phys(name)) => {
                i64::from(target.lookup_phys_reg(name)?.as_u32())
            }
            (OperandKind::PhysReg, RawOperand::Tagged("preg", n)) => n,
            (OperandKind::SubRegIdx, RawOperand::Ident(name)) => {
                i64::from(target.lookup_sub_reg(name)?)
            }
            (OperandKind::SubRegIdx, RawOperand::Tagged("sub", n)) => n,
            _ => return None,
        };
        Some(Resolved::Value(value))
    }
}

fn describe(kind: OperandKind) -> &'static str {
    match kind {
        OperandKind::Label => "a label `@name` or `@index`",
        OperandKind::InsnId | OperandKind::InsnIdList => "an instruction slot `MI[n]`",
        OperandKind::OutId => "an output slot `OutMI[n]`",
        OperandKind::OpIdx => "an operand index `opN`",
        OperandKind::FeatureBitset => "a feature bitset `features#n`",
        OperandKind::Opcode => "a known opcode name",
        OperandKind::Count => "a count",
        OperandKind::ImmPredicate => "an immediate predicate `pred#n`",
        OperandKind::TypeId => "a type `type#n`",
        OperandKind::RegClass => "a known register class",
        OperandKind::RendererId => "a renderer `renderer#n`",
        OperandKind::ComplexPredicate => "a complex predicate `complex#n`",
        OperandKind::Imm => "an integer",
        OperandKind::IntrinsicId => "an intrinsic id",
        OperandKind::PhysReg => "a known physical register `$name`",
        OperandKind::SubRegIdx => "a known sub-register index",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use selkie_mir::{InstrDesc, TargetInfoBuilder, generic};

    fn target() -> TargetInfo {
        let mut b = TargetInfoBuilder::new("t");
        let gprb = b.reg_bank("gprb");
        let w0 = b.phys_reg("w0");
        let x0 = b.phys_reg("x0");
        let gpr32 = b.reg_class("gpr32", gprb, 32, &[w0]);
        b.reg_class("gpr64", gprb, 64, &[x0]);
        b.sub_reg_index("sub_32");
        b.instr(InstrDesc::new("INC").defs(1).reg(gpr32).reg(gpr32));
        b.instr(InstrDesc::new("LDR").defs(1).reg(gpr32).untyped_n(2).may_load());
        b.finish()
    }

    #[test]
    fn assembles_symbolic_source() {
        let target = target();
        let table = assemble(
            &target,
            "\
; G_ADD x, 1 -> INC x
    GIM_Try @next
    GIM_CheckOpcode MI[0], G_ADD
    GIM_CheckConstantInt MI[0], op2, 1   ; folded constant
    GIR_MutateOpcode MI[0], OutMI[0], INC
    GIR_Done
next:
    GIM_Reject
",
        )
        .unwrap();
        let inc = target.lookup_opcode("INC").unwrap();

        let mut b = MatchTableBuilder::new();
        let next = b.label("next");
        b.try_block(next)
            .check_opcode(0, generic::G_ADD)
            .check_constant_int(0, 2, 1)
            .mutate_opcode(0, 0, inc)
            .done();
        b.bind(next).reject();
        assert_eq!(table, b.finish().unwrap());
    }

    #[test]
    fn disassembly_reassembles() {
        let target = target();
        let ldr = target.lookup_opcode("LDR").unwrap();
        let gpr64 = target.lookup_reg_class("gpr64").unwrap();
        let w0 = target.lookup_phys_reg("w0").unwrap();

        let mut b = MatchTableBuilder::new();
        let fail = b.label("fail");
        b.try_block(fail)
            .check_features(0)
            .check_opcode(0, generic::G_LOAD)
            .check_type(0, 0, 1)
            .check_reg_bank_for_class(0, 1, gpr64)
            .check_complex_pattern(0, 1, 0, 2)
            .check_intrinsic_id(0, 1, 9)
            .build_mi(0, ldr)
            .copy_sub_reg(0, 0, 0, 1)
            .complex_renderer(0, 0)
            .add_implicit_use(0, w0)
            .add_imm(0, -4)
            .constrain_operand_rc(0, 0, gpr64)
            .merge_mem_operands(0, &[0, 1])
            .erase_from_parent(0)
            .done();
        b.bind(fail).reject();
        let table = b.finish().unwrap();

        let text = table.display(Some(&target)).to_string();
        assert_eq!(assemble(&target, &text).unwrap(), table);
        assert_snapshot!(text, @r"
        0: GIM_Try @53
        2: GIM_CheckFeatures features#0
        4: GIM_CheckOpcode MI[0], G_LOAD
        7: GIM_CheckType MI[0], op0, type#1
        11: GIM_CheckRegBankForClass MI[0], op1, gpr64
        15: GIM_CheckComplexPattern MI[0], op1, renderer#0, complex#2
        20: GIM_CheckIntrinsicID MI[0], op1, intrinsic(9)
        24: GIR_BuildMI OutMI[0], LDR
        27: GIR_CopySubReg OutMI[0], MI[0], op0, sub_32
        32: GIR_ComplexRenderer OutMI[0], renderer#0
        35: GIR_AddImplicitUse OutMI[0], $w0
        38: GIR_AddImm OutMI[0], -4
        41: GIR_ConstrainOperandRC OutMI[0], op0, gpr64
        45: GIR_MergeMemOperands OutMI[0], MI[0], MI[1]
        50: GIR_EraseFromParent MI[0]
        52: GIR_Done
        53: GIM_Reject
        ");
    }

    #[test]
    fn numeric_forms_without_target_names() {
        let target = target();
        let table = assemble(&target, "GIM_Try @6\nGIM_CheckOpcode MI[0], opc#3\nGIM_Reject\nGIR_Done\n").unwrap();
        assert_eq!(table.as_slice(), &[0, 6, 3, 0, 3, 14, 29]);
    }

    #[test]
    fn reports_errors_with_line_numbers() {
        let target = target();
        let err = |text: &str| assemble(&target, text).unwrap_err();

        assert_eq!(
            err("GIR_Done\nGIM_Frobnicate MI[0]\n"),
            TableError::Syntax {
                line: 2,
                message: "unknown opcode `GIM_Frobnicate`".to_owned(),
            }
        );
        assert_eq!(
            err("GIM_CheckOpcode MI[0]\n"),
            TableError::Syntax {
                line: 1,
                message: "GIM_CheckOpcode takes 2 operand(s), found 1".to_owned(),
            }
        );
        assert_eq!(
            err("GIM_CheckOpcode MI[0], NOPE\n"),
            TableError::Syntax {
                line: 1,
                message: "operand 1 of GIM_CheckOpcode: expected a known opcode name, found `NOPE`"
                    .to_owned(),
            }
        );
        assert_eq!(
            err("GIR_Done\n3: GIR_Done\n"),
            TableError::Syntax {
                line: 2,
                message: "entry marked as index 3 is at index 1".to_owned(),
            }
        );
        assert!(matches!(err("GIR_Done ]\n"), TableError::Syntax { line: 1, .. }));
        assert_eq!(
            err("GIM_Try @nowhere\nGIR_Done\n"),
            TableError::UnboundLabel {
                label: "nowhere".to_owned(),
            }
        );
        assert_eq!(
            err("a:\nGIR_Done\na:\nGIR_Done\n"),
            TableError::DuplicateLabel {
                label: "a".to_owned(),
            }
        );
    }
}
