//! Machine IR text format parser.
//!
//! Parses the textual format produced by [`crate::printer`] back into a
//! [`MachineFunction`]. Names of opcodes, register classes, banks,
//! physical registers and sub-register indices are resolved against a
//! [`TargetInfo`].
//!
//! # Two-stage parsing
//!
//! 1. **Raw parse**: winnow combinators parse one statement (block header
//!    or instruction) at a time into `Raw*` structures.
//! 2. **Build**: `FunctionBuilder` resolves names and appends the
//!    statement to the function.
//!
//! Instructions are line-oriented: operands are separated by horizontal
//! whitespace and commas, and a newline ends the instruction. `;` starts a
//! comment running to the end of the line.

use std::collections::HashSet;

use derive_more::{Display, Error};
use winnow::ascii;
use winnow::combinator::{alt, delimited, eof, opt, peek, preceded, separated, terminated};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_while};

use crate::function::MachineFunction;
use crate::operand::{ConstantInt, MachineOperand, MemAccess, MemOperand, RegOperand, Register};
use crate::refs::*;
use crate::target::TargetInfo;
use crate::types::LowLevelType;

/// Register and block numbers above this are rejected to keep a typo from
/// allocating millions of arena entries.
const MAX_ENTITY_NUMBER: u32 = 1 << 20;

// ============================================================================
// Error type
// ============================================================================

/// Parse error for the machine IR text format.
#[derive(Debug, Clone, Display, Error)]
#[display("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

// ============================================================================
// Raw (unresolved) structures
// ============================================================================

#[derive(Debug, Clone)]
enum RawStatement<'a> {
    Block(u32),
    Inst(RawInst<'a>),
}

#[derive(Debug, Clone)]
struct RawInst<'a> {
    defs: Vec<RawDef<'a>>,
    opcode: &'a str,
    operands: Vec<RawOperand<'a>>,
    mem_operands: Vec<MemOperand>,
}

#[derive(Debug, Clone)]
struct RawDef<'a> {
    reg: RawReg<'a>,
    /// Register class or bank name after `:`.
    class: Option<&'a str>,
    ty: Option<RawType>,
}

#[derive(Debug, Clone, Copy)]
enum RawRegName<'a> {
    Virt(u32),
    Phys(&'a str),
}

#[derive(Debug, Clone, Copy)]
struct RawReg<'a> {
    name: RawRegName<'a>,
    sub_reg: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
enum RawOperand<'a> {
    Reg {
        reg: RawReg<'a>,
        is_def: bool,
        is_implicit: bool,
    },
    Imm(i64),
    CImm(u16, i64),
    Mbb(u32),
    IntrinsicId(u32),
}

#[derive(Debug, Clone, Copy)]
enum RawType {
    Scalar(u16),
    Pointer(u16),
    Vector(u16, u16),
}

// ============================================================================
// Winnow parsers
// ============================================================================

/// Skip whitespace, newlines and `;` comments.
fn ws(input: &mut &str) -> ModalResult<()> {
    loop {
        take_while(0.., |c: char| c.is_ascii_whitespace())
            .void()
            .parse_next(input)?;
        if !input.starts_with(';') {
            return Ok(());
        }
        take_till(0.., '\n').void().parse_next(input)?;
    }
}

/// Skip horizontal whitespace only.
fn hws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., [' ', '\t']).void().parse_next(input)
}

/// At least one horizontal whitespace character.
fn hws1(input: &mut &str) -> ModalResult<()> {
    take_while(1.., [' ', '\t']).void().parse_next(input)
}

/// End of an instruction line: optional comment, then a newline, the
/// closing brace or end of input.
fn line_end(input: &mut &str) -> ModalResult<()> {
    hws.parse_next(input)?;
    opt((';', take_till(0.., '\n'))).void().parse_next(input)?;
    alt(("\r\n".void(), "\n".void(), peek('}').void(), eof.void())).parse_next(input)
}

/// Parse an identifier: [a-zA-Z_][a-zA-Z0-9_]*
fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a signed 64-bit integer literal.
fn int_lit(input: &mut &str) -> ModalResult<i64> {
    let negative = opt('-').parse_next(input)?.is_some();
    let magnitude: u64 = ascii::dec_uint(input)?;
    let value = if negative {
        // i64::MIN has no positive counterpart.
        if magnitude > i64::MAX as u64 + 1 {
            return Err(winnow::error::ErrMode::Backtrack(
                winnow::error::ContextError::new(),
            ));
        }
        (magnitude as i64).wrapping_neg()
    } else {
        i64::try_from(magnitude).map_err(|_| {
            winnow::error::ErrMode::Backtrack(winnow::error::ContextError::new())
        })?
    };
    Ok(value)
}

fn raw_type(input: &mut &str) -> ModalResult<RawType> {
    alt((
        preceded('s', ascii::dec_uint).map(RawType::Scalar),
        preceded('p', ascii::dec_uint).map(RawType::Pointer),
        delimited(
            '<',
            (ascii::dec_uint, hws, 'x', hws, 's', ascii::dec_uint),
            '>',
        )
        .map(|(lanes, _, _, _, _, bits)| RawType::Vector(lanes, bits)),
    ))
    .parse_next(input)
}

fn raw_reg<'a>(input: &mut &'a str) -> ModalResult<RawReg<'a>> {
    let name = alt((
        preceded('%', ascii::dec_uint).map(RawRegName::Virt),
        preceded('$', ident).map(RawRegName::Phys),
    ))
    .parse_next(input)?;
    let sub_reg = opt(preceded('.', ident)).parse_next(input)?;
    Ok(RawReg { name, sub_reg })
}

/// A def on the left of `=`: `%0:gpr32(s32)`, `%1:(s64)`, `$w0`.
fn raw_def<'a>(input: &mut &'a str) -> ModalResult<RawDef<'a>> {
    let reg = raw_reg.parse_next(input)?;
    let class = opt(preceded(':', opt(ident))).parse_next(input)?;
    let ty = opt(delimited('(', raw_type, ')')).parse_next(input)?;
    Ok(RawDef {
        reg,
        class: class.flatten(),
        ty,
    })
}

fn raw_operand<'a>(input: &mut &'a str) -> ModalResult<RawOperand<'a>> {
    let reg_with = |is_def: bool, is_implicit: bool| {
        move |reg: RawReg<'a>| RawOperand::Reg {
            reg,
            is_def,
            is_implicit,
        }
    };
    alt((
        preceded(("implicit-def", hws1), raw_reg).map(reg_with(true, true)),
        preceded(("implicit", hws1), raw_reg).map(reg_with(false, true)),
        preceded(("def", hws1), raw_reg).map(reg_with(true, false)),
        delimited("intrinsic(", ascii::dec_uint, ')').map(RawOperand::IntrinsicId),
        preceded("%bb.", ascii::dec_uint).map(RawOperand::Mbb),
        raw_reg.map(reg_with(false, false)),
        (preceded('i', ascii::dec_uint), hws1, int_lit)
            .map(|(bits, _, value)| RawOperand::CImm(bits, value)),
        int_lit.map(RawOperand::Imm),
    ))
    .parse_next(input)
}

/// `(load 4)`, `(store 8, align 4)`
fn raw_mem_operand(input: &mut &str) -> ModalResult<MemOperand> {
    ('(', hws).parse_next(input)?;
    let access = alt((
        "load".value(MemAccess::Load),
        "store".value(MemAccess::Store),
    ))
    .parse_next(input)?;
    hws1.parse_next(input)?;
    let size: u32 = ascii::dec_uint(input)?;
    let align: Option<u32> =
        opt(preceded((hws, ',', hws, "align", hws1), ascii::dec_uint)).parse_next(input)?;
    (hws, ')').parse_next(input)?;
    Ok(MemOperand {
        access,
        size,
        align: align.unwrap_or(0),
    })
}

fn comma(input: &mut &str) -> ModalResult<()> {
    (hws, ',', hws).void().parse_next(input)
}

fn def_list<'a>(input: &mut &'a str) -> ModalResult<Vec<RawDef<'a>>> {
    separated(1.., raw_def, comma).parse_next(input)
}

fn operand_list<'a>(input: &mut &'a str) -> ModalResult<Vec<RawOperand<'a>>> {
    separated(1.., raw_operand, comma).parse_next(input)
}

fn mem_operand_list(input: &mut &str) -> ModalResult<Vec<MemOperand>> {
    separated(1.., raw_mem_operand, comma).parse_next(input)
}

fn raw_inst<'a>(input: &mut &'a str) -> ModalResult<RawInst<'a>> {
    let defs = opt(terminated(def_list, (hws, '=', hws)))
        .parse_next(input)?
        .unwrap_or_default();
    let opcode = ident.parse_next(input)?;
    let operands = opt(preceded(hws1, operand_list))
        .parse_next(input)?
        .unwrap_or_default();
    let mem_operands = opt(preceded((hws, "::", hws), mem_operand_list))
        .parse_next(input)?
        .unwrap_or_default();
    Ok(RawInst {
        defs,
        opcode,
        operands,
        mem_operands,
    })
}

fn raw_statement<'a>(input: &mut &'a str) -> ModalResult<RawStatement<'a>> {
    alt((
        delimited("bb.", ascii::dec_uint, ':').map(RawStatement::Block),
        raw_inst.map(RawStatement::Inst),
    ))
    .parse_next(input)
}

/// `func @name {`
fn function_header<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    ("func", hws1, '@').parse_next(input)?;
    let name = take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        .parse_next(input)?;
    (hws, '{').parse_next(input)?;
    Ok(name)
}

// ============================================================================
// FunctionBuilder (Raw -> MachineFunction)
// ============================================================================

struct FunctionBuilder<'t> {
    target: &'t TargetInfo,
    func: MachineFunction,
    current: Option<BlockRef>,
    defined_blocks: HashSet<BlockRef>,
}

impl<'t> FunctionBuilder<'t> {
    fn new(target: &'t TargetInfo, name: &str) -> Self {
        Self {
            target,
            func: MachineFunction::new(name),
            current: None,
            defined_blocks: HashSet::new(),
        }
    }

    fn check_number(what: &str, n: u32) -> Result<(), String> {
        if n >= MAX_ENTITY_NUMBER {
            return Err(format!("{what} number {n} is too large"));
        }
        Ok(())
    }

    fn block(&mut self, n: u32) -> Result<BlockRef, String> {
        Self::check_number("block", n)?;
        while self.func.num_blocks() <= n as usize {
            self.func.create_block();
        }
        Ok(BlockRef::from_u32(n))
    }

    fn apply(&mut self, stmt: RawStatement<'_>) -> Result<(), String> {
        match stmt {
            RawStatement::Block(n) => {
                let block = self.block(n)?;
                if !self.defined_blocks.insert(block) {
                    return Err(format!("duplicate block label `bb.{n}`"));
                }
                self.current = Some(block);
                Ok(())
            }
            RawStatement::Inst(raw) => self.apply_inst(raw),
        }
    }

    fn resolve_reg(&mut self, raw: &RawReg<'_>) -> Result<RegOperand, String> {
        let reg = match raw.name {
            RawRegName::Virt(n) => {
                Self::check_number("register", n)?;
                let v = VReg::from_u32(n);
                self.func.ensure_vreg(v);
                Register::Virt(v)
            }
            RawRegName::Phys(name) => self
                .target
                .lookup_phys_reg(name)
                .map(Register::Phys)
                .ok_or_else(|| format!("unknown physical register `${name}`"))?,
        };
        let sub_reg = match raw.sub_reg {
            Some(name) => self
                .target
                .lookup_sub_reg(name)
                .filter(|idx| *idx != 0)
                .ok_or_else(|| format!("unknown sub-register index `{name}`"))?,
            None => 0,
        };
        Ok(RegOperand::use_of(reg).with_sub_reg(sub_reg))
    }

    fn resolve_type(&self, raw: RawType) -> LowLevelType {
        match raw {
            RawType::Scalar(bits) => LowLevelType::scalar(bits),
            RawType::Pointer(addr_space) => {
                LowLevelType::pointer(addr_space, self.target.pointer_bits)
            }
            RawType::Vector(lanes, bits) => LowLevelType::vector(lanes, bits),
        }
    }

    fn apply_def(&mut self, raw: &RawDef<'_>) -> Result<MachineOperand, String> {
        let mut reg = self.resolve_reg(&raw.reg)?;
        reg.is_def = true;
        match reg.reg {
            Register::Virt(v) => {
                if let Some(name) = raw.class {
                    if let Some(rc) = self.target.lookup_reg_class(name) {
                        self.func.set_vreg_class(v, rc);
                        let bank = self.target.reg_class(rc).bank;
                        self.func.set_vreg_bank(v, bank);
                    } else if let Some(bank) = self.target.lookup_bank(name) {
                        self.func.set_vreg_bank(v, bank);
                    } else {
                        return Err(format!("unknown register class or bank `{name}`"));
                    }
                }
                if let Some(ty) = raw.ty {
                    let ty = self.resolve_type(ty);
                    self.func.set_vreg_type(v, ty);
                }
            }
            Register::Phys(p) => {
                if raw.class.is_some() || raw.ty.is_some() {
                    return Err(format!(
                        "physical register `${}` cannot carry a class or type",
                        self.target.phys_reg(p).name
                    ));
                }
            }
        }
        Ok(MachineOperand::Reg(reg))
    }

    fn apply_operand(&mut self, raw: &RawOperand<'_>) -> Result<MachineOperand, String> {
        Ok(match *raw {
            RawOperand::Reg {
                reg,
                is_def,
                is_implicit,
            } => {
                let mut reg = self.resolve_reg(&reg)?;
                reg.is_def = is_def;
                reg.is_implicit = is_implicit;
                if is_implicit && reg.reg.is_virtual() {
                    return Err("implicit operands must be physical registers".to_owned());
                }
                MachineOperand::Reg(reg)
            }
            RawOperand::Imm(imm) => MachineOperand::Imm(imm),
            RawOperand::CImm(bits, value) => {
                if bits == 0 || bits > 64 {
                    return Err(format!("unsupported constant width i{bits}"));
                }
                MachineOperand::CImm(ConstantInt::new(value, bits))
            }
            RawOperand::Mbb(n) => MachineOperand::Mbb(self.block(n)?),
            RawOperand::IntrinsicId(id) => MachineOperand::IntrinsicId(id),
        })
    }

    fn apply_inst(&mut self, raw: RawInst<'_>) -> Result<(), String> {
        let block = self
            .current
            .ok_or_else(|| "instruction outside of a block".to_owned())?;
        let opcode = self
            .target
            .lookup_opcode(raw.opcode)
            .ok_or_else(|| format!("unknown opcode `{}`", raw.opcode))?;

        let mut operands = Vec::with_capacity(raw.defs.len() + raw.operands.len());
        for def in &raw.defs {
            operands.push(self.apply_def(def)?);
        }
        for op in &raw.operands {
            operands.push(self.apply_operand(op)?);
        }

        let inst = self.func.create_inst(opcode);
        for op in operands {
            self.func.add_operand(inst, op);
        }
        for mem in raw.mem_operands {
            self.func.add_mem_operand(inst, mem);
        }
        self.func.append_inst(block, inst);
        Ok(())
    }

    fn finish(self) -> Result<MachineFunction, String> {
        if let Some(block) = self
            .func
            .block_order()
            .find(|b| !self.defined_blocks.contains(b))
        {
            return Err(format!("block `bb.{}` is referenced but never defined", block.as_u32()));
        }
        Ok(self.func)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a textual function.
pub fn parse_function(target: &TargetInfo, input: &str) -> Result<MachineFunction, ParseError> {
    let offset = |rest: &str| input.len() - rest.len();
    let mut remaining = input;

    let name = preceded(ws, function_header)
        .parse_next(&mut remaining)
        .map_err(|e| ParseError {
            message: format!("expected `func @name {{`: {e}"),
            offset: offset(remaining),
        })?;
    let mut builder = FunctionBuilder::new(target, name);

    loop {
        ws.parse_next(&mut remaining).map_err(|e| ParseError {
            message: format!("lexer error: {e}"),
            offset: offset(remaining),
        })?;
        if remaining.starts_with('}') {
            break;
        }
        if remaining.is_empty() {
            return Err(ParseError {
                message: "unexpected end of input, expected `}`".to_owned(),
                offset: offset(remaining),
            });
        }

        let start = offset(remaining);
        let stmt = terminated(raw_statement, line_end)
            .parse_next(&mut remaining)
            .map_err(|e| ParseError {
                message: format!("invalid statement: {e}"),
                offset: offset(remaining),
            })?;
        builder.apply(stmt).map_err(|message| ParseError {
            message,
            offset: start,
        })?;
    }

    let close = offset(remaining);
    remaining = &remaining[1..];
    ws.parse_next(&mut remaining).map_err(|e| ParseError {
        message: format!("lexer error: {e}"),
        offset: offset(remaining),
    })?;
    if !remaining.is_empty() {
        return Err(ParseError {
            message: "trailing input after function".to_owned(),
            offset: offset(remaining),
        });
    }

    builder.finish().map_err(|message| ParseError {
        message,
        offset: close,
    })
}

/// Parse a textual function, panicking on failure.
///
/// Intended for tests.
pub fn parse_test_function(target: &TargetInfo, input: &str) -> MachineFunction {
    parse_function(target, input).unwrap_or_else(|e| {
        panic!(
            "Failed to parse test MIR at offset {}:\n  {}\n\nInput:\n{}",
            e.offset, e.message, input
        );
    })
}

// ============================================================================
// Tests
// ============================================================================
