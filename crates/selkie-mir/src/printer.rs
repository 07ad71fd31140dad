//! Text format printer for machine IR.
//!
//! ```text
//! func @name {
//! bb.0:
//!   %0:gpr32(s32) = COPY $w0
//!   %1:(s32) = G_CONSTANT i32 1
//!   %2:gpr32(s32) = G_ADD %0, %1
//!   $w0 = COPY %2
//!   RET implicit $w0
//! }
//! ```
//!
//! Virtual registers keep their arena numbers, so printing and parsing
//! round-trip without renumbering.

use std::fmt::{self, Write};

use crate::function::MachineFunction;
use crate::operand::{MachineOperand, MemAccess, MemOperand, RegOperand, Register};
use crate::refs::*;
use crate::target::TargetInfo;

// ============================================================================
// Public API
// ============================================================================

/// Print a whole function.
pub fn print_function(target: &TargetInfo, func: &MachineFunction) -> String {
    let mut out = String::new();
    write_function(target, func, &mut out).expect("fmt::Write to String never fails");
    out
}

/// Print a single instruction without indentation or trailing newline.
pub fn print_inst(target: &TargetInfo, func: &MachineFunction, inst: InstRef) -> String {
    let mut out = String::new();
    write_inst(target, func, &mut out, inst).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Function / block printing
// ============================================================================

fn write_function(target: &TargetInfo, func: &MachineFunction, f: &mut impl Write) -> fmt::Result {
    writeln!(f, "func @{} {{", func.name)?;
    for block in func.block_order() {
        writeln!(f, "{}:", block_label(block))?;
        for &inst in func.block_insts(block) {
            f.write_str("  ")?;
            write_inst(target, func, f, inst)?;
            f.write_char('\n')?;
        }
    }
    f.write_str("}\n")
}

fn block_label(block: BlockRef) -> String {
    format!("bb.{}", block.as_u32())
}

// ============================================================================
// Instruction printing
// ============================================================================

/// Number of leading explicit def operands, printed on the left of `=`.
fn num_leading_defs(operands: &[MachineOperand]) -> usize {
    operands
        .iter()
        .take_while(|op| op.is_def() && !op.is_implicit())
        .count()
}

fn write_inst(
    target: &TargetInfo,
    func: &MachineFunction,
    f: &mut impl Write,
    inst: InstRef,
) -> fmt::Result {
    let data = func.inst(inst);
    let operands = data.operands();
    let num_defs = num_leading_defs(operands);

    for (i, op) in operands[..num_defs].iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        let Some(reg) = op.as_reg() else {
            unreachable!("leading defs are register operands")
        };
        write_def(target, func, f, reg)?;
    }
    if num_defs > 0 {
        f.write_str(" = ")?;
    }

    f.write_str(target.opcode_name(data.opcode))?;

    for (i, op) in operands[num_defs..].iter().enumerate() {
        f.write_str(if i == 0 { " " } else { ", " })?;
        write_operand(target, f, op)?;
    }

    if !data.mem_operands.is_empty() {
        f.write_str(" :: ")?;
        for (i, mem) in data.mem_operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_mem_operand(f, mem)?;
        }
    }
    Ok(())
}

/// A def printed with its register class / bank and type annotation.
fn write_def(
    target: &TargetInfo,
    func: &MachineFunction,
    f: &mut impl Write,
    reg: &RegOperand,
) -> fmt::Result {
    write_reg(target, f, reg)?;
    let Register::Virt(v) = reg.reg else {
        return Ok(());
    };
    let data = func.vreg(v);
    if let Some(rc) = data.class {
        write!(f, ":{}", target.reg_class(rc).name)?;
    } else if let Some(bank) = data.bank {
        write!(f, ":{}", target.bank(bank).name)?;
    } else if data.ty.is_some() {
        f.write_char(':')?;
    }
    if let Some(ty) = data.ty {
        write!(f, "({ty})")?;
    }
    Ok(())
}

fn write_reg(target: &TargetInfo, f: &mut impl Write, reg: &RegOperand) -> fmt::Result {
    match reg.reg {
        Register::Virt(v) => write!(f, "{v}")?,
        Register::Phys(p) => write!(f, "${}", target.phys_reg(p).name)?,
    }
    if reg.sub_reg != 0 {
        match target.sub_reg_name(reg.sub_reg) {
            Some(name) => write!(f, ".{name}")?,
            None => write!(f, ".sub{}", reg.sub_reg)?,
        }
    }
    Ok(())
}

fn write_operand(target: &TargetInfo, f: &mut impl Write, op: &MachineOperand) -> fmt::Result {
    match op {
        MachineOperand::Reg(reg) => {
            match (reg.is_implicit, reg.is_def) {
                (true, true) => f.write_str("implicit-def ")?,
                (true, false) => f.write_str("implicit ")?,
                (false, true) => f.write_str("def ")?,
                (false, false) => {}
            }
            write_reg(target, f, reg)
        }
        MachineOperand::Imm(imm) => write!(f, "{imm}"),
        MachineOperand::CImm(c) => write!(f, "i{} {}", c.bits, c.value),
        MachineOperand::Mbb(block) => write!(f, "%{}", block_label(*block)),
        MachineOperand::IntrinsicId(id) => write!(f, "intrinsic({id})"),
    }
}

fn write_mem_operand(f: &mut impl Write, mem: &MemOperand) -> fmt::Result {
    let access = match mem.access {
        MemAccess::Load => "load",
        MemAccess::Store => "store",
    };
    write!(f, "({access} {}", mem.size)?;
    if mem.align != 0 {
        write!(f, ", align {}", mem.align)?;
    }
    f.write_char(')')
}
