//! Error types for table construction and the selection pass.
//!
//! The interpreter itself never returns errors: a mismatch is a `false`
//! result and a malformed table is a panic. These types cover the edges
//! where input comes from outside the process.

use derive_more::{Display, Error};
use selkie_mir::VReg;

/// A match table that cannot be decoded, assembled or built.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum TableError {
    #[display("unknown opcode tag {tag} at index {index}")]
    UnknownOpcode { index: usize, tag: i64 },

    #[display("{mnemonic} at index {index} runs past the end of the table")]
    Truncated {
        index: usize,
        mnemonic: &'static str,
    },

    #[display("try at index {index} resumes at {target}, which is not an opcode boundary")]
    BadResumeTarget { index: usize, target: i64 },

    #[display("operand {operand} of {mnemonic} at index {index} is negative: {value}")]
    NegativeOperand {
        index: usize,
        mnemonic: &'static str,
        operand: usize,
        value: i64,
    },

    #[display("label `{label}` is used but never bound")]
    UnboundLabel { label: String },

    #[display("label `{label}` is bound twice")]
    DuplicateLabel { label: String },

    #[display("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Reported by the instruction-select pass when a function cannot be
/// fully selected under the abort policy.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum SelectError {
    #[display("cannot select `{inst}` in function `{function}`")]
    CannotSelect { function: String, inst: String },

    #[display("{vreg} has no register class after selecting function `{function}`")]
    MissingRegClass {
        function: String,
        vreg: VReg,
    },
}
