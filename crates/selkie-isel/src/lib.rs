//! Table-driven instruction selection.
//!
//! A target's patterns are compiled into a flat [`MatchTable`] of `i64`
//! opcodes. [`MatchTableExecutor`] interprets the table against one root
//! instruction: matcher opcodes inspect the instruction and the
//! instructions feeding it, renderer opcodes build the replacement.
//! [`InstructionSelect`] drives a target's [`InstructionSelector`] over a
//! whole [`MachineFunction`](selkie_mir::MachineFunction).

pub mod asm;
pub mod error;
pub mod executor;
pub mod info;
pub mod legality;
pub mod opcode;
pub mod selector;
pub mod state;
pub mod table;
pub mod utils;

pub use asm::assemble;
pub use error::{SelectError, TableError};
pub use executor::MatchTableExecutor;
pub use info::{ComplexMatcherFn, FeatureBitset, ImmPredicateFn, MatcherInfo, Renderer};
pub use legality::LegalityOracle;
pub use opcode::{LIST_END, MatchOpcode, OperandKind, UnknownOpcode};
pub use selector::{
    FallbackPolicy, InstructionSelect, InstructionSelector, SelectOptions, SelectStats,
};
pub use state::{MatcherState, NewInstVector, OutputInst, OutputKind};
pub use table::{DecodedEntry, Label, MatchTable, MatchTableBuilder};
