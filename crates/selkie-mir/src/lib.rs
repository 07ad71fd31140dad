//! Machine-level IR for the selkie instruction selector.
//!
//! Functions are stored in arenas (`cranelift-entity`) so instructions can
//! be created, rewritten and erased in place while def/use chains of
//! virtual registers stay current. A [`TargetInfo`] describes opcodes,
//! register banks and register classes of the target being selected for.

pub mod function;
pub mod operand;
pub mod parser;
pub mod printer;
pub mod refs;
pub mod target;
pub mod types;

pub use function::{BlockData, InstBuilder, InstData, MachineFunction, VRegData};
pub use operand::{ConstantInt, MachineOperand, MemAccess, MemOperand, RegOperand, Register};
pub use parser::{ParseError, parse_function, parse_test_function};
pub use printer::{print_function, print_inst};
pub use refs::{BlockRef, InstRef, Opcode, PhysReg, RegBankId, RegClassId, VReg};
pub use target::{
    InstrDesc, OperandInfo, PhysRegData, RegBankData, RegClassData, TargetInfo,
    TargetInfoBuilder, generic,
};
pub use types::LowLevelType;

// Re-export the entity trait so downstream crates can call `index()` /
// `new()` on refs without depending on cranelift-entity directly.
pub use cranelift_entity::EntityRef;

// Re-export smallvec for callers building operand lists.
pub use smallvec;
