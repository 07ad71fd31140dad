//! A small 32/64-bit target used to exercise table-driven selection.

pub mod selector;
pub mod table;
pub mod target;

pub use selector::ToySelector;
pub use table::{toy_matcher_info, toy_table};
pub use target::{FEATURE_HAS_MUL, INTRINSIC_RDCYCLE, ToyTarget};
