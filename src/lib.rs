//! Selkie: table-driven instruction selection for a toy target.
//!
//! The selection machinery lives in `selkie-isel` and the machine IR in
//! `selkie-mir`; this crate ties them to a concrete target and exposes
//! the pieces the command-line driver needs.

pub mod driver;
pub mod toy;

pub use driver::{DriverError, load_table, select_source};
pub use toy::{ToySelector, ToyTarget};
