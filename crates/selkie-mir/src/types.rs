//! Low-level types attached to virtual registers.
//!
//! Generic instructions carry no register classes before selection; the
//! only type information is the bit layout of each virtual register.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bit-level type of a virtual register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LowLevelType {
    /// Plain scalar of the given width: `s32`.
    Scalar(u16),
    /// Pointer into an address space: `p0`.
    Pointer { addr_space: u16, bits: u16 },
    /// Fixed-length vector of scalars: `<4 x s32>`.
    Vector { lanes: u16, scalar_bits: u16 },
}

impl LowLevelType {
    pub const fn scalar(bits: u16) -> Self {
        LowLevelType::Scalar(bits)
    }

    pub const fn pointer(addr_space: u16, bits: u16) -> Self {
        LowLevelType::Pointer { addr_space, bits }
    }

    pub const fn vector(lanes: u16, scalar_bits: u16) -> Self {
        LowLevelType::Vector { lanes, scalar_bits }
    }

    /// Total size in bits.
    pub fn size_in_bits(self) -> u32 {
        match self {
            LowLevelType::Scalar(bits) => bits as u32,
            LowLevelType::Pointer { bits, .. } => bits as u32,
            LowLevelType::Vector { lanes, scalar_bits } => lanes as u32 * scalar_bits as u32,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, LowLevelType::Scalar(_))
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, LowLevelType::Pointer { .. })
    }

    pub fn is_vector(self) -> bool {
        matches!(self, LowLevelType::Vector { .. })
    }
}

impl fmt::Display for LowLevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowLevelType::Scalar(bits) => write!(f, "s{bits}"),
            // The pointer width is a property of the target's data layout,
            // so only the address space is printed.
            LowLevelType::Pointer { addr_space, .. } => write!(f, "p{addr_space}"),
            LowLevelType::Vector { lanes, scalar_bits } => {
                write!(f, "<{lanes} x s{scalar_bits}>")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(LowLevelType::scalar(32).to_string(), "s32");
        assert_eq!(LowLevelType::pointer(0, 64).to_string(), "p0");
        assert_eq!(LowLevelType::vector(4, 16).to_string(), "<4 x s16>");
    }

    #[test]
    fn sizes() {
        assert_eq!(LowLevelType::scalar(1).size_in_bits(), 1);
        assert_eq!(LowLevelType::pointer(1, 64).size_in_bits(), 64);
        assert_eq!(LowLevelType::vector(4, 32).size_in_bits(), 128);
    }

    #[test]
    fn pointer_equality_includes_address_space() {
        assert_ne!(LowLevelType::pointer(0, 64), LowLevelType::pointer(1, 64));
        assert!(LowLevelType::pointer(0, 64).is_pointer());
        assert!(!LowLevelType::scalar(64).is_pointer());
    }
}
