//! Per-target matcher information referenced by match tables.

use std::fmt;

use selkie_mir::{InstBuilder, LowLevelType, MachineFunction, MachineOperand};

/// A set of target features, one bit per feature.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FeatureBitset(u64);

impl FeatureBitset {
    pub const EMPTY: FeatureBitset = FeatureBitset(0);

    /// A set containing the given feature bits.
    ///
    /// # Panics
    ///
    /// Panics if a bit is 64 or larger.
    pub fn from_bits(bits: &[u32]) -> Self {
        bits.iter().fold(Self::EMPTY, |set, bit| set.with(*bit))
    }

    pub fn with(mut self, bit: u32) -> Self {
        self.set(bit);
        self
    }

    pub fn set(&mut self, bit: u32) {
        assert!(bit < 64, "feature bit {bit} out of range");
        self.0 |= 1 << bit;
    }

    pub fn contains(self, bit: u32) -> bool {
        bit < 64 && self.0 & (1 << bit) != 0
    }

    /// Whether every feature in `required` is also in `self`.
    pub fn contains_all(self, required: FeatureBitset) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FeatureBitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries((0..64).filter(|bit| self.contains(*bit)))
            .finish()
    }
}

/// Predicate over the value of a `G_CONSTANT`.
pub type ImmPredicateFn = fn(i64) -> bool;

/// Deferred operand emission captured by a complex pattern. Invoked on an
/// output instruction, it appends the operands it captured.
pub type Renderer = Box<dyn Fn(&mut InstBuilder<'_>)>;

/// Complex-pattern callback. Returns a renderer when `operand` matches.
pub type ComplexMatcherFn<S> = fn(&S, &MachineFunction, &MachineOperand) -> Option<Renderer>;

/// Read-only tables indexed by match-table operands.
///
/// `S` is the selector type handed to complex-pattern callbacks.
pub struct MatcherInfo<S> {
    pub feature_bitsets: Vec<FeatureBitset>,
    pub types: Vec<LowLevelType>,
    pub imm_predicates: Vec<ImmPredicateFn>,
    pub complex_predicates: Vec<ComplexMatcherFn<S>>,
}

impl<S> MatcherInfo<S> {
    pub fn new() -> Self {
        Self {
            feature_bitsets: Vec::new(),
            types: Vec::new(),
            imm_predicates: Vec::new(),
            complex_predicates: Vec::new(),
        }
    }
}

impl<S> Default for MatcherInfo<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for MatcherInfo<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherInfo")
            .field("feature_bitsets", &self.feature_bitsets)
            .field("types", &self.types)
            .field("imm_predicates", &self.imm_predicates.len())
            .field("complex_predicates", &self.complex_predicates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_checks() {
        let available = FeatureBitset::from_bits(&[0, 3]);
        assert!(available.contains_all(FeatureBitset::EMPTY));
        assert!(available.contains_all(FeatureBitset::from_bits(&[3])));
        assert!(!available.contains_all(FeatureBitset::from_bits(&[1, 3])));
        assert!(!FeatureBitset::EMPTY.contains_all(available));
        assert_eq!(format!("{available:?}"), "{0, 3}");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn feature_bits_are_bounded() {
        FeatureBitset::EMPTY.with(64);
    }
}
