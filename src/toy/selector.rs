//! Instruction selector for the toy target.

use selkie_isel::utils::constrain_operand_reg_to_class;
use selkie_isel::{FeatureBitset, InstructionSelector, MatchTable, MatcherInfo};
use selkie_mir::{InstRef, MachineFunction, RegClassId, Register, TargetInfo, VReg, generic};
use tracing::trace;

use super::table::{toy_matcher_info, toy_table};
use super::target::{FEATURE_HAS_MUL, ToyTarget};

/// Selects toy instructions with the generated match table. `COPY` is
/// handled by hand: it only needs register classes.
pub struct ToySelector {
    toy: ToyTarget,
    table: MatchTable,
    info: MatcherInfo<ToySelector>,
    features: FeatureBitset,
}

impl ToySelector {
    /// A selector using the built-in table, with every feature available.
    pub fn new(toy: ToyTarget) -> Self {
        let table = toy_table(&toy);
        Self {
            toy,
            table,
            info: toy_matcher_info(),
            features: FeatureBitset::from_bits(&[FEATURE_HAS_MUL]),
        }
    }

    /// Replace the match table, e.g. with one loaded from a file.
    pub fn with_table(mut self, table: MatchTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_features(mut self, features: FeatureBitset) -> Self {
        self.features = features;
        self
    }

    pub fn toy(&self) -> &ToyTarget {
        &self.toy
    }

    pub fn table(&self) -> &MatchTable {
        &self.table
    }

    fn select_copy(&self, func: &mut MachineFunction, inst: InstRef) -> bool {
        for op_idx in 0..2 {
            let Some(reg) = func.operand(inst, op_idx).as_reg().copied() else {
                return false;
            };
            let Register::Virt(v) = reg.reg else {
                continue;
            };
            // A sub-register read is constrained by whoever created it.
            if reg.sub_reg != 0 {
                continue;
            }
            let other = func.operand(inst, 1 - op_idx).reg();
            let Some(rc) = self.copy_class(func, v, other) else {
                trace!(%inst, %v, "no register class for copy operand");
                return false;
            };
            constrain_operand_reg_to_class(func, self.oracle(), inst, op_idx, rc);
        }
        true
    }

    /// Class for a virtual register of a `COPY`: its own class, else one
    /// wide enough for its type, else whatever the other side lives in.
    fn copy_class(
        &self,
        func: &MachineFunction,
        v: VReg,
        other: Option<Register>,
    ) -> Option<RegClassId> {
        let data = func.vreg(v);
        if let Some(rc) = data.class {
            return Some(rc);
        }
        if let Some(ty) = data.ty {
            return self.class_for_size(ty.size_in_bits());
        }
        match other? {
            Register::Phys(p) => self.toy.info.min_class_of(p),
            Register::Virt(o) => {
                let data = func.vreg(o);
                data.class
                    .or_else(|| data.ty.and_then(|ty| self.class_for_size(ty.size_in_bits())))
            }
        }
    }

    fn class_for_size(&self, bits: u32) -> Option<RegClassId> {
        match bits {
            1..=32 => Some(self.toy.gpr32),
            33..=64 => Some(self.toy.gpr64),
            _ => None,
        }
    }
}

impl InstructionSelector for ToySelector {
    fn target(&self) -> &TargetInfo {
        &self.toy.info
    }

    fn available_features(&self, _func: &MachineFunction) -> FeatureBitset {
        self.features
    }

    fn select(&self, func: &mut MachineFunction, inst: InstRef) -> bool {
        if func.opcode(inst) == generic::COPY {
            return self.select_copy(func, inst);
        }
        self.select_with_table(func, &self.table, &self.info, inst)
    }
}
