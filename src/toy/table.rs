//! The toy target's match table and the matcher information it refers to.
//!
//! The table is a flat sequence of `GIM_Try` blocks, one per pattern,
//! ordered so that more specific patterns of an opcode come first. The
//! last entry rejects whatever no pattern accepted.

use selkie_isel::utils::constant_vreg_value;
use selkie_isel::{
    ComplexMatcherFn, FeatureBitset, ImmPredicateFn, MatchTable, MatchTableBuilder, MatcherInfo,
    Renderer,
};
use selkie_mir::{InstBuilder, LowLevelType, MachineFunction, MachineOperand, Register, generic};

use super::selector::ToySelector;
use super::target::{FEATURE_HAS_MUL, INTRINSIC_RDCYCLE, ToyTarget};

// Indices into `MatcherInfo::types`.
pub const TYPE_S32: i64 = 0;
pub const TYPE_S64: i64 = 1;
pub const TYPE_P0: i64 = 2;

// Indices into `MatcherInfo::imm_predicates`.
pub const PRED_SIMM12: i64 = 0;

// Indices into `MatcherInfo::complex_predicates`.
pub const COMPLEX_ADDR: i64 = 0;

// Indices into `MatcherInfo::feature_bitsets`.
pub const FEATURES_NONE: i64 = 0;
pub const FEATURES_MUL: i64 = 1;

/// Matcher information for [`toy_table`].
pub fn toy_matcher_info() -> MatcherInfo<ToySelector> {
    MatcherInfo {
        feature_bitsets: vec![
            FeatureBitset::EMPTY,
            FeatureBitset::from_bits(&[FEATURE_HAS_MUL]),
        ],
        types: vec![
            LowLevelType::scalar(32),
            LowLevelType::scalar(64),
            LowLevelType::pointer(0, 64),
        ],
        imm_predicates: vec![is_simm12 as ImmPredicateFn],
        complex_predicates: vec![select_addr as ComplexMatcherFn<ToySelector>],
    }
}

fn is_simm12(value: i64) -> bool {
    (-2048..2048).contains(&value)
}

/// `addr`: a base register plus an unsigned word offset.
///
/// A pointer computed by `G_GEP` from a constant multiple of four below
/// 16 KiB folds into the offset; anything else is used with offset 0.
fn select_addr(
    _selector: &ToySelector,
    func: &MachineFunction,
    op: &MachineOperand,
) -> Option<Renderer> {
    let ptr = op.reg()?;
    let (base, offset) = folded_gep(func, ptr).unwrap_or((ptr, 0));
    Some(render_base_offset(base, offset))
}

fn folded_gep(func: &MachineFunction, ptr: Register) -> Option<(Register, i64)> {
    let def = func.vreg_def(ptr.as_virtual()?)?;
    if func.opcode(def) != generic::G_GEP {
        return None;
    }
    let base = func.operand(def, 1).reg()?;
    let offset = constant_vreg_value(func, func.operand(def, 2).reg()?.as_virtual()?)?;
    if offset % 4 != 0 {
        return None;
    }
    let words = offset / 4;
    (0..4096).contains(&words).then_some((base, words))
}

fn render_base_offset(base: Register, offset: i64) -> Renderer {
    Box::new(move |b: &mut InstBuilder<'_>| {
        b.add_reg(base).add_imm(offset);
    })
}

/// Build the toy target's match table.
pub fn toy_table(toy: &ToyTarget) -> MatchTable {
    let mut b = MatchTableBuilder::new();

    // G_ADD x, 1 -> INC x
    let next = b.label("add_imm1");
    b.try_block(next)
        .check_opcode(0, generic::G_ADD)
        .check_type(0, 0, TYPE_S32)
        .record_insn(1, 0, 2)
        .check_opcode(1, generic::G_CONSTANT)
        .check_literal_int(1, 1, 1)
        .check_is_safe_to_fold(1)
        .build_mi(0, toy.inc)
        .copy(0, 0, 0)
        .copy(0, 0, 1)
        .constrain_selected_inst_operands(0)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_ADD x, simm12 -> ADDri x, imm
    let next = b.label("add_simm12");
    b.try_block(next)
        .check_opcode(0, generic::G_ADD)
        .check_type(0, 0, TYPE_S32)
        .record_insn(1, 0, 2)
        .check_opcode(1, generic::G_CONSTANT)
        .check_imm_predicate(1, PRED_SIMM12)
        .check_is_safe_to_fold(1)
        .build_mi(0, toy.addri)
        .copy(0, 0, 0)
        .copy(0, 0, 1)
        .copy_constant_as_simm(0, 1)
        .constrain_selected_inst_operands(0)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_ADD x, y -> ADDrr x, y
    let next = b.label("add_reg");
    b.try_block(next)
        .check_opcode(0, generic::G_ADD)
        .check_type(0, 0, TYPE_S32)
        .check_reg_bank_for_class(0, 0, toy.gpr32)
        .mutate_opcode(0, 0, toy.addrr)
        .constrain_selected_inst_operands(0)
        .done();
    b.bind(next);

    // G_MUL x, y -> MUL x, y, with the multiplier only
    let next = b.label("mul");
    b.try_block(next)
        .check_features(FEATURES_MUL)
        .check_opcode(0, generic::G_MUL)
        .check_type(0, 0, TYPE_S32)
        .mutate_opcode(0, 0, toy.mul)
        .constrain_selected_inst_operands(0)
        .done();
    b.bind(next);

    // G_CONSTANT 0 -> COPY $wzr
    let next = b.label("zero");
    b.try_block(next)
        .check_opcode(0, generic::G_CONSTANT)
        .check_type(0, 0, TYPE_S32)
        .check_literal_int(0, 1, 0)
        .build_mi(0, generic::COPY)
        .copy(0, 0, 0)
        .add_register(0, toy.wzr)
        .constrain_operand_rc(0, 0, toy.gpr32)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_CONSTANT -> MOVi / MOVXi
    for (label, ty, opcode) in [
        ("const32", TYPE_S32, toy.movi),
        ("const64", TYPE_S64, toy.movxi),
    ] {
        let next = b.label(label);
        b.try_block(next)
            .check_opcode(0, generic::G_CONSTANT)
            .check_type(0, 0, ty)
            .build_mi(0, opcode)
            .copy(0, 0, 0)
            .copy_constant_as_simm(0, 0)
            .constrain_selected_inst_operands(0)
            .erase_from_parent(0)
            .done();
        b.bind(next);
    }

    // G_LOAD addr -> LDRWui base, offset
    let next = b.label("load");
    b.try_block(next)
        .check_opcode(0, generic::G_LOAD)
        .check_type(0, 0, TYPE_S32)
        .check_type(0, 1, TYPE_P0)
        .check_complex_pattern(0, 1, 0, COMPLEX_ADDR)
        .build_mi(0, toy.ldrwui)
        .copy(0, 0, 0)
        .complex_renderer(0, 0)
        .merge_mem_operands(0, &[0])
        .constrain_selected_inst_operands(0)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_STORE val, addr -> STRWui val, base, offset
    let next = b.label("store");
    b.try_block(next)
        .check_opcode(0, generic::G_STORE)
        .check_type(0, 0, TYPE_S32)
        .check_type(0, 1, TYPE_P0)
        .check_complex_pattern(0, 1, 0, COMPLEX_ADDR)
        .build_mi(0, toy.strwui)
        .copy(0, 0, 0)
        .complex_renderer(0, 0)
        .merge_mem_operands(0, &[0])
        .constrain_selected_inst_operands(0)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_GEP ptr, off -> ADDXrr ptr, off
    let next = b.label("gep");
    b.try_block(next)
        .check_opcode(0, generic::G_GEP)
        .check_type(0, 0, TYPE_P0)
        .mutate_opcode(0, 0, toy.addxrr)
        .constrain_selected_inst_operands(0)
        .done();
    b.bind(next);

    // G_TRUNC s64 -> s32: COPY of the low half
    let next = b.label("trunc");
    b.try_block(next)
        .check_opcode(0, generic::G_TRUNC)
        .check_type(0, 0, TYPE_S32)
        .check_type(0, 1, TYPE_S64)
        .build_mi(0, generic::COPY)
        .copy(0, 0, 0)
        .copy_sub_reg(0, 0, 1, toy.sub_32)
        .constrain_operand_rc(0, 0, toy.gpr32)
        .constrain_operand_rc(0, 1, toy.gpr64)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_BR %bb -> B %bb
    let next = b.label("br");
    b.try_block(next)
        .check_opcode(0, generic::G_BR)
        .check_is_mbb(0, 0)
        .mutate_opcode(0, 0, toy.b)
        .done();
    b.bind(next);

    // rdcycle -> RDCYCLE, clobbering the flags
    let next = b.label("rdcycle");
    b.try_block(next)
        .check_opcode(0, generic::G_INTRINSIC_W_SIDE_EFFECTS)
        .check_num_operands(0, 2)
        .check_intrinsic_id(0, 1, i64::from(INTRINSIC_RDCYCLE))
        .check_type(0, 0, TYPE_S64)
        .build_mi(0, toy.rdcycle)
        .copy(0, 0, 0)
        .add_implicit_def(0, toy.cc)
        .constrain_selected_inst_operands(0)
        .erase_from_parent(0)
        .done();
    b.bind(next);

    // G_IMPLICIT_DEF -> IMPLICIT_DEF, one register class per width
    let next = b.label("undef");
    let wide = b.label("undef_wide");
    let pointer = b.label("undef_pointer");
    b.try_block(next)
        .check_opcode(0, generic::G_IMPLICIT_DEF)
        .try_block(wide)
        .check_type(0, 0, TYPE_S32)
        .mutate_opcode(0, 0, generic::IMPLICIT_DEF)
        .constrain_operand_rc(0, 0, toy.gpr32)
        .done();
    b.bind(wide)
        .try_block(pointer)
        .check_type(0, 0, TYPE_S64)
        .mutate_opcode(0, 0, generic::IMPLICIT_DEF)
        .constrain_operand_rc(0, 0, toy.gpr64)
        .done();
    b.bind(pointer)
        .check_type(0, 0, TYPE_P0)
        .mutate_opcode(0, 0, generic::IMPLICIT_DEF)
        .constrain_operand_rc(0, 0, toy.gpr64)
        .done();
    b.bind(next).reject();

    b.finish().expect("toy match table labels are all bound once")
}
