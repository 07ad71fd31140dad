//! Per-interpretation state: matched-instruction slots, renderer captures
//! and output instructions.
//!
//! All slot vectors grow strictly by appending. An id that is neither an
//! existing slot nor the next free one is a broken table and panics.

use selkie_mir::{InstRef, MachineFunction, Opcode};
use smallvec::SmallVec;
use tracing::trace;

use crate::info::Renderer;

/// Matched instructions and renderer captures for one interpretation.
pub struct MatcherState {
    mis: SmallVec<[InstRef; 4]>,
    renderers: Vec<Option<Renderer>>,
}

impl MatcherState {
    /// Fresh state with `root` bound to slot 0.
    pub fn new(root: InstRef) -> Self {
        let mut mis = SmallVec::new();
        mis.push(root);
        Self {
            mis,
            renderers: Vec::new(),
        }
    }

    pub fn root(&self) -> InstRef {
        self.mis[0]
    }

    pub fn num_insns(&self) -> usize {
        self.mis.len()
    }

    /// Bind slot `id` to `inst`.
    ///
    /// Appends when `id` is the next free slot and rebinds an existing
    /// non-root slot, which happens when an alternative re-records a slot
    /// after a rewind.
    ///
    /// # Panics
    ///
    /// Panics when `id` is 0 or skips past the next free slot.
    pub fn bind_insn(&mut self, id: usize, inst: InstRef) {
        assert!(id != 0, "slot 0 is the root and cannot be rebound");
        assert!(
            id <= self.mis.len(),
            "instruction slot {id} bound out of order: only {} slot(s) exist",
            self.mis.len()
        );
        if id == self.mis.len() {
            self.mis.push(inst);
        } else {
            self.mis[id] = inst;
        }
    }

    /// The instruction bound to slot `id`.
    ///
    /// # Panics
    ///
    /// Panics if the slot was never bound.
    pub fn insn(&self, id: usize) -> InstRef {
        *self.mis.get(id).unwrap_or_else(|| {
            panic!(
                "instruction slot {id} used before it was bound ({} bound)",
                self.mis.len()
            )
        })
    }

    /// Store a renderer capture, which may be `None` for a failed match.
    ///
    /// # Panics
    ///
    /// Panics when `id` skips past the next free renderer slot.
    pub fn set_renderer(&mut self, id: usize, renderer: Option<Renderer>) {
        assert!(
            id <= self.renderers.len(),
            "renderer slot {id} set out of order: only {} slot(s) exist",
            self.renderers.len()
        );
        if id == self.renderers.len() {
            self.renderers.push(renderer);
        } else {
            self.renderers[id] = renderer;
        }
    }

    pub fn has_renderer(&self, id: usize) -> bool {
        matches!(self.renderers.get(id), Some(Some(_)))
    }

    /// The renderer captured in slot `id`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is missing or holds a failed capture.
    pub fn renderer(&self, id: usize) -> &Renderer {
        match self.renderers.get(id) {
            Some(Some(renderer)) => renderer,
            Some(None) => panic!("renderer slot {id} holds a failed capture"),
            None => panic!("renderer slot {id} used before it was set"),
        }
    }
}

/// How an output instruction came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// Freshly built in front of the root.
    Built,
    /// A matched instruction whose opcode was rewritten in place.
    Mutated { original: Opcode },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputInst {
    pub inst: InstRef,
    pub kind: OutputKind,
}

/// Output instructions of one interpretation, indexed by output id.
#[derive(Clone, Debug, Default)]
pub struct NewInstVector {
    insts: SmallVec<[OutputInst; 4]>,
}

impl NewInstVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register output `id`.
    ///
    /// # Panics
    ///
    /// Panics unless `id` is the next free output slot.
    pub fn push(&mut self, id: usize, inst: InstRef, kind: OutputKind) {
        assert_eq!(
            id,
            self.insts.len(),
            "output instruction {id} created out of order"
        );
        self.insts.push(OutputInst { inst, kind });
    }

    /// The instruction of output `id`.
    ///
    /// # Panics
    ///
    /// Panics if the output was never created.
    pub fn get(&self, id: usize) -> InstRef {
        match self.insts.get(id) {
            Some(out) => out.inst,
            None => panic!(
                "output instruction {id} used before it was created ({} created)",
                self.insts.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputInst> {
        self.insts.iter()
    }

    /// Instructions of all outputs, in id order.
    pub fn insts(&self) -> impl Iterator<Item = InstRef> + '_ {
        self.insts.iter().map(|out| out.inst)
    }

    /// Erase every freshly built output and forget all outputs.
    ///
    /// In-place mutations are kept.
    pub fn rollback(&mut self, func: &mut MachineFunction) {
        self.rollback_to(func, 0);
    }

    /// Erase the freshly built outputs with an id of at least `mark` and
    /// forget every output from `mark` on, so the next output id is `mark`.
    ///
    /// In-place mutations are kept.
    pub fn rollback_to(&mut self, func: &mut MachineFunction, mark: usize) {
        if mark >= self.insts.len() {
            return;
        }
        for out in self.insts.drain(mark..) {
            if out.kind == OutputKind::Built && !func.is_erased(out.inst) {
                trace!(inst = %out.inst, "rolling back speculative instruction");
                func.erase_inst(out.inst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_mir::{EntityRef, InstBuilder, generic};

    #[test]
    fn slots_append_and_rebind() {
        let mut state = MatcherState::new(InstRef::new(0));
        state.bind_insn(1, InstRef::new(5));
        state.bind_insn(2, InstRef::new(6));
        state.bind_insn(1, InstRef::new(7));
        assert_eq!(state.insn(1), InstRef::new(7));
        assert_eq!(state.insn(2), InstRef::new(6));
        assert_eq!(state.root(), InstRef::new(0));
    }

    #[test]
    #[should_panic(expected = "bound out of order")]
    fn binding_past_next_slot_panics() {
        let mut state = MatcherState::new(InstRef::new(0));
        state.bind_insn(2, InstRef::new(1));
    }

    #[test]
    #[should_panic(expected = "cannot be rebound")]
    fn rebinding_root_panics() {
        let mut state = MatcherState::new(InstRef::new(0));
        state.bind_insn(0, InstRef::new(1));
    }

    #[test]
    fn failed_capture_is_stored() {
        let mut state = MatcherState::new(InstRef::new(0));
        state.set_renderer(0, None);
        assert!(!state.has_renderer(0));
        state.set_renderer(
            0,
            Some(Box::new(|b: &mut InstBuilder<'_>| {
                b.add_imm(1);
            })),
        );
        assert!(state.has_renderer(0));
    }

    #[test]
    #[should_panic(expected = "created out of order")]
    fn outputs_must_be_created_in_order() {
        let mut out = NewInstVector::new();
        out.push(1, InstRef::new(0), OutputKind::Built);
    }

    #[test]
    fn rollback_erases_only_built_outputs() {
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let root = func.create_inst(generic::G_ADD);
        func.append_inst(bb, root);
        let built = func.create_inst(generic::COPY);
        func.insert_before(root, built);

        let mut out = NewInstVector::new();
        out.push(0, built, OutputKind::Built);
        out.push(
            1,
            root,
            OutputKind::Mutated {
                original: generic::G_ADD,
            },
        );
        out.rollback(&mut func);

        assert!(out.is_empty());
        assert!(func.is_erased(built));
        assert!(!func.is_erased(root));
        assert_eq!(func.block_insts(bb), &[root]);
    }

    #[test]
    fn rollback_to_keeps_outputs_below_mark() {
        let mut func = MachineFunction::new("f");
        let bb = func.create_block();
        let root = func.create_inst(generic::G_ADD);
        func.append_inst(bb, root);
        let kept = func.create_inst(generic::COPY);
        func.insert_before(root, kept);
        let dropped = func.create_inst(generic::COPY);
        func.insert_before(root, dropped);

        let mut out = NewInstVector::new();
        out.push(0, kept, OutputKind::Built);
        out.push(1, dropped, OutputKind::Built);
        out.rollback_to(&mut func, 1);

        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0), kept);
        assert!(func.is_erased(dropped));
        assert_eq!(func.block_insts(bb), &[kept, root]);

        // The freed id can be reused.
        out.push(1, dropped, OutputKind::Built);
        assert_eq!(out.len(), 2);
    }
}
