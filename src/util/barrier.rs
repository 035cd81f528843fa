//! Write barrier and remembered set (component E).
//!
//! When mutator code overwrites a field of an `Old` object with a
//! reference to a young object, it must call [`write_barrier`] so the
//! parent gets re-scanned on the next collection instead of silently
//! keeping a young object alive only through an untracked edge.

use crate::util::{Address, ObjectReference};
use crate::vm::object_model::{DynamicField, FieldDescType, GcState};
use crate::vm::{ObjectModel, VMBinding};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Two remset buffers per thread, alternated each cycle instead of
/// being freed and reallocated (spec §9, "Remset alternation").
pub struct RemSet {
    buffers: [Vec<ObjectReference>; 2],
    current: u8,
}

impl RemSet {
    pub fn new() -> Self {
        RemSet {
            buffers: [Vec::new(), Vec::new()],
            current: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, obj: ObjectReference) {
        self.buffers[self.current as usize].push(obj);
    }

    pub fn current(&self) -> &[ObjectReference] {
        &self.buffers[self.current as usize]
    }

    /// Swap the active buffer with the last cycle's, clearing the new
    /// active one. Returns the buffer that was active before the swap
    /// (the spec's `last_remset`), for premark to walk.
    pub fn swap(&mut self) -> &[ObjectReference] {
        let just_retired = self.current as usize;
        self.current = 1 - self.current;
        self.buffers[self.current as usize].clear();
        &self.buffers[just_retired]
    }

    pub fn clear_both(&mut self) {
        self.buffers[0].clear();
        self.buffers[1].clear();
    }
}

impl Default for RemSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread binding list; tracked separately from `RemSet` because
/// bindings are not first-class objects (spec §4.E).
pub struct RemBindings {
    entries: Vec<Address>,
}

impl RemBindings {
    pub fn new() -> Self {
        RemBindings { entries: Vec::new() }
    }

    pub fn push(&mut self, binding: Address) {
        self.entries.push(binding);
    }

    pub fn entries(&self) -> &[Address] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for RemBindings {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread barrier state: the alternating remset and the binding
/// list. Conservatively tracks how many pointer fields were touched
/// since the object's ownership began (`remset_nptr`).
pub struct BarrierState {
    pub remset: RemSet,
    pub rem_bindings: RemBindings,
    remset_nptr: AtomicUsize,
}

impl BarrierState {
    pub fn new() -> Self {
        BarrierState {
            remset: RemSet::new(),
            rem_bindings: RemBindings::new(),
            remset_nptr: AtomicUsize::new(0),
        }
    }
}

impl Default for BarrierState {
    fn default() -> Self {
        Self::new()
    }
}

/// Write barrier entry point: called after `parent`'s field has just
/// been overwritten with a reference to `child`. If `parent` is `Old`
/// and `child` is not, demote `parent`'s bits to `Marked` and remember
/// it so the next mark phase re-scans it.
pub fn write_barrier<VM: VMBinding>(state: &mut BarrierState, parent: ObjectReference, child: ObjectReference) {
    if child.is_null() {
        return;
    }
    let parent_state = VM::ObjectModel::gc_state(parent);
    let child_state = VM::ObjectModel::gc_state(child);
    if parent_state.is_old() && !child_state.is_old() {
        VM::ObjectModel::store_state(parent, GcState::Marked);
        state.remset.push(parent);
        state.remset_nptr.fetch_add(1, Ordering::Relaxed);
    }
}

/// `queue_multiroot`: inspect `parent`'s type layout's first pointer and
/// remaining pointer slots; if any referenced value is young, re-enroll
/// `parent` in the remset (a conservative "is this still worth
/// tracking" check run after the initial barrier hit).
pub fn queue_multiroot<VM: VMBinding>(state: &mut BarrierState, parent: ObjectReference) {
    let layout = VM::ObjectModel::layout_of(parent);
    let base = parent.to_raw_address();
    let mut any_young = false;
    let mut visit = |offset: usize| {
        let slot = base + offset;
        let child = ObjectReference::from_raw_address(unsafe { slot.load::<Address>() });
        if !child.is_null() && !VM::ObjectModel::gc_state(child).is_old() {
            any_young = true;
        }
    };

    if let Some(first) = layout.first_ptr {
        visit(first as usize);
    }
    match layout.fields {
        FieldDescType::Narrow8(offs) => offs.iter().for_each(|&o| visit(o as usize)),
        FieldDescType::Narrow16(offs) => offs.iter().for_each(|&o| visit(o as usize)),
        FieldDescType::Narrow32(offs) => offs.iter().for_each(|&o| visit(o as usize)),
        FieldDescType::Dynamic(d) => {
            any_young |= d.mark(&mut |_| {}, parent);
        }
    }

    if any_young {
        state.remset.push(parent);
    }
}

/// `queue_binding`: flip the binding's GC bits and push it into
/// `rem_bindings`. Bindings carry their GC state the same two bits as
/// objects, addressed directly since they aren't first-class values.
pub fn queue_binding(state: &mut BarrierState, binding: Address, header: &'static AtomicUsize) {
    loop {
        let bits = header.load(Ordering::Relaxed);
        let cur = GcState::from_bits(bits);
        let new = GcState::marked(cur.is_old());
        let type_bits = bits & !GcState::STATE_MASK;
        if header
            .compare_exchange_weak(bits, type_bits | new as usize, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
    state.rem_bindings.push(binding);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remset_alternates_buffers() {
        let mut rs = RemSet::new();
        rs.push(ObjectReference::from_raw_address(Address::from_usize(8)));
        assert_eq!(rs.current().len(), 1);
        let retired = rs.swap();
        assert_eq!(retired.len(), 1);
        assert_eq!(rs.current().len(), 0);
    }

    #[test]
    fn clear_both_empties_everything() {
        let mut rs = RemSet::new();
        rs.push(ObjectReference::from_raw_address(Address::from_usize(8)));
        rs.swap();
        rs.push(ObjectReference::from_raw_address(Address::from_usize(16)));
        rs.clear_both();
        assert_eq!(rs.current().len(), 0);
    }
}
