//! Mark engine (component G): the reachability closure over live
//! objects. Dispatch is driven entirely by the type-layout descriptor
//! the binding supplies through [`ObjectModel::layout_of`] -- the only
//! type-system dependency the collector has (see the external
//! interfaces section this is grounded on). Host-specific root kinds
//! (stacks, modules, tasks) are enumerated as roots by
//! [`crate::vm::Scanning`] rather than dispatched here.

use crate::util::constants::PROMOTE_AGE;
use crate::util::heap::{PageAllocator, PageMetadata};
use crate::util::queue::MarkStack;
use crate::util::ObjectReference;
use crate::vm::object_model::{FieldDescType, GcState};
use crate::vm::{ObjectModel, VMBinding};
use std::sync::atomic::Ordering;

/// Atomically mark `obj` and, if this call performed the transition,
/// push it onto `queue` for later scanning. This is the single
/// claim-and-enqueue choke point invariant 9 (mark idempotence) relies
/// on: exactly one concurrent caller ever sees `true`.
#[inline]
pub fn try_claim_and_push<VM: VMBinding>(
    queue: &mut MarkStack,
    obj: ObjectReference,
    old: bool,
    mark_reset_age: bool,
) {
    if obj.is_null() {
        return;
    }
    let mode = if old { GcState::Old } else { GcState::Clean };
    if VM::ObjectModel::try_setmark_tag(obj, mode, mark_reset_age) {
        queue.push(obj);
    }
}

/// Read one pointer-sized slot at `offset` bytes into `parent` and feed
/// it through [`try_claim_and_push`].
#[inline]
fn visit_offset<VM: VMBinding>(queue: &mut MarkStack, parent: ObjectReference, offset: usize) {
    let slot = parent.to_raw_address() + offset;
    let child = ObjectReference::from_raw_address(unsafe { slot.load::<crate::util::Address>() });
    try_claim_and_push::<VM>(queue, child, false, false);
}

/// `mark_outrefs`: push every outgoing reference from `parent` onto the
/// queue. The generic-datatype case (`fielddesc_type` 0-2) walks the
/// narrow offset table; case 3 defers entirely to the type's own
/// `mark` callback.
pub fn mark_outrefs<VM: VMBinding>(queue: &mut MarkStack, parent: ObjectReference) {
    let layout = VM::ObjectModel::layout_of(parent);

    if let Some(first) = layout.first_ptr {
        visit_offset::<VM>(queue, parent, first as usize);
    }

    match layout.fields {
        FieldDescType::Narrow8(offsets) => {
            for &o in offsets {
                visit_offset::<VM>(queue, parent, o as usize);
            }
        }
        FieldDescType::Narrow16(offsets) => {
            for &o in offsets {
                visit_offset::<VM>(queue, parent, o as usize);
            }
        }
        FieldDescType::Narrow32(offsets) => {
            for &o in offsets {
                visit_offset::<VM>(queue, parent, o as usize);
            }
        }
        FieldDescType::Dynamic(dyn_field) => {
            let mut visitor = |child: ObjectReference| {
                try_claim_and_push::<VM>(queue, child, false, false);
            };
            dyn_field.mark(&mut visitor, parent);
        }
    }
}

/// Update per-page bookkeeping after `obj` transitioned to `mode`
/// during this mark phase: `has_marked`, and `nold` when the object was
/// freshly promoted. Big objects route to the mark cache instead (see
/// `util::finalizer`/driver integration); this function only applies to
/// pool-allocated cells.
pub fn mark_setmark<VM: VMBinding>(
    pages: &PageAllocator<VM>,
    obj: ObjectReference,
    mode: GcState,
    mark_reset_age: bool,
) {
    let addr = obj.to_raw_address();
    let Some(page): Option<&PageMetadata<VM>> = pages.page_metadata(addr) else {
        return; // big object; not page-tracked
    };
    page.has_marked.store(true, Ordering::Relaxed);
    if mode == GcState::OldMarked {
        page.nold.fetch_add(1, Ordering::Relaxed);
    }
    if mark_reset_age {
        let idx = page.cell_index(addr);
        page.age_bitmap.clear(idx);
    }
}

/// Drain `queue` until empty, calling `mark_outrefs` for every popped
/// object. Single-threaded for now; the queue abstraction is already
/// shaped so a future multi-marker could steal from it (spec §9).
pub fn drain_mark_queue<VM: VMBinding>(queue: &mut MarkStack) {
    while let Some(obj) = queue.pop() {
        mark_outrefs::<VM>(queue, obj);
    }
}

/// Decide the promoted-or-not `GcState` for an object entering the
/// mark phase, given its current age. An object whose age has already
/// reached [`PROMOTE_AGE`] is marked old; otherwise it stays young.
pub fn mark_mode_for_age(age: u8) -> GcState {
    if age >= PROMOTE_AGE {
        GcState::marked(true)
    } else {
        GcState::marked(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_mode_promotes_at_threshold() {
        assert_eq!(mark_mode_for_age(0), GcState::Marked);
        assert_eq!(mark_mode_for_age(PROMOTE_AGE), GcState::OldMarked);
    }
}
