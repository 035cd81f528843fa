//! Dispatching outgoing references out of an object, and root
//! enumeration. The mark engine (`util::mark`) drives these; the
//! binding only has to answer "what does this object point at".

use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// Called by the binding, and by the generic array/module scanners in
/// `util::mark`, once per discovered outgoing edge.
pub trait SlotVisitor {
    fn visit_slot(&mut self, parent: ObjectReference, slot: Address);
}

impl<F: FnMut(ObjectReference, Address)> SlotVisitor for F {
    fn visit_slot(&mut self, parent: ObjectReference, slot: Address) {
        (self)(parent, slot)
    }
}

/// Where roots get pushed during the premark/root-enumeration phase.
pub trait RootsWorkFactory<VM: VMBinding> {
    fn push_root(&mut self, obj: ObjectReference);
}

/// A single walked stack slot: its address, and whether the slot holds
/// a pointer *to* a reference (indirect) rather than the reference
/// itself. See the spec's "task stack walking with copied stacks".
pub struct StackSlot {
    pub addr: Address,
    pub indirect: bool,
}

/// Binding-supplied scanning behavior: root enumeration (stacks,
/// globals, thread-local roots) and fallback scanning for any object
/// kind the generic dispatch in `util::mark` doesn't already know how
/// to walk (the `root_scanner` callback in the spec).
pub trait Scanning<VM: VMBinding> {
    /// Enumerate all roots reachable from a thread's stack, as
    /// `(slot_addr, slot_is_indirect)` pairs, translating any address
    /// that falls in a copied-stack's `[lb, ub)` range by `offset`
    /// before it is returned.
    fn scan_thread_roots(tls: VM::Ptls, out: &mut dyn FnMut(StackSlot));

    /// Extra, VM-specific global roots beyond the generic ones the
    /// driver already enqueues (module init order, sentinel types...).
    fn scan_vm_specific_roots(factory: &mut dyn RootsWorkFactory<VM>);
}
