//! A minimal, in-process [`VMBinding`] used only by this crate's own
//! unit tests. Objects are plain heap-allocated header words; roots and
//! scanning are both empty, since the page table, pool allocator and
//! mark engine tests below exercise the collector side only.

use crate::util::constants::TAG_SIZE;
use crate::util::{Address, ObjectReference};
use crate::vm::{
    ActivePlan, Collection, DatatypeLayout, FieldDescType, ObjectModel, RootsWorkFactory,
    Scanning, SlotVisitor, StackSlot, ThreadId, VMBinding,
};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MockTls(pub usize);

impl ThreadId for MockTls {
    fn as_usize(self) -> usize {
        self.0
    }
    fn from_usize(v: usize) -> Self {
        MockTls(v)
    }
}

pub struct MockVM;

pub struct MockObjectModel;

impl ObjectModel<MockVM> for MockObjectModel {
    const HEADER_SIZE: usize = TAG_SIZE;

    fn header_word(obj: ObjectReference) -> &'static AtomicUsize {
        let addr = obj.header_address(Self::HEADER_SIZE);
        unsafe { &*(addr.to_ptr::<AtomicUsize>()) }
    }

    fn layout_of(_obj: ObjectReference) -> &'static DatatypeLayout<MockVM> {
        static EMPTY: DatatypeLayout<MockVM> = DatatypeLayout {
            first_ptr: None,
            fields: FieldDescType::Narrow8(&[]),
            npointers: 0,
            nfields: 0,
        };
        &EMPTY
    }
}

pub struct MockScanning;

impl Scanning<MockVM> for MockScanning {
    fn scan_thread_roots(_tls: MockTls, _out: &mut dyn FnMut(StackSlot)) {}
    fn scan_vm_specific_roots(_factory: &mut dyn RootsWorkFactory<MockVM>) {}
}

pub struct MockActivePlan;

impl ActivePlan<MockVM> for MockActivePlan {
    fn for_each_mutator(_f: &mut dyn FnMut(MockTls)) {}
    fn mutator_count() -> usize {
        1
    }
    fn current_thread() -> MockTls {
        MockTls(0)
    }
}

pub struct MockCollection;

impl Collection<MockVM> for MockCollection {
    fn safepoint_start_gc() -> bool {
        true
    }
    fn safepoint_end_gc() {}
    fn block_for_safepoint() -> Duration {
        Duration::ZERO
    }
    fn set_gc_state(_tls: MockTls, _state: crate::vm::SafepointState) {}
    fn get_gc_state(_tls: MockTls) -> crate::vm::SafepointState {
        crate::vm::SafepointState::Running
    }
    fn throw_out_of_memory(_tls: MockTls) -> ! {
        panic!("mock out of memory")
    }
}

impl VMBinding for MockVM {
    type Ptls = MockTls;
    type ObjectModel = MockObjectModel;
    type Scanning = MockScanning;
    type ActivePlan = MockActivePlan;
    type Collection = MockCollection;
}

/// Helper used by pool/big-object tests: wraps a raw slot visitor
/// closure so call sites don't need to name the trait object type.
pub struct NullVisitor;

impl SlotVisitor for NullVisitor {
    fn visit_slot(&mut self, _parent: ObjectReference, _slot: Address) {}
}
