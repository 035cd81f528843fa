//! The object header: GC state bits plus a pointer to type layout
//! metadata, and the dynamic-dispatch description of where the
//! pointers live inside an object.

use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use std::sync::atomic::Ordering;

/// The two low bits of the header word. Never moves once written;
/// marking flips bits with an atomic exchange on the header word.
///
/// Invariant: `MARKED` bit is set for both `Marked` and `OldMarked`;
/// `OLD` bit is set for both `Old` and `OldMarked`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum GcState {
    Clean = 0b00,
    Marked = 0b01,
    Old = 0b10,
    OldMarked = 0b11,
}

impl GcState {
    pub const MARK_BIT: usize = 0b01;
    pub const OLD_BIT: usize = 0b10;
    pub const STATE_MASK: usize = 0b11;

    #[inline(always)]
    pub fn from_bits(bits: usize) -> Self {
        match bits & Self::STATE_MASK {
            0b00 => GcState::Clean,
            0b01 => GcState::Marked,
            0b10 => GcState::Old,
            0b11 => GcState::OldMarked,
            _ => unreachable!(),
        }
    }

    #[inline(always)]
    pub fn is_marked(self) -> bool {
        (self as usize) & Self::MARK_BIT != 0
    }

    #[inline(always)]
    pub fn is_old(self) -> bool {
        (self as usize) & Self::OLD_BIT != 0
    }

    /// `OldMarked` if `old`, else `Marked`.
    #[inline(always)]
    pub fn marked(old: bool) -> Self {
        if old {
            GcState::OldMarked
        } else {
            GcState::Marked
        }
    }

    /// `Old` if currently marked-old, else `Clean`: the state a cell
    /// reverts to after a sweep drops its mark bit.
    #[inline(always)]
    pub fn demoted(self) -> Self {
        if self.is_old() {
            GcState::Old
        } else {
            GcState::Clean
        }
    }
}

/// Discriminator for how a type's pointer fields are described. Mirrors
/// a tagged union: variant 3 carries dynamic mark/sweep callbacks rather
/// than a static offset table.
#[derive(Copy, Clone, Debug)]
pub enum FieldDescType<VM: VMBinding> {
    /// Offsets fit in `u8`.
    Narrow8(&'static [u8]),
    /// Offsets fit in `u16`.
    Narrow16(&'static [u16]),
    /// Offsets fit in `u32`.
    Narrow32(&'static [u32]),
    /// The type supplies its own mark/sweep behavior.
    Dynamic(&'static dyn DynamicField<VM>),
}

/// Callback pair for `fielddesc_type == 3`: a type that knows how to
/// mark and sweep its own internals (e.g. malloc-backed or reshaped
/// arrays). `mark` returns whether the scan discovered any reference to
/// a young object (used to decide whether to re-enroll in the remset).
pub trait DynamicField<VM: VMBinding>: Send + Sync {
    fn mark(&self, visitor: &mut dyn FnMut(ObjectReference), obj: ObjectReference) -> bool;
    fn sweep(&self, obj: ObjectReference);
}

/// Static description of an object's pointer layout, handed to the mark
/// engine so it can walk outgoing references without knowing the host
/// type system.
pub struct DatatypeLayout<VM: VMBinding> {
    /// Offset of the first pointer field, if the layout starts with one.
    pub first_ptr: Option<u32>,
    pub fields: FieldDescType<VM>,
    pub npointers: u32,
    pub nfields: u32,
}

/// The header-word and type-layout contract the mark/sweep engine needs
/// from the host's object representation.
pub trait ObjectModel<VM: VMBinding>: Sized {
    /// Size in bytes of the header word prepended to every object.
    const HEADER_SIZE: usize = crate::util::constants::TAG_SIZE;

    /// Read the raw header word for `obj`.
    fn header_word(obj: ObjectReference) -> &'static std::sync::atomic::AtomicUsize;

    #[inline(always)]
    fn load_bits(obj: ObjectReference, order: Ordering) -> usize {
        Self::header_word(obj).load(order)
    }

    #[inline(always)]
    fn gc_state(obj: ObjectReference) -> GcState {
        GcState::from_bits(Self::load_bits(obj, Ordering::Acquire))
    }

    /// Pointer to the object's type descriptor, masked out of the header.
    fn type_descriptor(obj: ObjectReference) -> Address {
        Address::from_usize(Self::load_bits(obj, Ordering::Acquire) & !GcState::STATE_MASK)
    }

    /// Look up the pointer layout for `obj`'s type.
    fn layout_of(obj: ObjectReference) -> &'static DatatypeLayout<VM>;

    /// Atomically transition the header from `{Clean, Old}` to
    /// `mode | old-bit`. Returns whether *this* call performed the
    /// transition (mark idempotence, invariant 9 of the spec).
    ///
    /// If `mark_reset_age` is set, the object is forced back to
    /// `Marked` regardless of a prior `Old` state (used while
    /// re-walking the finalizer-marked list so objects don't inherit
    /// old-age across a cycle where they were not otherwise reachable).
    fn try_setmark_tag(obj: ObjectReference, mode: GcState, mark_reset_age: bool) -> bool {
        let word = Self::header_word(obj);
        loop {
            let old_bits = word.load(Ordering::Relaxed);
            let old_state = GcState::from_bits(old_bits);
            if old_state.is_marked() && !mark_reset_age {
                return false;
            }
            if old_state.is_marked() && mark_reset_age && old_state == GcState::Marked {
                // Already plain-Marked; resetting age is a no-op.
                return false;
            }
            let new_state = if mark_reset_age {
                GcState::Marked
            } else {
                GcState::marked(old_state.is_old() || mode.is_old())
            };
            let type_bits = old_bits & !GcState::STATE_MASK;
            let new_bits = type_bits | new_state as usize;
            match word.compare_exchange_weak(
                old_bits,
                new_bits,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Used by the write barrier to demote `Old -> Marked` and by sweep
    /// to demote `OldMarked -> Old` / clear the mark bit entirely.
    fn store_state(obj: ObjectReference, state: GcState) {
        let word = Self::header_word(obj);
        loop {
            let old_bits = word.load(Ordering::Relaxed);
            let type_bits = old_bits & !GcState::STATE_MASK;
            let new_bits = type_bits | state as usize;
            if word
                .compare_exchange_weak(old_bits, new_bits, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}
