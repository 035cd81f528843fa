//! Weak-reference subsystem (component J): clear unreachable targets
//! after marking and before sweeping, then compact the per-thread list.

use crate::util::ObjectReference;

/// A single weak reference. `value` is rewritten to `ObjectReference::NULL`
/// (the collector's "nothing" sentinel) once its target is found
/// unreachable; the binding is responsible for translating `NULL` into
/// its own host-level nil value when reading `wr.value`.
pub struct WeakRef {
    pub value: ObjectReference,
}

/// Per-thread list of weak references created via `new_weakref`.
pub struct WeakRefList {
    refs: Vec<WeakRef>,
}

impl WeakRefList {
    pub fn new() -> Self {
        WeakRefList { refs: Vec::new() }
    }

    pub fn new_weakref(&mut self, target: ObjectReference) -> usize {
        self.refs.push(WeakRef { value: target });
        self.refs.len() - 1
    }

    pub fn get(&self, idx: usize) -> ObjectReference {
        self.refs[idx].value
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// `clear_weak_refs`: called after marking, before sweeping. Any
    /// entry whose target did not get marked this cycle is cleared to
    /// `NULL`.
    pub fn clear_weak_refs(&mut self, is_marked: impl Fn(ObjectReference) -> bool) {
        for wr in self.refs.iter_mut() {
            if !wr.value.is_null() && !is_marked(wr.value) {
                wr.value = ObjectReference::NULL;
            }
        }
    }

    /// `sweep_weak_refs`: compact the list in place by partition,
    /// swapping cleared (now-dead) entries to the tail and truncating.
    /// Live weak-ref *slots* themselves are never reclaimed mid-list
    /// (only the dead ones, identified here as those cleared to `NULL`
    /// that the binding has also released its handle to) -- this
    /// collector-side compaction removes entries the binding marks via
    /// `drop_handle`.
    pub fn sweep_weak_refs(&mut self, drop_handle: impl Fn(usize) -> bool) {
        let mut write = 0;
        for read in 0..self.refs.len() {
            if drop_handle(read) {
                continue;
            }
            self.refs.swap(write, read);
            write += 1;
        }
        self.refs.truncate(write);
    }
}

impl Default for WeakRefList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    fn obj(n: usize) -> ObjectReference {
        ObjectReference::from_raw_address(Address::from_usize(n * 16 + 16))
    }

    #[test]
    fn clear_weak_refs_nils_unmarked_targets() {
        let mut list = WeakRefList::new();
        let a = list.new_weakref(obj(1));
        let b = list.new_weakref(obj(2));
        list.clear_weak_refs(|o| o == obj(2));
        assert!(list.get(a).is_null());
        assert_eq!(list.get(b), obj(2));
    }

    #[test]
    fn sweep_weak_refs_compacts_dropped_entries() {
        let mut list = WeakRefList::new();
        list.new_weakref(obj(1));
        list.new_weakref(obj(2));
        list.new_weakref(obj(3));
        list.sweep_weak_refs(|i| i == 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0), obj(1));
        assert_eq!(list.get(1), obj(3));
    }
}
