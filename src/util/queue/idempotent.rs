//! Idempotent work-stealing deque (component L): the alternative
//! contract where multiple concurrent steal attempts may observe and
//! return the *same* element -- cheaper than Chase-Lev when the caller
//! can tolerate (and dedup) repeated steals, e.g. a racy helper pool
//! that will simply re-mark an already-marked object harmlessly.

use std::sync::atomic::{AtomicU64, AtomicPtr, Ordering};

/// `{tail, tag}` packed into one word so it can be read/written
/// atomically: low 32 bits are `tail`, high 32 bits are a version tag
/// bumped on every push, so a stale CAS from a steal that raced a
/// resize can't succeed against a coincidentally-equal `tail`.
#[derive(Copy, Clone)]
struct Anchor(u64);

impl Anchor {
    fn new(tail: u32, tag: u32) -> Self {
        Anchor(((tag as u64) << 32) | tail as u64)
    }
    fn tail(self) -> u32 {
        self.0 as u32
    }
    fn tag(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

struct Buffer<T: Copy> {
    cap: usize,
    data: Box<[std::cell::UnsafeCell<Option<T>>]>,
}

unsafe impl<T: Copy> Sync for Buffer<T> {}

impl<T: Copy> Buffer<T> {
    fn new(cap: usize) -> Self {
        Buffer {
            cap,
            data: (0..cap).map(|_| std::cell::UnsafeCell::new(None)).collect(),
        }
    }
}

/// `T` must be `Copy`: elements are read by value under a CAS race, so
/// there is no way to hand out an owned, non-Copy value safely here.
pub struct IdempotentDeque<T: Copy> {
    anchor: AtomicU64,
    buffer: AtomicPtr<Buffer<T>>,
}

impl<T: Copy> IdempotentDeque<T> {
    pub fn new(initial_capacity: usize) -> Self {
        let buf = Box::into_raw(Box::new(Buffer::new(initial_capacity.max(1))));
        IdempotentDeque {
            anchor: AtomicU64::new(Anchor::new(0, 0).0),
            buffer: AtomicPtr::new(buf),
        }
    }

    fn buffer(&self) -> &Buffer<T> {
        unsafe { &*self.buffer.load(Ordering::Acquire) }
    }

    /// Owner-only. Resizes (copy, publish new buffer, leak the old one
    /// for a cycle since a concurrent thief may still be reading it) on
    /// overflow.
    pub fn push(&self, elt: T) {
        let anchor = Anchor(self.anchor.load(Ordering::Relaxed));
        let buf = self.buffer();
        if anchor.tail() as usize == buf.cap {
            let new_cap = buf.cap * 2;
            let new_buf = Box::new(Buffer::<T>::new(new_cap));
            for i in 0..buf.cap {
                unsafe { *new_buf.data[i].get() = *buf.data[i].get() };
            }
            let new_ptr = Box::into_raw(new_buf);
            self.buffer.store(new_ptr, Ordering::Release);
            // Deliberately leak the old buffer: a concurrent `steal`
            // may still hold a reference to it from before the swap.
        }
        let buf = self.buffer();
        unsafe { *buf.data[anchor.tail() as usize].get() = Some(elt) };
        let new_anchor = Anchor::new(anchor.tail() + 1, anchor.tag().wrapping_add(1));
        self.anchor.store(new_anchor.0, Ordering::Release);
    }

    /// Owner-only.
    pub fn pop(&self) -> Option<T> {
        let anchor = Anchor(self.anchor.load(Ordering::Relaxed));
        if anchor.tail() == 0 {
            return None;
        }
        let buf = self.buffer();
        let idx = anchor.tail() - 1;
        let value = unsafe { *buf.data[idx as usize].get() };
        let new_anchor = Anchor::new(idx, anchor.tag());
        self.anchor.store(new_anchor.0, Ordering::Release);
        value
    }

    /// Thief entry point. On a lost race the steal has no effect and
    /// returns `None`; the caller is expected to retry. On success, the
    /// same element may also be returned by a racing `pop` or another
    /// `steal` -- callers must tolerate duplicates.
    pub fn steal(&self) -> Option<T> {
        let anchor = Anchor(self.anchor.load(Ordering::Acquire));
        if anchor.tail() == 0 {
            return None;
        }
        let buf = self.buffer();
        let value = unsafe { *buf.data[(anchor.tail() - 1) as usize].get() };
        let new_anchor = Anchor::new(anchor.tail() - 1, anchor.tag());
        if self
            .anchor
            .compare_exchange(anchor.0, new_anchor.0, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        value
    }
}

impl<T: Copy> Drop for IdempotentDeque<T> {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.buffer.load(Ordering::Relaxed))) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let d: IdempotentDeque<u32> = IdempotentDeque::new(4);
        d.push(1);
        d.push(2);
        assert_eq!(d.pop(), Some(2));
        assert_eq!(d.pop(), Some(1));
        assert_eq!(d.pop(), None);
    }

    #[test]
    fn push_past_initial_capacity_resizes() {
        let d: IdempotentDeque<u32> = IdempotentDeque::new(2);
        for i in 0..100 {
            d.push(i);
        }
        let mut count = 0;
        while d.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 100);
    }

    #[test]
    fn steal_on_empty_returns_none() {
        let d: IdempotentDeque<u32> = IdempotentDeque::new(4);
        assert_eq!(d.steal(), None);
    }
}
