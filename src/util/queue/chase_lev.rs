//! Chase-Lev work-stealing deque (component L). Library-pure: it does
//! not touch GC state and is memory-safe under concurrent
//! push/pop (owner only) + steal (many thieves).
//!
//! Pushes by the owner linearize before successful pops/steals; a
//! successful steal returns a value that was pushed; no value is ever
//! returned twice across pop+steal.

use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

struct Buffer<T> {
    cap: usize,
    slots: Box<[AtomicPtr<T>]>,
}

impl<T> Buffer<T> {
    fn new(cap: usize) -> Self {
        debug_assert!(cap.is_power_of_two());
        Buffer {
            cap,
            slots: (0..cap).map(|_| AtomicPtr::new(std::ptr::null_mut())).collect(),
        }
    }

    #[inline]
    fn put(&self, idx: isize, value: T) {
        let slot = idx as usize & (self.cap - 1);
        self.slots[slot].store(Box::into_raw(Box::new(value)), Ordering::Relaxed);
    }

    #[inline]
    unsafe fn take(&self, idx: isize) -> T {
        let slot = idx as usize & (self.cap - 1);
        let ptr = self.slots[slot].load(Ordering::Relaxed);
        *Box::from_raw(ptr)
    }
}

/// Owner-push/owner-pop, thief-steal deque with a power-of-two circular
/// buffer. Does not currently grow the buffer (the spec's resize path
/// is covered by the idempotent deque variant); `push` fails when full.
pub struct ChaseLevDeque<T> {
    top: AtomicIsize,
    bottom: AtomicIsize,
    buffer: Buffer<T>,
}

impl<T> ChaseLevDeque<T> {
    pub fn new(capacity: usize) -> Self {
        ChaseLevDeque {
            top: AtomicIsize::new(0),
            bottom: AtomicIsize::new(0),
            buffer: Buffer::new(capacity.next_power_of_two()),
        }
    }

    /// Owner-only. Returns `Err(value)` if the deque is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        if b - t > self.buffer.cap as isize - 1 {
            return Err(value);
        }
        self.buffer.put(b, value);
        // Release fence: the stored value must be visible before
        // `bottom` advances and a thief becomes able to race for it.
        std::sync::atomic::fence(Ordering::Release);
        self.bottom.store(b + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Owner-only.
    pub fn pop(&self) -> Option<T> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        self.bottom.store(b, Ordering::Relaxed);
        // Full fence between publishing the tentative new `bottom` and
        // reading `top`, so a concurrent steal can't both observe the
        // old bottom and win the race for the same slot.
        std::sync::atomic::fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);
        if t > b {
            self.bottom.store(b + 1, Ordering::Relaxed);
            return None;
        }
        let value = unsafe { self.buffer.take(b) };
        if t == b {
            if self
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                self.bottom.store(b + 1, Ordering::Relaxed);
                return None;
            }
            self.bottom.store(b + 1, Ordering::Relaxed);
        }
        Some(value)
    }

    /// Thief entry point; safe to call concurrently from many threads.
    pub fn steal(&self) -> Option<T> {
        let t = self.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);
        if t >= b {
            return None;
        }
        let value = unsafe { self.buffer.take(t) };
        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.top.load(Ordering::Acquire) >= self.bottom.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn owner_push_pop_round_trips() {
        let d: ChaseLevDeque<u64> = ChaseLevDeque::new(16);
        for i in 0..10 {
            d.push(i).unwrap();
        }
        let mut out = vec![];
        while let Some(v) = d.pop() {
            out.push(v);
        }
        out.sort();
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_steal_and_pop_partition_pushed_values() {
        let d = Arc::new(ChaseLevDeque::<u64>::new(4096));
        const N: u64 = 2000;
        for i in 0..N {
            d.push(i).unwrap();
        }

        let collected = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut thieves = vec![];
        for _ in 0..4 {
            let d = Arc::clone(&d);
            let collected = Arc::clone(&collected);
            thieves.push(thread::spawn(move || {
                let mut local = vec![];
                while let Some(v) = d.steal() {
                    local.push(v);
                }
                collected.lock().unwrap().extend(local);
            }));
        }
        while let Some(v) = d.pop() {
            collected.lock().unwrap().push(v);
        }
        for t in thieves {
            t.join().unwrap();
        }

        let all = collected.lock().unwrap();
        let set: HashSet<_> = all.iter().copied().collect();
        assert_eq!(set.len(), all.len(), "no value returned twice");
        assert_eq!(set.len() as u64, N, "every pushed value accounted for");
    }
}
