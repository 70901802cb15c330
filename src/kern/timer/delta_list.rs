//! Delta list — the scheduler's core data structure.
//!
//! Same intrusive-link idiom as `kern::queue::QueueChain`, specialized to a
//! singly-linked, priority-ordered list keyed by *relative* deadlines instead
//! of a generic doubly-linked FIFO. Each node stores the ticks to wait after
//! its predecessor fires, so ageing the whole list by `Δ` ticks is a single
//! subtraction on the head.

use core::ptr::NonNull;

use super::SleeptimerStatus;

/// Callback invoked when a timer fires.
///
/// Runs in ISR context with interrupts re-enabled (see `kern/timer/mod.rs`).
/// `callback_data` is an opaque payload set by the caller at `start_timer` time.
pub type TimerCallback = fn(&mut TimerHandle, *mut ());

/// Caller-owned timer registration.
///
/// The scheduler never allocates one of these; the caller provides storage
/// (typically `'static`) and must not move or reuse it while it is linked
/// into the delta list.
pub struct TimerHandle {
    pub(super) next: Option<NonNull<TimerHandle>>,
    pub(super) delta: u32,
    pub(super) timeout_periodic: u32,
    pub(super) callback: Option<TimerCallback>,
    pub(super) callback_data: *mut (),
    pub(super) priority: u8,
    pub(super) option_flags: u16,
}

unsafe impl Send for TimerHandle {}

impl TimerHandle {
    /// An unregistered handle. Call `kern::timer::start_timer` (or one of its
    /// siblings) to arm it.
    pub const fn new() -> Self {
        Self {
            next: None,
            delta: 0,
            timeout_periodic: 0,
            callback: None,
            callback_data: core::ptr::null_mut(),
            priority: 0,
            option_flags: 0,
        }
    }

    pub fn option_flags(&self) -> u16 {
        self.option_flags
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Head of the delta list, plus the tick at which `head.delta` was last aged.
///
/// Invariant: if `head` is `Some`, the hardware compare register is armed at
/// `last_delta_update_count + head.delta` (mod 2^32); if `head` is `None`,
/// the compare IRQ source is disabled. Enforcing that pairing is the job of
/// `kern::timer::mod`, not of this module.
pub struct DeltaList {
    pub(super) head: Option<NonNull<TimerHandle>>,
    pub(super) last_delta_update_count: u32,
}

impl DeltaList {
    pub const fn new() -> Self {
        Self {
            head: None,
            last_delta_update_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head_delta(&self) -> Option<u32> {
        unsafe { self.head.map(|h| h.as_ref().delta) }
    }

    /// True if `handle` is currently linked into this list.
    pub fn contains(&self, handle: &TimerHandle) -> bool {
        let target: *const TimerHandle = handle;
        let mut cur = self.head;
        while let Some(node) = cur {
            if node.as_ptr() as *const TimerHandle == target {
                return true;
            }
            cur = unsafe { node.as_ref().next };
        }
        false
    }

    /// Insert `handle`, due in `timeout` ticks from "now" (the moment the
    /// list was last aged). See SPEC_FULL.md §4.1 for the placement rule.
    ///
    /// # Safety
    /// `handle` must outlive its time on the list and must not already be
    /// linked into this or any other list.
    pub unsafe fn insert(&mut self, handle: &mut TimerHandle, timeout: u32) {
        let mut remaining = timeout;
        handle.delta = remaining;

        if self.head.is_none() {
            handle.next = None;
            self.head = NonNull::new(handle as *mut TimerHandle);
            return;
        }

        let mut prev: Option<NonNull<TimerHandle>> = None;
        let mut cur = self.head;

        while let Some(mut node) = cur {
            let node_ref = node.as_mut();
            // Walk past any node due at or before the remainder, so that
            // among equal deadlines the earlier-inserted timer keeps its
            // slot ahead of the newcomer. Priority among a same-tick
            // cluster is resolved at dispatch time, not here.
            if remaining < node_ref.delta {
                break;
            }
            remaining -= node_ref.delta;
            handle.delta = remaining;
            prev = cur;
            cur = node_ref.next;
        }

        let handle_ptr = NonNull::new(handle as *mut TimerHandle);
        handle.next = cur;

        match prev {
            Some(mut p) => p.as_mut().next = handle_ptr,
            None => self.head = handle_ptr,
        }

        if let Some(mut successor) = cur {
            successor.as_mut().delta -= handle.delta;
        }
    }

    /// Remove `handle` from the list. `InvalidState` if it is not linked here.
    ///
    /// # Safety
    /// `handle` must be a handle previously passed to `insert` on this list
    /// (or already known to be absent).
    pub unsafe fn remove(&mut self, handle: &mut TimerHandle) -> Result<(), SleeptimerStatus> {
        let target: *mut TimerHandle = handle;
        let mut prev: Option<NonNull<TimerHandle>> = None;
        let mut cur = self.head;

        while let Some(mut node) = cur {
            if node.as_ptr() == target {
                let next = node.as_mut().next;
                match prev {
                    Some(mut p) => p.as_mut().next = next,
                    None => self.head = next,
                }
                if let Some(mut n) = next {
                    n.as_mut().delta += node.as_ref().delta;
                }
                handle.next = None;
                return Ok(());
            }
            prev = cur;
            cur = node.as_ref().next;
        }

        Err(SleeptimerStatus::InvalidState)
    }

    /// Age the list by the elapsed ticks since `last_delta_update_count`.
    ///
    /// If the head is overdue (its delta is smaller than the elapsed ticks),
    /// clamp it to zero rather than underflow — this is the one place the
    /// scheduler repairs state internally instead of surfacing an error,
    /// since an overdue head is an expected race with dispatch, not a bug.
    pub fn age(&mut self, now: u32) {
        let elapsed = now.wrapping_sub(self.last_delta_update_count);
        match self.head {
            None => self.last_delta_update_count = now,
            Some(mut head) => unsafe {
                let head = head.as_mut();
                if head.delta >= elapsed {
                    head.delta -= elapsed;
                    self.last_delta_update_count = now;
                } else {
                    self.last_delta_update_count = now.wrapping_sub(head.delta);
                    head.delta = 0;
                }
            },
        }
    }
}

impl Default for DeltaList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_h: &mut TimerHandle, _d: *mut ()) {}

    #[test]
    fn test_insert_single() {
        let mut list = DeltaList::new();
        let mut h = TimerHandle::new();
        h.callback = Some(noop);
        unsafe { list.insert(&mut h, 100) };
        assert_eq!(list.head_delta(), Some(100));
        assert!(list.contains(&h));
    }

    #[test]
    fn test_insert_order() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        let mut b = TimerHandle::new();
        unsafe {
            list.insert(&mut a, 100);
            list.insert(&mut b, 40);
        }
        // b fires first; a's delta is now relative to b's fire time.
        assert_eq!(list.head_delta(), Some(40));
        unsafe {
            let head = list.head.unwrap();
            let a_node = head.as_ref().next.unwrap();
            assert_eq!(a_node.as_ref().delta, 60);
        }
    }

    #[test]
    fn test_same_tick_preserves_insertion_order() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        a.priority = 5;
        let mut b = TimerHandle::new();
        b.priority = 1;
        unsafe {
            list.insert(&mut a, 50);
            // Same deadline as a; insert() doesn't look at priority, so b
            // simply takes the next slot regardless of being more urgent.
            // Priority among this same-tick cluster is sorted out later, at
            // dispatch time (see kern::timer::process_timer_irq).
            list.insert(&mut b, 50);
        }
        unsafe {
            let head = list.head.unwrap();
            assert_eq!(head.as_ptr(), &mut a as *mut TimerHandle);
            let tail = head.as_ref().next.unwrap();
            assert_eq!(tail.as_ptr(), &mut b as *mut TimerHandle);
            assert_eq!(tail.as_ref().delta, 0);
        }
    }

    #[test]
    fn test_remove_middle_preserves_downstream_deadline() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        let mut b = TimerHandle::new();
        let mut c = TimerHandle::new();
        unsafe {
            list.insert(&mut a, 10);
            list.insert(&mut b, 20);
            list.insert(&mut c, 30);
        }
        // a=10, b=10 (20-10), c=10 (30-20)
        unsafe {
            list.remove(&mut b).unwrap();
        }
        unsafe {
            let head = list.head.unwrap();
            assert_eq!(head.as_ref().delta, 10); // a unchanged
            let c_node = head.as_ref().next.unwrap();
            assert_eq!(c_node.as_ref().delta, 20); // b's 10 folded back in
        }
        assert!(list.contains(&a));
        assert!(!list.contains(&b));
    }

    #[test]
    fn test_remove_not_present() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        let mut b = TimerHandle::new();
        unsafe {
            list.insert(&mut a, 10);
            assert_eq!(list.remove(&mut b), Err(SleeptimerStatus::InvalidState));
        }
    }

    #[test]
    fn test_age_normal() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        unsafe { list.insert(&mut a, 100) };
        list.age(40);
        assert_eq!(list.head_delta(), Some(60));
        assert_eq!(list.last_delta_update_count, 40);
    }

    #[test]
    fn test_age_overdue_clamps_to_zero() {
        let mut list = DeltaList::new();
        let mut a = TimerHandle::new();
        unsafe { list.insert(&mut a, 10) };
        list.age(100);
        assert_eq!(list.head_delta(), Some(0));
        assert_eq!(list.last_delta_update_count, 90);
    }

    #[test]
    fn test_age_empty_list() {
        let mut list = DeltaList::new();
        list.age(500);
        assert_eq!(list.last_delta_update_count, 500);
    }
}
