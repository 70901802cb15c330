//! Hardware Abstraction for the sleep timer scheduler.
//!
//! The scheduler never touches a peripheral register directly; it only
//! calls through the [`TimerHal`] trait. This mirrors how `arch::Architecture`
//! already abstracts interrupt masking for the rest of the kernel: the
//! scheduler core is portable, the HAL impl is not.
//!
//! A real board wires a concrete [`TimerHal`] (backed by its free-running
//! counter peripheral) with [`set_hal`] during boot. Tests use [`SimHal`],
//! a software counter that never fires a real interrupt; test code drives
//! the scheduler by calling `process_timer_irq` directly.

/// Event mask bit: the hardware counter wrapped from `u32::MAX` to `0`.
pub const EVENT_OVERFLOW: u8 = 1 << 0;
/// Event mask bit: the hardware counter reached the armed compare value.
pub const EVENT_COMPARE: u8 = 1 << 1;

/// Operations the delta-list scheduler requires of the timer peripheral.
///
/// Implementors must be safe to call from both normal and interrupt context;
/// the scheduler itself provides the critical-section discipline, not the HAL.
pub trait TimerHal: Sync {
    /// Start the counter running from zero at a fixed frequency.
    fn init_timer(&self);

    /// Current free-running counter value.
    fn get_counter(&self) -> u32;

    /// Arm the compare register to fire when the counter reaches `value`.
    fn set_compare(&self, value: u32);

    /// Unmask the given event bits.
    fn enable_int(&self, mask: u8);

    /// Mask the given event bits.
    fn disable_int(&self, mask: u8);

    /// Ticks per second; constant for the lifetime of the program.
    fn get_timer_frequency(&self) -> u32;
}

static mut HAL: Option<&'static dyn TimerHal> = None;

/// Register the board's real timer HAL. Must be called once during boot,
/// before `kern::timer::init()`.
pub fn set_hal(hal: &'static dyn TimerHal) {
    unsafe {
        HAL = Some(hal);
    }
}

#[cfg(not(test))]
pub(super) fn hal() -> &'static dyn TimerHal {
    unsafe { HAL.expect("kern::timer: no TimerHal registered; call kern::timer::hal::set_hal() during board init") }
}

#[cfg(test)]
pub(super) fn hal() -> &'static dyn TimerHal {
    &SIM_HAL
}

/// A deterministic, interrupt-free software HAL used by the test suite.
///
/// `SimHal` never raises a real interrupt; tests advance the simulated
/// counter and call `process_timer_irq` themselves to drive dispatch.
#[cfg(test)]
pub struct SimHal {
    counter: core::sync::atomic::AtomicU32,
    compare: core::sync::atomic::AtomicU32,
    compare_armed: core::sync::atomic::AtomicBool,
    overflow_armed: core::sync::atomic::AtomicBool,
    frequency: core::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl SimHal {
    pub const fn new(frequency: u32) -> Self {
        use core::sync::atomic::{AtomicBool, AtomicU32};
        Self {
            counter: AtomicU32::new(0),
            compare: AtomicU32::new(0),
            compare_armed: AtomicBool::new(false),
            overflow_armed: AtomicBool::new(false),
            frequency: AtomicU32::new(frequency),
        }
    }

    /// Set the simulated counter directly (test setup helper).
    pub fn set_counter(&self, value: u32) {
        self.counter.store(value, core::sync::atomic::Ordering::SeqCst);
    }

    /// Advance the simulated counter by `delta` ticks, wrapping modulo 2^32.
    pub fn advance(&self, delta: u32) -> u32 {
        self.counter
            .fetch_update(
                core::sync::atomic::Ordering::SeqCst,
                core::sync::atomic::Ordering::SeqCst,
                |c| Some(c.wrapping_add(delta)),
            )
            .unwrap();
        self.counter.load(core::sync::atomic::Ordering::SeqCst)
    }

    pub fn is_compare_armed(&self) -> bool {
        self.compare_armed.load(core::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TimerHal for SimHal {
    fn init_timer(&self) {
        self.counter.store(0, core::sync::atomic::Ordering::SeqCst);
    }

    fn get_counter(&self) -> u32 {
        self.counter.load(core::sync::atomic::Ordering::SeqCst)
    }

    fn set_compare(&self, value: u32) {
        self.compare.store(value, core::sync::atomic::Ordering::SeqCst);
    }

    fn enable_int(&self, mask: u8) {
        if mask & EVENT_COMPARE != 0 {
            self.compare_armed.store(true, core::sync::atomic::Ordering::SeqCst);
        }
        if mask & EVENT_OVERFLOW != 0 {
            self.overflow_armed.store(true, core::sync::atomic::Ordering::SeqCst);
        }
    }

    fn disable_int(&self, mask: u8) {
        if mask & EVENT_COMPARE != 0 {
            self.compare_armed.store(false, core::sync::atomic::Ordering::SeqCst);
        }
        if mask & EVENT_OVERFLOW != 0 {
            self.overflow_armed.store(false, core::sync::atomic::Ordering::SeqCst);
        }
    }

    fn get_timer_frequency(&self) -> u32 {
        self.frequency.load(core::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(super) static SIM_HAL: SimHal = SimHal::new(32_768);
