//! Firmware entry point.
//!
//! A real board provides its own [`TimerHal`](mach_r::kern::timer::hal::TimerHal)
//! backed by the MCU's free-running counter peripheral and registers it with
//! `kern::timer::hal::set_hal` before calling `mach_r::init()`. This binary
//! stands in a software-driven placeholder so the firmware has something to
//! boot and blink against on hardware that hasn't been wired up yet.

#![no_std]
#![no_main]

extern crate mach_r;

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};

use mach_r::arch::{Architecture, ArchImpl};
use mach_r::kern::timer::hal::{TimerHal, EVENT_COMPARE, EVENT_OVERFLOW};

/// Placeholder HAL: a free-running counter driven by the idle loop instead
/// of a real peripheral. Replace with a board-specific `TimerHal` before
/// shipping.
struct PlaceholderHal {
    counter: AtomicU32,
    compare: AtomicU32,
    compare_armed: core::sync::atomic::AtomicBool,
}

static PLACEHOLDER_HAL: PlaceholderHal = PlaceholderHal {
    counter: AtomicU32::new(0),
    compare: AtomicU32::new(0),
    compare_armed: core::sync::atomic::AtomicBool::new(false),
};

impl TimerHal for PlaceholderHal {
    fn init_timer(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    fn get_counter(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    fn set_compare(&self, value: u32) {
        self.compare.store(value, Ordering::SeqCst);
    }

    fn enable_int(&self, mask: u8) {
        if mask & EVENT_COMPARE != 0 {
            self.compare_armed.store(true, Ordering::SeqCst);
        }
    }

    fn disable_int(&self, mask: u8) {
        if mask & EVENT_COMPARE != 0 {
            self.compare_armed.store(false, Ordering::SeqCst);
        }
    }

    fn get_timer_frequency(&self) -> u32 {
        32_768
    }
}

#[cfg(target_arch = "aarch64")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    kernel_main()
}

#[cfg(target_arch = "x86_64")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    kernel_main()
}

fn kernel_main() -> ! {
    mach_r::kern::timer::hal::set_hal(&PLACEHOLDER_HAL);

    ArchImpl::init();
    mach_r::init();

    mach_r::println!("\n=== mach_r timer service ===");
    mach_r::println!("frequency: {} Hz", mach_r::kern::timer::get_timer_frequency());

    // Idle loop: advance the placeholder counter and poll for fired timers,
    // standing in for a real board's hardware IRQ firing process_timer_irq.
    loop {
        let prev = PLACEHOLDER_HAL.counter.fetch_add(1, Ordering::SeqCst);
        if prev == u32::MAX {
            mach_r::kern::timer::process_timer_irq(EVENT_OVERFLOW);
        }
        if PLACEHOLDER_HAL.compare_armed.load(Ordering::SeqCst)
            && PLACEHOLDER_HAL.get_counter() == PLACEHOLDER_HAL.compare.load(Ordering::SeqCst)
        {
            mach_r::kern::timer::process_timer_irq(EVENT_COMPARE);
        }
        core::hint::spin_loop();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    mach_r::panic::kernel_panic(info);
}
