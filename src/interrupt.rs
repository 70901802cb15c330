//! Interrupt routing for the timer service.
//!
//! Provides interrupt descriptor table (IDT) management and IRQ dispatch.
//! The only IRQ this crate cares about is the timer peripheral's; it is
//! routed straight into `kern::timer::process_timer_irq`.

use core::mem::size_of;
use spin::Mutex;
use crate::println;

/// Number of IDT entries (Intel standard).
pub const IDT_ENTRIES: usize = 256;

/// Hardware interrupt numbers (remapped from default).
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Irq {
    Timer = 32,
}

/// Interrupt context saved on stack.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct InterruptContext {
    pub gs: u64,
    pub fs: u64,
    pub es: u64,
    pub ds: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub int_no: u64,
    pub err_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub user_rsp: u64,
    pub ss: u64,
}

/// IDT entry structure (x86_64).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IdtEntry {
    base_low: u16,
    selector: u16,
    ist: u8,
    flags: u8,
    base_mid: u16,
    base_high: u32,
    reserved: u32,
}

impl IdtEntry {
    pub const fn new() -> Self {
        IdtEntry {
            base_low: 0,
            selector: 0,
            ist: 0,
            flags: 0,
            base_mid: 0,
            base_high: 0,
            reserved: 0,
        }
    }

    pub fn set_handler(&mut self, handler: usize, selector: u16, flags: u8) {
        self.base_low = (handler & 0xFFFF) as u16;
        self.base_mid = ((handler >> 16) & 0xFFFF) as u16;
        self.base_high = ((handler >> 32) & 0xFFFFFFFF) as u32;
        self.selector = selector;
        self.flags = flags;
        self.ist = 0;
        self.reserved = 0;
    }
}

/// IDT pointer structure.
#[repr(C, packed)]
pub struct IdtPointer {
    limit: u16,
    base: u64,
}

/// Interrupt Descriptor Table.
pub struct Idt {
    entries: [IdtEntry; IDT_ENTRIES],
}

impl Idt {
    pub const fn new() -> Self {
        Idt {
            entries: [IdtEntry::new(); IDT_ENTRIES],
        }
    }

    pub fn set_handler(&mut self, index: u8, handler: fn()) {
        let flags = 0x8E; // Present, DPL=0, interrupt gate.
        let selector = 0x08; // Kernel code segment.
        self.entries[index as usize].set_handler(handler as usize, selector, flags);
    }

    /// # Safety
    /// Must only be called once, during `init`, on a table that stays alive
    /// for the rest of the program.
    pub unsafe fn load(&self) {
        let _ptr = IdtPointer {
            limit: (size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
            base: self.entries.as_ptr() as u64,
        };
        // Board-specific: asm!("lidt [{}]", in(reg) &ptr);
    }
}

static IDT: Mutex<Idt> = Mutex::new(Idt::new());

/// Interrupt handler type.
pub type InterruptHandler = fn(&InterruptContext);

static HANDLERS: Mutex<[Option<InterruptHandler>; IDT_ENTRIES]> = Mutex::new([None; IDT_ENTRIES]);

/// Common interrupt handler called by all ISRs.
pub extern "C" fn interrupt_handler(ctx: &InterruptContext) {
    let handlers = HANDLERS.lock();
    if let Some(handler) = handlers[ctx.int_no as usize] {
        handler(ctx);
    } else {
        default_handler(ctx);
    }

    if ctx.int_no >= 32 && ctx.int_no < 48 {
        unsafe {
            end_of_interrupt(ctx.int_no as u8);
        }
    }
}

fn default_handler(ctx: &InterruptContext) {
    println!("Unhandled interrupt: {:#x}", ctx.int_no);
    if ctx.int_no < 32 {
        println!("Exception occurred! Halting...");
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Register an interrupt handler.
pub fn register_handler(interrupt: u8, handler: InterruptHandler) {
    let mut handlers = HANDLERS.lock();
    handlers[interrupt as usize] = Some(handler);
}

/// Timer interrupt handler — the only event source this crate dispatches.
///
/// Reads the HAL's pending-event mask is the HAL's own job; here we simply
/// forward both event kinds and let `process_timer_irq` sort out which fired.
pub fn timer_handler(_ctx: &InterruptContext) {
    crate::kern::timer::process_timer_irq(
        crate::kern::timer::hal::EVENT_OVERFLOW | crate::kern::timer::hal::EVENT_COMPARE,
    );
}

mod pic {
    pub const PIC1_COMMAND: u16 = 0x20;
    pub const PIC1_DATA: u16 = 0x21;
    pub const PIC2_COMMAND: u16 = 0xA0;
    pub const PIC2_DATA: u16 = 0xA1;
    pub const PIC_EOI: u8 = 0x20;
}

/// Send End of Interrupt to the PIC.
///
/// # Safety
/// Must only be called from interrupt context after a hardware IRQ.
pub unsafe fn end_of_interrupt(irq: u8) {
    if irq >= 40 {
        // Board-specific: asm!("out 0xA0, al", in("al") pic::PIC_EOI);
    }
    // Board-specific: asm!("out 0x20, al", in("al") pic::PIC_EOI);
}

/// Remap IRQs to 32-47, away from CPU exceptions.
///
/// # Safety
/// Must run once, before any IRQ is unmasked.
pub unsafe fn init_pic() {
    // Board-specific PIC remap sequence.
}

/// Initialize interrupt handling and wire the timer IRQ.
pub fn init() {
    unsafe {
        init_pic();

        let idt = IDT.lock();
        register_handler(Irq::Timer as u8, timer_handler);
        idt.load();

        enable_interrupts();
    }
}

/// # Safety
/// Must only be called once interrupt handlers are registered.
pub unsafe fn enable_interrupts() {
    // Board-specific: asm!("sti");
}

/// # Safety
/// Disables all maskable interrupts on the calling core.
pub unsafe fn disable_interrupts() {
    // Board-specific: asm!("cli");
}

pub fn interrupts_enabled() -> bool {
    let flags: u64 = 0x200; // Board-specific: read via asm!("pushfq; pop {}", out(reg) flags);
    (flags & 0x200) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idt_entry() {
        let mut entry = IdtEntry::new();
        entry.set_handler(0xDEADBEEF, 0x08, 0x8E);
    }

    #[test]
    fn test_interrupt_registration() {
        let test_handler: InterruptHandler = |_ctx| {};
        register_handler(32, test_handler);
        let handlers = HANDLERS.lock();
        assert!(handlers[32].is_some());
    }
}
