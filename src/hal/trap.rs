//! Interrupt-disable nesting, the tick counter, and the trap-return
//! collaborator.
//!
//! Trap and interrupt dispatch themselves live on a real platform; what's
//! here is the nested-cli bookkeeping the scheduler lock depends on.

use crate::hal::cpu;
use core::sync::atomic::{AtomicU64, Ordering};

/// Whether interrupts are currently enabled on this hart.
///
/// A real platform HAL reads the actual status register (`sstatus`/
/// `rflags`). Single-hart test builds of this crate track it with a plain
/// flag instead.
static INTERRUPTS_ENABLED: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(true);

pub fn intr_get() -> bool {
    INTERRUPTS_ENABLED.load(Ordering::Relaxed)
}

pub fn intr_on() {
    INTERRUPTS_ENABLED.store(true, Ordering::Relaxed);
}

pub fn intr_off() {
    INTERRUPTS_ENABLED.store(false, Ordering::Relaxed);
}

/// Push one layer of interrupt-disable nesting, remembering the
/// pre-existing enabled state the first time nesting goes from 0 to 1.
pub fn push_intr_off() {
    let enabled_before = intr_get();
    intr_off();

    let c = unsafe { cpu::current() };
    if c.interrupt_disable_layers == 0 {
        c.previous_interrupts_enabled = enabled_before;
    }
    c.interrupt_disable_layers += 1;
}

/// Pop one layer of interrupt-disable nesting, restoring the remembered
/// pre-existing enabled state once nesting returns to 0.
///
/// A `push_intr_off`/`pop_intr_off` mismatch that would go negative, or
/// popping while interruptible, is an invariant violation.
pub fn pop_intr_off() {
    let c = unsafe { cpu::current() };
    if intr_get() {
        crate::error::invariant_violation!("pop_intr_off: interruptible");
    }
    if c.interrupt_disable_layers == 0 {
        crate::error::invariant_violation!("pop_intr_off: not held");
    }
    c.interrupt_disable_layers -= 1;
    if c.interrupt_disable_layers == 0 && c.previous_interrupts_enabled {
        intr_on();
    }
}

/// RAII interrupt-disable guard, for code that just needs a short critical
/// section without a full lock.
#[derive(Default)]
pub struct InterruptBlocker;

impl InterruptBlocker {
    pub fn new() -> InterruptBlocker {
        push_intr_off();
        InterruptBlocker
    }
}

impl Drop for InterruptBlocker {
    fn drop(&mut self) {
        pop_intr_off();
    }
}

/// Monotonic tick counter driven by the timer interrupt. Ticks are what
/// `elapsed`/`start` in the per-process scheduler-info record and the
/// MLFQ/stride budgets measure.
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Called by the timer interrupt handler once per tick.
pub fn advance_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

extern "C" {
    /// Returns from the trap handler into user mode. A newly created
    /// thread's context is primed to resume in a bootstrap that releases
    /// the scheduler lock and falls into this.
    pub fn trap_return_stub() -> !;
}
