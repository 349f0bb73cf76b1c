//! Per-CPU state and enumeration.
//!
//! Boot-time CPU enumeration and APIC/hart-id lookup are collaborators a
//! real platform HAL supplies; `cpuid()` here is a thin stand-in for that
//! (reading `tp` on RISC-V, the APIC id on x86_64).

use crate::hal::context::Context;
use crate::param::NCPU;

/// Per-CPU scheduler state. Each hart touches only its own `Cpu`, so unlike
/// the process table this needs no lock: the dispatcher loop runs
/// independently per CPU.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Cpu {
    /// Process-table slot currently assigned to this CPU, if any.
    pub proc: Option<usize>,
    /// `context_switch` resumes here to re-enter the dispatcher loop.
    pub context: Context,
    /// Depth of interrupt-disable nesting.
    pub interrupt_disable_layers: u32,
    /// Were interrupts enabled before the outermost `push_intr_off`?
    pub previous_interrupts_enabled: bool,
}

impl Cpu {
    pub const fn new() -> Cpu {
        Cpu {
            proc: None,
            context: Context::new(),
            interrupt_disable_layers: 0,
            previous_interrupts_enabled: false,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

pub static mut CPUS: [Cpu; NCPU] = [Cpu::new(); NCPU];

/// Return this hart's APIC/hart id. Must be called with interrupts
/// disabled, to avoid racing with a process migrating CPUs mid-read.
///
/// This crate has no real platform to boot on; `cpuid` is a stub a platform
/// HAL backs with the real register read.
pub fn cpuid() -> usize {
    // Placeholder for the real tp/APIC-id read; keeps test builds single-CPU.
    0
}

/// # Safety
/// Caller must have interrupts disabled so the returned reference cannot
/// be invalidated by a migration to another CPU mid-use.
pub unsafe fn current() -> &'static mut Cpu {
    let id = cpuid();
    &mut *core::ptr::addr_of_mut!(CPUS[id])
}
