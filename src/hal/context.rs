//! Saved kernel-thread register state and the context-switch collaborator.
//!
//! The actual register save/restore is a platform-supplied primitive;
//! `context_switch` below is the interface the scheduling core calls
//! through.

/// Callee-saved registers for a kernel-thread switch (RISC-V ABI shape). A
/// thread's `Context` and its kernel stack together are everything needed
/// to resume it without touching the page table.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,
    pub s0: u64,
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
}

impl Context {
    pub const fn new() -> Context {
        Context {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

extern "C" {
    /// Save the caller's callee-saved registers into `from`, then load
    /// `to`'s and jump to its `ra`. Never touches the page table: in-process
    /// thread switches and dispatcher switches alike rely on that.
    ///
    /// This crate declares the interface and never defines it; a real
    /// platform backs it with hand-written assembly.
    pub fn context_switch(from: *mut Context, to: *mut Context);
}

/// Safe wrapper used by every caller in this crate, so the single `unsafe`
/// a context switch requires is written once.
///
/// # Safety
/// `from` and `to` must be valid, non-aliasing, non-overlapping pointers
/// to contexts owned respectively by the outgoing and incoming kernel
/// threads, and the caller must hold the scheduler lock with a nested-cli
/// depth of exactly 1.
pub unsafe fn switch(from: *mut Context, to: *mut Context) {
    context_switch(from, to);
}
