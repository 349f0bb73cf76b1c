//! MLFQ + stride scheduling core with a per-process thread pool.
//!
//! A `no_std` staticlib with an `extern "C"` boundary to a platform that
//! supplies `print`/`panic`/the real context switch, and a single
//! `#[no_mangle] extern "C" fn` entry point. The scheduler in `proc` is an
//! MLFQ/stride dispatcher (`proc::dispatcher`) sitting behind that
//! boundary.
//!
//! `#[cfg(test)]` builds link against `std` instead of freestanding, so the
//! whole scheduling core can be exercised on the host without real
//! hardware.

#![cfg_attr(not(test), no_std)]
#![allow(clippy::missing_safety_doc)]

extern crate alloc;
extern crate core;

pub mod console;
pub mod error;
pub mod hal;
pub mod logging;
pub mod param;
pub mod proc;
pub mod sync;
pub mod syscall;

#[cfg(not(test))]
use core::ffi::{c_char, CStr};

#[cfg(not(test))]
extern "C" {
    fn print(message: *const c_char);
    fn panic(panic_message: *const c_char) -> !;
}

/// Kernel entry point, called once per hart after the platform's own boot
/// assembly has set up a stack and page table. Brings up logging, then
/// drops straight into the dispatcher loop forever: this crate has no
/// shell or init program of its own to exec.
#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn rust_main() -> ! {
    logging::init(log::LevelFilter::Info);
    unsafe {
        print(
            CStr::from_bytes_with_nul(b"scheduling core up\n\0")
                .unwrap()
                .as_ptr(),
        );
    }
    loop {
        proc::dispatcher::run_once();
    }
}

#[cfg(not(test))]
#[panic_handler]
unsafe fn panic_wrapper(_panic_info: &core::panic::PanicInfo) -> ! {
    panic(
        CStr::from_bytes_with_nul(b"panic in scheduling core\0")
            .unwrap_or_default()
            .as_ptr(),
    )
}
