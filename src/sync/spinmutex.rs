//! A value-carrying spin lock: the single owner of every scheduler data
//! structure, handing out short-lived mutable borrows under a lock guard.
//!
//! Most callers just take the RAII guard. The scheduler's suspend points
//! (`proc::sync::sleep`, the in-process thread switch, the dispatcher's
//! context switch) need to hold the lock across a boundary where control
//! literally moves to a different saved stack and back, so `into_locked`/
//! `from_locked` below let a guard be forgotten on one side of that switch
//! and reconstructed on the other without ever actually releasing the lock.

use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::hal::trap::{pop_intr_off, push_intr_off};

pub struct SpinMutex<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> SpinMutex<T> {
        SpinMutex {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(value),
        }
    }

    fn acquire(&self) {
        push_intr_off();
        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    /// # Safety
    /// Must be paired with exactly one matching release of this lock.
    unsafe fn release(&self) {
        self.locked.store(false, Ordering::Release);
        pop_intr_off();
    }

    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.acquire();
        SpinMutexGuard { mutex: self }
    }

    /// Consume a guard without releasing the lock, returning a raw pointer
    /// to the guarded value. Used only across a real context switch, where
    /// the lock is logically still held by the scheduler but no single
    /// Rust stack frame spans both sides of the switch.
    ///
    /// # Safety
    /// The caller must eventually call `from_locked` (or `release`) on this
    /// same mutex before any other thread observes it as unlocked.
    pub unsafe fn into_locked(guard: SpinMutexGuard<'_, T>) -> *mut T {
        let ptr = guard.mutex.inner.get();
        core::mem::forget(guard);
        ptr
    }

    /// Reconstruct a guard for a lock that is already held (see
    /// `into_locked`), for use on the resuming side of a context switch.
    ///
    /// # Safety
    /// The lock must actually still be held, by this CPU, with no
    /// intervening release.
    pub unsafe fn from_locked(&self) -> SpinMutexGuard<'_, T> {
        debug_assert!(self.holding());
        SpinMutexGuard { mutex: self }
    }
}

pub struct SpinMutexGuard<'m, T> {
    mutex: &'m SpinMutex<T>,
}

impl<'m, T> Deref for SpinMutexGuard<'m, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.inner.get() }
    }
}

impl<'m, T> DerefMut for SpinMutexGuard<'m, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.inner.get() }
    }
}

impl<'m, T> Drop for SpinMutexGuard<'m, T> {
    fn drop(&mut self) {
        unsafe { self.mutex.release() }
    }
}
