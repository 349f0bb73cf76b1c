//! Physical-page allocation and address-space management collaborators.
//!
//! Virtual-memory management (page-table setup, user-memory alloc/copy/
//! free) is referenced only through the interfaces below; the scheduling
//! core never implements it.

/// Opaque handle to a page of physical memory, as returned by the physical
/// allocator.
pub type PageHandle = u64;

static NEXT_PAGE: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(crate::param::PGSIZE);

/// Allocate one zeroed physical page. Returns `None` on exhaustion.
///
/// A real platform HAL backs this with the kernel's free-list allocator.
/// This stand-in hands out an ever-increasing fake address and never
/// reports exhaustion, enough for the scheduling core's tests to exercise
/// the allocate/fail/rollback paths that a real free-list would also drive.
pub fn alloc_page() -> Option<PageHandle> {
    Some(NEXT_PAGE.fetch_add(crate::param::PGSIZE, core::sync::atomic::Ordering::Relaxed))
}

/// Free a page previously returned by `alloc_page`.
///
/// # Safety
/// `page` must have been produced by `alloc_page` and not already freed.
pub unsafe fn free_page(_page: PageHandle) {}

/// A process's address space: page table plus user-memory size. This crate
/// only needs the interface its scheduling logic calls through, and a
/// trivial stub to exercise it in tests.
pub trait AddressSpace: Sized {
    /// Create an empty address space (no user memory, just whatever
    /// mappings every process needs unconditionally).
    fn create() -> Option<Self>;
    /// Duplicate `self` into a freshly created child address space,
    /// copying up to `size` bytes of user memory (`proc::process::fork`).
    fn copy_into(&self, child: &mut Self, size: u64) -> Result<(), ()>;
    /// Grow (`delta > 0`) or shrink (`delta < 0`) user memory, returning
    /// the new total size.
    fn resize(&mut self, current_size: u64, delta: i64) -> Result<u64, ()>;
    /// Release every page this address space owns.
    fn destroy(self, size: u64);
}

/// Minimal stand-in `AddressSpace` used so the process table can be
/// exercised without a real page-table implementation. Tracks only the
/// size a real implementation would also track, since that's all the
/// scheduling core ever reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StubAddressSpace {
    pub size: u64,
}

impl AddressSpace for StubAddressSpace {
    fn create() -> Option<Self> {
        Some(StubAddressSpace { size: 0 })
    }

    fn copy_into(&self, child: &mut Self, size: u64) -> Result<(), ()> {
        child.size = size;
        Ok(())
    }

    fn resize(&mut self, current_size: u64, delta: i64) -> Result<u64, ()> {
        let new_size = if delta >= 0 {
            current_size.saturating_add(delta as u64)
        } else {
            current_size.saturating_sub((-delta) as u64)
        };
        self.size = new_size;
        Ok(new_size)
    }

    fn destroy(self, _size: u64) {}
}
