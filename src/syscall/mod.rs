//! The system-call surface. Marshalling arguments out of trapframes is a
//! collaborator this crate does not implement; everything here takes
//! already-decoded arguments and returns the syscall's raw result.

pub mod sysproc;
