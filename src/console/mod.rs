//! A minimal console sink.
//!
//! The real UART driver lives on a platform this crate does not target;
//! this ring buffer is just enough of a sink that the logging layer
//! (`crate::logging`) and the scheduler's own diagnostic prints have
//! somewhere to write, and that host tests can assert against without real
//! hardware.

pub mod printf;

use crate::sync::spinmutex::SpinMutex;

pub const OUTPUT_BUF_SIZE: usize = 1024;

pub struct Console {
    buffer: [u8; OUTPUT_BUF_SIZE],
    write_index: usize,
}

impl Console {
    pub const fn new() -> Console {
        Console {
            buffer: [0u8; OUTPUT_BUF_SIZE],
            write_index: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let i = self.write_index % self.buffer.len();
            self.buffer[i] = b;
            self.write_index += 1;
        }
    }

    /// The most recently written bytes, oldest first, for test assertions.
    pub fn tail(&self, n: usize) -> arrayvec::ArrayVec<u8, OUTPUT_BUF_SIZE> {
        let n = n.min(self.write_index).min(self.buffer.len());
        let mut out = arrayvec::ArrayVec::new();
        for i in 0..n {
            let idx = (self.write_index - n + i) % self.buffer.len();
            out.push(self.buffer[idx]);
        }
        out
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::new()
    }
}

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

pub static CONSOLE: SpinMutex<Console> = SpinMutex::new(Console::new());
