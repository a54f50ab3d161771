use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Writer that **captures** VM output in a shared `String` (tests, REPL, embedding).
///
/// Clones share the same buffer: hand one to [`Vm::with_output`](crate::Vm::with_output)
/// and keep the other to read what was written.
#[derive(Debug, Default, Clone)]
pub struct Captured(Arc<Mutex<String>>);

impl Captured {
    /// Copy of everything written so far.
    pub fn get(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Empty the buffer.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push_str(&s);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}
