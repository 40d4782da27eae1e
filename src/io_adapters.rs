use std::io::{Cursor, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Memory-backed reader, used as a session's stdin when there is no
/// terminal (tests, command substitution).
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

/// Handle to the bytes collected by a [`MemWriter`].
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Collected output, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Memory-backed writer for capturing command output.
#[derive(Default)]
pub struct MemWriter {
    buf: Captured,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer together with a handle for reading what it collects.
    pub fn with_handle() -> (Self, Captured) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }

    /// Another writer appending to the same buffer.
    pub fn from_handle(buf: Captured) -> Self {
        Self { buf }
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_handle_sees_output() {
        let (mut w, out) = MemWriter::with_handle();
        write!(w, "hello ").unwrap();
        writeln!(w, "world").unwrap();
        assert_eq!(out.text(), "hello world\n");
        out.clear();
        assert!(out.bytes().is_empty());
    }

    #[test]
    fn test_reader() {
        let mut r = MemReader::new("abc");
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        assert_eq!(s, "abc");
    }
}
