use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination for finished access log entries.
///
/// Each request produces exactly one `write_entry` call carrying the whole
/// entry (summary line, debug block and error list), so a sink that writes
/// every call in one piece keeps lines from interleaving under load.
pub trait LogSink: Send + Sync {
    fn write_entry(&self, entry: &str) -> io::Result<()>;
}

/// Writes entries to the process standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_entry(&self, entry: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(entry.as_bytes())?;
        out.flush()
    }
}

/// In-memory byte buffer shared between clones.
///
/// Serves both as a [`LogSink`] that captures entries and as the side
/// buffer the tee bodies copy into.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the buffer, taking over a poisoned lock.
    fn buf(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf().clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.buf().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buf().clear();
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogSink for MemorySink {
    fn write_entry(&self, entry: &str) -> io::Result<()> {
        self.clone().write_all(entry.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write_all(b"abc").unwrap();
        sink.write_entry("def\n").unwrap();

        assert_eq!(sink.contents(), "abcdef\n");
        assert_eq!(sink.len(), 7);

        sink.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn poisoned_buffer_keeps_data_and_accepts_writes() {
        let sink = MemorySink::new();
        sink.write_entry("before\n").unwrap();

        let held = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.buf.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(sink.buf.is_poisoned());

        assert_eq!(sink.contents(), "before\n");
        assert_eq!(sink.len(), 7);
        sink.write_entry("after\n").unwrap();
        assert_eq!(sink.bytes(), b"before\nafter\n".to_vec());

        sink.clear();
        assert!(sink.is_empty());
    }
}
