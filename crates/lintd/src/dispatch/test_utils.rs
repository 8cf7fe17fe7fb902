//! In-memory connection used by dispatch and stdio tests.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::ConnectionOutput;

/// Connection whose writes land in a shared buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryConnection {
    buffer: Arc<Mutex<Vec<u8>>>,
    lent: Arc<AtomicUsize>,
}

impl MemoryConnection {
    /// Everything written so far, as text.
    pub(crate) fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("connection buffer lock");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Number of writers lent through [`ConnectionOutput`].
    pub(crate) fn lent_writers(&self) -> usize {
        self.lent.load(Ordering::SeqCst)
    }
}

impl Write for MemoryConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .map_err(|_| io::Error::other("connection buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ConnectionOutput for MemoryConnection {
    fn try_clone_output(&self) -> io::Result<Box<dyn Write>> {
        self.lent.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}
