//! In-memory serial device for tests and dry runs.
//!
//! Records every write, counts closes, and can be "unplugged" so that
//! subsequent writes fail the way a yanked USB adapter does.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{LinkError, PortHandle, PortOpener};

#[derive(Debug, Default)]
struct MockState {
    writes: Vec<Vec<u8>>,
    opened: Vec<String>,
    closes: usize,
    fail_open: bool,
    unplugged: bool,
    /// Writes still allowed before the device unplugs itself.
    writes_left: Option<usize>,
}

/// Opener handing out [`MockPort`]s that share one recorded state.
#[derive(Debug, Clone, Default)]
pub struct MockPortOpener {
    state: Arc<Mutex<MockState>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    /// Writes other than the given probe command.
    pub fn writes_except(&self, probe: &[u8]) -> Vec<Vec<u8>> {
        self.state()
            .writes
            .iter()
            .filter(|w| w.as_slice() != probe)
            .cloned()
            .collect()
    }

    pub fn opened_ports(&self) -> Vec<String> {
        self.state().opened.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Make every following write fail with `BrokenPipe`.
    pub fn unplug(&self) {
        self.state().unplugged = true;
    }

    pub fn replug(&self) {
        let mut state = self.state();
        state.unplugged = false;
        state.writes_left = None;
    }

    /// Allow `count` more writes, then behave as unplugged.
    pub fn unplug_after(&self, count: usize) {
        self.state().writes_left = Some(count);
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, port: &str) -> Result<PortHandle, LinkError> {
        let mut state = self.state();
        if state.fail_open {
            return Err(LinkError::Connection {
                port: port.to_string(),
                source: Box::new(io::Error::new(io::ErrorKind::NotFound, "no such device")),
            });
        }
        state.opened.push(port.to_string());
        Ok(Box::new(MockPort {
            state: self.state.clone(),
        }))
    }
}

pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.writes_left {
            Some(0) => state.unplugged = true,
            Some(n) => state.writes_left = Some(n - 1),
            None => {}
        }
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.closes += 1;
    }
}
