//! # Serial Link Module
//!
//! Exclusive access to the single serial connection that carries AT commands
//! to the sending device.
//!
//! ## Locking
//!
//! Every open, write and close happens through a [`LinkGuard`] obtained from
//! [`SerialLink::lock`]. A caller that needs several writes to land back to
//! back (the four commands of one SMS submission) holds one guard for the
//! whole sequence; the keepalive probe takes its own guard for its single
//! write. Guards wrap a std mutex and must be dropped before any `.await`.
//!
//! ## Devices
//!
//! Opening is delegated to a [`PortOpener`]. [`SerialPortOpener`] drives real
//! hardware through the `serialport` crate; [`mock::MockPortOpener`] keeps
//! everything in memory for tests.
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # {
//! use smsgate::serial::{SerialLink, SerialPortOpener};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let link = SerialLink::new(Arc::new(SerialPortOpener::new(9600, Duration::from_millis(500))));
//! let mut guard = link.lock();
//! guard.open("/dev/ttyUSB0")?;
//! guard.write_command(b"AT\r")?;
//! guard.close();
//! # }
//! # Ok::<(), smsgate::serial::LinkError>(())
//! ```

pub mod commands;
pub mod mock;

use log::{debug, warn};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
#[cfg(feature = "serial")]
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The port could not be opened (missing device, driver failure, busy).
    #[error("could not open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A write or flush failed on an open port.
    #[error("serial write failed: {0}")]
    Transmission(#[from] std::io::Error),

    /// A write was attempted while no port is open.
    #[error("serial link is not connected")]
    NotConnected,
}

/// Byte sink for an opened device.
pub type PortHandle = Box<dyn Write + Send>;

/// Opens a named port. Implemented for real hardware and for test doubles.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str) -> Result<PortHandle, LinkError>;
}

#[derive(Default)]
struct LinkState {
    port: Option<PortHandle>,
    port_name: Option<String>,
    last_error: Option<String>,
}

/// Shared handle to the one serial connection. Cloning shares the link.
#[derive(Clone)]
pub struct SerialLink {
    state: Arc<Mutex<LinkState>>,
    opener: Arc<dyn PortOpener>,
}

impl SerialLink {
    pub fn new(opener: Arc<dyn PortOpener>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState::default())),
            opener,
        }
    }

    /// Acquire exclusive access for one logical operation.
    pub fn lock(&self) -> LinkGuard<'_> {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        LinkGuard {
            state,
            opener: self.opener.as_ref(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    pub fn port_name(&self) -> Option<String> {
        self.lock().state.port_name.clone()
    }

    /// Text of the most recent open or write failure.
    pub fn last_error(&self) -> Option<String> {
        self.lock().state.last_error.clone()
    }
}

/// Exclusive access to the link; released on drop.
pub struct LinkGuard<'a> {
    state: MutexGuard<'a, LinkState>,
    opener: &'a dyn PortOpener,
}

impl LinkGuard<'_> {
    pub fn is_connected(&self) -> bool {
        self.state.port.is_some()
    }

    /// Open `port`, replacing any connection that is already open.
    pub fn open(&mut self, port: &str) -> Result<(), LinkError> {
        self.close();
        match self.opener.open(port) {
            Ok(handle) => {
                debug!("Serial port {} opened", port);
                self.state.port = Some(handle);
                self.state.port_name = Some(port.to_string());
                self.state.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Write one command and flush it to the device.
    pub fn write_command(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let Some(port) = self.state.port.as_mut() else {
            self.state.last_error = Some(LinkError::NotConnected.to_string());
            return Err(LinkError::NotConnected);
        };
        let result = port.write_all(bytes).and_then(|_| port.flush());
        if let Err(e) = result {
            warn!("Serial write of {} bytes failed: {}", bytes.len(), e);
            self.state.last_error = Some(e.to_string());
            return Err(LinkError::Transmission(e));
        }
        Ok(())
    }

    /// Drop the connection. Safe to call when already closed.
    pub fn close(&mut self) {
        if self.state.port.take().is_some() {
            debug!(
                "Serial port {} closed",
                self.state.port_name.as_deref().unwrap_or("?")
            );
        }
        self.state.port_name = None;
    }
}

/// Opens real devices through the `serialport` crate (8N1).
#[cfg(feature = "serial")]
pub struct SerialPortOpener {
    baud_rate: u32,
    timeout: Duration,
}

#[cfg(feature = "serial")]
impl SerialPortOpener {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

#[cfg(feature = "serial")]
impl PortOpener for SerialPortOpener {
    fn open(&self, port: &str) -> Result<PortHandle, LinkError> {
        let mut builder = serialport::new(port, self.baud_rate).timeout(self.timeout);
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let device = builder.open().map_err(|e| LinkError::Connection {
            port: port.to_string(),
            source: Box::new(e),
        })?;
        Ok(Box::new(SerialDevice(device)))
    }
}

#[cfg(feature = "serial")]
struct SerialDevice(Box<dyn serialport::SerialPort>);

#[cfg(feature = "serial")]
impl Write for SerialDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}
