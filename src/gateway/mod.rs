//! # Gateway Runtime
//!
//! The pieces that move a message from an HTTP form to the modem:
//!
//! - [`PriorityReentryQueue`]: the FIFO buffer between intake and sending,
//!   with head re-insertion for failed sends
//! - [`Dispatcher`]: drains the queue onto the serial link
//! - [`LinkMonitor`]: probes the link and detects a vanished device
//! - [`Gateway`]: owns the link, the queue and the three workers, and
//!   sequences connect, disconnect, serve and shutdown
//!
//! Workers report through a [`GatewayHooks`] implementation supplied by the
//! owner.

pub mod dispatcher;
pub mod hooks;
pub mod lifecycle;
pub mod message;
pub mod monitor;
pub mod queue;

pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use hooks::{ChannelHooks, GatewayEvent, GatewayHooks, LoggingHooks, NoHooks};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use message::{DisplayHandle, Message, SmsClass, DISPLAY_TIME_FORMAT};
pub use monitor::LinkMonitor;
pub use queue::{PriorityReentryQueue, QueueFull, Reservation};

use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::http::{ListenerError, RequestListener};
use crate::metrics;
use crate::serial::{commands, LinkError, PortOpener, SerialLink};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("a serial port is already connected")]
    AlreadyConnected,

    #[error("the HTTP server is already running on {0}")]
    AlreadyServing(SocketAddr),

    #[error("no serial port configured")]
    NoPortConfigured,
}

/// Owns the runtime and sequences its workers.
///
/// Connecting opens the link and starts the dispatcher and the monitor;
/// disconnecting stops the monitor first so that the dispatcher's exit is not
/// mistaken for a lost link. The HTTP listener runs independently of the
/// device: messages accepted while disconnected wait in the queue.
pub struct Gateway {
    config: Config,
    queue: Arc<PriorityReentryQueue<Message>>,
    link: SerialLink,
    hooks: Arc<dyn GatewayHooks>,
    dispatcher: Option<Dispatcher>,
    monitor: Option<LinkMonitor>,
    listener: Option<RequestListener>,
}

impl Gateway {
    pub fn new(config: Config, opener: Arc<dyn PortOpener>, hooks: Arc<dyn GatewayHooks>) -> Self {
        let queue = Arc::new(PriorityReentryQueue::with_capacity(
            config.dispatch.queue_capacity,
        ));
        Self {
            config,
            queue,
            link: SerialLink::new(opener),
            hooks,
            dispatcher: None,
            monitor: None,
            listener: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> Arc<PriorityReentryQueue<Message>> {
        self.queue.clone()
    }

    pub fn link(&self) -> &SerialLink {
        &self.link
    }

    /// Messages still waiting to be sent, head first.
    pub fn queued_messages(&self) -> Vec<Message> {
        self.queue.snapshot()
    }

    /// True while a dispatcher is alive (running or finishing its last step).
    pub fn is_connected(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(Dispatcher::is_alive)
    }

    pub fn is_serving(&self) -> bool {
        self.listener.as_ref().is_some_and(RequestListener::is_alive)
    }

    pub fn server_address(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .filter(|l| l.is_alive())
            .map(RequestListener::local_addr)
    }

    /// Open `port` (or the configured port) and start sending.
    pub fn connect_device(&mut self, port: Option<&str>) -> Result<(), GatewayError> {
        if self.is_connected() {
            return Err(GatewayError::AlreadyConnected);
        }
        let port = port
            .map(str::to_string)
            .unwrap_or_else(|| self.config.serial.port.clone());
        if port.is_empty() {
            return Err(GatewayError::NoPortConfigured);
        }

        self.link.lock().open(&port)?;
        info!("Serial port {} connected", port);

        let dispatcher = Dispatcher::start(
            self.queue.clone(),
            self.link.clone(),
            self.hooks.clone(),
            DispatcherSettings::from_config(&self.config),
        );
        let monitor = LinkMonitor::start(
            self.link.clone(),
            dispatcher.clone(),
            self.hooks.clone(),
            self.config.monitor.probe_interval(),
            commands::probe(&self.config.serial.commands).to_vec(),
        );
        self.dispatcher = Some(dispatcher);
        self.monitor = Some(monitor);
        Ok(())
    }

    /// Stop the monitor, then the dispatcher. With `block`, wait for both to
    /// exit; the dispatcher closes the link on its way out.
    ///
    /// The handles stay in place until the workers are gone, so a connect
    /// issued while the old dispatcher is still finishing is refused instead
    /// of racing it for the link.
    pub async fn disconnect_device(&mut self, block: bool) {
        if let Some(monitor) = &self.monitor {
            monitor.stop();
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.stop(false);
        }
        if block {
            if let Some(monitor) = &self.monitor {
                monitor.wait().await;
            }
            if let Some(dispatcher) = &self.dispatcher {
                dispatcher.wait().await;
            }
        }
    }

    /// Bind and start the HTTP listener. Returns the bound address.
    pub async fn start_server(&mut self) -> Result<SocketAddr, GatewayError> {
        if let Some(addr) = self.server_address() {
            return Err(GatewayError::AlreadyServing(addr));
        }
        let listener = RequestListener::start(
            self.config.server.clone(),
            self.queue.clone(),
            self.hooks.clone(),
        )
        .await?;
        let addr = listener.local_addr();
        info!("HTTP server listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    pub async fn stop_server(&mut self, block: bool) {
        if let Some(listener) = &self.listener {
            listener.stop();
            if block {
                listener.wait().await;
            }
        }
    }

    /// Stop everything and wait for every worker to exit.
    pub async fn shutdown(&mut self) {
        self.stop_server(true).await;
        self.disconnect_device(true).await;
        let pending = self.queue.len();
        if pending > 0 {
            warn!("{} message(s) left unsent in the queue", pending);
        }
        let m = metrics::snapshot();
        info!(
            "Gateway stopped: queued={} sent={} requeued={} probe_failures={} rejected={}",
            m.messages_queued, m.messages_sent, m.messages_requeued, m.probe_failures, m.requests_rejected
        );
    }
}
