//! Observer callbacks raised by the runtime workers.
//!
//! All methods are invoked synchronously on the worker that produced the
//! event, so implementations should return quickly. Every method has a no-op
//! default; implement only what you need.

use log::{debug, error, info};
use tokio::sync::mpsc;

use super::Message;

/// Queue view width used when logging received messages.
const QUEUED_PREVIEW_CHARS: usize = 50;
/// Sent view width used when logging delivered messages.
const SENT_PREVIEW_CHARS: usize = 60;

pub trait GatewayHooks: Send + Sync {
    /// A validated message holds a queue slot and is about to be appended.
    /// May attach a [`DisplayHandle`](super::DisplayHandle).
    fn message_received(&self, _message: &mut Message) {}

    /// All four commands of the message reached the device.
    fn message_sent(&self, _message: &Message) {}

    /// One line per inbound HTTP request.
    fn http_activity(&self, _line: &str) {}

    /// The keepalive monitor found the device gone and shut the dispatcher down.
    fn link_lost(&self) {}

    /// The dispatcher exited and closed the link. `conn_error` is set when it
    /// stopped because of a transmission failure or a lost link.
    fn dispatcher_exited(&self, _conn_error: bool) {}

    fn monitor_exited(&self) {}

    fn listener_exited(&self) {}
}

/// Ignores every event.
pub struct NoHooks;

impl GatewayHooks for NoHooks {}

/// Owned copy of a hook invocation, for owners that prefer draining a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    MessageReceived(Message),
    MessageSent(Message),
    HttpActivity(String),
    LinkLost,
    DispatcherExited { conn_error: bool },
    MonitorExited,
    ListenerExited,
}

/// Forwards every hook as a [`GatewayEvent`] on an unbounded channel.
pub struct ChannelHooks {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelHooks {
    pub fn new(tx: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn emit(&self, event: GatewayEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl GatewayHooks for ChannelHooks {
    fn message_received(&self, message: &mut Message) {
        self.emit(GatewayEvent::MessageReceived(message.clone()));
    }

    fn message_sent(&self, message: &Message) {
        self.emit(GatewayEvent::MessageSent(message.clone()));
    }

    fn http_activity(&self, line: &str) {
        self.emit(GatewayEvent::HttpActivity(line.to_string()));
    }

    fn link_lost(&self) {
        self.emit(GatewayEvent::LinkLost);
    }

    fn dispatcher_exited(&self, conn_error: bool) {
        self.emit(GatewayEvent::DispatcherExited { conn_error });
    }

    fn monitor_exited(&self) {
        self.emit(GatewayEvent::MonitorExited);
    }

    fn listener_exited(&self) {
        self.emit(GatewayEvent::ListenerExited);
    }
}

/// Writes every event to the log. HTTP activity goes to target `http`,
/// message traffic to target `sms`.
pub struct LoggingHooks;

impl GatewayHooks for LoggingHooks {
    fn message_received(&self, message: &mut Message) {
        info!(target: "sms", "Queued {}", message.describe(QUEUED_PREVIEW_CHARS));
    }

    fn message_sent(&self, message: &Message) {
        info!(target: "sms", "Sent {}", message.describe(SENT_PREVIEW_CHARS));
    }

    fn http_activity(&self, line: &str) {
        info!(target: "http", "{}", line);
    }

    fn link_lost(&self) {
        error!("The connection to the serial port has been lost");
    }

    fn dispatcher_exited(&self, conn_error: bool) {
        if conn_error {
            debug!("Dispatcher exited after a connection error");
        } else {
            info!("Serial port disconnected");
        }
    }

    fn monitor_exited(&self) {
        debug!("Link monitor exited");
    }

    fn listener_exited(&self) {
        info!("HTTP server stopped");
    }
}
