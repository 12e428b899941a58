//! Dispatcher task: drains the message queue onto the serial link.
//!
//! One message at a time is pulled from the queue and sent as four AT writes
//! under a single link guard. A failed write puts the message back at the
//! head of the queue and shuts the dispatcher down with the connection-error
//! flag set, so nothing accepted is ever lost to a flaky device. When the
//! task ends, for whatever reason, it closes the link and reports through
//! [`GatewayHooks::dispatcher_exited`].

use log::{debug, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::hooks::GatewayHooks;
use super::lifecycle::{Lifecycle, LifecycleState};
use super::{Message, PriorityReentryQueue};
use crate::config::{Config, DeviceCommands};
use crate::logutil::escape_log;
use crate::metrics;
use crate::serial::{commands, LinkError, SerialLink};

/// Timing and command settings for one dispatcher run.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Longest a single dequeue waits before the stop flag is re-checked.
    pub dequeue_timeout: Duration,
    /// Gap after each message so the device can finish the submission.
    pub send_interval: Duration,
    pub commands: DeviceCommands,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dequeue_timeout: config.dispatch.dequeue_timeout(),
            send_interval: config.dispatch.send_interval(),
            commands: config.serial.commands.clone(),
        }
    }
}

const CONN_ERROR: u8 = 0b01;
/// Set once the exit has been reported; the error bit is frozen from then on.
const SEALED: u8 = 0b10;

/// Handle to a running dispatcher task. Clones refer to the same task.
#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: Lifecycle,
    flags: Arc<AtomicU8>,
}

impl Dispatcher {
    /// Spawn the dispatcher. The link should already be open; if it is not,
    /// the first message fails with [`LinkError::NotConnected`] and is
    /// re-queued.
    pub fn start(
        queue: Arc<PriorityReentryQueue<Message>>,
        link: SerialLink,
        hooks: Arc<dyn GatewayHooks>,
        settings: DispatcherSettings,
    ) -> Self {
        let handle = Self {
            lifecycle: Lifecycle::new(),
            flags: Arc::new(AtomicU8::new(0)),
        };
        handle.lifecycle.mark_running();
        let worker = SendLoop {
            queue,
            link,
            hooks,
            settings,
            handle: handle.clone(),
        };
        tokio::spawn(worker.run());
        handle
    }

    /// Ask the task to stop after its current step. `conn_error` records that
    /// the stop was caused by a link failure; it is never cleared, and it is
    /// ignored once the task has reported its exit.
    pub fn stop(&self, conn_error: bool) {
        if conn_error {
            let _ = self
                .flags
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |flags| {
                    ((flags & SEALED) == 0).then_some(flags | CONN_ERROR)
                });
        }
        if self.lifecycle.request_stop() {
            debug!("Dispatcher stop requested (conn_error={})", conn_error);
        }
    }

    pub async fn wait(&self) {
        self.lifecycle.wait_stopped().await;
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Running or stopping but not yet exited.
    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn conn_error(&self) -> bool {
        (self.flags.load(Ordering::SeqCst) & CONN_ERROR) != 0
    }

    /// Freeze the flag and return the value to report.
    fn seal(&self) -> bool {
        (self.flags.fetch_or(SEALED, Ordering::SeqCst) & CONN_ERROR) != 0
    }
}

struct SendLoop {
    queue: Arc<PriorityReentryQueue<Message>>,
    link: SerialLink,
    hooks: Arc<dyn GatewayHooks>,
    settings: DispatcherSettings,
    handle: Dispatcher,
}

impl SendLoop {
    async fn run(self) {
        info!("Dispatcher started");
        while self.handle.is_running() {
            let Some(message) = self.queue.dequeue(self.settings.dequeue_timeout).await else {
                continue;
            };

            match self.transmit(&message) {
                Ok(()) => {
                    metrics::inc_messages_sent();
                    debug!("Message {} delivered to device", message.id);
                    self.hooks.message_sent(&message);
                }
                Err(e) => {
                    warn!(
                        "Sending to {} failed, message re-queued: {}",
                        escape_log(&message.recipient),
                        e
                    );
                    metrics::inc_messages_requeued();
                    if let Err(full) = self.queue.enqueue(message, true) {
                        // Front inserts ignore capacity; keep the arm for completeness.
                        warn!("Could not re-queue message {}: {}", full.item.id, full);
                    }
                    self.handle.stop(true);
                }
            }

            if self.handle.is_running() {
                self.handle.lifecycle.pause(self.settings.send_interval).await;
            }
        }

        self.link.lock().close();
        let conn_error = self.handle.seal();
        info!("Dispatcher stopped (conn_error={})", conn_error);
        self.hooks.dispatcher_exited(conn_error);
        self.handle.lifecycle.mark_stopped();
    }

    /// All four writes happen under one guard so the probe cannot interleave.
    fn transmit(&self, message: &Message) -> Result<(), LinkError> {
        let mut guard = self.link.lock();
        for command in commands::sms_submission(&self.settings.commands, message) {
            guard.write_command(&command)?;
        }
        Ok(())
    }
}
