//! Keepalive monitor for the serial link.
//!
//! While the dispatcher runs, a bare `AT` probe is written every probe
//! interval. A failed probe stops the dispatcher with the connection-error
//! flag; a dispatcher that is observed to have exited on its own (for
//! example after a failed submission) is treated the same way. Either case
//! raises [`GatewayHooks::link_lost`] exactly once and ends the monitor.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::dispatcher::Dispatcher;
use super::hooks::GatewayHooks;
use super::lifecycle::{Lifecycle, LifecycleState};
use crate::metrics;
use crate::serial::{LinkError, SerialLink};

#[derive(Clone)]
pub struct LinkMonitor {
    lifecycle: Lifecycle,
}

impl LinkMonitor {
    pub fn start(
        link: SerialLink,
        dispatcher: Dispatcher,
        hooks: Arc<dyn GatewayHooks>,
        probe_interval: Duration,
        probe: Vec<u8>,
    ) -> Self {
        let handle = Self {
            lifecycle: Lifecycle::new(),
        };
        handle.lifecycle.mark_running();
        let worker = ProbeLoop {
            link,
            dispatcher,
            hooks,
            probe_interval,
            probe,
            lifecycle: handle.lifecycle.clone(),
        };
        tokio::spawn(worker.run());
        handle
    }

    pub fn stop(&self) {
        self.lifecycle.request_stop();
    }

    pub async fn wait(&self) {
        self.lifecycle.wait_stopped().await;
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

struct ProbeLoop {
    link: SerialLink,
    dispatcher: Dispatcher,
    hooks: Arc<dyn GatewayHooks>,
    probe_interval: Duration,
    probe: Vec<u8>,
    lifecycle: Lifecycle,
}

impl ProbeLoop {
    async fn run(self) {
        debug!("Link monitor started");
        while self.lifecycle.is_running() {
            if self.dispatcher.is_alive() {
                let probed = self.link.lock().write_command(&self.probe);
                match probed {
                    Ok(()) => {}
                    // The dispatcher closes the link on its way out.
                    Err(LinkError::NotConnected) if !self.dispatcher.is_running() => {
                        debug!("Link closed by exiting dispatcher, probe skipped");
                        self.dispatcher.wait().await;
                    }
                    Err(e) => {
                        metrics::inc_probe_failures();
                        warn!("Keepalive probe failed: {}", e);
                        self.dispatcher.stop(true);
                        self.dispatcher.wait().await;
                    }
                }
            }

            // A stop requested by the owner means the dispatcher is being
            // shut down on purpose; only an unrequested exit is a lost link.
            if !self.dispatcher.is_alive() && self.lifecycle.is_running() {
                info!("Serial link lost, dispatcher shut down");
                self.hooks.link_lost();
                break;
            }

            if self.lifecycle.is_running() {
                self.lifecycle.pause(self.probe_interval).await;
            }
        }
        self.hooks.monitor_exited();
        self.lifecycle.mark_stopped();
    }
}
