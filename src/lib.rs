//! # smsgate - HTTP to SMS Gateway
//!
//! smsgate accepts SMS send requests over HTTP and delivers them through a
//! GSM modem or handset attached to a serial port, using the standard text
//! mode AT command set.
//!
//! ## Features
//!
//! - **HTTP Intake**: A small form page plus a `POST` endpoint; one request may fan out to many recipients.
//! - **Ordered Delivery**: FIFO queue where a message whose send failed is retried before newer arrivals.
//! - **Link Supervision**: A keepalive probe notices an unplugged device even when nothing is being sent.
//! - **Observer Hooks**: Every accepted, sent or lost event is reported through [`gateway::GatewayHooks`].
//! - **Async Design**: Built with Tokio; the listener, dispatcher and monitor run as independent tasks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smsgate::config::Config;
//! use smsgate::gateway::{Gateway, LoggingHooks};
//! use smsgate::serial::mock::MockPortOpener;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut gateway = Gateway::new(config, Arc::new(MockPortOpener::new()), Arc::new(LoggingHooks));
//!
//!     gateway.connect_device(Some("/dev/ttyUSB0"))?;
//!     gateway.start_server().await?;
//!     tokio::signal::ctrl_c().await?;
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gateway`] - Queue, dispatcher, link monitor and the owning controller
//! - [`http`] - Request listener, routing and embedded pages
//! - [`serial`] - Serial link, port openers and AT command rendering
//! - [`config`] - Configuration management
//! - [`validation`] - Send request validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ RequestListener │ ← HTTP form and POST intake
//! └─────────────────┘
//!          │ enqueue
//! ┌─────────────────┐
//! │  Message Queue  │ ← FIFO, failed sends re-enter at the head
//! └─────────────────┘
//!          │ dequeue
//! ┌─────────────────┐     ┌─────────────┐
//! │   Dispatcher    │ ──▶ │ Serial Link │ ◀── LinkMonitor (AT probe)
//! └─────────────────┘     └─────────────┘
//! ```

pub mod config;
pub mod gateway;
pub mod http;
pub mod logutil;
pub mod metrics;
pub mod serial;
pub mod validation;
