//! Shared fixtures for the integration tests.
#![allow(dead_code)] // each test crate uses a different subset

use smsgate::config::Config;
use smsgate::gateway::GatewayEvent;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

pub const PROBE: &[u8] = b"AT\r";

/// Loopback listener on an ephemeral port and millisecond-scale timings.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.dispatch.dequeue_timeout_ms = 20;
    config.dispatch.send_interval_ms = 5;
    config.monitor.probe_interval_ms = 10;
    config
}

/// Send one raw HTTP/1.1 request and return the whole response text.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .expect("read response");
    String::from_utf8_lossy(&response).into_owned()
}

/// POST an urlencoded body the way a bare scripted client does: no
/// Content-Type header.
pub async fn post_form(addr: SocketAddr, path: &str, body: &str) -> String {
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    raw_request(addr, &request).await
}

/// Wait for the first event satisfying `pred`, collecting everything seen.
pub async fn wait_for_event<F>(
    rx: &mut UnboundedReceiver<GatewayEvent>,
    seen: &mut Vec<GatewayEvent>,
    pred: F,
) -> GatewayEvent
where
    F: Fn(&GatewayEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        seen.push(event.clone());
        if pred(&event) {
            return event;
        }
    }
}

/// Everything already in the channel.
pub fn drain(rx: &mut UnboundedReceiver<GatewayEvent>, seen: &mut Vec<GatewayEvent>) {
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
}

pub fn count(seen: &[GatewayEvent], event: &GatewayEvent) -> usize {
    seen.iter().filter(|e| *e == event).count()
}
