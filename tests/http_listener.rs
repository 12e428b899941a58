mod common;

use common::{fast_config, post_form, raw_request, wait_for_event};
use smsgate::gateway::{ChannelHooks, GatewayEvent, LifecycleState, Message, PriorityReentryQueue};
use smsgate::http::{ListenerError, RequestListener};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn serves_real_connections_until_stopped() {
    let queue: Arc<PriorityReentryQueue<Message>> = Arc::new(PriorityReentryQueue::new());
    let (hooks, mut events) = ChannelHooks::channel();
    let listener = RequestListener::start(fast_config().server, queue.clone(), Arc::new(hooks))
        .await
        .unwrap();
    let addr = listener.local_addr();
    assert_ne!(addr.port(), 0);
    assert_eq!(listener.state(), LifecycleState::Running);

    let response = post_form(
        addr,
        "/send_message",
        "recipients=07745896325%3B+07745856932&message=This+is+an+SMS+message%21",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was: {response}");
    assert!(response.contains("server: SmsGateway/") || response.contains("Server: SmsGateway/"));
    assert_eq!(queue.len(), 2);

    let response = raw_request(
        addr,
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 302"), "response was: {response}");

    listener.stop();
    tokio::time::timeout(Duration::from_secs(5), listener.wait())
        .await
        .expect("listener did not stop");
    assert!(!listener.is_alive());

    let mut seen = Vec::new();
    wait_for_event(&mut events, &mut seen, |e| *e == GatewayEvent::ListenerExited).await;
    let activity = seen
        .iter()
        .filter(|e| matches!(e, GatewayEvent::HttpActivity(_)))
        .count();
    assert_eq!(activity, 2);

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn busy_port_is_a_bind_error() {
    let queue: Arc<PriorityReentryQueue<Message>> = Arc::new(PriorityReentryQueue::new());
    let (hooks, _events) = ChannelHooks::channel();
    let hooks = Arc::new(hooks);
    let first = RequestListener::start(fast_config().server, queue.clone(), hooks.clone())
        .await
        .unwrap();

    let mut config = fast_config().server;
    config.port = first.local_addr().port();
    match RequestListener::start(config, queue, hooks).await {
        Err(ListenerError::Bind { address, .. }) => {
            assert_eq!(address, format!("127.0.0.1:{}", first.local_addr().port()));
        }
        Err(other) => panic!("expected bind error, got {other}"),
        Ok(_) => panic!("second listener bound the same port"),
    }

    first.stop();
    first.wait().await;
}
