mod common;

use chrono::Local;
use common::{count, drain, fast_config, post_form, wait_for_event, PROBE};
use smsgate::gateway::{
    ChannelHooks, Gateway, GatewayError, GatewayEvent, Message, SmsClass,
};
use smsgate::serial::mock::MockPortOpener;
use smsgate::serial::LinkError;
use std::sync::Arc;
use std::time::Duration;

fn gateway() -> (Gateway, MockPortOpener, tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>) {
    let mock = MockPortOpener::new();
    let (hooks, events) = ChannelHooks::channel();
    let gateway = Gateway::new(fast_config(), Arc::new(mock.clone()), Arc::new(hooks));
    (gateway, mock, events)
}

fn message(recipient: &str) -> Message {
    Message::new(Local::now(), recipient, SmsClass::Phone, "queued", "127.0.0.1")
}

fn is_sent(event: &GatewayEvent) -> bool {
    matches!(event, GatewayEvent::MessageSent(_))
}

#[tokio::test]
async fn http_request_reaches_the_device_in_order() {
    let (mut gateway, mock, mut events) = gateway();
    let addr = gateway.start_server().await.unwrap();
    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();
    assert!(gateway.is_serving());
    assert!(gateway.is_connected());

    let response = post_form(
        addr,
        "/send_message",
        "recipients=07745896325%3B+07745856932&message=This+is+an+SMS+message%21&class=0",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was: {response}");

    let mut seen = Vec::new();
    wait_for_event(&mut events, &mut seen, is_sent).await;
    wait_for_event(&mut events, &mut seen, is_sent).await;
    let sent: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            GatewayEvent::MessageSent(m) => Some(m.recipient.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["07745896325", "07745856932"]);

    let expected: Vec<Vec<u8>> = vec![
        b"AT+CMGF=1\r".to_vec(),
        b"AT+CSMP=17,169,0,240\r".to_vec(),
        b"AT+CMGS=\"07745896325\"\r".to_vec(),
        b"This is an SMS message!\x1a".to_vec(),
        b"AT+CMGF=1\r".to_vec(),
        b"AT+CSMP=17,169,0,240\r".to_vec(),
        b"AT+CMGS=\"07745856932\"\r".to_vec(),
        b"This is an SMS message!\x1a".to_vec(),
    ];
    assert_eq!(mock.writes_except(PROBE), expected);

    gateway.shutdown().await;
    assert!(!gateway.is_serving());
    assert!(!gateway.is_connected());
    assert!(!gateway.link().is_connected());

    wait_for_event(&mut events, &mut seen, |e| {
        matches!(e, GatewayEvent::DispatcherExited { .. })
    })
    .await;
    drain(&mut events, &mut seen);
    assert_eq!(count(&seen, &GatewayEvent::DispatcherExited { conn_error: false }), 1);
    assert_eq!(count(&seen, &GatewayEvent::ListenerExited), 1);
    assert_eq!(count(&seen, &GatewayEvent::MonitorExited), 1);
    assert_eq!(count(&seen, &GatewayEvent::LinkLost), 0);
}

#[tokio::test]
async fn messages_wait_in_the_queue_while_disconnected() {
    let (mut gateway, mock, mut events) = gateway();
    let queue = gateway.queue();
    queue.enqueue(message("111"), false).unwrap();
    queue.enqueue(message("222"), false).unwrap();

    let waiting: Vec<String> = gateway
        .queued_messages()
        .into_iter()
        .map(|m| m.recipient)
        .collect();
    assert_eq!(waiting, vec!["111", "222"]);
    assert!(mock.writes().is_empty());

    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();
    let mut seen = Vec::new();
    wait_for_event(&mut events, &mut seen, is_sent).await;
    wait_for_event(&mut events, &mut seen, is_sent).await;
    assert!(gateway.queued_messages().is_empty());
    gateway.shutdown().await;
}

#[tokio::test]
async fn unplugged_device_keeps_messages_and_reconnect_resumes() {
    let (mut gateway, mock, mut events) = gateway();
    let queue = gateway.queue();
    queue.enqueue(message("first"), false).unwrap();
    queue.enqueue(message("second"), false).unwrap();

    mock.unplug();
    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();

    let mut seen = Vec::new();
    wait_for_event(&mut events, &mut seen, |e| *e == GatewayEvent::MonitorExited).await;
    drain(&mut events, &mut seen);
    assert_eq!(count(&seen, &GatewayEvent::LinkLost), 1);
    assert_eq!(count(&seen, &GatewayEvent::DispatcherExited { conn_error: true }), 1);
    assert!(!gateway.is_connected());
    assert!(!gateway.link().is_connected());

    let waiting: Vec<String> = gateway
        .queued_messages()
        .into_iter()
        .map(|m| m.recipient)
        .collect();
    assert_eq!(waiting, vec!["first", "second"]);

    mock.replug();
    gateway.connect_device(None).unwrap_err();
    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();
    queue.enqueue(message("third"), false).unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        wait_for_event(&mut events, &mut seen, is_sent).await;
    }
    let sent: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            GatewayEvent::MessageSent(m) => Some(m.recipient.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["first", "second", "third"]);
    gateway.shutdown().await;
}

#[tokio::test]
async fn second_connect_is_refused() {
    let (mut gateway, _mock, _events) = gateway();
    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();
    assert!(matches!(
        gateway.connect_device(Some("/dev/ttyOTHER")),
        Err(GatewayError::AlreadyConnected)
    ));
    gateway.disconnect_device(true).await;
    assert!(!gateway.is_connected());
    gateway.connect_device(Some("/dev/ttyOTHER")).unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn reconnect_waits_for_the_old_dispatcher() {
    let (mut gateway, mock, mut events) = gateway();
    gateway.connect_device(Some("/dev/ttyMOCK")).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    gateway.disconnect_device(false).await;
    let mut refused = 0;
    loop {
        match gateway.connect_device(Some("/dev/ttyMOCK")) {
            Ok(()) => break,
            Err(GatewayError::AlreadyConnected) => {
                refused += 1;
                assert!(refused < 500, "old dispatcher never exited");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Err(other) => panic!("unexpected connect error: {other}"),
        }
    }
    assert_eq!(mock.opened_ports().len(), 2);

    gateway.queue().enqueue(message("after-reconnect"), false).unwrap();
    let mut seen = Vec::new();
    wait_for_event(&mut events, &mut seen, is_sent).await;
    assert!(gateway.link().is_connected());
    assert!(gateway.is_connected());

    gateway.shutdown().await;
    drain(&mut events, &mut seen);
    assert_eq!(count(&seen, &GatewayEvent::LinkLost), 0);
    assert_eq!(count(&seen, &GatewayEvent::DispatcherExited { conn_error: true }), 0);
    assert_eq!(count(&seen, &GatewayEvent::DispatcherExited { conn_error: false }), 2);
    assert!(gateway.queued_messages().is_empty());
}

#[tokio::test]
async fn connect_needs_a_port() {
    let (mut gateway, _mock, _events) = gateway();
    assert!(matches!(
        gateway.connect_device(None),
        Err(GatewayError::NoPortConfigured)
    ));
}

#[tokio::test]
async fn open_failure_is_reported_and_nothing_starts() {
    let (mut gateway, mock, _events) = gateway();
    mock.set_fail_open(true);
    match gateway.connect_device(Some("/dev/missing")) {
        Err(GatewayError::Link(LinkError::Connection { port, .. })) => {
            assert_eq!(port, "/dev/missing");
        }
        other => panic!("expected connection error, got {:?}", other),
    }
    assert!(!gateway.is_connected());
    assert!(gateway.link().last_error().is_some());
}

#[tokio::test]
async fn second_server_start_is_refused() {
    let (mut gateway, _mock, _events) = gateway();
    let addr = gateway.start_server().await.unwrap();
    match gateway.start_server().await {
        Err(GatewayError::AlreadyServing(running)) => assert_eq!(running, addr),
        other => panic!("expected AlreadyServing, got {:?}", other),
    }
    gateway.stop_server(true).await;
    assert!(!gateway.is_serving());
    assert!(gateway.server_address().is_none());
}
