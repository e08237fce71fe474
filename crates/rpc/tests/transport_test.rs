//! End-to-end tests of the transport against a scripted media server.

use kurento_rpc::{
    ConnectionError, ConnectionState, Error, Event, Method, ObjectId, ReconnectPolicy,
    RequestOptions, RpcTransport, SubscriptionId,
};
use kurento_rpc_mock::{MockConnection, MockMediaServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

async fn setup() -> (MockMediaServer, RpcTransport) {
    let _ = tracing_subscriber::fmt::try_init();

    let server = MockMediaServer::start().await.unwrap();
    let transport = RpcTransport::builder()
        .url(server.url())
        .connect_timeout(Duration::from_secs(1))
        .reconnect_policy(ReconnectPolicy::immediate().with_max_attempts(3))
        .keepalive_interval(None)
        .build()
        .unwrap();

    (server, transport)
}

fn forward_events() -> (
    impl Fn(Event) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Event>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event: Event| {
            let _ = tx.send(event);
        },
        rx,
    )
}

async fn subscribe(
    transport: &RpcTransport,
    conn: &mut MockConnection,
    object: &str,
    event_type: &'static str,
    subscription: &str,
) -> mpsc::UnboundedReceiver<Event> {
    let (handler, events) = forward_events();
    let client = transport.clone();
    let object_id = ObjectId::from(object);
    let call =
        tokio::spawn(async move { client.subscribe(&object_id, event_type, handler).await });

    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.method, "subscribe");
    assert_eq!(request.param("object"), object);
    assert_eq!(request.param("type"), event_type);
    conn.reply_value(&request, json!(subscription)).await.unwrap();

    let id = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(id, SubscriptionId::from(subscription));
    events
}

#[tokio::test]
async fn test_create_learns_session_id() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move { client.create("MediaPipeline", json!({})).await });

    let mut conn = server.accept().await.unwrap();
    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.method, "create");
    assert_eq!(request.param("type"), "MediaPipeline");
    assert_eq!(request.param("constructorParams"), &json!({}));
    assert_eq!(request.session_id(), None);
    conn.reply(&request, json!({"value": "p1", "sessionId": "s1"}))
        .await
        .unwrap();

    let pipeline = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(pipeline, ObjectId::from("p1"));
    assert_eq!(transport.session_id().as_deref(), Some("s1"));
    assert_eq!(transport.state(), ConnectionState::Connected);

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("p1"), "getName", Value::Null)
            .await
    });

    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.method, "invoke");
    assert_eq!(request.session_id(), Some("s1"));
    assert_eq!(request.param("object"), "p1");
    assert_eq!(request.param("operation"), "getName");
    assert_eq!(request.param("operationParams"), &json!({}));
    conn.reply_value(&request, json!("pipeline-name"))
        .await
        .unwrap();

    let value = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(value, json!("pipeline-name"));
    assert_eq!(transport.pending_calls(), 0);

    transport.stop().await;
}

#[tokio::test]
async fn test_error_reply_fails_only_that_call() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "play", json!({}))
            .await
    });

    let mut conn = server.accept().await.unwrap();
    let request = conn.recv_request().await.unwrap();
    conn.reply_error(&request, 40101, "Invalid state")
        .await
        .unwrap();

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    let rpc = err.as_rpc().unwrap();
    assert_eq!(rpc.message, "Invalid state");
    assert_eq!(rpc.code, Some(40101));

    // The connection is unaffected.
    let client = transport.clone();
    let call = tokio::spawn(async move { client.release(&ObjectId::from("ep1")).await });
    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.method, "release");
    assert_eq!(request.param("object"), "ep1");
    conn.reply(&request, json!({})).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    transport.stop().await;
}

#[tokio::test]
async fn test_event_delivered_once() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let mut events = subscribe(&transport, &mut conn, "ep1", "EndOfStream", "sub1").await;
    assert_eq!(transport.subscription_count(), 1);

    conn.push_event("ep1", "EndOfStream", json!({"source": "ep1"}))
        .await
        .unwrap();

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.object, ObjectId::from("ep1"));
    assert_eq!(event.event_type, "EndOfStream");
    assert_eq!(event.value["data"]["source"], "ep1");
    assert!(timeout(QUIET, events.recv()).await.is_err());

    transport.stop().await;
}

#[tokio::test]
async fn test_in_flight_call_survives_reconnect() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let create = tokio::spawn(async move { client.create("MediaPipeline", json!({})).await });

    let mut conn = server.accept().await.unwrap();
    let request = conn.recv_request().await.unwrap();
    conn.reply(&request, json!({"value": "p1", "sessionId": "s1"}))
        .await
        .unwrap();
    timeout(WAIT, create).await.unwrap().unwrap().unwrap();

    let client = transport.clone();
    let first = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "getUri", json!({}))
            .await
    });

    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.session_id(), Some("s1"));
    conn.drop_abruptly();

    let mut conn = server.accept().await.unwrap();

    let client = transport.clone();
    let second = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "getState", json!({}))
            .await
    });

    let queued = conn.recv_request().await.unwrap();
    assert_eq!(queued.param("operation"), "getState");
    assert_eq!(queued.session_id(), Some("s1"));

    conn.reply_value(&request, json!("file:///tmp/a.webm"))
        .await
        .unwrap();
    conn.reply_value(&queued, json!("PLAYING")).await.unwrap();

    let uri = timeout(WAIT, first).await.unwrap().unwrap().unwrap();
    assert_eq!(uri, json!("file:///tmp/a.webm"));
    let state = timeout(WAIT, second).await.unwrap().unwrap().unwrap();
    assert_eq!(state, json!("PLAYING"));
    assert_eq!(transport.session_id().as_deref(), Some("s1"));

    transport.stop().await;
}

#[tokio::test]
async fn test_event_right_behind_subscribe_reply() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let (handler, mut events) = forward_events();
    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .subscribe(&ObjectId::from("ep1"), "EndOfStream", handler)
            .await
    });

    let request = conn.recv_request().await.unwrap();
    conn.reply_value(&request, json!("sub1")).await.unwrap();
    conn.push_event("ep1", "EndOfStream", json!({"source": "ep1"}))
        .await
        .unwrap();

    let id = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(id, SubscriptionId::from("sub1"));

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.object, ObjectId::from("ep1"));
    assert_eq!(event.event_type, "EndOfStream");

    transport.stop().await;
}

#[tokio::test]
async fn test_rejected_subscribe_registers_nothing() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let (handler, _events) = forward_events();
    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .subscribe(&ObjectId::from("ep1"), "EndOfStream", handler)
            .await
    });

    let request = conn.recv_request().await.unwrap();
    conn.reply_error(&request, 40101, "Object not found")
        .await
        .unwrap();

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.as_rpc().unwrap().message, "Object not found");
    assert_eq!(transport.subscription_count(), 0);

    transport.stop().await;
}

#[tokio::test]
async fn test_numeric_object_ids_are_sent_back_unchanged() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move { client.create("PlayerEndpoint", json!({})).await });

    let mut conn = server.accept().await.unwrap();
    let request = conn.recv_request().await.unwrap();
    conn.reply_value(&request, json!(42)).await.unwrap();

    let object = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(object, ObjectId::from(42_u64));

    let client = transport.clone();
    let call = tokio::spawn(async move { client.invoke(&object, "play", json!({})).await });
    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.param("object"), &json!(42));
    conn.reply(&request, json!({})).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    transport.stop().await;
}

#[tokio::test]
async fn test_out_of_order_replies() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let mut calls = Vec::new();
    for operation in ["first", "second", "third"] {
        let client = transport.clone();
        calls.push(tokio::spawn(async move {
            client
                .invoke(&ObjectId::from("ep1"), operation, json!({}))
                .await
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(conn.recv_request().await.unwrap());
    }
    assert_eq!(transport.pending_calls(), 3);

    for request in requests.iter().rev() {
        let operation = request.param("operation").clone();
        conn.reply_value(request, operation).await.unwrap();
    }

    for (call, expected) in calls.into_iter().zip(["first", "second", "third"]) {
        let value = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
        assert_eq!(value, expected);
    }

    transport.stop().await;
}

#[tokio::test]
async fn test_stop_fails_pending_calls() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "play", json!({}))
            .await
    });

    let mut conn = server.accept().await.unwrap();
    conn.recv_request().await.unwrap();
    let mut events = subscribe(&transport, &mut conn, "ep1", "EndOfStream", "sub1").await;

    timeout(WAIT, transport.stop()).await.unwrap();

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, Error::Teardown));
    conn.wait_closed().await.unwrap();

    assert_eq!(transport.state(), ConnectionState::Closed);
    assert_eq!(transport.pending_calls(), 0);
    assert_eq!(transport.subscription_count(), 0);
    assert!(timeout(WAIT, events.recv()).await.unwrap().is_none());

    assert!(matches!(
        transport.create("MediaPipeline", json!({})).await,
        Err(Error::Teardown)
    ));
}

#[tokio::test]
async fn test_dropping_last_handle_shuts_down() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let mut states = transport.state_changes();
    drop(transport);

    conn.wait_closed().await.unwrap();
    let state = *timeout(WAIT, states.wait_for(|state| state.is_terminal()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ConnectionState::Closed);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let mut events = subscribe(&transport, &mut conn, "ep1", "EndOfStream", "sub1").await;

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .unsubscribe(&SubscriptionId::from("sub1"))
            .await
    });
    let request = conn.recv_request().await.unwrap();
    assert_eq!(request.method, "unsubscribe");
    assert_eq!(request.param("subscription"), "sub1");
    assert_eq!(request.param("object"), "ep1");
    conn.reply(&request, json!({})).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    assert_eq!(transport.subscription_count(), 0);
    conn.push_event("ep1", "EndOfStream", json!({})).await.unwrap();
    assert!(timeout(WAIT, events.recv()).await.unwrap().is_none());

    transport.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_unknown_sends_nothing() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    timeout(WAIT, transport.unsubscribe(&SubscriptionId::from("nope")))
        .await
        .unwrap()
        .unwrap();
    assert!(conn.recv_request_within(QUIET).await.unwrap().is_none());

    transport.stop().await;
}

#[tokio::test]
async fn test_subscription_survives_reconnect() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let mut events = subscribe(&transport, &mut conn, "ep1", "EndOfStream", "sub1").await;
    conn.drop_abruptly();

    let mut conn = server.accept().await.unwrap();
    conn.push_event("ep1", "EndOfStream", json!({})).await.unwrap();

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.object, ObjectId::from("ep1"));
    assert_eq!(transport.subscription_count(), 1);

    transport.stop().await;
}

#[tokio::test]
async fn test_retries_exhausted() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = RpcTransport::builder()
        .url(format!("ws://127.0.0.1:{port}/kurento"))
        .reconnect_policy(ReconnectPolicy::immediate().with_max_attempts(3))
        .build()
        .unwrap();

    let err = timeout(
        WAIT,
        transport.invoke(&ObjectId::from("ep1"), "play", json!({})),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(transport.state(), ConnectionState::Failed);

    // Later calls fail immediately with the same cause.
    assert!(matches!(
        transport.send_request(Method::Release, json!({"object": "ep1"})),
        Err(Error::Connection(ConnectionError::RetriesExhausted { .. }))
    ));
    assert!(transport.connect().await.is_err());
}

#[tokio::test]
async fn test_connections_dropped_on_accept_count_as_failures() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "play", json!({}))
            .await
    });

    for _ in 0..3 {
        let conn = timeout(WAIT, server.accept()).await.unwrap().unwrap();
        conn.drop_abruptly();
    }

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(transport.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_stop_releases_handlers_holding_the_transport() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let marker = Arc::new(());
    let held = (transport.clone(), Arc::clone(&marker));
    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .subscribe(
                &ObjectId::from("webrtc1"),
                "IceCandidateFound",
                move |_event: Event| {
                    let _ = &held;
                },
            )
            .await
    });

    let request = conn.recv_request().await.unwrap();
    conn.reply_value(&request, json!("sub1")).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);

    timeout(WAIT, transport.stop()).await.unwrap();
    conn.wait_closed().await.unwrap();

    timeout(WAIT, async {
        while Arc::strong_count(&marker) > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unroutable_frames_are_discarded() {
    let (mut server, transport) = setup().await;

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "getUri", json!({}))
            .await
    });

    let mut conn = server.accept().await.unwrap();
    let request = conn.recv_request().await.unwrap();

    conn.push_event("ghost", "EndOfStream", json!({})).await.unwrap();
    conn.send_raw("not json").await.unwrap();
    conn.send_raw(r#"{"jsonrpc":"2.0","something":"else"}"#)
        .await
        .unwrap();
    conn.send_raw(r#"{"jsonrpc":"2.0","id":"unknown-call","result":{"value":1}}"#)
        .await
        .unwrap();
    conn.reply_value(&request, json!("file:///tmp/a.webm"))
        .await
        .unwrap();

    let uri = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(uri, json!("file:///tmp/a.webm"));
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.stop().await;
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let (tx, mut events) = mpsc::unbounded_channel();
    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .subscribe(&ObjectId::from("ep1"), "CodeFound", move |event: Event| {
                assert_ne!(event.value["data"]["n"], 0, "handler failure");
                let _ = tx.send(event);
            })
            .await
    });
    let request = conn.recv_request().await.unwrap();
    conn.reply_value(&request, json!("sub1")).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    conn.push_event("ep1", "CodeFound", json!({"n": 0})).await.unwrap();
    conn.push_event("ep1", "CodeFound", json!({"n": 1})).await.unwrap();

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.value["data"]["n"], 1);

    // The dispatcher keeps routing replies.
    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .invoke(&ObjectId::from("ep1"), "getUri", json!({}))
            .await
    });
    let request = conn.recv_request().await.unwrap();
    conn.reply_value(&request, json!("uri")).await.unwrap();
    assert_eq!(
        timeout(WAIT, call).await.unwrap().unwrap().unwrap(),
        json!("uri")
    );

    transport.stop().await;
}

#[tokio::test]
async fn test_call_timeout_purges_entry() {
    let (mut server, transport) = setup().await;
    transport.connect().await.unwrap();
    let mut conn = server.accept().await.unwrap();

    let client = transport.clone();
    let call = tokio::spawn(async move {
        client
            .rpc_with_options(
                Method::Invoke,
                json!({"object": "ep1", "operation": "play", "operationParams": {}}),
                RequestOptions::with_timeout(Duration::from_millis(100)),
            )
            .await
    });
    let request = conn.recv_request().await.unwrap();

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(transport.pending_calls(), 0);

    // The late reply is dropped and the connection keeps working.
    conn.reply_value(&request, json!(null)).await.unwrap();
    let client = transport.clone();
    let call = tokio::spawn(async move { client.release(&ObjectId::from("ep1")).await });
    let request = conn.recv_request().await.unwrap();
    conn.reply(&request, json!({})).await.unwrap();
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    transport.stop().await;
}

#[tokio::test]
async fn test_invalid_params_rejected_locally() {
    let (mut server, transport) = setup().await;

    let err = transport
        .invoke(&ObjectId::from("ep1"), "play", json!([1, 2]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParams(_)));

    // Nothing was sent, so nothing connected.
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(timeout(QUIET, server.accept()).await.is_err());
}
