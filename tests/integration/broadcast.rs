//! End-to-end broadcast fan-out across sessions.
//!
//! # Coverage
//! - A channel invoked from an action handler fans out to every current
//!   subscriber and to nobody else.
//! - Per-session FIFO ordering of deliveries.
//! - A closed session is removed from every subscriber set; later
//!   broadcasts cannot reach it and do not disturb the others.
//! - Handlers returning nothing suppress the frame per subscriber.

use sa_protocol::{ActionStatus, ClientFrame, Payload, ServerFrame};
use sa_test_utils::MockWsClient;
use serde_json::{json, Value};
use socketapi::{App, Config, Endpoint, HandlerError, ParamSpec, ParamType, SocketApi};
use std::time::Duration;

fn data(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {:?}", other),
    }
}

fn build_app() -> App {
    let mut api = SocketApi::new(Config::default());

    api.register(
        Endpoint::channel("chat")
            .param(ParamSpec::value("message", ParamType::String))
            .handler(|args, _ctx| async move {
                Ok(Some(json!({ "message": args.require_str("message")? })))
            })
            .expect("chat should compile"),
    )
    .expect("register chat");

    api.register(
        Endpoint::channel("quiet")
            .handler(|_args, _ctx| async { Ok(None) })
            .expect("quiet should compile"),
    )
    .expect("register quiet");

    api.register(
        Endpoint::action("send")
            .param(ParamSpec::value("text", ParamType::String))
            .handler(|args, ctx| async move {
                let mut payload = Payload::new();
                payload.insert("message".to_owned(), json!(args.require_str("text")?));
                ctx.broadcast("chat", payload)
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                Ok(None)
            })
            .expect("send should compile"),
    )
    .expect("register send");

    api.register(
        Endpoint::action("hush")
            .handler(|_args, ctx| async move {
                ctx.broadcast("quiet", Payload::new())
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                Ok(None)
            })
            .expect("hush should compile"),
    )
    .expect("register hush");

    api.build()
}

async fn start_app(app: App) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind server");
    let addr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .expect("server error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

async fn connect(addr: std::net::SocketAddr) -> MockWsClient {
    MockWsClient::connect(&format!("ws://{}/ws", addr))
        .await
        .expect("client should connect")
}

async fn subscribe(client: &mut MockWsClient, channel: &str) {
    client
        .send_frame(&ClientFrame::Subscribe {
            channel: channel.to_owned(),
            data: Payload::new(),
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv_frame().await.unwrap(),
        ServerFrame::Subscribed { .. }
    ));
}

#[tokio::test]
async fn action_triggered_broadcast_reaches_every_subscriber() {
    let addr = start_app(build_app()).await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    let mut caller = connect(addr).await;

    subscribe(&mut first, "chat").await;
    subscribe(&mut second, "chat").await;

    caller
        .send_frame(&ClientFrame::Action {
            channel: "send".to_owned(),
            data: data(json!({"text": "hi"})),
        })
        .await
        .unwrap();

    // The caller gets its action response, without data.
    assert_eq!(
        caller.recv_frame().await.unwrap(),
        ServerFrame::Action {
            channel: "send".to_owned(),
            status: ActionStatus::Completed,
            data: None,
        }
    );
    // The caller is not subscribed, so no data frame reaches it.
    assert!(caller
        .recv_frame_timeout(Duration::from_millis(150))
        .await
        .unwrap()
        .is_none());

    for subscriber in [&mut first, &mut second] {
        assert_eq!(
            subscriber.recv_frame().await.unwrap(),
            ServerFrame::Data {
                channel: "chat".to_owned(),
                data: json!({"message": "hi"}),
            }
        );
    }
}

#[tokio::test]
async fn broadcasts_arrive_in_engine_processing_order() {
    let addr = start_app(build_app()).await;
    let mut subscriber = connect(addr).await;
    let mut caller = connect(addr).await;

    subscribe(&mut subscriber, "chat").await;

    for n in 0..4 {
        caller
            .send_frame(&ClientFrame::Action {
                channel: "send".to_owned(),
                data: data(json!({"text": format!("m{}", n)})),
            })
            .await
            .unwrap();
        assert!(matches!(
            caller.recv_frame().await.unwrap(),
            ServerFrame::Action { .. }
        ));
    }

    for n in 0..4 {
        assert_eq!(
            subscriber.recv_frame().await.unwrap(),
            ServerFrame::Data {
                channel: "chat".to_owned(),
                data: json!({"message": format!("m{}", n)}),
            }
        );
    }
}

#[tokio::test]
async fn closed_sessions_are_detached_from_every_channel() {
    let addr = start_app(build_app()).await;
    let mut staying = connect(addr).await;
    let mut leaving = connect(addr).await;
    let mut caller = connect(addr).await;

    subscribe(&mut staying, "chat").await;
    subscribe(&mut leaving, "chat").await;

    leaving.close().await.unwrap();
    // Let the server notice the close and detach the session.
    tokio::time::sleep(Duration::from_millis(50)).await;

    caller
        .send_frame(&ClientFrame::Action {
            channel: "send".to_owned(),
            data: data(json!({"text": "after-close"})),
        })
        .await
        .unwrap();
    assert!(matches!(
        caller.recv_frame().await.unwrap(),
        ServerFrame::Action { .. }
    ));

    // The remaining subscriber receives exactly one delivery.
    assert_eq!(
        staying.recv_frame().await.unwrap(),
        ServerFrame::Data {
            channel: "chat".to_owned(),
            data: json!({"message": "after-close"}),
        }
    );
    assert!(staying
        .recv_frame_timeout(Duration::from_millis(150))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn handler_returning_nothing_suppresses_delivery() {
    let addr = start_app(build_app()).await;
    let mut subscriber = connect(addr).await;
    let mut caller = connect(addr).await;

    subscribe(&mut subscriber, "quiet").await;

    caller
        .send_frame(&ClientFrame::Action {
            channel: "hush".to_owned(),
            data: Payload::new(),
        })
        .await
        .unwrap();
    assert!(matches!(
        caller.recv_frame().await.unwrap(),
        ServerFrame::Action { .. }
    ));

    assert!(subscriber
        .recv_frame_timeout(Duration::from_millis(150))
        .await
        .unwrap()
        .is_none());
}
