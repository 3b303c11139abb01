//! Mounting the framework inside a host axum application.
//!
//! Nothing in the core assumes sole ownership of the HTTP server: the
//! WebSocket route and the ingress route are plain axum routes and work
//! nested under a host router's prefix.

use sa_protocol::{ActionStatus, ClientFrame, Payload, ServerFrame};
use sa_test_utils::MockWsClient;
use serde_json::{json, Value};
use socketapi::{App, Config, Endpoint, ParamSpec, ParamType, SocketApi};
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
        Endpoint::action("add")
            .param(ParamSpec::value("a", ParamType::Integer))
            .param(ParamSpec::value("b", ParamType::Integer))
            .handler(|args, _ctx| async move {
                Ok(Some(json!(args.require_i64("a")? + args.require_i64("b")?)))
            })
            .expect("add should compile"),
    )
    .expect("register add");
    api.register(
        Endpoint::channel("chat")
            .param(ParamSpec::value("message", ParamType::String))
            .handler(|args, _ctx| async move {
                Ok(Some(json!({ "message": args.require_str("message")? })))
            })
            .expect("chat should compile"),
    )
    .expect("register chat");
    api.build()
}

#[tokio::test]
async fn endpoints_from_an_included_router_serve_identically() {
    // Registering through a merged router fragment must be
    // indistinguishable from registering on the app directly.
    let mut fragment = socketapi::Router::new();
    fragment
        .register(
            Endpoint::action("mul")
                .param(ParamSpec::value("a", ParamType::Integer))
                .param(ParamSpec::value("b", ParamType::Integer))
                .handler(|args, _ctx| async move {
                    Ok(Some(json!(args.require_i64("a")? * args.require_i64("b")?)))
                })
                .expect("mul should compile"),
        )
        .expect("register mul");

    let mut api = SocketApi::new(Config::default());
    api.include_router(fragment).expect("merge should succeed");
    let app = api.build();

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

    let mut client = MockWsClient::connect(&format!("ws://{}/ws", addr))
        .await
        .expect("client should connect");
    client
        .send_frame(&ClientFrame::Action {
            channel: "mul".to_owned(),
            data: data(json!({"a": 6, "b": 7})),
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_frame().await.unwrap(),
        ServerFrame::Action {
            channel: "mul".to_owned(),
            status: ActionStatus::Completed,
            data: Some(json!(42)),
        }
    );
}

#[tokio::test]
async fn routes_work_nested_under_a_host_router_prefix() {
    let host = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/rt", build_app().router());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            host.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .expect("server error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The host's own routes are untouched.
    let health = reqwest::get(format!("http://{}/healthz", addr))
        .await
        .expect("health request");
    assert_eq!(health.status().as_u16(), 200);

    // WebSocket route under the prefix.
    let mut client = MockWsClient::connect(&format!("ws://{}/rt/ws", addr))
        .await
        .expect("client should connect");
    client
        .send_frame(&ClientFrame::Subscribe {
            channel: "chat".to_owned(),
            data: Payload::new(),
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv_frame().await.unwrap(),
        ServerFrame::Subscribed { .. }
    ));

    client
        .send_frame(&ClientFrame::Action {
            channel: "add".to_owned(),
            data: data(json!({"a": 2, "b": 3})),
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_frame().await.unwrap(),
        ServerFrame::Action {
            channel: "add".to_owned(),
            status: ActionStatus::Completed,
            data: Some(json!(5)),
        }
    );

    // Ingress route under the prefix.
    let response = reqwest::Client::new()
        .post(format!("http://{}/rt/broadcast", addr))
        .json(&json!({"channel": "chat", "data": {"message": "nested"}}))
        .send()
        .await
        .expect("post should succeed");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        client.recv_frame().await.unwrap(),
        ServerFrame::Data {
            channel: "chat".to_owned(),
            data: json!({"message": "nested"}),
        }
    );
}
