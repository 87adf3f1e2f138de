mod common;

use std::sync::Arc;

use common::{
    config, expect_close, http_url, next_text, panicking_handler, start_gateway, wait_for_open,
    wait_until, ws_connect,
};
use futures_util::SinkExt;
use lambda_dev_gateway::config::FunctionConfig;
use lambda_dev_gateway::invocation::HandlerError;
use lambda_dev_gateway::{handler_fn, StaticHandlerLoader};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Handlers that reply with the route key and body they received.
fn routing_loader() -> StaticHandlerLoader {
    let reply = |label: &'static str| {
        handler_fn(move |event, _ctx| async move {
            let event = event.as_websocket().cloned();
            let (route_key, body) = event
                .map(|e| (e.request_context.route_key, e.body))
                .unwrap_or_default();
            Ok(Some(json!({
                "statusCode": 200,
                "body": json!({ "handler": label, "routeKey": route_key, "body": body }).to_string(),
            })))
        })
    };
    StaticHandlerLoader::new()
        .with_handler("ws/chat.send", reply("send"))
        .with_handler("ws/chat.fallback", reply("default"))
}

fn routing_config() -> lambda_dev_gateway::GatewayConfig {
    let mut cfg = config(vec![
        FunctionConfig::new("send", "ws/chat.send").websocket("sendMessage"),
        FunctionConfig::new("fallback", "ws/chat.fallback").websocket("$default"),
    ]);
    cfg.gateway.websocket_route_responses = true;
    cfg
}

#[tokio::test]
async fn rejected_connect_closes_with_policy_violation() {
    let loader = StaticHandlerLoader::new().with_handler(
        "ws/auth.connect",
        handler_fn(|_event, _ctx| async { Ok(Some(json!({ "statusCode": 403 }))) }),
    );
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("auth", "ws/auth.connect").websocket("$connect")
        ]),
        Arc::new(loader),
    )
    .await;

    let mut client = ws_connect(&gateway, "/").await;
    let (code, _reason) = expect_close(&mut client).await;
    assert_eq!(code, 1008);

    let registry = gateway.connections().clone();
    wait_until(|| registry.is_empty()).await;

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn failing_connect_closes_with_internal_error() {
    let loader = StaticHandlerLoader::new().with_handler(
        "ws/auth.connect",
        handler_fn(|_event, _ctx| async { Err(HandlerError::new("authorizer crashed")) }),
    );
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("auth", "ws/auth.connect").websocket("$connect")
        ]),
        Arc::new(loader),
    )
    .await;

    let mut client = ws_connect(&gateway, "/").await;
    let (code, _reason) = expect_close(&mut client).await;
    assert_eq!(code, 1011);

    let registry = gateway.connections().clone();
    wait_until(|| registry.is_empty()).await;

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn unresolvable_connect_handler_closes_with_internal_error() {
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("auth", "ws/missing.connect").websocket("$connect")
        ]),
        Arc::new(StaticHandlerLoader::new()),
    )
    .await;

    let mut client = ws_connect(&gateway, "/").await;
    let (code, _reason) = expect_close(&mut client).await;
    assert_eq!(code, 1011);

    let registry = gateway.connections().clone();
    wait_until(|| registry.is_empty()).await;

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn panicking_connect_closes_with_internal_error() {
    let loader = StaticHandlerLoader::new().with_handler("ws/auth.connect", panicking_handler());
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("auth", "ws/auth.connect").websocket("$connect")
        ]),
        Arc::new(loader),
    )
    .await;

    let mut client = ws_connect(&gateway, "/").await;
    let (code, _reason) = expect_close(&mut client).await;
    assert_eq!(code, 1011);

    let registry = gateway.connections().clone();
    wait_until(|| registry.is_empty()).await;

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn accepted_connect_sees_upgrade_request() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let loader = StaticHandlerLoader::new().with_handler(
        "ws/auth.connect",
        handler_fn(move |event, _ctx| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(serde_json::to_value(&event)?);
                Ok(None)
            }
        }),
    );
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("auth", "ws/auth.connect").websocket("$connect")
        ]),
        Arc::new(loader),
    )
    .await;

    let _client = ws_connect(&gateway, "/chat?token=abc").await;
    let ids = wait_for_open(&gateway, 1).await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event["requestContext"]["eventType"], "CONNECT");
    assert_eq!(event["requestContext"]["routeKey"], "$connect");
    assert_eq!(event["requestContext"]["connectionId"], ids[0].as_str());
    assert_eq!(event["queryStringParameters"]["token"], "abc");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn frames_are_routed_by_action() {
    let gateway = start_gateway(routing_config(), Arc::new(routing_loader())).await;
    let mut client = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 1).await;

    client
        .send(Message::text(r#"{"action":"sendMessage","text":"hi"}"#))
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(reply["handler"], "send");
    assert_eq!(reply["routeKey"], "sendMessage");
    assert_eq!(reply["body"], r#"{"action":"sendMessage","text":"hi"}"#);

    client.send(Message::text("plain text")).await.unwrap();
    let reply: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(reply["handler"], "default");
    assert_eq!(reply["routeKey"], "$default");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn unbound_action_is_ignored() {
    let gateway = start_gateway(routing_config(), Arc::new(routing_loader())).await;
    let mut client = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 1).await;

    client
        .send(Message::text(r#"{"action":"nobodyHome"}"#))
        .await
        .unwrap();
    client.send(Message::text("after")).await.unwrap();

    let reply: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(reply["handler"], "default");
    assert_eq!(reply["body"], "after");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn panicking_route_drops_only_that_message() {
    let loader = routing_loader().with_handler("ws/chat.fallback", panicking_handler());
    let gateway = start_gateway(routing_config(), Arc::new(loader)).await;
    let mut client = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 1).await;

    client.send(Message::text("crash please")).await.unwrap();
    client
        .send(Message::text(r#"{"action":"sendMessage","text":"still here"}"#))
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(reply["handler"], "send");

    client.close(None).await.unwrap();
    let registry = gateway.connections().clone();
    wait_until(|| registry.is_empty()).await;

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn messages_are_handled_in_arrival_order() {
    let gateway = start_gateway(routing_config(), Arc::new(routing_loader())).await;
    let mut client = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 1).await;

    for i in 0..10 {
        client.send(Message::text(format!("m{}", i))).await.unwrap();
    }
    for i in 0..10 {
        let reply: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(reply["body"], format!("m{}", i));
    }

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn management_api_drives_connections() {
    let gateway = start_gateway(config(vec![]), Arc::new(StaticHandlerLoader::new())).await;
    let mut client = ws_connect(&gateway, "/").await;
    let ids = wait_for_open(&gateway, 1).await;
    let id = &ids[0];
    let http = reqwest::Client::new();
    let url = http_url(&gateway, &format!("/@connections/{}", id));

    let listed: Value = http
        .get(http_url(&gateway, "/@connections"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["connectionId"], id.as_str());
    assert!(listed[0]["connectedAt"].is_string());

    let response = http.post(&url).body("pushed").send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(next_text(&mut client).await, "pushed");

    let info: Value = http.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(info["connectionId"], id.as_str());
    assert_eq!(info["identity"]["sourceIp"], "127.0.0.1");

    let response = http.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), 204);
    let (code, _reason) = expect_close(&mut client).await;
    assert_eq!(code, 1000);

    assert_eq!(http.delete(&url).send().await.unwrap().status(), 410);
    assert_eq!(http.get(&url).send().await.unwrap().status(), 410);
    assert_eq!(http.post(&url).body("late").send().await.unwrap().status(), 410);

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn broadcast_reaches_every_open_connection() {
    let gateway = start_gateway(config(vec![]), Arc::new(StaticHandlerLoader::new())).await;
    let mut first = ws_connect(&gateway, "/").await;
    let mut second = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 2).await;

    assert_eq!(gateway.connections().broadcast("hello all"), 2);
    assert_eq!(next_text(&mut first).await, "hello all");
    assert_eq!(next_text(&mut second).await, "hello all");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn client_close_dispatches_disconnect() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let loader = StaticHandlerLoader::new().with_handler(
        "ws/chat.gone",
        handler_fn(move |event, _ctx| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(serde_json::to_value(&event)?);
                Ok(None)
            }
        }),
    );
    let gateway = start_gateway(
        config(vec![
            FunctionConfig::new("gone", "ws/chat.gone").websocket("$disconnect")
        ]),
        Arc::new(loader),
    )
    .await;

    let mut client = ws_connect(&gateway, "/").await;
    let ids = wait_for_open(&gateway, 1).await;
    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event["requestContext"]["eventType"], "DISCONNECT");
    assert_eq!(event["requestContext"]["connectionId"], ids[0].as_str());
    assert_eq!(event["requestContext"]["disconnectStatusCode"], 1000);
    assert_eq!(event["requestContext"]["disconnectReason"], "bye");
    assert!(!gateway.connections().contains(&ids[0]));

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_connections_with_going_away() {
    let gateway = start_gateway(config(vec![]), Arc::new(StaticHandlerLoader::new())).await;
    let mut client = ws_connect(&gateway, "/").await;
    wait_for_open(&gateway, 1).await;

    gateway.stop().await.unwrap();

    let (code, reason) = expect_close(&mut client).await;
    assert_eq!(code, 1001);
    assert_eq!(reason, "Server shutting down");
}
