use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::StreamExt;
use linkrpc::{ws::Connection, ErrorCode, RequestInfo};
use linkrpc_client::*;
use serde_json::{json, Value};

mod utils;
use utils::*;

/// Wires every socket the link opens to an in-process [`Connection`].
fn ws_link(server: &Server, connections: Arc<Mutex<Vec<Connection<()>>>>) -> WsLink {
    let handler = server.ws.clone();
    WsLink::new(move || {
        let (handler, connections) = (handler.clone(), connections.clone());
        async move {
            let (link_end, socket) = WsChannel::pair();
            let WsChannel {
                sender,
                mut receiver,
            } = socket;
            let conn = handler.connection(RequestInfo::default(), sender);
            connections.lock().unwrap().push(conn.clone());

            tokio::spawn(async move {
                while let Some(text) = receiver.recv().await {
                    tokio::spawn(conn.handle_message(&text));
                }
                conn.close();
            });
            Ok(link_end)
        }
    })
}

async fn eventually(f: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn test_ws_query_and_mutation() {
    let server = Server::new();
    let connections = Arc::default();
    let link = ws_link(&server, connections);
    let client: Client = Client::new(Chain::new().link(link.clone()));

    assert!(!link.is_connected());
    let out: Value = client.query("greet", json!({ "name": "a" })).await.unwrap();
    assert_eq!(out, json!({ "message": "Hello a" }));
    assert!(link.is_connected());

    let out: Value = client.mutation("echo", json!([1, 2])).await.unwrap();
    assert_eq!(out, json!([1, 2]));

    let err = client.query::<Value>("forbidden", ()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn test_ws_concurrent_calls_share_one_socket() {
    let server = Server::new();
    let connections: Arc<Mutex<Vec<_>>> = Arc::default();
    let client: Client = Client::new(Chain::new().link(ws_link(&server, connections.clone())));

    let results = futures::future::join_all(
        (0..4).map(|i| client.query::<u64>("slow", 10 * (4 - i))),
    )
    .await;
    let results: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, [40, 30, 20, 10]);
    assert_eq!(connections.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ws_clients_with_overlapping_operation_ids_share_a_socket() {
    let server = Server::new();
    let connections: Arc<Mutex<Vec<_>>> = Arc::default();
    let link = ws_link(&server, connections.clone());
    // Both clients number their operations from 1.
    let a: Client = Client::new(Chain::new().link(link.clone()));
    let b: Client = Client::new(Chain::new().link(link));

    let (x, y) = tokio::join!(a.query::<u64>("slow", 30), b.query::<u64>("slow", 10));
    assert_eq!(x.unwrap(), 30);
    assert_eq!(y.unwrap(), 10);
    assert_eq!(connections.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ws_subscription_completes() {
    let server = Server::new();
    let client: Client = Client::new(Chain::new().link(ws_link(&server, Arc::default())));

    let items: Vec<u32> = client
        .subscription::<u32>("countdown", 3)
        .into_stream()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(items, [3, 2, 1]);
}

#[tokio::test]
async fn test_ws_unsubscribe_stops_server_subscription() {
    let server = Server::new();
    let connections: Arc<Mutex<Vec<Connection<()>>>> = Arc::default();
    let client: Client = Client::new(Chain::new().link(ws_link(&server, connections.clone())));

    let mut ticks = client.subscription::<u32>("ticks", ()).into_stream();
    assert_eq!(ticks.next().await.unwrap().unwrap(), 1);
    assert_eq!(ticks.next().await.unwrap().unwrap(), 2);

    let conn = connections.lock().unwrap()[0].clone();
    assert_eq!(conn.active_subscriptions(), 1);

    drop(ticks);
    eventually(|| conn.active_subscriptions() == 0).await;
}

#[tokio::test]
async fn test_ws_subscription_error() {
    let server = Server::new();
    let client: Client = Client::new(Chain::new().link(ws_link(&server, Arc::default())));

    let items: Vec<_> = client
        .subscription::<u32>("greet", json!({ "name": "a" }))
        .into_stream()
        .collect()
        .await;
    match items.as_slice() {
        [Err(err)] => assert_eq!(err.code(), ErrorCode::MethodNotSupported),
        other => panic!("unexpected items: {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_disconnect_fails_pending_and_reconnects() {
    let sockets: Arc<Mutex<Vec<WsChannel>>> = Arc::default();
    let s = sockets.clone();
    let link = WsLink::new(move || {
        let sockets = s.clone();
        async move {
            let (link_end, socket) = WsChannel::pair();
            sockets.lock().unwrap().push(socket);
            Ok(link_end)
        }
    });
    let client: Client = Client::new(Chain::new().link(link.clone()));

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.query::<Value>("greet", json!({ "name": "a" })).await }
    });
    let subscription = client
        .subscription::<u32>("ticks", ())
        .into_stream()
        .collect::<Vec<_>>();
    let subscription = tokio::spawn(subscription);

    eventually(|| {
        let mut sockets = sockets.lock().unwrap();
        let Some(socket) = sockets.first_mut() else {
            return false;
        };
        socket.receiver.len() == 2
    })
    .await;

    // The server goes away without answering.
    sockets.lock().unwrap().clear();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
    let items = subscription.await.unwrap();
    assert!(matches!(items.as_slice(), [Err(ClientError::ConnectionClosed)]));
    eventually(|| !link.is_connected()).await;

    // The next call opens a new socket.
    let next = tokio::spawn({
        let client = client.clone();
        async move { client.query::<Value>("greet", ()).await }
    });
    eventually(|| {
        let sockets = sockets.lock().unwrap();
        sockets.first().is_some_and(|socket| socket.receiver.len() == 1)
    })
    .await;
    link.close();
    assert!(matches!(
        next.await.unwrap().unwrap_err(),
        ClientError::ConnectionClosed
    ));
}

#[tokio::test]
async fn test_split_subscriptions_to_ws() {
    let server = Server::new();
    let client: Client = Client::new(Chain::new().link(LoggerLink).link(SplitLink::subscriptions(
        Chain::new().link(ws_link(&server, Arc::default())),
        Chain::new().link(HttpBatchLink::new(BASE, server.fetch())),
    )));

    let out: Value = client.query("greet", json!({ "name": "a" })).await.unwrap();
    assert_eq!(out, json!({ "message": "Hello a" }));
    assert_eq!(server.requests(), 1);

    let items: Vec<u32> = client
        .subscription::<u32>("countdown", 2)
        .into_stream()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(items, [2, 1]);
    assert_eq!(server.requests(), 1);
}
