use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::request::Parts,
    routing::{get, MethodRouter},
};
use futures::{SinkExt, StreamExt};
use linkrpc::{ws::WsHandler, RequestInfo};
use tokio::sync::mpsc;

use crate::endpoint::request_info;

pub(crate) fn route<TCtx, S>(handler: WsHandler<TCtx>) -> MethodRouter<S>
where
    TCtx: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    get(move |parts: Parts, ws: WebSocketUpgrade| {
        let handler = handler.clone();
        async move {
            let info = request_info(&parts);
            ws.on_upgrade(move |socket| handle_socket(handler, info, socket))
        }
    })
}

async fn handle_socket<TCtx>(handler: WsHandler<TCtx>, info: RequestInfo, socket: WebSocket)
where
    TCtx: Clone + Send + Sync + 'static,
{
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = handler.connection(info, tx);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(_err) = sink.send(Message::Text(text)).await {
                #[cfg(feature = "tracing")]
                tracing::debug!("failed to write websocket frame: {_err}");
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            // Registration happens inside `handle_message`, the rest runs concurrently.
            Ok(Message::Text(text)) => {
                tokio::spawn(conn.handle_message(&text));
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    tokio::spawn(conn.handle_message(&text));
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("ignoring non UTF-8 websocket frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("websocket closed with error: {_err}");
                break;
            }
        }
    }

    conn.close();
    writer.abort();
}
