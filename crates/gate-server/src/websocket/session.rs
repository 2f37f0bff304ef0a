//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gate_core::{Connection, Dispatcher, TransportKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Delivery};
use super::handler::handle_message;
use super::manager::ConnectionManager;

/// Everything a session needs from the gateway.
#[derive(Clone)]
pub struct WsContext {
    /// Live session table.
    pub manager: Arc<ConnectionManager>,
    /// Action dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Gateway-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Tracker joined on shutdown.
    pub tracker: TaskTracker,
    /// Outbound queue capacity per session.
    pub queue_size: usize,
    /// Upgrade route, used as the dispatch locator.
    pub route: String,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the session in the connection table
/// 2. Spawns the write worker that drains the outbound queue
/// 3. Reads frames and dispatches envelopes until close, error, or shutdown
/// 4. Removes the session, which closes the queue and ends the write worker
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(socket: WebSocket, peer: String, ctx: WsContext) {
    let (ws_tx, ws_rx) = socket.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(ctx.queue_size.max(1));
    let conn = Connection::new(TransportKind::WebSocket, peer);
    let client = Arc::new(ClientConnection::new(conn, send_tx, ctx.shutdown.child_token()));
    let _ = tracing::Span::current().record("conn_id", client.id());

    info!(peer = %client.connection().identifier, "client connected");
    ctx.manager.insert(Arc::clone(&client));

    let writer = ctx
        .tracker
        .spawn(write_loop(ws_tx, send_rx, client.cancel_token().clone()));

    read_loop(ws_rx, &client, &ctx).await;

    let _ = ctx.manager.remove(client.id());
    if writer.await.is_err() {
        warn!("write worker panicked");
    }
    info!("client disconnected");
}

async fn read_loop(mut ws_rx: SplitStream<WebSocket>, client: &ClientConnection, ctx: &WsContext) {
    let cancel = client.cancel_token();
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = ws_rx.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                debug!("client closed the socket");
                break;
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(len = data.len(), "ignoring binary frame");
                continue;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
        };

        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            reply = handle_message(text.as_str(), client.connection(), &ctx.dispatcher, &ctx.route) => reply,
        };
        let json = match reply.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize reply");
                continue;
            }
        };
        match client.send(Arc::from(json)) {
            Delivery::Queued => {}
            Delivery::Full => warn!("outbound queue full, reply dropped"),
            Delivery::Closed => break,
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server closing connection".into(),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }
            msg = send_rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(Message::Text(text.as_ref().into())).await.is_err() {
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = ws_tx.close().await;
}
