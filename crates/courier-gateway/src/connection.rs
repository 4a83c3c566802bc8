use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use courier_types::events::{ClientCommand, ServerEvent};

use crate::dispatcher::{Dispatcher, Flow};
use crate::session::Session;

/// How long queued events get to flush once the server decides to close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Connections still unauthenticated after this long are closed.
    pub auth_timeout: Duration,
    /// The server sends a Ping this often. Two missed Pongs in a row drop
    /// the connection.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Drive one WebSocket connection from accept to close.
///
/// Inbound frames are handled strictly one after another, so a connection's
/// sends are stored in the order it issued them. Outbound events (own queue,
/// broadcasts, heartbeat) are written by a separate task.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, settings: ConnectionSettings) {
    let (sender, mut receiver) = socket.split();
    let (mut session, outbound_rx) = dispatcher.open_session();
    let socket_id = session.socket_id();
    info!("Connection {} opened", socket_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let mut send_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        dispatcher.subscribe(),
        pong_received.clone(),
        settings.heartbeat_interval,
    ));

    let deadline = Instant::now() + settings.auth_timeout;
    tokio::select! {
        _ = &mut send_task => debug!("Connection {} writer finished first", socket_id),
        _ = read_loop(&dispatcher, &mut session, &mut receiver, &pong_received, deadline) => {}
    }

    dispatcher.disconnect(&mut session);

    // Dropping the session closes the outbound queue; the writer drains what
    // is left, sends Close and exits.
    drop(session);
    if !send_task.is_finished() && tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }

    info!("Connection {} closed", socket_id);
}

async fn read_loop(
    dispatcher: &Dispatcher,
    session: &mut Session,
    receiver: &mut SplitStream<WebSocket>,
    pong_received: &AtomicBool,
    auth_deadline: Instant,
) {
    loop {
        let next = if session.is_authenticated() {
            receiver.next().await
        } else {
            match tokio::time::timeout_at(auth_deadline, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!("Connection {} did not authenticate in time, closing", session.socket_id());
                    return;
                }
            }
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!("Connection {} read error: {}", session.socket_id(), e);
                return;
            }
            None => return,
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) => {
                    trace!("Connection {} <- {}", session.socket_id(), cmd.name());
                    if dispatcher.handle_command(session, cmd).await == Flow::Close {
                        return;
                    }
                }
                Err(e) => {
                    let raw: String = text.chars().take(200).collect();
                    warn!("Connection {} bad command: {} -- raw: {}", session.socket_id(), e, raw);
                }
            },
            Message::Pong(_) => {
                pong_received.store(true, Ordering::Release);
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
    mut broadcast_rx: broadcast::Receiver<ServerEvent>,
    pong_received: Arc<AtomicBool>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        // Own queue first: a presence snapshot must reach the client before
        // any status broadcast published after it.
        let event = tokio::select! {
            biased;

            event = outbound.recv() => match event {
                Some(event) => event,
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            result = broadcast_rx.recv() => match result {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Broadcast receiver lagged by {} messages", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode outbound event: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}
