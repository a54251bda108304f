//! The patchbay WebSocket: a many-subscriber broker for graph changes.
//!
//! Subscribers authenticate with a `?token=` query parameter. On connect
//! they receive a full graph snapshot; afterwards the broker pushes
//! incremental edge frames for every successful connect or disconnect, and
//! fresh snapshots whenever rooms change or the periodic refresh fires.
//!
//! Each subscriber gets a bounded channel. A subscriber that cannot keep up
//! overflows its backlog and is dropped, so one slow client never blocks
//! the rest.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use jamhub_hub::{authorize, Action, GraphChange, HubEvent, SessionData};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::timeout};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    serialized::{Graph, ToSerialized},
};

/// Frames queued per subscriber before it counts as too slow
const SUBSCRIBER_BACKLOG: usize = 64;
/// How long a single socket write may stall before the peer is dropped
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Cadence of the coalesced full-snapshot refresh
const REFRESH_INTERVAL: Duration = Duration::from_secs(15);

type Outgoing = SplitSink<WebSocket, Message>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Full graph snapshot; subscribers reconcile from this
    Graph { data: Graph },
    Connected { source: String, dest: String },
    Disconnected { source: String, dest: String },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Connect { source: String, dest: String },
    Disconnect { source: String, dest: String },
    Refresh,
}

/// The set of live patchbay subscribers
pub struct PatchbaySockets {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<OutboundFrame>,
}

impl PatchbaySockets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Sends a frame to every subscriber. Subscribers whose backlog is full
    /// are dropped rather than awaited.
    pub fn broadcast(&self, frame: OutboundFrame) {
        let targets: Vec<_> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        let mut dropped = Vec::new();

        for (id, tx) in targets {
            if tx.try_send(frame.clone()).is_err() {
                dropped.push(id);
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|s| !dropped.contains(&s.id));
            warn!("Dropped {} slow patchbay subscriber(s)", dropped.len());
        }
    }

    fn subscribe(&self) -> (u64, mpsc::Receiver<OutboundFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BACKLOG);

        self.subscribers.lock().push(Subscriber { id, tx });

        (id, rx)
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PatchbayAuth {
    token: String,
}

/// `GET /ws/patchbay?token=<bearer token>`
pub(crate) async fn patchbay_ws(
    context: ServerContext,
    Query(auth): Query<PatchbayAuth>,
    ws: WebSocketUpgrade,
) -> ServerResult<Response> {
    let session = context
        .hub
        .auth
        .session(&auth.token)
        .await
        .map_err(|_| ServerError::InvalidToken)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, context, session)))
}

async fn handle_socket(socket: WebSocket, context: ServerContext, session: SessionData) {
    let (mut outgoing, mut incoming) = socket.split();

    // Every subscriber starts from a full snapshot
    match context.hub.patchbay().snapshot().await {
        Ok(snapshot) => {
            let frame = OutboundFrame::Graph {
                data: snapshot.to_serialized(),
            };

            if send_frame(&mut outgoing, &frame).await.is_err() {
                return;
            }
        }
        Err(e) => warn!("Could not send initial graph snapshot: {e}"),
    }

    let (id, mut rx) = context.sockets.subscribe();
    info!("Patchbay subscriber connected: {}", session.user.username);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if send_frame(&mut outgoing, &frame).await.is_err() {
                        break;
                    }
                }
                // The broker dropped us as a slow subscriber
                None => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_frame(&context, &session, text.as_str()).await {
                        if send_frame(&mut outgoing, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    context.sockets.unsubscribe(id);
    info!("Patchbay subscriber disconnected: {}", session.user.username);
}

/// Handles one inbound message. Returns a frame to send back to this
/// subscriber only; successful mutations reach everyone through the
/// event pump instead.
async fn handle_client_frame(
    context: &ServerContext,
    session: &SessionData,
    text: &str,
) -> Option<OutboundFrame> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(OutboundFrame::Error {
                message: format!("malformed message: {e}"),
            })
        }
    };

    match frame {
        ClientFrame::Refresh => match context.hub.patchbay().snapshot().await {
            Ok(snapshot) => Some(OutboundFrame::Graph {
                data: snapshot.to_serialized(),
            }),
            Err(e) => Some(OutboundFrame::Error {
                message: e.to_string(),
            }),
        },
        ClientFrame::Connect { source, dest } => {
            if let Some(error) = check_patch_access(context, session).await {
                return Some(error);
            }

            match context.hub.patchbay().connect(&source, &dest).await {
                Ok(()) => None,
                Err(e) => Some(OutboundFrame::Error {
                    message: e.to_string(),
                }),
            }
        }
        ClientFrame::Disconnect { source, dest } => {
            if let Some(error) = check_patch_access(context, session).await {
                return Some(error);
            }

            match context.hub.patchbay().disconnect(&source, &dest).await {
                Ok(()) => None,
                Err(e) => Some(OutboundFrame::Error {
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Re-resolves the session so that a revoked patchbay grant takes effect on
/// the very next mutation, without closing the socket.
async fn check_patch_access(
    context: &ServerContext,
    session: &SessionData,
) -> Option<OutboundFrame> {
    let user = match context.hub.auth.session(&session.token).await {
        Ok(session) => session.user,
        Err(_) => {
            return Some(OutboundFrame::Error {
                message: "session is no longer valid".to_string(),
            })
        }
    };

    authorize(&user, Action::MutateGraph)
        .err()
        .map(|e| OutboundFrame::Error {
            message: e.to_string(),
        })
}

async fn send_frame(outgoing: &mut Outgoing, frame: &OutboundFrame) -> Result<(), ()> {
    let json = serde_json::to_string(frame).expect("serializes properly");

    match timeout(SEND_TIMEOUT, outgoing.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}

/// Forwards hub events to the subscriber set for the lifetime of the server.
///
/// Edge changes go out as increments; room changes and the periodic refresh
/// go out as full snapshots, which also covers graph changes the hub did not
/// itself cause.
pub(crate) async fn run_event_pump(context: ServerContext) {
    let mut events = context.hub.subscribe();
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(HubEvent::GraphChanged { change }) => {
                    let frame = match change {
                        GraphChange::Connected { source, dest } => {
                            OutboundFrame::Connected { source, dest }
                        }
                        GraphChange::Disconnected { source, dest } => {
                            OutboundFrame::Disconnected { source, dest }
                        }
                    };

                    context.sockets.broadcast(frame);
                }
                Ok(_) => broadcast_snapshot(&context).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = refresh.tick() => broadcast_snapshot(&context).await,
        }
    }
}

async fn broadcast_snapshot(context: &ServerContext) {
    if context.sockets.subscriber_count() == 0 {
        return;
    }

    match context.hub.patchbay().snapshot().await {
        Ok(snapshot) => context.sockets.broadcast(OutboundFrame::Graph {
            data: snapshot.to_serialized(),
        }),
        Err(e) => warn!("Could not refresh graph snapshot: {e}"),
    }
}
