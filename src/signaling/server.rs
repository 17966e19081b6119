use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::actor::RelayHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnId, OutboundMessage, SignalingError};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

const LIVENESS_BODY: &str = "WebRTC Signaling Server is running";

pub struct SignalingServer {
    listener: TcpListener,
    handle: RelayHandle,
}

impl SignalingServer {
    /// Bind the listener and start the relay actor
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: RelayHandle::spawn(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let app = router(self.handle);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// WebSocket upgrades on `/` and `/ws`, liveness on plain `GET /` and `/health`.
fn router(handle: RelayHandle) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(websocket))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(handle)
}

async fn root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(handle): State<RelayHandle>,
) -> Response {
    match ws {
        Ok(ws) => upgrade(ws, addr, handle),
        Err(_) => LIVENESS_BODY.into_response(),
    }
}

async fn websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(handle): State<RelayHandle>,
) -> Response {
    upgrade(ws, addr, handle)
}

async fn health() -> &'static str {
    LIVENESS_BODY
}

fn upgrade(ws: WebSocketUpgrade, addr: SocketAddr, handle: RelayHandle) -> Response {
    ws.on_failed_upgrade(move |e| warn!("WebSocket upgrade from {} failed: {}", addr, e))
        .on_upgrade(move |socket| handle_socket(socket, addr, handle))
}

/// Pong deadline for the keep-alive; armed by a ping, cleared by a pong.
struct Heartbeat {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Heartbeat {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arms the deadline unless an earlier ping is still unanswered.
    fn ping_sent(&mut self) {
        let timeout = self.timeout;
        self.deadline.get_or_insert_with(|| Instant::now() + timeout);
    }

    fn pong_received(&mut self) {
        self.deadline = None;
    }

    /// Resolves once the armed deadline passes; pending while disarmed.
    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, handle: RelayHandle) {
    let conn_id = ConnId::generate();
    info!("WebSocket connection from {} as {}", addr, conn_id);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    if let Err(e) = handle.connect(conn_id, tx.clone()).await {
        error!("Relay unavailable for {}: {}", conn_id, e);
        return;
    }

    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut heartbeat = Heartbeat::new(PONG_TIMEOUT);

    loop {
        tokio::select! {
            Some(out) = rx.recv() => {
                if socket.send(Message::Text(out.into_inner())).await.is_err() {
                    break;
                }
            }

            _ = ping.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                heartbeat.ping_sent();
                debug!("Ping sent to {}", conn_id);
            }

            _ = heartbeat.expired() => {
                warn!("Pong timeout, disconnecting {}", conn_id);
                break;
            }

            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = forward_text(text.as_str(), conn_id, &tx, &handle).await {
                        error!("Relay unavailable for {}: {}", conn_id, e);
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    heartbeat.pong_received();
                    debug!("Pong received from {}", conn_id);
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Close received from {}: {:?}", conn_id, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", conn_id, e);
                    break;
                }
                None => break,
            },
        }
    }

    handle.disconnect(conn_id).await;
    info!("WebSocket disconnected: {} ({})", conn_id, addr);
}

/// Malformed frames are answered on the sender's own queue and the
/// connection stays open.
async fn forward_text(
    text: &str,
    conn_id: ConnId,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RelayHandle,
) -> Result<(), SignalingError> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Invalid message from {}: {}", conn_id, e);
            let reply = ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            };
            match reply.to_outbound() {
                Ok(out) => {
                    let _ = tx.send(out);
                }
                Err(e) => error!("Failed to encode error for {}: {}", conn_id, e),
            }
            return Ok(());
        }
    };

    handle.dispatch(conn_id, message).await
}
