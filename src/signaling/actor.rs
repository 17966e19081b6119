use tokio::sync::mpsc;
use tracing::info;

use super::messages::ClientMessage;
use super::relay::Relay;
use super::types::{ConnId, OutboundMessage, SignalingError};

/// Capacity of the command queue in front of the relay actor
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Commands sent to the relay actor
pub(crate) enum RelayCommand {
    Connect {
        conn_id: ConnId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    },
    Event {
        conn_id: ConnId,
        message: ClientMessage,
    },
    Disconnect {
        conn_id: ConnId,
    },
}

/// Owns all room state; commands are applied one at a time, in arrival order.
pub(crate) async fn relay_actor(mut rx: mpsc::Receiver<RelayCommand>) {
    let mut relay = Relay::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Connect { conn_id, tx } => relay.connect(conn_id, tx),
            RelayCommand::Event { conn_id, message } => relay.handle(conn_id, message),
            RelayCommand::Disconnect { conn_id } => relay.disconnect(conn_id),
        }
    }

    info!("Relay actor stopped ({} rooms dropped)", relay.registry().room_count());
}

/// Handle to communicate with the relay actor
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Spawn the relay actor on the current runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RelayCommand>(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(relay_actor(rx));
        Self { tx }
    }

    /// Register a new connection; it receives `connected` on `tx`
    pub async fn connect(
        &self,
        conn_id: ConnId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<(), SignalingError> {
        self.send(RelayCommand::Connect { conn_id, tx }).await
    }

    /// Deliver an inbound event from `conn_id`
    pub async fn dispatch(
        &self,
        conn_id: ConnId,
        message: ClientMessage,
    ) -> Result<(), SignalingError> {
        self.send(RelayCommand::Event { conn_id, message }).await
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        let _ = self.send(RelayCommand::Disconnect { conn_id }).await;
    }

    async fn send(&self, cmd: RelayCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
