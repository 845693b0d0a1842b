//! Connected Remote sessions

use crate::protocol::OutgoingMessage;
use intg_core::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Handle to one WebSocket connection
///
/// Messages are queued and written by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, tx: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self { id, peer, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue a message; returns `false` if the connection is gone
    pub fn send(&self, message: OutgoingMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn respond(&self, req_id: u32, code: StatusCode, msg: &str, msg_data: Value) -> bool {
        self.send(OutgoingMessage::response(req_id, code, msg, msg_data))
    }

    pub fn result(&self, req_id: u32, code: StatusCode) -> bool {
        self.send(OutgoingMessage::result(req_id, code))
    }
}

/// All connected sessions, for broadcasting events
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    sessions: Arc<RwLock<HashMap<u64, Session>>>,
    next_id: Arc<AtomicU64>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection
    pub async fn register(
        &self,
        peer: SocketAddr,
        tx: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Session::new(id, peer, tx);
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    pub async fn unregister(&self, id: u64) -> Option<Session> {
        self.sessions.write().await.remove(&id)
    }

    /// Send a message to every session, dropping closed ones
    pub async fn broadcast(&self, message: OutgoingMessage) {
        let mut closed = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if !session.send(message.clone()) {
                    closed.push(session.id);
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in closed {
                tracing::debug!("Removing closed session {}", id);
                sessions.remove(&id);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intg_core::DeviceState;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let sessions = Sessions::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let first = sessions.register(peer(), tx1).await;
        let second = sessions.register(peer(), tx2).await;
        assert_ne!(first.id(), second.id());

        sessions
            .broadcast(OutgoingMessage::device_state(DeviceState::Connected))
            .await;

        assert_eq!(rx1.recv().await.unwrap().msg(), "device_state");
        assert_eq!(rx2.recv().await.unwrap().msg(), "device_state");
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_sessions() {
        let sessions = Sessions::new();
        let (tx, rx) = mpsc::unbounded_channel();
        sessions.register(peer(), tx).await;
        drop(rx);

        sessions
            .broadcast(OutgoingMessage::device_state(DeviceState::Connected))
            .await;
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(1, peer(), tx);

        assert!(session.result(4, StatusCode::Ok));
        assert_eq!(rx.recv().await.unwrap(), OutgoingMessage::result(4, StatusCode::Ok));

        drop(rx);
        assert!(!session.result(5, StatusCode::Ok));
    }
}
