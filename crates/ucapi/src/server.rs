//! WebSocket server accepting Remote connections

use crate::error::Result;
use crate::protocol::{IncomingMessage, MessageKind, OutgoingMessage, RemoteEvent, Request};
use crate::session::{Session, Sessions};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use intg_core::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Handles parsed requests and events of a session
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request; the handler sends the response through `session`
    ///
    /// An error is answered with a 500 result.
    async fn handle_request(&self, session: &Session, req_id: u32, request: Request)
        -> Result<()>;

    async fn handle_event(&self, session: &Session, event: RemoteEvent);

    /// Called after a session disconnected
    async fn session_closed(&self, _session: &Session) {}
}

/// Integration API WebSocket server
pub struct IntegrationServer {
    addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    sessions: Sessions,
    local_addr: Option<SocketAddr>,
    server_handle: Option<JoinHandle<()>>,
}

impl IntegrationServer {
    /// Create a new server
    ///
    /// # Arguments
    /// * `addr` - Address to bind to (e.g., "0.0.0.0:9090")
    /// * `handler` - Request handler shared by all connections
    /// * `sessions` - Registry the connections are added to
    pub fn new(addr: SocketAddr, handler: Arc<dyn RequestHandler>, sessions: Sessions) -> Self {
        Self {
            addr,
            handler,
            sessions,
            local_addr: None,
            server_handle: None,
        }
    }

    /// Bind and start accepting connections, returning the bound address
    pub async fn start(&mut self) -> Result<SocketAddr> {
        info!("Starting Integration API server on {}", self.addr);

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Integration API listening on ws://{}", local_addr);

        let handler = self.handler.clone();
        let sessions = self.sessions.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        let sessions = sessions.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, handler, sessions).await
                            {
                                warn!("[{}] Connection error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
        });

        self.local_addr = Some(local_addr);
        self.server_handle = Some(handle);

        Ok(local_addr)
    }

    /// Stop accepting connections
    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            info!("Stopping Integration API server");
            handle.abort();
        }
    }

    /// Bound address once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}

impl Drop for IntegrationServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    sessions: Sessions,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingMessage>();
    let session = sessions.register(peer, tx).await;
    info!("[{}] WS: Client added", peer);

    session.send(OutgoingMessage::authentication());

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_text() {
                Ok(text) => text,
                Err(e) => {
                    error!("[{}] Failed to serialize {}: {}", peer, message.msg(), e);
                    continue;
                }
            };
            debug!("[{}] <-: {}", peer, text);

            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("[{}] Send failed: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!("[{}] ->: {}", peer, text);
                dispatch(handler.as_ref(), &session, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("[{}] WS error: {}", peer, e);
                break;
            }
        }
    }

    sessions.unregister(session.id()).await;
    handler.session_closed(&session).await;
    writer.abort();
    info!("[{}] WS: Client removed", peer);

    Ok(())
}

async fn dispatch(handler: &dyn RequestHandler, session: &Session, text: &str) {
    let message = match IncomingMessage::from_text(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("[{}] Invalid message: {}", session.peer(), e);
            return;
        }
    };

    match message.kind {
        MessageKind::Req => {
            let Some(req_id) = message.id else {
                warn!("[{}] Ignoring request {} without id", session.peer(), message.msg);
                return;
            };

            match Request::parse(&message.msg, message.msg_data) {
                Ok(request) => {
                    if let Err(e) = handler.handle_request(session, req_id, request).await {
                        error!("[{}] Failed to handle {}: {}", session.peer(), message.msg, e);
                        session.result(req_id, StatusCode::ServerError);
                    }
                }
                Err(e) => {
                    warn!("[{}] {}", session.peer(), e);
                    session.result(req_id, StatusCode::BadRequest);
                }
            }
        }
        MessageKind::Event => {
            handler
                .handle_event(session, RemoteEvent::parse(&message.msg))
                .await
        }
        MessageKind::Resp => {
            debug!("[{}] Ignoring response message {}", session.peer(), message.msg);
        }
    }
}
