//! Bridges the blocking `mxp::Transport` receive loop onto async call/response
//! and server-streaming semantics, correlated by request id.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mxp::{Message, MessageType, Transport, TransportConfig, TransportHandle};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::{Envelope, RpcRequest, RpcResponse, StreamFrame};
use crate::error::{TransportError, TransportResult};

enum Waiter {
    Unary(oneshot::Sender<RpcResponse>),
    Stream(mpsc::Sender<StreamFrame>),
}

/// Handles one inbound `Call`. Implementors decide per-request whether to
/// reply once ([`ServeOutcome::Unary`]) or stream ([`ServeOutcome::Stream`]).
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync {
    /// Processes one request from `peer`.
    async fn handle(&self, peer: SocketAddr, request: RpcRequest) -> ServeOutcome;
}

/// What to send back for a served request.
pub enum ServeOutcome {
    /// A single reply frame.
    Unary(RpcResponse),
    /// A channel of output chunks; the endpoint forwards each as it arrives
    /// and stops once a chunk with `finished = true` has been sent.
    Stream(mpsc::Receiver<StreamFrame>),
}

/// A bound MXP endpoint that can both issue calls and serve them.
#[derive(Clone)]
pub struct Endpoint {
    handle: TransportHandle,
    local_addr: SocketAddr,
    waiters: Arc<Mutex<HashMap<Uuid, Waiter>>>,
}

impl Endpoint {
    /// Binds a new endpoint at `addr` (use port `0` for an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the socket cannot be bound.
    pub fn bind(addr: SocketAddr) -> TransportResult<Self> {
        let transport = Transport::new(TransportConfig::default());
        let handle = transport
            .bind(addr)
            .map_err(|err| TransportError::Bind(format!("{err:?}")))?;
        Ok(Self {
            handle,
            local_addr: addr,
            waiters: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The local address this endpoint is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the blocking receive loop driving both call correlation and
    /// (if `handler` is given) inbound request service. Returns immediately.
    pub fn spawn(&self, handler: Option<Arc<dyn RpcHandler>>) {
        let handle = self.handle.clone();
        let waiters = Arc::clone(&self.waiters);
        let self_for_replies = self.clone();

        tokio::task::spawn_blocking(move || loop {
            let mut buffer = handle.acquire_buffer();
            match handle.receive(&mut buffer) {
                Ok((_len, peer)) => {
                    let Ok(message) = Message::decode(buffer.as_slice().to_vec()) else {
                        warn!(%peer, "dropped undecodable MXP message");
                        continue;
                    };
                    let waiters = Arc::clone(&waiters);
                    let handler = handler.clone();
                    let endpoint = self_for_replies.clone();
                    tokio::spawn(async move {
                        route_inbound(peer, message, &waiters, handler, endpoint).await;
                    });
                }
                Err(err) => {
                    debug!(?err, "MXP receive error (expected on idle non-blocking sockets)");
                }
            }
        });
    }

    /// Issues a unary call and awaits the matching response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if no reply arrives within `timeout`,
    /// or [`TransportError::Send`] if the request could not be transmitted.
    pub async fn call_unary(
        &self,
        peer: SocketAddr,
        request: RpcRequest,
        timeout: Duration,
    ) -> TransportResult<RpcResponse> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .insert(request_id, Waiter::Unary(tx));

        self.send_request(peer, request_id, &request)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.waiters.lock().await.remove(&request_id);
                Err(TransportError::Timeout)
            }
        }
    }

    /// Issues a streaming call, returning a channel of output chunks.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the request could not be transmitted.
    pub async fn call_streaming(
        &self,
        peer: SocketAddr,
        request: RpcRequest,
        buffer: usize,
    ) -> TransportResult<mpsc::Receiver<StreamFrame>> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(buffer);
        self.waiters
            .lock()
            .await
            .insert(request_id, Waiter::Stream(tx));

        self.send_request(peer, request_id, &request)?;
        Ok(rx)
    }

    fn send_request(
        &self,
        peer: SocketAddr,
        request_id: Uuid,
        request: &RpcRequest,
    ) -> TransportResult<()> {
        let envelope = Envelope::new(request_id, request.clone());
        let payload = serde_json::to_vec(&envelope)?;
        let message = Message::new(MessageType::Call, payload);
        self.handle
            .send(&message.encode(), peer)
            .map_err(|err| TransportError::Send(format!("{err:?}")))
    }

    fn send_reply(&self, peer: SocketAddr, request_id: Uuid, response: &RpcResponse) {
        let envelope = Envelope::new(request_id, response.clone());
        let Ok(payload) = serde_json::to_vec(&envelope) else {
            warn!("failed to serialize reply envelope");
            return;
        };
        let message = Message::new(MessageType::Response, payload);
        if let Err(err) = self.handle.send(&message.encode(), peer) {
            warn!(?err, %peer, "failed to send reply");
        }
    }

    fn send_chunk(&self, peer: SocketAddr, request_id: Uuid, chunk: &StreamFrame) {
        let envelope = Envelope::new(request_id, chunk.clone());
        let Ok(payload) = serde_json::to_vec(&envelope) else {
            warn!("failed to serialize stream chunk envelope");
            return;
        };
        let message_type = if chunk.finished {
            MessageType::StreamClose
        } else {
            MessageType::StreamChunk
        };
        let message = Message::new(message_type, payload);
        if let Err(err) = self.handle.send(&message.encode(), peer) {
            warn!(?err, %peer, "failed to send stream chunk");
        }
    }
}

async fn route_inbound(
    peer: SocketAddr,
    message: Message,
    waiters: &Arc<Mutex<HashMap<Uuid, Waiter>>>,
    handler: Option<Arc<dyn RpcHandler>>,
    endpoint: Endpoint,
) {
    match message.message_type() {
        Some(MessageType::Response) => {
            let Ok(envelope) = serde_json::from_slice::<Envelope<RpcResponse>>(message.payload())
            else {
                warn!(%peer, "dropped undecodable response envelope");
                return;
            };
            if let Some(Waiter::Unary(tx)) = waiters.lock().await.remove(&envelope.request_id) {
                let _ = tx.send(envelope.body);
            }
        }
        Some(MessageType::StreamChunk | MessageType::StreamClose) => {
            let Ok(envelope) = serde_json::from_slice::<Envelope<StreamFrame>>(message.payload())
            else {
                warn!(%peer, "dropped undecodable stream chunk envelope");
                return;
            };
            let finished = envelope.body.finished;
            let mut guard = waiters.lock().await;
            if let Some(Waiter::Stream(tx)) = guard.get(&envelope.request_id) {
                let _ = tx.send(envelope.body).await;
            }
            if finished {
                guard.remove(&envelope.request_id);
            }
        }
        Some(MessageType::Call) => {
            let Ok(envelope) = serde_json::from_slice::<Envelope<RpcRequest>>(message.payload())
            else {
                warn!(%peer, "dropped undecodable request envelope");
                return;
            };
            let Some(handler) = handler else {
                return;
            };
            match handler.handle(peer, envelope.body).await {
                ServeOutcome::Unary(response) => {
                    endpoint.send_reply(peer, envelope.request_id, &response);
                }
                ServeOutcome::Stream(mut chunks) => {
                    while let Some(chunk) = chunks.recv().await {
                        let finished = chunk.finished;
                        endpoint.send_chunk(peer, envelope.request_id, &chunk);
                        if finished {
                            break;
                        }
                    }
                }
            }
        }
        other => {
            debug!(?other, %peer, "ignored MXP message of unhandled type");
        }
    }
}
