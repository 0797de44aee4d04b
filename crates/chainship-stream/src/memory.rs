//! In-process socket collaborator.
//!
//! `MemoryConnector` hands out scripted sessions in order. Each session is
//! paired with a [`MemoryPeer`] that plays the node: it queues inbound
//! messages, closes the connection and records what the client sent.

use crate::error::TransportError;
use crate::socket::{Socket, SocketConnector};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

enum Scripted {
    Session(MemorySocket),
    Failure(String),
}

#[derive(Default)]
struct ConnectorState {
    queue: VecDeque<Scripted>,
    opened: Vec<String>,
}

/// Connector that replays queued sessions and failures.
///
/// With nothing queued, `open` fails with `ConnectionFailed`.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a session whose first inbound message is `handshake`.
    pub fn push_session(&self, handshake: impl Into<Vec<u8>>) -> MemoryPeer {
        let peer = self.push_silent_session();
        peer.send(handshake);
        peer
    }

    /// Queue a session that sends nothing until told to.
    pub fn push_silent_session(&self) -> MemoryPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            inbound: Arc::new(Mutex::new(Some(tx))),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed_by_client: Arc::new(Mutex::new(false)),
        };
        let socket = MemorySocket {
            inbound: rx,
            peer: peer.clone(),
        };
        self.lock().queue.push_back(Scripted::Session(socket));
        peer
    }

    /// Queue a failed connection attempt.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.lock().queue.push_back(Scripted::Failure(reason.into()));
    }

    /// Number of `open` calls so far, successful or not.
    pub fn open_count(&self) -> usize {
        self.lock().opened.len()
    }

    /// Endpoints passed to `open`, in call order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }
}

#[async_trait]
impl SocketConnector for MemoryConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Socket>, TransportError> {
        let mut state = self.lock();
        state.opened.push(endpoint.to_string());
        match state.queue.pop_front() {
            Some(Scripted::Session(socket)) => Ok(Box::new(socket)),
            Some(Scripted::Failure(reason)) => Err(TransportError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason,
            }),
            None => Err(TransportError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: "no scripted session".into(),
            }),
        }
    }
}

/// The node side of a scripted session.
#[derive(Clone)]
pub struct MemoryPeer {
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed_by_client: Arc<Mutex<bool>>,
}

impl MemoryPeer {
    /// Deliver a message to the client. Ignored after `close`.
    pub fn send(&self, payload: impl Into<Vec<u8>>) {
        let guard = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(payload.into());
        }
    }

    /// Close the connection from the node side. Queued messages are still
    /// delivered first.
    pub fn close(&self) {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Everything the client has sent on this session.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain what the client has sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether the client closed this session.
    pub fn is_closed(&self) -> bool {
        *self
            .closed_by_client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct MemorySocket {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    peer: MemoryPeer,
}

#[async_trait]
impl Socket for MemorySocket {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.peer.is_closed() {
            return Err(TransportError::Closed);
        }
        self.peer
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        if self.peer.is_closed() {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        *self
            .peer
            .closed_by_client
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.inbound.close();
        Ok(())
    }
}
