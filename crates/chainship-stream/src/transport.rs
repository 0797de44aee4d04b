//! Connection state machine over a [`SocketConnector`].
//!
//! ```text
//!        connect()            handshake received
//!  Idle ───────────▶ Connecting ─────────────────▶ Connected
//!   ▲                    │                            │
//!   │  open/handshake    │                            │ disconnect()
//!   │  failed (delayed)  │                            ▼
//!   ├────────────────────┘                       Disconnecting
//!   │                                                 │
//!   └──────────── remote close ◀── Connected          │
//!   └─────────────────────────────────────────────────┘
//! ```
//!
//! The transport never spawns. The owner drives it: `connect()` runs the
//! open and the handshake, `pump()` waits for the next socket event or the
//! deferred Idle notification after a failed attempt.

use crate::config::ReaderConfig;
use crate::error::TransportError;
use crate::socket::{Socket, SocketConnector};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Payload of a state handler call.
///
/// `data` carries the handshake bytes on the transition to `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous: ConnectionState,
    pub state: ConnectionState,
    pub data: Option<Vec<u8>>,
}

pub type StateHandler = Box<dyn FnMut(&StateChange) + Send>;
pub type MessageHandler = Box<dyn FnMut(Vec<u8>) + Send>;
pub type ErrorHandler = Box<dyn FnMut(&TransportError) + Send>;

/// Single-connection transport with round-robin endpoint selection.
pub struct Transport {
    config: ReaderConfig,
    connector: Arc<dyn SocketConnector>,
    state: ConnectionState,
    socket: Option<Box<dyn Socket>>,
    next_endpoint: usize,
    endpoint: Option<String>,
    state_handlers: HashMap<ConnectionState, StateHandler>,
    message_handler: Option<MessageHandler>,
    error_handler: Option<ErrorHandler>,
    /// When a failed attempt's Idle notification is due.
    pending_idle: Option<Instant>,
}

impl Transport {
    pub fn new(config: ReaderConfig, connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            config,
            connector,
            state: ConnectionState::Idle,
            socket: None,
            next_endpoint: 0,
            endpoint: None,
            state_handlers: HashMap::new(),
            message_handler: None,
            error_handler: None,
            pending_idle: None,
        }
    }

    /// Register the handler for transitions into `state`. A second
    /// registration for the same state replaces the first.
    pub fn add_state_handler(
        &mut self,
        state: ConnectionState,
        handler: impl FnMut(&StateChange) + Send + 'static,
    ) {
        if self.state_handlers.insert(state, Box::new(handler)).is_some() {
            warn!(state = %state, "replacing existing state handler");
        }
    }

    pub fn on_message(&mut self, handler: impl FnMut(Vec<u8>) + Send + 'static) {
        self.message_handler = Some(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(&TransportError) + Send + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether `pump()` has anything to wait for.
    pub fn is_active(&self) -> bool {
        self.socket.is_some() || self.pending_idle.is_some()
    }

    /// Endpoint of the current or most recent attempt.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Open a connection and wait for the schema handshake.
    ///
    /// Only acts from `Idle`; in any other state this is a no-op. On
    /// failure the state returns to `Idle` at once, the error handler runs
    /// and the Idle handler fires from `pump()` after the reconnect delay.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Idle {
            debug!(state = %self.state, "connect ignored");
            return Ok(());
        }
        if self.config.endpoints.is_empty() {
            let err = TransportError::NoEndpoints;
            self.report_error(&err);
            return Err(err);
        }

        let endpoint = self.config.endpoints[self.next_endpoint % self.config.endpoints.len()].clone();
        self.next_endpoint = self.next_endpoint.wrapping_add(1);
        self.endpoint = Some(endpoint.clone());
        self.pending_idle = None;
        self.transition(ConnectionState::Connecting, None);
        info!(endpoint = %endpoint, "connecting to state-history endpoint");

        let connector = self.connector.clone();
        let timeout_ms = self.config.handshake_timeout_ms;
        match open_and_handshake(connector.as_ref(), &endpoint, timeout_ms).await {
            Ok((socket, handshake)) => {
                self.socket = Some(socket);
                info!(endpoint = %endpoint, bytes = handshake.len(), "handshake received");
                self.transition(ConnectionState::Connected, Some(handshake));
                Ok(())
            }
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "connection attempt failed");
                self.state = ConnectionState::Idle;
                self.pending_idle = Some(Instant::now() + self.config.reconnect_delay());
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Wait for and dispatch the next event.
    ///
    /// Returns `false` when there is nothing to wait for.
    pub async fn pump(&mut self) -> bool {
        if self.socket.is_none() {
            let Some(due) = self.pending_idle else {
                return false;
            };
            tokio::time::sleep_until(due).await;
            self.pending_idle = None;
            if self.state == ConnectionState::Idle {
                self.notify(StateChange {
                    previous: ConnectionState::Connecting,
                    state: ConnectionState::Idle,
                    data: None,
                });
            }
            return true;
        }

        let next = match self.socket.as_mut() {
            Some(socket) => socket.recv().await,
            None => return false,
        };
        match next {
            Some(Ok(message)) => {
                if let Some(handler) = self.message_handler.as_mut() {
                    handler(message);
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "socket error, dropping connection");
                self.report_error(&err);
                self.on_closed();
            }
            None => {
                info!(endpoint = ?self.endpoint, "connection closed by remote");
                self.on_closed();
            }
        }
        true
    }

    fn on_closed(&mut self) {
        self.socket = None;
        self.transition(ConnectionState::Idle, None);
    }

    /// Close the connection. Only acts from `Connected`.
    pub async fn disconnect(&mut self) {
        if self.state != ConnectionState::Connected {
            debug!(state = %self.state, "disconnect ignored");
            return;
        }
        self.transition(ConnectionState::Disconnecting, None);
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close().await {
                debug!(error = %err, "close failed");
            }
        }
        self.transition(ConnectionState::Idle, None);
    }

    /// Send one binary message. Requires `Connected`.
    pub async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;
        socket.send(payload).await
    }

    fn transition(&mut self, state: ConnectionState, data: Option<Vec<u8>>) {
        let previous = self.state;
        self.state = state;
        debug!(from = %previous, to = %state, "transport state change");
        self.notify(StateChange {
            previous,
            state,
            data,
        });
    }

    fn notify(&mut self, change: StateChange) {
        if let Some(handler) = self.state_handlers.get_mut(&change.state) {
            handler(&change);
        }
    }

    fn report_error(&mut self, err: &TransportError) {
        if let Some(handler) = self.error_handler.as_mut() {
            handler(err);
        }
    }
}

async fn open_and_handshake(
    connector: &dyn SocketConnector,
    endpoint: &str,
    timeout_ms: u64,
) -> Result<(Box<dyn Socket>, Vec<u8>), TransportError> {
    let mut socket = connector.open(endpoint).await?;
    let timeout = Duration::from_millis(timeout_ms);
    match tokio::time::timeout(timeout, socket.recv()).await {
        Ok(Some(Ok(handshake))) => Ok((socket, handshake)),
        Ok(Some(Err(e))) => Err(TransportError::HandshakeFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }),
        Ok(None) => Err(TransportError::HandshakeFailed {
            endpoint: endpoint.to_string(),
            reason: "closed before handshake".into(),
        }),
        Err(_) => {
            let _ = socket.close().await;
            Err(TransportError::HandshakeTimeout {
                endpoint: endpoint.to_string(),
                ms: timeout_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use std::sync::Mutex;

    fn config(endpoints: &[&str]) -> ReaderConfig {
        ReaderConfig {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            reconnect_delay_ms: 10,
            handshake_timeout_ms: 50,
            auto_reconnect: true,
        }
    }

    fn record(transport: &mut Transport) -> Arc<Mutex<Vec<StateChange>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
        ] {
            let log = log.clone();
            transport.add_state_handler(state, move |c| log.lock().unwrap().push(c.clone()));
        }
        log
    }

    #[tokio::test]
    async fn connect_delivers_handshake_with_connected() {
        let connector = MemoryConnector::new();
        connector.push_session(b"{}".to_vec());
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        let log = record(&mut transport);

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].state, ConnectionState::Connecting);
        assert_eq!(log[1].previous, ConnectionState::Connecting);
        assert_eq!(log[1].data.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn messages_reach_handler_and_remote_close_goes_idle() {
        let connector = MemoryConnector::new();
        let peer = connector.push_session(b"{}".to_vec());
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        let log = record(&mut transport);
        let messages = Arc::new(Mutex::new(Vec::new()));
        let m = messages.clone();
        transport.on_message(move |bytes| m.lock().unwrap().push(bytes));

        transport.connect().await.unwrap();
        peer.send(vec![7]);
        peer.close();
        assert!(transport.pump().await);
        assert!(transport.pump().await);
        assert!(!transport.pump().await);

        assert_eq!(*messages.lock().unwrap(), vec![vec![7]]);
        let last = log.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.state, ConnectionState::Idle);
        assert_eq!(last.previous, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_connect_fires_idle_after_delay() {
        let connector = MemoryConnector::new();
        connector.push_failure("refused");
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        let log = record(&mut transport);
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        transport.on_error(move |_| *e.lock().unwrap() += 1);

        assert!(transport.connect().await.is_err());
        assert_eq!(transport.state(), ConnectionState::Idle);
        assert_eq!(*errors.lock().unwrap(), 1);
        // only Connecting so far; the Idle notification is deferred
        assert_eq!(log.lock().unwrap().len(), 1);

        assert!(transport.is_active());
        assert!(transport.pump().await);
        let last = log.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.state, ConnectionState::Idle);
        assert_eq!(last.previous, ConnectionState::Connecting);
        assert!(!transport.is_active());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let connector = MemoryConnector::new();
        connector.push_silent_session();
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::HandshakeTimeout { ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_passes_through_disconnecting() {
        let connector = MemoryConnector::new();
        let peer = connector.push_session(b"{}".to_vec());
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        let log = record(&mut transport);

        transport.connect().await.unwrap();
        transport.disconnect().await;
        assert!(peer.is_closed());
        let log = log.lock().unwrap();
        let states: Vec<_> = log.iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnecting,
                ConnectionState::Idle,
            ]
        );
        assert_eq!(log[3].previous, ConnectionState::Disconnecting);
        drop(log);
        assert!(matches!(transport.send(vec![1]).await, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn endpoints_rotate() {
        let connector = MemoryConnector::new();
        connector.push_failure("down");
        connector.push_session(b"{}".to_vec());
        let mut transport = Transport::new(config(&["ws://a", "ws://b"]), Arc::new(connector.clone()));

        assert!(transport.connect().await.is_err());
        transport.connect().await.unwrap();
        assert_eq!(connector.opened(), vec!["ws://a", "ws://b"]);
        assert_eq!(transport.endpoint(), Some("ws://b"));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let connector = MemoryConnector::new();
        connector.push_session(b"{}".to_vec());
        let mut transport = Transport::new(config(&["ws://a"]), Arc::new(connector));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let h1 = hits.clone();
        transport.add_state_handler(ConnectionState::Connected, move |_| h1.lock().unwrap().push(1));
        let h2 = hits.clone();
        transport.add_state_handler(ConnectionState::Connected, move |_| h2.lock().unwrap().push(2));

        transport.connect().await.unwrap();
        assert_eq!(*hits.lock().unwrap(), vec![2]);
    }
}
