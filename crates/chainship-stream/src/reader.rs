//! `BlockReader`: block-range streaming with one-message-in-flight flow
//! control.
//!
//! The reader owns a [`Transport`], resolves the session schema from the
//! handshake through a [`SchemaCache`], requests block ranges and
//! acknowledges each data message after the block handler has returned.
//!
//! Transport callbacks only enqueue events; the reader drains the
//! queue from its own async methods, so every state mutation happens on
//! whoever drives the reader. Drive it directly with [`BlockReader::process_next`]
//! or hand it to a task with [`BlockReader::spawn`] and talk to it through a
//! [`ReaderHandle`].

use crate::config::{ReadOptions, ReaderConfig};
use crate::error::{ReaderError, TransportError};
use crate::handler::{BlockContext, BlockHandler, ConnectionHandler, RangeCompleteHandler};
use crate::messages::{AckRequest, BlockRangeRequest, ReceivedBlock, ShipMessage, RESULT_TYPE};
use crate::socket::SocketConnector;
use crate::transport::{ConnectionState, Transport};
use chainship_core::TypeTable;
use chainship_registry::SchemaCache;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type ErrorCallback = Box<dyn Fn(&ReaderError) + Send + Sync>;
pub type WarningCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Transport notification queued for the reader.
#[derive(Debug)]
enum ReaderEvent {
    Connected(Vec<u8>),
    Idle { previous: ConnectionState },
    Message(Vec<u8>),
    Error(TransportError),
}

/// Counters since the reader was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderMetrics {
    pub blocks_received: u64,
    pub acks_sent: u64,
    pub pongs: u64,
    pub decode_errors: u64,
    pub reconnections: u64,
    pub ranges_completed: u64,
}

/// Streams block ranges from a state-history endpoint.
pub struct BlockReader {
    config: ReaderConfig,
    transport: Transport,
    events: mpsc::UnboundedReceiver<ReaderEvent>,
    cache: SchemaCache,
    table: Option<Arc<TypeTable>>,

    block_handler: Option<Arc<dyn BlockHandler>>,
    range_handler: Option<Arc<dyn RangeCompleteHandler>>,
    connection_handler: Option<Arc<dyn ConnectionHandler>>,
    error_handler: Option<ErrorCallback>,
    warning_handler: Option<WarningCallback>,

    /// Active `[start, end)`
    range: Option<(u32, u32)>,
    last_block: bool,
    paused: bool,
    metrics: ReaderMetrics,
}

impl BlockReader {
    pub fn new(
        config: ReaderConfig,
        connector: Arc<dyn SocketConnector>,
        cache: SchemaCache,
    ) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let mut transport = Transport::new(config.clone(), connector);

        let connected = tx.clone();
        transport.add_state_handler(ConnectionState::Connected, move |change| {
            let handshake = change.data.clone().unwrap_or_default();
            let _ = connected.send(ReaderEvent::Connected(handshake));
        });
        let idle = tx.clone();
        transport.add_state_handler(ConnectionState::Idle, move |change| {
            let _ = idle.send(ReaderEvent::Idle {
                previous: change.previous,
            });
        });
        let messages = tx.clone();
        transport.on_message(move |bytes| {
            let _ = messages.send(ReaderEvent::Message(bytes));
        });
        transport.on_error(move |err| {
            let _ = tx.send(ReaderEvent::Error(err.clone()));
        });

        Self {
            config,
            transport,
            events,
            cache,
            table: None,
            block_handler: None,
            range_handler: None,
            connection_handler: None,
            error_handler: None,
            warning_handler: None,
            range: None,
            last_block: false,
            paused: false,
            metrics: ReaderMetrics::default(),
        }
    }

    // ─── Registration ─────────────────────────────────────────────────────

    pub fn set_block_handler(&mut self, handler: impl BlockHandler + 'static) {
        self.block_handler = Some(Arc::new(handler));
    }

    pub fn set_range_complete_handler(&mut self, handler: impl RangeCompleteHandler + 'static) {
        self.range_handler = Some(Arc::new(handler));
    }

    pub fn set_connection_handler(&mut self, handler: impl ConnectionHandler + 'static) {
        self.connection_handler = Some(Arc::new(handler));
    }

    /// Errors raised while streaming: codec failures, handler failures,
    /// unexpected messages and transport errors.
    pub fn on_error(&mut self, handler: impl Fn(&ReaderError) + Send + Sync + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn on_warning(&mut self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.warning_handler = Some(Box::new(handler));
    }

    // ─── Queries ──────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Version string of the session schema, once the handshake resolved.
    pub fn schema_version(&self) -> Option<&str> {
        self.table.as_deref().map(TypeTable::version)
    }

    /// The `[start, end)` range being streamed, if any.
    pub fn active_range(&self) -> Option<(u32, u32)> {
        self.range
    }

    pub fn metrics(&self) -> ReaderMetrics {
        self.metrics
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Connect and process the handshake.
    ///
    /// A failure is also passed to the error handler, and with
    /// `auto_reconnect` the next attempt happens from `process_next()`
    /// after the reconnect delay.
    pub async fn connect(&mut self) -> Result<(), ReaderError> {
        let result = self.transport.connect().await;
        self.process_events().await;
        result.map_err(ReaderError::from)
    }

    /// Close the connection. The reader stays Idle until `connect()`.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
        self.process_events().await;
    }

    /// Wait for one transport event and handle everything it caused.
    ///
    /// Returns `false` when the transport has nothing to wait for.
    pub async fn process_next(&mut self) -> bool {
        let progressed = self.transport.pump().await;
        self.process_events().await;
        progressed
    }

    async fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ReaderEvent::Connected(handshake) => self.handle_connected(handshake).await,
                ReaderEvent::Idle { previous } => self.handle_idle(previous).await,
                ReaderEvent::Message(bytes) => self.handle_message(bytes).await,
                ReaderEvent::Error(err) => self.report(ReaderError::Transport(err)),
            }
        }
    }

    async fn handle_connected(&mut self, handshake: Vec<u8>) {
        let table = match self.cache.resolve_handshake(&handshake) {
            Ok(table) => table,
            Err(e) => {
                // never carry a schema over from the previous node
                self.table = None;
                self.report(ReaderError::Codec(e));
                return;
            }
        };
        let version = table.version().to_string();
        info!(version = %version, "state-history schema resolved");
        self.table = Some(table);
        if let Some(handler) = self.connection_handler.clone() {
            handler.on_connected(&version).await;
        }
    }

    async fn handle_idle(&mut self, previous: ConnectionState) {
        self.range = None;
        self.last_block = false;
        self.paused = false;
        if previous == ConnectionState::Disconnecting {
            self.table = None;
        }
        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Disconnecting
        ) {
            info!(previous = %previous, "disconnected");
            if let Some(handler) = self.connection_handler.clone() {
                handler.on_disconnected().await;
            }
        }
        if self.config.auto_reconnect && previous != ConnectionState::Disconnecting {
            self.metrics.reconnections += 1;
            info!(attempt = self.metrics.reconnections, "reconnecting");
            // a failure queues an Error event and schedules the next Idle
            let _ = self.transport.connect().await;
        }
    }

    // ─── Inbound ──────────────────────────────────────────────────────────

    async fn handle_message(&mut self, bytes: Vec<u8>) {
        let Some(table) = self.table.clone() else {
            self.report(ReaderError::SchemaUnavailable);
            return;
        };
        let decoded = match table.decode(RESULT_TYPE, &bytes) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.decode_errors += 1;
                self.report(ReaderError::UnhandledMessage {
                    reason: e.to_string(),
                });
                return;
            }
        };
        let message = match ShipMessage::parse(&decoded, table.version()) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.decode_errors += 1;
                self.report(e);
                return;
            }
        };

        match message {
            ShipMessage::Pong { head, .. } => {
                self.metrics.pongs += 1;
                debug!(head = head.block_num, "pong");
            }
            _ if self.last_block => debug!("message after the last block of the range, skipped"),
            ShipMessage::MissingThisBlock => {
                self.warning("the received message does not contain this_block");
            }
            ShipMessage::Block(block) => self.handle_block(*block, table).await,
        }
    }

    async fn handle_block(&mut self, block: ReceivedBlock, table: Arc<TypeTable>) {
        let Some((start, end)) = self.range else {
            self.warning(&format!(
                "block {} received with no active range, dropped",
                block.block_num()
            ));
            return;
        };
        self.metrics.blocks_received += 1;
        let block_num = block.block_num();
        debug!(block = block_num, "block received");

        if let Some(handler) = self.block_handler.clone() {
            let ctx = BlockContext { table };
            if let Err(e) = handler.handle_block(&block, &ctx).await {
                self.report(e);
            }
        }

        if end.checked_sub(1) == Some(block_num) {
            self.last_block = true;
            self.range = None;
            self.metrics.ranges_completed += 1;
            info!(start, end, "block range complete");
            if let Some(handler) = self.range_handler.clone() {
                handler.on_range_complete(start, end).await;
            }
        } else if self.transport.is_connected() && !self.paused {
            self.send_ack().await;
        }
    }

    async fn send_ack(&mut self) {
        let Some(table) = self.table.clone() else {
            return;
        };
        let payload = match AckRequest::new(1).encode(&table) {
            Ok(payload) => payload,
            Err(e) => {
                self.report(ReaderError::Codec(e));
                return;
            }
        };
        match self.transport.send(payload).await {
            Ok(()) => {
                self.metrics.acks_sent += 1;
                debug!("ack sent");
            }
            Err(e) => self.report(ReaderError::Transport(e)),
        }
    }

    // ─── Requests ─────────────────────────────────────────────────────────

    /// Request blocks `[start_block, end_block)`.
    ///
    /// Replaces any range in progress.
    pub async fn read_range(
        &mut self,
        start_block: u32,
        end_block: u32,
        options: ReadOptions,
    ) -> Result<(), ReaderError> {
        if self.block_handler.is_none() {
            return Err(ReaderError::MissingHandler);
        }
        let table = self.table.clone().ok_or(ReaderError::SchemaUnavailable)?;
        if !self.transport.is_connected() {
            return Err(ReaderError::NotConnected);
        }
        if end_block <= start_block {
            return Err(ReaderError::InvalidRange {
                start: start_block,
                end: end_block,
            });
        }

        self.last_block = false;
        self.paused = false;
        let payload = BlockRangeRequest::new(start_block, end_block, options).encode(&table)?;
        self.transport.send(payload).await?;
        self.range = Some((start_block, end_block));
        info!(start = start_block, end = end_block, "block range requested");
        Ok(())
    }

    /// Request the single block `block_num`.
    pub async fn read_one_block(
        &mut self,
        block_num: u32,
        options: ReadOptions,
    ) -> Result<(), ReaderError> {
        let end = block_num.checked_add(1).ok_or(ReaderError::InvalidRange {
            start: block_num,
            end: block_num,
        })?;
        self.read_range(block_num, end, options).await
    }

    /// Stop acknowledging. The node stops after the message in flight.
    pub fn pause(&mut self) {
        if !self.transport.is_connected() {
            info!("pause ignored: not connected");
            return;
        }
        self.paused = true;
        debug!("paused");
    }

    /// Resume acknowledging, sending the ack withheld while paused.
    pub async fn resume(&mut self) {
        if !self.transport.is_connected() {
            info!("resume ignored: not connected");
            return;
        }
        let was_paused = std::mem::replace(&mut self.paused, false);
        debug!("resumed");
        if was_paused && self.range.is_some() && !self.last_block {
            self.send_ack().await;
        }
    }

    // ─── Reporting ────────────────────────────────────────────────────────

    fn report(&self, err: ReaderError) {
        warn!(error = %err, "block reader error");
        if let Some(handler) = &self.error_handler {
            handler(&err);
        }
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
        if let Some(handler) = &self.warning_handler {
            handler(message);
        }
    }

    // ─── Event loop ───────────────────────────────────────────────────────

    /// Move the reader onto its own task.
    pub fn spawn(self) -> (ReaderHandle, JoinHandle<()>) {
        let (handle, commands) = ReaderHandle::channel();
        (handle, tokio::spawn(self.run(commands)))
    }

    /// Serve commands and transport events until shutdown or until every
    /// handle is dropped, then disconnect and flush the schema cache.
    pub async fn run(mut self, mut commands: ReaderCommands) {
        loop {
            let wake = if self.transport.is_active() {
                tokio::select! {
                    cmd = commands.rx.recv() => Wake::Command(cmd),
                    _ = self.transport.pump() => Wake::Transport,
                }
            } else {
                Wake::Command(commands.rx.recv().await)
            };

            match wake {
                Wake::Transport => self.process_events().await,
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => break,
                Wake::Command(Some(cmd)) => self.execute(cmd).await,
            }
        }
        self.disconnect().await;
        self.cache.flush().await;
        debug!("block reader stopped");
    }

    async fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(reply) => {
                let _ = reply.send(self.connect().await);
            }
            Command::Disconnect(reply) => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::ReadRange {
                start,
                end,
                options,
                reply,
            } => {
                let _ = reply.send(self.read_range(start, end, options).await);
            }
            Command::Pause(reply) => {
                self.pause();
                let _ = reply.send(());
            }
            Command::Resume(reply) => {
                self.resume().await;
                let _ = reply.send(());
            }
            Command::Metrics(reply) => {
                let _ = reply.send(self.metrics);
            }
            Command::Shutdown => {}
        }
    }
}

enum Wake {
    Command(Option<Command>),
    Transport,
}

enum Command {
    Connect(oneshot::Sender<Result<(), ReaderError>>),
    Disconnect(oneshot::Sender<()>),
    ReadRange {
        start: u32,
        end: u32,
        options: ReadOptions,
        reply: oneshot::Sender<Result<(), ReaderError>>,
    },
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Metrics(oneshot::Sender<ReaderMetrics>),
    Shutdown,
}

/// Receiving end of a [`ReaderHandle`], consumed by [`BlockReader::run`].
pub struct ReaderCommands {
    rx: mpsc::UnboundedReceiver<Command>,
}

/// Cloneable control surface for a running reader.
#[derive(Clone)]
pub struct ReaderHandle {
    tx: mpsc::UnboundedSender<Command>,
}

fn stopped() -> ReaderError {
    ReaderError::Transport(TransportError::Closed)
}

impl ReaderHandle {
    pub fn channel() -> (Self, ReaderCommands) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ReaderCommands { rx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ReaderError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn connect(&self) -> Result<(), ReaderError> {
        self.request(Command::Connect).await?
    }

    pub async fn disconnect(&self) -> Result<(), ReaderError> {
        self.request(Command::Disconnect).await
    }

    pub async fn read_range(
        &self,
        start: u32,
        end: u32,
        options: ReadOptions,
    ) -> Result<(), ReaderError> {
        self.request(|reply| Command::ReadRange {
            start,
            end,
            options,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<(), ReaderError> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), ReaderError> {
        self.request(Command::Resume).await
    }

    pub async fn metrics(&self) -> Result<ReaderMetrics, ReaderError> {
        self.request(Command::Metrics).await
    }

    /// Ask the loop to disconnect and stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}
