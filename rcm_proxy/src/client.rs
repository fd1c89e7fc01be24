//! Client end of an interface proxy.
//!
//! Mirrors a remote provided interface: after fetching the command and
//! event tables, the component gets [`RemoteFunction`] handles to call
//! and its event handlers start firing. A receiver thread demultiplexes
//! replies by sequence number; a ping thread keeps the connection
//! observably alive. When the transport dies, every outstanding and
//! future call fails with `ConnectionLost` instead of hanging.

use crate::error::{ProxyError, TransportError};
use crate::handle::Handle;
use crate::message::{CommandOutcome, Message, decode_frame, encode_frame};
use crate::serializer::PayloadSerializer;
use crate::transport::{TransportPair, TransportRx, TransportTx};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use rcm_common::address::{CommandKind, EventKind};
use rcm_common::arg_value::ArgValue;
use rcm_common::config::ProxyConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client tuning, usually taken from [`ProxyConfig`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// How long a call waits for its reply.
    pub call_timeout: Duration,
    /// Liveness ping interval.
    pub ping_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for ClientSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            ping_interval: Duration::from_millis(config.ping_interval_ms),
        }
    }
}

enum Reply {
    Outcome(CommandOutcome),
    CommandHandles(Vec<crate::message::CommandHandleEntry>),
    EventHandles(Vec<crate::message::EventHandleEntry>),
}

#[derive(Clone, Copy)]
struct FunctionEntry {
    kind: CommandKind,
    handle: Handle,
}

struct EventHandler {
    name: String,
    kind: EventKind,
    callback: Box<dyn FnMut(Option<ArgValue>) + Send>,
}

struct ClientInner {
    interface: String,
    tx: Mutex<Option<Box<dyn TransportTx>>>,
    pending: Mutex<HashMap<u64, Sender<Reply>>>,
    next_seq: AtomicU64,
    functions: RwLock<HashMap<String, FunctionEntry>>,
    /// Handlers staged by name, inactive until the event table is
    /// fetched and they are bound to handles.
    staged_handlers: Mutex<HashMap<String, EventHandler>>,
    /// Handlers live on the wire, keyed by event handle.
    event_handlers: Mutex<HashMap<u64, EventHandler>>,
    connected: AtomicBool,
    serializer: Arc<dyn PayloadSerializer>,
    settings: ClientSettings,
    on_disconnect: Mutex<Option<Box<dyn FnMut() + Send>>>,
}

impl ClientInner {
    fn send_message(&self, message: &Message) -> Result<(), ProxyError> {
        let body = encode_frame(message)?;
        let mut tx = self.tx.lock();
        let tx = tx.as_mut().ok_or(ProxyError::ConnectionLost)?;
        tx.send(&body).map_err(ProxyError::from)
    }

    fn request(&self, build: impl FnOnce(u64) -> Message) -> Result<Reply, ProxyError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ProxyError::ConnectionLost);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = bounded(1);
        self.pending.lock().insert(seq, reply_tx);

        if let Err(e) = self.send_message(&build(seq)) {
            self.pending.lock().remove(&seq);
            mark_disconnected(self);
            return Err(e);
        }

        match reply_rx.recv_timeout(self.settings.call_timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.lock().remove(&seq);
                Err(ProxyError::Timeout)
            }
            // sender dropped during teardown
            Err(RecvTimeoutError::Disconnected) => Err(ProxyError::ConnectionLost),
        }
    }
}

/// Fail everything outstanding and notify the owner. Idempotent.
fn mark_disconnected(inner: &ClientInner) {
    if !inner.connected.swap(false, Ordering::AcqRel) {
        return;
    }
    if let Some(mut tx) = inner.tx.lock().take() {
        tx.shutdown();
    }
    // dropping the reply senders wakes every waiting caller
    inner.pending.lock().clear();
    info!(interface = %inner.interface, "connection lost");
    if let Some(callback) = inner.on_disconnect.lock().as_mut() {
        callback();
    }
}

/// Client side of one interface connection.
pub struct InterfaceClient {
    inner: Arc<ClientInner>,
}

impl InterfaceClient {
    /// Take ownership of a connected transport and start the receiver
    /// and ping threads.
    pub fn connect(
        interface: impl Into<String>,
        pair: TransportPair,
        serializer: Arc<dyn PayloadSerializer>,
        settings: ClientSettings,
    ) -> Self {
        let (tx, rx) = pair;
        let interface = interface.into();
        let inner = Arc::new(ClientInner {
            interface: interface.clone(),
            tx: Mutex::new(Some(tx)),
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            functions: RwLock::new(HashMap::new()),
            staged_handlers: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            serializer,
            settings,
            on_disconnect: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        if let Err(e) = std::thread::Builder::new()
            .name(format!("rcm-recv-{interface}"))
            .spawn(move || receiver_loop(weak, rx))
        {
            warn!(error = %e, "failed to spawn receiver thread");
        }

        let weak = Arc::downgrade(&inner);
        let ping_interval = inner.settings.ping_interval;
        if let Err(e) = std::thread::Builder::new()
            .name(format!("rcm-ping-{interface}"))
            .spawn(move || ping_loop(weak, ping_interval))
        {
            warn!(error = %e, "failed to spawn ping thread");
        }

        Self { inner }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Callback invoked once when the connection dies.
    pub fn on_disconnect(&self, callback: impl FnMut() + Send + 'static) {
        *self.inner.on_disconnect.lock() = Some(Box::new(callback));
    }

    /// Stage an event handler. Inactive until [`fetch_handles`]
    /// binds it to the server's event table.
    ///
    /// [`fetch_handles`]: InterfaceClient::fetch_handles
    pub fn set_event_handler(
        &self,
        name: impl Into<String>,
        kind: EventKind,
        callback: impl FnMut(Option<ArgValue>) + Send + 'static,
    ) {
        let name = name.into();
        self.inner.staged_handlers.lock().insert(
            name.clone(),
            EventHandler { name, kind, callback: Box::new(callback) },
        );
    }

    /// Fetch the command and event tables. Populates the remote
    /// function map, binds staged event handlers, and opts this
    /// connection in to event delivery.
    pub fn fetch_handles(&self) -> Result<(), ProxyError> {
        let reply = self.inner.request(|seq| Message::FetchCommandHandles { seq })?;
        let Reply::CommandHandles(entries) = reply else {
            return Err(ProxyError::Codec { reason: "unexpected reply to command fetch".to_string() });
        };
        {
            let mut functions = self.inner.functions.write();
            functions.clear();
            for entry in entries {
                functions.insert(
                    entry.name,
                    FunctionEntry { kind: entry.kind, handle: entry.handle },
                );
            }
        }

        let reply = self.inner.request(|seq| Message::FetchEventHandles { seq })?;
        let Reply::EventHandles(entries) = reply else {
            return Err(ProxyError::Codec { reason: "unexpected reply to event fetch".to_string() });
        };
        let mut staged = self.inner.staged_handlers.lock();
        let mut handlers = self.inner.event_handlers.lock();
        for entry in entries {
            if let Some(handler) = staged.remove(&entry.name) {
                if handler.kind != entry.kind {
                    warn!(
                        interface = %self.inner.interface,
                        event = %entry.name,
                        "event kind mismatch, handler not bound"
                    );
                    continue;
                }
                handlers.insert(entry.handle.as_u64(), handler);
            }
        }
        for handler in staged.values() {
            warn!(
                interface = %self.inner.interface,
                event = %handler.name,
                "no such event on remote interface, handler not bound"
            );
        }
        debug!(interface = %self.inner.interface, "handles fetched");
        Ok(())
    }

    /// Look up a fetched remote function by name.
    pub fn function(&self, name: &str) -> Result<RemoteFunction, ProxyError> {
        let entry = self
            .inner
            .functions
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| ProxyError::UnknownFunction { name: name.to_string() })?;
        Ok(RemoteFunction {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            kind: entry.kind,
            handle: entry.handle,
        })
    }

    /// Orderly goodbye; the connection is unusable afterwards.
    pub fn close(&self) {
        let _ = self.inner.send_message(&Message::Bye);
        mark_disconnected(&self.inner);
    }
}

impl Drop for InterfaceClient {
    fn drop(&mut self) {
        if self.is_connected() {
            self.close();
        }
    }
}

/// Callable mirror of one remote command.
#[derive(Clone)]
pub struct RemoteFunction {
    inner: Arc<ClientInner>,
    name: String,
    kind: CommandKind,
    handle: Handle,
}

impl RemoteFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Invoke a void command. With `blocking`, waits for execution
    /// instead of just the acknowledgement.
    pub fn execute(&self, blocking: bool) -> Result<(), ProxyError> {
        if self.kind != CommandKind::Void {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        self.call(None, blocking).map(|_| ())
    }

    /// Invoke a write command.
    pub fn execute_with(&self, arg: &ArgValue, blocking: bool) -> Result<(), ProxyError> {
        if self.kind != CommandKind::Write {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        let payload = self.inner.serializer.serialize(arg)?;
        self.call(Some(payload), blocking).map(|_| ())
    }

    /// Invoke a read command; always waits for the result.
    pub fn read(&self) -> Result<ArgValue, ProxyError> {
        if self.kind != CommandKind::Read {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        self.call(None, true)?
            .ok_or_else(|| ProxyError::Codec { reason: "read returned no payload".to_string() })
    }

    /// Invoke a qualified read; always waits for the result.
    pub fn qualified_read(&self, arg: &ArgValue) -> Result<ArgValue, ProxyError> {
        if self.kind != CommandKind::QualifiedRead {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        let payload = self.inner.serializer.serialize(arg)?;
        self.call(Some(payload), true)?
            .ok_or_else(|| ProxyError::Codec { reason: "read returned no payload".to_string() })
    }

    fn call(&self, payload: Option<Vec<u8>>, blocking: bool) -> Result<Option<ArgValue>, ProxyError> {
        let handle = self.handle;
        let reply = self.inner.request(move |seq| Message::ExecuteCommand {
            seq,
            handle,
            blocking,
            payload,
        })?;
        match reply {
            Reply::Outcome(CommandOutcome::Accepted) => Ok(None),
            Reply::Outcome(CommandOutcome::Done { payload }) => match payload {
                Some(bytes) => Ok(Some(self.inner.serializer.deserialize(&bytes)?)),
                None => Ok(None),
            },
            Reply::Outcome(CommandOutcome::Failed { reason }) => {
                Err(ProxyError::RemoteFailure { reason })
            }
            _ => Err(ProxyError::Codec { reason: "unexpected reply to command".to_string() }),
        }
    }
}

fn receiver_loop(weak: Weak<ClientInner>, mut rx: Box<dyn TransportRx>) {
    loop {
        let Some(inner) = weak.upgrade() else { break };
        if !inner.connected.load(Ordering::Acquire) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(body) => match decode_frame(&body) {
                Ok(message) => handle_incoming(&inner, message),
                Err(e) => {
                    warn!(interface = %inner.interface, error = %e, "undecodable frame dropped");
                }
            },
            Err(TransportError::Timeout) => continue,
            Err(e) => {
                debug!(interface = %inner.interface, error = %e, "transport ended");
                mark_disconnected(&inner);
                break;
            }
        }
    }
}

fn handle_incoming(inner: &Arc<ClientInner>, message: Message) {
    match message {
        Message::CommandResult { seq, outcome } => {
            deliver(inner, seq, Reply::Outcome(outcome));
        }
        Message::CommandHandles { seq, entries } => {
            deliver(inner, seq, Reply::CommandHandles(entries));
        }
        Message::EventHandles { seq, entries } => {
            deliver(inner, seq, Reply::EventHandles(entries));
        }
        Message::Event { handle, payload } => {
            let value = match payload {
                Some(bytes) => match inner.serializer.deserialize(&bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(interface = %inner.interface, error = %e, "event payload rejected");
                        return;
                    }
                },
                None => None,
            };
            let mut handlers = inner.event_handlers.lock();
            if let Some(handler) = handlers.get_mut(&handle.as_u64()) {
                (handler.callback)(value);
            } else {
                debug!(interface = %inner.interface, ?handle, "event with no handler dropped");
            }
        }
        Message::Pong => {}
        Message::Ping => {
            let _ = inner.send_message(&Message::Pong);
        }
        Message::Bye => {
            mark_disconnected(inner);
        }
        other => {
            warn!(interface = %inner.interface, ?other, "unexpected message");
        }
    }
}

fn deliver(inner: &Arc<ClientInner>, seq: u64, reply: Reply) {
    if let Some(tx) = inner.pending.lock().remove(&seq) {
        let _ = tx.send(reply);
    } else {
        debug!(interface = %inner.interface, seq, "reply with no waiter dropped");
    }
}

fn ping_loop(weak: Weak<ClientInner>, interval: Duration) {
    loop {
        std::thread::sleep(interval);
        let Some(inner) = weak.upgrade() else { break };
        if !inner.connected.load(Ordering::Acquire) {
            break;
        }
        if inner.send_message(&Message::Ping).is_err() {
            mark_disconnected(&inner);
            break;
        }
    }
}
