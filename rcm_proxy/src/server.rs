//! Server end of an interface proxy.
//!
//! Holds the real command targets and event sources for one provided
//! interface and serves any number of connections. Each connection gets
//! a dispatch thread; non-blocking void/write commands are queued to a
//! shared executor thread, everything with a result executes inline on
//! the dispatch thread so the reply carries it. Events fan out to every
//! connection that has fetched the event table; a fresh connection
//! receives nothing until it opts in.

use crate::error::ProxyError;
use crate::handle::{Handle, HandleTable};
use crate::message::{
    CommandHandleEntry, CommandOutcome, EventHandleEntry, Message, decode_frame, encode_frame,
};
use crate::serializer::PayloadSerializer;
use crate::transport::{TransportPair, TransportTx};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};
use rcm_common::address::{CommandDescriptor, CommandKind, EventDescriptor, EventKind};
use rcm_common::arg_value::ArgValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Server-side execution target of one command.
///
/// `arg` is present exactly when the command kind takes an argument;
/// the return value is present exactly when the kind returns a result.
pub trait CommandTarget: Send + Sync {
    fn execute(&self, arg: Option<ArgValue>) -> Result<Option<ArgValue>, String>;
}

impl<F> CommandTarget for F
where
    F: Fn(Option<ArgValue>) -> Result<Option<ArgValue>, String> + Send + Sync,
{
    fn execute(&self, arg: Option<ArgValue>) -> Result<Option<ArgValue>, String> {
        self(arg)
    }
}

/// Server tuning.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Receive timeout per wait; three silent waits in a row drop the
    /// connection.
    pub recv_timeout: Duration,
    /// Depth of the queued-execution channel.
    pub executor_queue_depth: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(3),
            executor_queue_depth: 256,
        }
    }
}

#[derive(Clone)]
struct CommandEntry {
    name: String,
    kind: CommandKind,
    target: Arc<dyn CommandTarget>,
}

struct EventEntry {
    name: String,
    kind: EventKind,
}

struct Job {
    name: String,
    target: Arc<dyn CommandTarget>,
    arg: Option<ArgValue>,
}

struct Subscriber {
    tx: Arc<Mutex<Box<dyn TransportTx>>>,
    /// Set once the connection fetches the event table.
    events_enabled: bool,
}

struct ServerCore {
    interface: String,
    commands: RwLock<HandleTable<CommandEntry>>,
    events: RwLock<HandleTable<EventEntry>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscriber: AtomicU64,
    executor_tx: Sender<Job>,
    serializer: Arc<dyn PayloadSerializer>,
    settings: ServerSettings,
}

/// One provided interface, served over any number of transports.
pub struct InterfaceServer {
    core: Arc<ServerCore>,
    executor: Option<JoinHandle<()>>,
}

impl InterfaceServer {
    pub fn new(
        interface: impl Into<String>,
        serializer: Arc<dyn PayloadSerializer>,
        settings: ServerSettings,
    ) -> Self {
        let interface = interface.into();
        let (executor_tx, executor_rx) = bounded(settings.executor_queue_depth);

        let core = Arc::new(ServerCore {
            interface: interface.clone(),
            commands: RwLock::new(HandleTable::new()),
            events: RwLock::new(HandleTable::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(0),
            executor_tx,
            serializer,
            settings,
        });

        let executor = std::thread::Builder::new()
            .name(format!("rcm-exec-{interface}"))
            .spawn(move || executor_loop(executor_rx))
            .map_err(|e| warn!(error = %e, "failed to spawn executor thread"))
            .ok();

        Self { core, executor }
    }

    /// Register a command under `name`.
    pub fn add_command(
        &self,
        name: impl Into<String>,
        kind: CommandKind,
        target: Arc<dyn CommandTarget>,
    ) -> Handle {
        let name = name.into();
        let handle = self.core.commands.write().insert(CommandEntry {
            name: name.clone(),
            kind,
            target,
        });
        debug!(interface = %self.core.interface, command = %name, ?kind, "command registered");
        handle
    }

    /// Register an event source and get the emitter for it.
    pub fn add_event(&self, name: impl Into<String>, kind: EventKind) -> EventEmitter {
        let name = name.into();
        let handle = self
            .core
            .events
            .write()
            .insert(EventEntry { name: name.clone(), kind });
        EventEmitter {
            core: Arc::clone(&self.core),
            handle,
            kind,
            name,
        }
    }

    /// Descriptors for the registry catalog.
    pub fn command_descriptors(&self) -> Vec<CommandDescriptor> {
        self.core
            .commands
            .read()
            .iter()
            .map(|(_, e)| CommandDescriptor { name: e.name.clone(), kind: e.kind })
            .collect()
    }

    pub fn event_descriptors(&self) -> Vec<EventDescriptor> {
        self.core
            .events
            .read()
            .iter()
            .map(|(_, e)| EventDescriptor { name: e.name.clone(), kind: e.kind })
            .collect()
    }

    /// Serve one connected transport. Returns the dispatch thread's
    /// handle; the thread exits when the peer disconnects or goes
    /// silent.
    pub fn serve(&self, pair: TransportPair) -> std::io::Result<JoinHandle<()>> {
        let (tx, rx) = pair;
        let id = self.core.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let tx = Arc::new(Mutex::new(tx));
        self.core.subscribers.lock().insert(
            id,
            Subscriber { tx: Arc::clone(&tx), events_enabled: false },
        );
        info!(interface = %self.core.interface, subscriber = id, "connection accepted");

        let core = Arc::clone(&self.core);
        std::thread::Builder::new()
            .name(format!("rcm-dispatch-{}", self.core.interface))
            .spawn(move || dispatch_loop(core, id, tx, rx))
    }

    /// Tell every connection goodbye and drop them.
    pub fn shutdown(&mut self) {
        let bye = encode_frame(&Message::Bye).ok();
        let mut subscribers = self.core.subscribers.lock();
        for (_, subscriber) in subscribers.drain() {
            let mut tx = subscriber.tx.lock();
            if let Some(body) = &bye {
                let _ = tx.send(body);
            }
            tx.shutdown();
        }
        drop(subscribers);
        // the executor exits once every job sender is gone; detach it
        self.executor.take();
    }
}

impl Drop for InterfaceServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Event source bound to one server. Cloneable; cheap to hand to the
/// owning component.
#[derive(Clone)]
pub struct EventEmitter {
    core: Arc<ServerCore>,
    handle: Handle,
    kind: EventKind,
    name: String,
}

impl EventEmitter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit a payload-free event.
    pub fn raise(&self) -> Result<(), ProxyError> {
        if self.kind != EventKind::Void {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        self.emit(None)
    }

    /// Emit an event with a payload.
    pub fn raise_with(&self, value: &ArgValue) -> Result<(), ProxyError> {
        if self.kind != EventKind::Write {
            return Err(ProxyError::KindMismatch { name: self.name.clone() });
        }
        let payload = self.core.serializer.serialize(value)?;
        self.emit(Some(payload))
    }

    fn emit(&self, payload: Option<Vec<u8>>) -> Result<(), ProxyError> {
        let body = encode_frame(&Message::Event { handle: self.handle, payload })?;

        let mut dead = Vec::new();
        {
            let subscribers = self.core.subscribers.lock();
            for (id, subscriber) in subscribers.iter() {
                if !subscriber.events_enabled {
                    continue;
                }
                if subscriber.tx.lock().send(&body).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.core.subscribers.lock();
            for id in dead {
                subscribers.remove(&id);
                debug!(interface = %self.core.interface, subscriber = id, "dead subscriber dropped");
            }
        }
        Ok(())
    }
}

fn executor_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if let Err(reason) = job.target.execute(job.arg) {
            warn!(command = %job.name, reason, "queued command failed");
        }
    }
    debug!("executor stopped");
}

fn dispatch_loop(
    core: Arc<ServerCore>,
    subscriber: u64,
    tx: Arc<Mutex<Box<dyn TransportTx>>>,
    mut rx: Box<dyn crate::transport::TransportRx>,
) {
    let mut silent_waits = 0u32;
    loop {
        match rx.recv_timeout(core.settings.recv_timeout) {
            Ok(body) => {
                silent_waits = 0;
                match decode_frame(&body) {
                    Ok(Message::Bye) => {
                        debug!(interface = %core.interface, subscriber, "peer said goodbye");
                        break;
                    }
                    Ok(message) => {
                        if let Err(e) = handle_message(&core, subscriber, &tx, message) {
                            warn!(interface = %core.interface, subscriber, error = %e, "reply failed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(interface = %core.interface, subscriber, error = %e, "undecodable frame dropped");
                    }
                }
            }
            Err(crate::error::TransportError::Timeout) => {
                silent_waits += 1;
                if silent_waits >= 3 {
                    warn!(interface = %core.interface, subscriber, "peer silent, dropping connection");
                    break;
                }
            }
            Err(e) => {
                debug!(interface = %core.interface, subscriber, error = %e, "connection closed");
                break;
            }
        }
    }
    core.subscribers.lock().remove(&subscriber);
    info!(interface = %core.interface, subscriber, "connection ended");
}

fn handle_message(
    core: &Arc<ServerCore>,
    subscriber: u64,
    tx: &Arc<Mutex<Box<dyn TransportTx>>>,
    message: Message,
) -> Result<(), ProxyError> {
    match message {
        Message::Ping => reply(tx, &Message::Pong),
        Message::Pong => Ok(()),
        Message::FetchCommandHandles { seq } => {
            let entries = core
                .commands
                .read()
                .iter()
                .map(|(handle, e)| CommandHandleEntry {
                    name: e.name.clone(),
                    kind: e.kind,
                    handle,
                })
                .collect();
            reply(tx, &Message::CommandHandles { seq, entries })
        }
        Message::FetchEventHandles { seq } => {
            // fetching the event table opts this connection in
            if let Some(s) = core.subscribers.lock().get_mut(&subscriber) {
                s.events_enabled = true;
            }
            let entries = core
                .events
                .read()
                .iter()
                .map(|(handle, e)| EventHandleEntry {
                    name: e.name.clone(),
                    kind: e.kind,
                    handle,
                })
                .collect();
            reply(tx, &Message::EventHandles { seq, entries })
        }
        Message::ExecuteCommand { seq, handle, blocking, payload } => {
            let outcome = execute_command(core, handle, blocking, payload, tx, seq)?;
            if let Some(outcome) = outcome {
                reply(tx, &Message::CommandResult { seq, outcome })
            } else {
                Ok(())
            }
        }
        other => {
            warn!(interface = %core.interface, subscriber, ?other, "unexpected message");
            Ok(())
        }
    }
}

/// Returns the outcome to send, or `None` if a reply was already sent.
fn execute_command(
    core: &Arc<ServerCore>,
    handle: Handle,
    blocking: bool,
    payload: Option<Vec<u8>>,
    tx: &Arc<Mutex<Box<dyn TransportTx>>>,
    seq: u64,
) -> Result<Option<CommandOutcome>, ProxyError> {
    let Some(entry) = core.commands.read().get(handle).cloned() else {
        debug!(interface = %core.interface, ?handle, "stale command handle rejected");
        return Ok(Some(CommandOutcome::Failed {
            reason: "stale or unknown command handle".to_string(),
        }));
    };

    let arg = match (entry.kind.takes_argument(), payload) {
        (true, Some(bytes)) => match core.serializer.deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                return Ok(Some(CommandOutcome::Failed {
                    reason: format!("argument rejected: {e}"),
                }));
            }
        },
        (true, None) => {
            return Ok(Some(CommandOutcome::Failed {
                reason: format!("command {} requires an argument", entry.name),
            }));
        }
        (false, Some(_)) => {
            return Ok(Some(CommandOutcome::Failed {
                reason: format!("command {} takes no argument", entry.name),
            }));
        }
        (false, None) => None,
    };

    if entry.kind.returns_result() || blocking {
        // inline: the reply must carry the result (or completion)
        let outcome = match entry.target.execute(arg) {
            Ok(result) => {
                let payload = match (entry.kind.returns_result(), result) {
                    (true, Some(value)) => Some(core.serializer.serialize(&value)?),
                    (true, None) => Some(core.serializer.serialize(&ArgValue::Empty)?),
                    (false, _) => None,
                };
                CommandOutcome::Done { payload }
            }
            Err(reason) => CommandOutcome::Failed { reason },
        };
        Ok(Some(outcome))
    } else {
        // queued: acknowledge first, execute on the executor thread
        match core.executor_tx.try_send(Job {
            name: entry.name.clone(),
            target: Arc::clone(&entry.target),
            arg,
        }) {
            Ok(()) => {
                reply(tx, &Message::CommandResult { seq, outcome: CommandOutcome::Accepted })?;
                Ok(None)
            }
            Err(TrySendError::Full(_)) => Ok(Some(CommandOutcome::Failed {
                reason: "executor queue full".to_string(),
            })),
            Err(TrySendError::Disconnected(_)) => Ok(Some(CommandOutcome::Failed {
                reason: "executor stopped".to_string(),
            })),
        }
    }
}

fn reply(tx: &Arc<Mutex<Box<dyn TransportTx>>>, message: &Message) -> Result<(), ProxyError> {
    let body = encode_frame(message)?;
    tx.lock().send(&body).map_err(ProxyError::from)
}
