//! End-to-end proxy tests over the in-process loopback transport.

use rcm_common::address::{CommandKind, EventKind};
use rcm_common::arg_value::ArgValue;
use rcm_proxy::message::{decode_frame, encode_frame};
use rcm_proxy::{
    ClientSettings, CommandOutcome, Handle, InterfaceClient, InterfaceServer, JsonSerializer,
    Message, ProxyError, ServerSettings,
};
use rcm_proxy::transport::loopback;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

fn f64_bits(value: f64) -> u64 {
    value.to_bits()
}

struct Fixture {
    server: InterfaceServer,
    bumps: Arc<AtomicU64>,
    target: Arc<AtomicU64>,
}

/// Server with one command of each kind plus two events.
fn fixture() -> (Fixture, rcm_proxy::EventEmitter, rcm_proxy::EventEmitter) {
    let server = InterfaceServer::new(
        "robot.state",
        Arc::new(JsonSerializer),
        ServerSettings::default(),
    );

    let bumps = Arc::new(AtomicU64::new(0));
    let counter = bumps.clone();
    server.add_command(
        "bump",
        CommandKind::Void,
        Arc::new(move |_arg| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
    );

    let target = Arc::new(AtomicU64::new(f64_bits(0.0)));
    let store = target.clone();
    server.add_command(
        "set_target",
        CommandKind::Write,
        Arc::new(move |arg| match arg {
            Some(ArgValue::Float(v)) => {
                store.store(f64_bits(v), Ordering::SeqCst);
                Ok(None)
            }
            other => Err(format!("expected float, got {other:?}")),
        }),
    );

    let position = target.clone();
    server.add_command(
        "get_position",
        CommandKind::Read,
        Arc::new(move |_arg| {
            Ok(Some(ArgValue::Float(f64::from_bits(position.load(Ordering::SeqCst)))))
        }),
    );

    server.add_command(
        "scale",
        CommandKind::QualifiedRead,
        Arc::new(|arg| match arg {
            Some(ArgValue::Float(v)) => Ok(Some(ArgValue::Float(v * 2.0))),
            other => Err(format!("expected float, got {other:?}")),
        }),
    );

    server.add_command(
        "always_fails",
        CommandKind::Void,
        Arc::new(|_arg| Err("boom".to_string())),
    );

    let fault = server.add_event("fault", EventKind::Void);
    let progress = server.add_event("progress", EventKind::Write);

    (Fixture { server, bumps, target }, fault, progress)
}

fn connected_client(fixture: &Fixture) -> InterfaceClient {
    let (server_pair, client_pair) = loopback::pair();
    fixture.server.serve(server_pair).unwrap();
    InterfaceClient::connect(
        "robot.state",
        client_pair,
        Arc::new(JsonSerializer),
        ClientSettings::default(),
    )
}

#[test]
fn test_commands_of_every_kind() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    client.fetch_handles().unwrap();

    // blocking void executes before the call returns
    client.function("bump").unwrap().execute(true).unwrap();
    assert_eq!(f.bumps.load(Ordering::SeqCst), 1);

    // blocking write
    client
        .function("set_target")
        .unwrap()
        .execute_with(&ArgValue::Float(2.5), true)
        .unwrap();
    assert_eq!(f64::from_bits(f.target.load(Ordering::SeqCst)), 2.5);

    // read sees the written value
    let position = client.function("get_position").unwrap().read().unwrap();
    assert_eq!(position, ArgValue::Float(2.5));

    // qualified read
    let scaled = client
        .function("scale")
        .unwrap()
        .qualified_read(&ArgValue::Float(3.0))
        .unwrap();
    assert_eq!(scaled, ArgValue::Float(6.0));
}

#[test]
fn test_non_blocking_command_is_queued() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    client.fetch_handles().unwrap();

    client.function("bump").unwrap().execute(false).unwrap();

    // acknowledged immediately; execution completes on the executor
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while f.bumps.load(Ordering::SeqCst) == 0 {
        assert!(std::time::Instant::now() < deadline, "queued command never ran");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_function_lookup_requires_fetch() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    assert!(matches!(
        client.function("bump"),
        Err(ProxyError::UnknownFunction { .. })
    ));
}

#[test]
fn test_kind_mismatch_rejected_client_side() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    client.fetch_handles().unwrap();

    let bump = client.function("bump").unwrap();
    assert!(matches!(bump.read(), Err(ProxyError::KindMismatch { .. })));
    assert!(matches!(
        bump.execute_with(&ArgValue::Int(1), true),
        Err(ProxyError::KindMismatch { .. })
    ));
}

#[test]
fn test_remote_failure_propagates() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    client.fetch_handles().unwrap();

    let err = client.function("always_fails").unwrap().execute(true).unwrap_err();
    match err {
        ProxyError::RemoteFailure { reason } => assert_eq!(reason, "boom"),
        other => panic!("expected remote failure, got {other:?}"),
    }
}

#[test]
fn test_wrong_argument_shape_rejected_by_server() {
    let (f, _fault, _progress) = fixture();
    let client = connected_client(&f);
    client.fetch_handles().unwrap();

    // right kind, wrong payload variant: server target rejects it
    let err = client
        .function("set_target")
        .unwrap()
        .execute_with(&ArgValue::Text("not a float".to_string()), true)
        .unwrap_err();
    assert!(matches!(err, ProxyError::RemoteFailure { .. }));
}

#[test]
fn test_events_delivered_after_fetch() {
    let (f, fault, progress) = fixture();
    let client = connected_client(&f);

    let (fault_tx, fault_rx) = crossbeam_channel::unbounded();
    let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
    client.set_event_handler("fault", EventKind::Void, move |payload| {
        fault_tx.send(payload).unwrap();
    });
    client.set_event_handler("progress", EventKind::Write, move |payload| {
        progress_tx.send(payload).unwrap();
    });

    client.fetch_handles().unwrap();

    fault.raise().unwrap();
    progress.raise_with(&ArgValue::Int(42)).unwrap();

    assert_eq!(fault_rx.recv_timeout(Duration::from_secs(1)).unwrap(), None);
    assert_eq!(
        progress_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Some(ArgValue::Int(42))
    );
}

#[test]
fn test_event_emitter_kind_checked() {
    let (_f, fault, progress) = fixture();
    assert!(matches!(
        fault.raise_with(&ArgValue::Int(1)),
        Err(ProxyError::KindMismatch { .. })
    ));
    assert!(matches!(progress.raise(), Err(ProxyError::KindMismatch { .. })));
}

#[test]
fn test_events_withheld_until_table_fetched() {
    let (f, fault, _progress) = fixture();
    let (server_pair, (mut tx, mut rx)) = loopback::pair();
    f.server.serve(server_pair).unwrap();

    // connection is up but has not fetched the event table
    fault.raise().unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    tx.send(&encode_frame(&Message::FetchEventHandles { seq: 1 }).unwrap()).unwrap();
    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    let Message::EventHandles { seq: 1, entries } = reply else {
        panic!("expected event handles, got {reply:?}");
    };
    assert_eq!(entries.len(), 2);

    fault.raise().unwrap();
    let event = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    assert!(matches!(event, Message::Event { payload: None, .. }));
}

#[test]
fn test_stale_handle_rejected_by_server() {
    let (f, _fault, _progress) = fixture();
    let (server_pair, (mut tx, mut rx)) = loopback::pair();
    f.server.serve(server_pair).unwrap();

    let bogus = Handle::from_parts(0, 999);
    tx.send(
        &encode_frame(&Message::ExecuteCommand {
            seq: 7,
            handle: bogus,
            blocking: true,
            payload: None,
        })
        .unwrap(),
    )
    .unwrap();

    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    match reply {
        Message::CommandResult { seq: 7, outcome: CommandOutcome::Failed { reason } } => {
            assert!(reason.contains("stale"), "unexpected reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_malformed_argument_payload_rejected() {
    let (f, _fault, _progress) = fixture();
    let (server_pair, (mut tx, mut rx)) = loopback::pair();
    f.server.serve(server_pair).unwrap();

    // fetch a real handle for the write command
    tx.send(&encode_frame(&Message::FetchCommandHandles { seq: 1 }).unwrap()).unwrap();
    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    let Message::CommandHandles { entries, .. } = reply else {
        panic!("expected command handles");
    };
    let set_target = entries.iter().find(|e| e.name == "set_target").unwrap().handle;

    tx.send(
        &encode_frame(&Message::ExecuteCommand {
            seq: 2,
            handle: set_target,
            blocking: true,
            payload: Some(vec![0x00, 0xff, 0x13]),
        })
        .unwrap(),
    )
    .unwrap();

    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    match reply {
        Message::CommandResult { seq: 2, outcome: CommandOutcome::Failed { reason } } => {
            assert!(reason.contains("argument rejected"), "unexpected reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // the connection survives the bad request
    tx.send(&encode_frame(&Message::Ping).unwrap()).unwrap();
    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    assert_eq!(reply, Message::Pong);
}

#[test]
fn test_missing_argument_rejected() {
    let (f, _fault, _progress) = fixture();
    let (server_pair, (mut tx, mut rx)) = loopback::pair();
    f.server.serve(server_pair).unwrap();

    tx.send(&encode_frame(&Message::FetchCommandHandles { seq: 1 }).unwrap()).unwrap();
    let Message::CommandHandles { entries, .. } =
        decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap()
    else {
        panic!("expected command handles");
    };
    let set_target = entries.iter().find(|e| e.name == "set_target").unwrap().handle;

    tx.send(
        &encode_frame(&Message::ExecuteCommand {
            seq: 2,
            handle: set_target,
            blocking: true,
            payload: None,
        })
        .unwrap(),
    )
    .unwrap();

    let reply = decode_frame(&rx.recv_timeout(Duration::from_secs(1)).unwrap()).unwrap();
    assert!(matches!(
        reply,
        Message::CommandResult { outcome: CommandOutcome::Failed { .. }, .. }
    ));
}

#[test]
fn test_severed_transport_fails_calls() {
    let (f, _fault, _progress) = fixture();
    let mut server = f.server;
    let (server_pair, client_pair) = loopback::pair();
    server.serve(server_pair).unwrap();

    let client = InterfaceClient::connect(
        "robot.state",
        client_pair,
        Arc::new(JsonSerializer),
        ClientSettings::default(),
    );
    client.fetch_handles().unwrap();
    let bump = client.function("bump").unwrap();

    let disconnected = Arc::new(AtomicBool::new(false));
    let flag = disconnected.clone();
    client.on_disconnect(move || flag.store(true, Ordering::SeqCst));

    server.shutdown();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while client.is_connected() {
        assert!(std::time::Instant::now() < deadline, "client never noticed the loss");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(disconnected.load(Ordering::SeqCst));
    assert!(matches!(bump.execute(true), Err(ProxyError::ConnectionLost)));
}

#[test]
fn test_descriptors_reflect_registrations() {
    let (f, _fault, _progress) = fixture();
    let commands = f.server.command_descriptors();
    assert_eq!(commands.len(), 5);
    assert!(commands.iter().any(|c| c.name == "scale" && c.kind == CommandKind::QualifiedRead));

    let events = f.server.event_descriptors();
    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|e| e.name == "fault" && e.kind == EventKind::Void));
}
