//! # RCM Node Binary
//!
//! Hosts one middleware process: loads the node configuration,
//! registers the process and its components with the connection
//! registry, serves their provided interfaces over TCP, and runs the
//! periodic component cycle until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Run with a config file
//! rcm_node --config config/node.toml
//!
//! # Verbose logging
//! rcm_node --config config/node.toml -v
//!
//! # JSON log output
//! rcm_node --config config/node.toml --json
//! ```

#![deny(warnings)]

mod telemetry;

use clap::Parser;
use rcm_common::config::{ConfigLoader, LogLevel, NodeConfig};
use rcm_common::prelude::{DEFAULT_CYCLE_TIME, MonotonicClock, TimeSource};
use rcm_proxy::InterfaceServer;
use rcm_proxy::transport::tcp;
use rcm_registry::{GlobalRegistry, InterfaceDescription, ProcessContext, RegistrySettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// RCM Node - component host with state tables and interface proxies
#[derive(Parser, Debug)]
#[command(name = "rcm_node")]
#[command(author = "RCM")]
#[command(version)]
#[command(about = "Hosts middleware components and serves their interfaces")]
#[command(long_about = None)]
struct Args {
    /// Path to the node configuration file (node.toml).
    #[arg(short, long, default_value = "/etc/rcm/node.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("node startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = NodeConfig::load(&args.config)?;
    config.validate()?;

    setup_tracing(&args, config.shared.log_level);

    info!("RCM node v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(process = %config.shared.process_name, "registering process");

    let clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock::new());
    let registry = GlobalRegistry::new(
        RegistrySettings::from(&config.registry),
        Arc::clone(&clock),
    );
    let context = ProcessContext::new(
        config.shared.process_name.clone(),
        Arc::clone(&registry),
        Arc::clone(&clock),
    )?;

    let (mut component, server) = telemetry::Telemetry::new(Arc::clone(&clock))?;
    context.register_component(telemetry::COMPONENT)?;
    context.register_provided(
        telemetry::COMPONENT,
        telemetry::INTERFACE,
        InterfaceDescription {
            commands: server.command_descriptors(),
            events: server.event_descriptors(),
        },
    )?;

    let listener = tcp::Listener::bind(&config.proxy.listen_addr)?;
    info!(addr = %listener.local_addr()?, "interface server listening");
    std::thread::Builder::new()
        .name("rcm-accept".to_string())
        .spawn(move || accept_loop(listener, server))?;

    // Setup signal handler.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    if let Err(e) = component.run(&running, DEFAULT_CYCLE_TIME) {
        error!("cycle loop error: {}", e);
    }

    context.leave();
    registry.shutdown();
    info!("RCM node shutdown complete");
    Ok(())
}

/// Hand every accepted connection to the interface server. The server
/// lives on this thread; dropping it on exit says goodbye to all peers.
fn accept_loop(listener: tcp::Listener, server: InterfaceServer) {
    loop {
        match listener.accept() {
            Ok(pair) => {
                if let Err(e) = server.serve(pair) {
                    warn!(error = %e, "failed to start connection dispatch");
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed, stopping listener");
                break;
            }
        }
    }
}

/// Setup tracing subscriber based on CLI arguments and config.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        "debug"
    } else {
        level.as_filter_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
