//! Demo telemetry component.
//!
//! Integrates a commanded velocity into a position signal once per
//! cycle, logs its state table into history, and exposes the whole
//! thing over one provided interface: velocity and zeroing as
//! commands, position and velocity as reads, a velocity-change event
//! for anyone mirroring the interface remotely.

use rcm_common::arg_value::ArgValue;
use rcm_common::prelude::{CommandKind, EventKind, TimeSource};
use rcm_proxy::{InterfaceServer, JsonSerializer, ServerSettings};
use rcm_state_table::{SignalId, StateTable, TableResult, TableWriter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub const COMPONENT: &str = "telemetry";
pub const INTERFACE: &str = "state";

/// Seconds between period-statistics log lines.
const STATS_INTERVAL_S: f64 = 5.0;

pub struct Telemetry {
    table: Arc<StateTable>,
    writer: TableWriter,
    position_id: SignalId,
    velocity_id: SignalId,
    position: f64,
    target_velocity: Arc<AtomicU64>,
    zero_request: Arc<AtomicBool>,
    clock: Arc<dyn TimeSource>,
}

impl Telemetry {
    /// Build the component and the interface server that fronts it.
    /// The server is returned separately so the accept loop can own it.
    pub fn new(clock: Arc<dyn TimeSource>) -> TableResult<(Self, InterfaceServer)> {
        let (table, mut writer) = StateTable::new(COMPONENT, 512, Arc::clone(&clock));
        let position_id = writer.new_signal::<f64>("position")?;
        let velocity_id = writer.new_signal::<f64>("velocity")?;

        let target_velocity = Arc::new(AtomicU64::new(0.0f64.to_bits()));
        let zero_request = Arc::new(AtomicBool::new(false));

        let server = InterfaceServer::new(
            format!("{COMPONENT}.{INTERFACE}"),
            Arc::new(JsonSerializer),
            ServerSettings::default(),
        );
        let velocity_changed = server.add_event("velocity_changed", EventKind::Write);

        let target = Arc::clone(&target_velocity);
        server.add_command(
            "set_velocity",
            CommandKind::Write,
            Arc::new(move |arg| match arg {
                Some(ArgValue::Float(v)) => {
                    target.store(v.to_bits(), Ordering::Release);
                    if let Err(e) = velocity_changed.raise_with(&ArgValue::Float(v)) {
                        warn!(error = %e, "velocity_changed event not delivered");
                    }
                    Ok(None)
                }
                other => Err(format!("set_velocity expects a float, got {other:?}")),
            }),
        );

        let zero = Arc::clone(&zero_request);
        server.add_command(
            "zero_position",
            CommandKind::Void,
            Arc::new(move |_arg| {
                zero.store(true, Ordering::Release);
                Ok(None)
            }),
        );

        let position = table.accessor::<f64>(position_id)?;
        server.add_command(
            "get_position",
            CommandKind::Read,
            Arc::new(move |_arg| {
                position
                    .get_latest()
                    .map(|(value, _)| Some(ArgValue::Float(value)))
                    .map_err(|e| e.to_string())
            }),
        );

        let velocity = table.accessor::<f64>(velocity_id)?;
        server.add_command(
            "get_velocity",
            CommandKind::Read,
            Arc::new(move |_arg| {
                velocity
                    .get_latest()
                    .map(|(value, _)| Some(ArgValue::Float(value)))
                    .map_err(|e| e.to_string())
            }),
        );

        let component = Self {
            table,
            writer,
            position_id,
            velocity_id,
            position: 0.0,
            target_velocity,
            zero_request,
            clock,
        };
        Ok((component, server))
    }

    /// Periodic cycle until `running` goes false.
    pub fn run(&mut self, running: &AtomicBool, cycle: Duration) -> TableResult<()> {
        info!(component = COMPONENT, cycle_us = cycle.as_micros() as u64, "cycle loop started");
        let mut last_tic = self.clock.now();
        let mut last_stats = last_tic;

        while running.load(Ordering::Acquire) {
            self.writer.start();

            let tic = self.clock.now();
            let dt = tic - last_tic;
            last_tic = tic;

            if self.zero_request.swap(false, Ordering::AcqRel) {
                info!(component = COMPONENT, "position zeroed");
                self.position = 0.0;
            }
            let velocity = f64::from_bits(self.target_velocity.load(Ordering::Acquire));
            self.position += velocity * dt;

            self.writer.set(self.position_id, self.position)?;
            self.writer.set(self.velocity_id, velocity)?;
            self.writer.advance()?;

            if tic - last_stats >= STATS_INTERVAL_S {
                let stats = self.table.period_stats();
                info!(
                    component = COMPONENT,
                    samples = stats.samples(),
                    period_avg_us = stats.period_avg() * 1e6,
                    period_max_us = stats.period_max() * 1e6,
                    compute_avg_us = stats.compute_avg() * 1e6,
                    "cycle statistics"
                );
                last_stats = tic;
            }

            std::thread::sleep(cycle);
        }
        info!(component = COMPONENT, "cycle loop stopped");
        Ok(())
    }
}
