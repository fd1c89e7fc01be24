//! Per-process dependency bundle.
//!
//! Everything a component needs from its process (the global registry,
//! the local catalog, the clock) arrives through a [`ProcessContext`]
//! handed down at construction. There is no process-global state to
//! reach for.

use crate::error::RegistryResult;
use crate::global::GlobalRegistry;
use crate::local::{InterfaceDescription, LocalRegistry};
use rcm_common::address::{InterfaceAddress, InterfaceRole};
use rcm_common::time::TimeSource;
use std::sync::Arc;
use tracing::warn;

/// One process's view of the middleware.
pub struct ProcessContext {
    process: String,
    registry: Arc<GlobalRegistry>,
    local: Arc<LocalRegistry>,
    clock: Arc<dyn TimeSource>,
}

impl ProcessContext {
    /// Register `process` with the global registry, attach its catalog
    /// so descriptor queries resolve, and build its context.
    pub fn new(
        process: impl Into<String>,
        registry: Arc<GlobalRegistry>,
        clock: Arc<dyn TimeSource>,
    ) -> RegistryResult<Self> {
        let process = process.into();
        registry.add_process(&process)?;
        let local = Arc::new(LocalRegistry::new(process.clone()));
        registry.attach_catalog(Arc::clone(&local))?;
        Ok(Self { process, registry, local, clock })
    }

    pub fn process_name(&self) -> &str {
        &self.process
    }

    pub fn registry(&self) -> &Arc<GlobalRegistry> {
        &self.registry
    }

    pub fn local(&self) -> &LocalRegistry {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    /// Register a component in both the local catalog and the global
    /// registry.
    pub fn register_component(&self, component: &str) -> RegistryResult<()> {
        self.local.register_component(component)?;
        self.registry.add_component(&self.process, component)
    }

    /// Register a provided interface with its description.
    pub fn register_provided(
        &self,
        component: &str,
        interface: &str,
        description: InterfaceDescription,
    ) -> RegistryResult<()> {
        self.local.register_provided(component, interface, description)?;
        self.registry.add_interface(
            &InterfaceAddress::new(&self.process, component, interface),
            InterfaceRole::Provided,
        )
    }

    /// Register a required interface.
    pub fn register_required(&self, component: &str, interface: &str) -> RegistryResult<()> {
        self.local.register_required(component, interface)?;
        self.registry.add_interface(
            &InterfaceAddress::new(&self.process, component, interface),
            InterfaceRole::Required,
        )
    }

    /// Address of an interface hosted by this process.
    pub fn address(&self, component: &str, interface: &str) -> InterfaceAddress {
        InterfaceAddress::new(&self.process, component, interface)
    }

    /// Deregister this process from the global registry, tearing down
    /// its connections. An orderly departure, not the dead-peer path.
    pub fn leave(&self) {
        if let Err(e) = self.registry.remove_process(&self.process, false) {
            warn!(process = %self.process, error = %e, "process removal failed");
        }
    }
}
