//! Per-process interface catalog.
//!
//! Keeps the command and event descriptors of the interfaces this
//! process hosts. The global registry tracks who is connected to whom;
//! the local catalog answers what an interface actually offers, which
//! is what the proxy layer serves to remote peers.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use rcm_common::address::{CommandDescriptor, EventDescriptor};
use std::collections::BTreeMap;

/// Commands and events one provided interface offers.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDescription {
    pub commands: Vec<CommandDescriptor>,
    pub events: Vec<EventDescriptor>,
}

#[derive(Default)]
struct LocalComponent {
    provided: BTreeMap<String, InterfaceDescription>,
    required: Vec<String>,
}

/// Catalog of this process's components and interfaces.
pub struct LocalRegistry {
    process: String,
    components: Mutex<BTreeMap<String, LocalComponent>>,
}

impl LocalRegistry {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            components: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process
    }

    pub fn register_component(&self, component: &str) -> RegistryResult<()> {
        let mut components = self.components.lock();
        if components.contains_key(component) {
            return Err(RegistryError::ComponentAlreadyRegistered {
                process: self.process.clone(),
                component: component.to_string(),
            });
        }
        components.insert(component.to_string(), LocalComponent::default());
        Ok(())
    }

    pub fn register_provided(
        &self,
        component: &str,
        interface: &str,
        description: InterfaceDescription,
    ) -> RegistryResult<()> {
        let mut components = self.components.lock();
        let entry = components
            .get_mut(component)
            .ok_or_else(|| RegistryError::ComponentNotFound {
                process: self.process.clone(),
                component: component.to_string(),
            })?;
        if entry.provided.contains_key(interface) {
            return Err(RegistryError::InterfaceAlreadyRegistered {
                uid: format!("{}:{}:{}", self.process, component, interface),
            });
        }
        entry.provided.insert(interface.to_string(), description);
        Ok(())
    }

    pub fn register_required(&self, component: &str, interface: &str) -> RegistryResult<()> {
        let mut components = self.components.lock();
        let entry = components
            .get_mut(component)
            .ok_or_else(|| RegistryError::ComponentNotFound {
                process: self.process.clone(),
                component: component.to_string(),
            })?;
        if entry.required.iter().any(|i| i == interface) {
            return Err(RegistryError::InterfaceAlreadyRegistered {
                uid: format!("{}:{}:{}", self.process, component, interface),
            });
        }
        entry.required.push(interface.to_string());
        Ok(())
    }

    /// Description of a provided interface, if this process hosts it.
    pub fn description(&self, component: &str, interface: &str) -> Option<InterfaceDescription> {
        self.components
            .lock()
            .get(component)
            .and_then(|c| c.provided.get(interface))
            .cloned()
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.lock().keys().cloned().collect()
    }

    pub fn provided_names(&self, component: &str) -> Vec<String> {
        self.components
            .lock()
            .get(component)
            .map(|c| c.provided.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn required_names(&self, component: &str) -> Vec<String> {
        self.components
            .lock()
            .get(component)
            .map(|c| c.required.clone())
            .unwrap_or_default()
    }
}
