//! Process / component / interface store.
//!
//! Three-level map mirroring the deployment structure: processes own
//! components, components own provided and required interfaces, and
//! each interface keeps the list of connection ids attached to it. The
//! whole store sits behind one registry mutex; nothing here locks.

use crate::connection::ConnectionId;
use crate::error::{RegistryError, RegistryResult};
use rcm_common::address::{InterfaceAddress, InterfaceRole};
use std::collections::BTreeMap;

#[derive(Default)]
struct InterfaceEntry {
    connections: Vec<ConnectionId>,
}

#[derive(Default)]
struct ComponentEntry {
    provided: BTreeMap<String, InterfaceEntry>,
    required: BTreeMap<String, InterfaceEntry>,
}

impl ComponentEntry {
    fn side(&self, role: InterfaceRole) -> &BTreeMap<String, InterfaceEntry> {
        match role {
            InterfaceRole::Provided => &self.provided,
            InterfaceRole::Required => &self.required,
        }
    }

    fn side_mut(&mut self, role: InterfaceRole) -> &mut BTreeMap<String, InterfaceEntry> {
        match role {
            InterfaceRole::Provided => &mut self.provided,
            InterfaceRole::Required => &mut self.required,
        }
    }
}

#[derive(Default)]
struct ProcessEntry {
    components: BTreeMap<String, ComponentEntry>,
}

/// Owned process map, guarded by one registry mutex.
#[derive(Default)]
pub(crate) struct ProcessStore {
    processes: BTreeMap<String, ProcessEntry>,
}

impl ProcessStore {
    pub(crate) fn add_process(&mut self, name: &str) -> RegistryResult<()> {
        if self.processes.contains_key(name) {
            return Err(RegistryError::ProcessAlreadyRegistered { name: name.to_string() });
        }
        self.processes.insert(name.to_string(), ProcessEntry::default());
        Ok(())
    }

    pub(crate) fn remove_process(&mut self, name: &str) -> RegistryResult<()> {
        self.processes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::ProcessNotFound { name: name.to_string() })
    }

    pub(crate) fn has_process(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    pub(crate) fn add_component(&mut self, process: &str, component: &str) -> RegistryResult<()> {
        let entry = self
            .processes
            .get_mut(process)
            .ok_or_else(|| RegistryError::ProcessNotFound { name: process.to_string() })?;
        if entry.components.contains_key(component) {
            return Err(RegistryError::ComponentAlreadyRegistered {
                process: process.to_string(),
                component: component.to_string(),
            });
        }
        entry
            .components
            .insert(component.to_string(), ComponentEntry::default());
        Ok(())
    }

    pub(crate) fn remove_component(&mut self, process: &str, component: &str) -> RegistryResult<()> {
        let entry = self
            .processes
            .get_mut(process)
            .ok_or_else(|| RegistryError::ProcessNotFound { name: process.to_string() })?;
        entry
            .components
            .remove(component)
            .map(|_| ())
            .ok_or_else(|| RegistryError::ComponentNotFound {
                process: process.to_string(),
                component: component.to_string(),
            })
    }

    pub(crate) fn has_component(&self, process: &str, component: &str) -> bool {
        self.processes
            .get(process)
            .is_some_and(|p| p.components.contains_key(component))
    }

    pub(crate) fn add_interface(
        &mut self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> RegistryResult<()> {
        let component = self.component_mut(address)?;
        let side = component.side_mut(role);
        if side.contains_key(&address.interface) {
            return Err(RegistryError::InterfaceAlreadyRegistered { uid: address.uid() });
        }
        side.insert(address.interface.clone(), InterfaceEntry::default());
        Ok(())
    }

    pub(crate) fn remove_interface(
        &mut self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> RegistryResult<()> {
        let component = self.component_mut(address)?;
        component
            .side_mut(role)
            .remove(&address.interface)
            .map(|_| ())
            .ok_or_else(|| RegistryError::InterfaceNotFound { uid: address.uid() })
    }

    pub(crate) fn has_interface(&self, address: &InterfaceAddress, role: InterfaceRole) -> bool {
        self.processes
            .get(&address.process)
            .and_then(|p| p.components.get(&address.component))
            .is_some_and(|c| c.side(role).contains_key(&address.interface))
    }

    pub(crate) fn attach_connection(
        &mut self,
        address: &InterfaceAddress,
        role: InterfaceRole,
        id: ConnectionId,
    ) -> RegistryResult<()> {
        let entry = self.interface_mut(address, role)?;
        if !entry.connections.contains(&id) {
            entry.connections.push(id);
        }
        Ok(())
    }

    /// Remove `id` from the interface's list. Missing process,
    /// component, or interface is fine here: detach runs during
    /// teardown, when the owner may already be gone.
    pub(crate) fn detach_connection(
        &mut self,
        address: &InterfaceAddress,
        role: InterfaceRole,
        id: ConnectionId,
    ) {
        if let Ok(entry) = self.interface_mut(address, role) {
            entry.connections.retain(|c| *c != id);
        }
    }

    pub(crate) fn connections_of(
        &self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> Vec<ConnectionId> {
        self.processes
            .get(&address.process)
            .and_then(|p| p.components.get(&address.component))
            .and_then(|c| c.side(role).get(&address.interface))
            .map(|e| e.connections.clone())
            .unwrap_or_default()
    }

    pub(crate) fn process_names(&self) -> Vec<String> {
        self.processes.keys().cloned().collect()
    }

    pub(crate) fn component_names(&self, process: &str) -> Vec<String> {
        self.processes
            .get(process)
            .map(|p| p.components.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn interface_names(
        &self,
        process: &str,
        component: &str,
        role: InterfaceRole,
    ) -> Vec<String> {
        self.processes
            .get(process)
            .and_then(|p| p.components.get(component))
            .map(|c| c.side(role).keys().cloned().collect())
            .unwrap_or_default()
    }

    fn component_mut(&mut self, address: &InterfaceAddress) -> RegistryResult<&mut ComponentEntry> {
        self.processes
            .get_mut(&address.process)
            .ok_or_else(|| RegistryError::ProcessNotFound { name: address.process.clone() })?
            .components
            .get_mut(&address.component)
            .ok_or_else(|| RegistryError::ComponentNotFound {
                process: address.process.clone(),
                component: address.component.clone(),
            })
    }

    fn interface_mut(
        &mut self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> RegistryResult<&mut InterfaceEntry> {
        self.component_mut(address)?
            .side_mut(role)
            .get_mut(&address.interface)
            .ok_or_else(|| RegistryError::InterfaceNotFound { uid: address.uid() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(interface: &str) -> InterfaceAddress {
        InterfaceAddress::new("proc", "comp", interface)
    }

    fn store_with_component() -> ProcessStore {
        let mut store = ProcessStore::default();
        store.add_process("proc").unwrap();
        store.add_component("proc", "comp").unwrap();
        store
    }

    #[test]
    fn test_interface_registration() {
        let mut store = store_with_component();
        store.add_interface(&addr("state"), InterfaceRole::Provided).unwrap();
        assert!(store.has_interface(&addr("state"), InterfaceRole::Provided));
        assert!(!store.has_interface(&addr("state"), InterfaceRole::Required));

        assert!(matches!(
            store.add_interface(&addr("state"), InterfaceRole::Provided),
            Err(RegistryError::InterfaceAlreadyRegistered { .. })
        ));

        // Same name on the other side is a different interface.
        store.add_interface(&addr("state"), InterfaceRole::Required).unwrap();
    }

    #[test]
    fn test_attach_detach_connection() {
        let mut store = store_with_component();
        store.add_interface(&addr("state"), InterfaceRole::Provided).unwrap();

        store
            .attach_connection(&addr("state"), InterfaceRole::Provided, ConnectionId(3))
            .unwrap();
        assert_eq!(
            store.connections_of(&addr("state"), InterfaceRole::Provided),
            vec![ConnectionId(3)]
        );

        store.detach_connection(&addr("state"), InterfaceRole::Provided, ConnectionId(3));
        assert!(store.connections_of(&addr("state"), InterfaceRole::Provided).is_empty());

        // detach of something already gone is silent
        store.detach_connection(&addr("missing"), InterfaceRole::Provided, ConnectionId(3));
    }

    #[test]
    fn test_unknown_process_reported() {
        let mut store = ProcessStore::default();
        assert!(matches!(
            store.add_component("ghost", "comp"),
            Err(RegistryError::ProcessNotFound { .. })
        ));
    }
}
