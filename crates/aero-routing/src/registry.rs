//! Collaborator contracts the routing engine consumes, and an in-memory implementation.
//!
//! Hosts with their own object model implement [`ObjectRegistry`], [`RootReferences`] and
//! [`DeviceMetadata`] directly. [`StaticRegistry`] covers hosts (and tests) that describe their
//! topology as plain data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::TopologyError;
use crate::registers::Register;
use crate::topology::{AddressSpace, ObjectId, SpaceKind, TargetRef};
use crate::translate::{TransactionTranslator, Translator};

/// Object registry of the host.
pub trait ObjectRegistry {
    /// Names of every address-space object currently alive.
    fn space_ids(&self) -> Vec<ObjectId>;

    /// Routing table of a space, or `None` if `id` is not a space.
    fn space(&self, id: &ObjectId) -> Option<AddressSpace>;

    fn translator(&self, target: &TargetRef) -> Option<&dyn Translator>;

    fn transaction_translator(&self, target: &TargetRef) -> Option<&dyn TransactionTranslator>;

    /// Whether an object of this name exists at all.
    fn contains(&self, id: &ObjectId) -> bool;

    fn class_name(&self, id: &ObjectId) -> Option<String>;

    fn has_interface(&self, id: &ObjectId, interface: &str) -> bool;
}

/// Objects a processor-like root references directly (its memory and port spaces).
pub trait RootReferences {
    fn referenced_spaces(&self, root: &ObjectId) -> Vec<ObjectId>;
}

/// Register layout of devices.
pub trait DeviceMetadata {
    /// Bank names of a device.
    fn banks(&self, device: &ObjectId) -> Vec<String>;

    /// Registers of one bank, sorted by offset.
    fn registers(&self, device: &ObjectId, bank: &str) -> Vec<Register>;
}

enum Object {
    Space(AddressSpace),
    Translator(Arc<dyn Translator>),
    TransactionTranslator(Arc<dyn TransactionTranslator>),
    Device { banks: BTreeMap<String, Vec<Register>> },
    Processor { references: Vec<ObjectId> },
}

struct Entry {
    class: String,
    interfaces: BTreeSet<String>,
    object: Object,
}

/// In-memory object registry.
///
/// Map entries are validated on insertion: port-space entries must be at most 4 bytes long and
/// carry priority 0, and `base + offset` must not overflow.
#[derive(Default)]
pub struct StaticRegistry {
    objects: BTreeMap<ObjectId, Entry>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        id: ObjectId,
        class: &str,
        object: Object,
    ) -> Result<&mut Entry, TopologyError> {
        if self.objects.contains_key(&id) {
            return Err(TopologyError::DuplicateObject(id));
        }
        Ok(self.objects.entry(id).or_insert(Entry {
            class: class.to_owned(),
            interfaces: BTreeSet::new(),
            object,
        }))
    }

    pub fn add_space(
        &mut self,
        id: impl Into<ObjectId>,
        space: AddressSpace,
    ) -> Result<(), TopologyError> {
        let id = id.into();
        validate_space(&id, &space)?;
        let class = match space.kind {
            SpaceKind::Memory => "memory-space",
            SpaceKind::Port => "port-space",
        };
        self.insert(id, class, Object::Space(space))?;
        Ok(())
    }

    pub fn add_translator(
        &mut self,
        id: impl Into<ObjectId>,
        translator: Arc<dyn Translator>,
    ) -> Result<(), TopologyError> {
        let entry = self.insert(id.into(), "translator", Object::Translator(translator))?;
        entry.interfaces.insert("translator".to_owned());
        Ok(())
    }

    pub fn add_transaction_translator(
        &mut self,
        id: impl Into<ObjectId>,
        translator: Arc<dyn TransactionTranslator>,
    ) -> Result<(), TopologyError> {
        let entry = self.insert(
            id.into(),
            "transaction-translator",
            Object::TransactionTranslator(translator),
        )?;
        entry.interfaces.insert("transaction_translator".to_owned());
        Ok(())
    }

    /// Register a device of class `class`. Banks are added with [`Self::add_bank`].
    pub fn add_device(
        &mut self,
        id: impl Into<ObjectId>,
        class: &str,
    ) -> Result<(), TopologyError> {
        let entry = self.insert(
            id.into(),
            class,
            Object::Device {
                banks: BTreeMap::new(),
            },
        )?;
        entry.interfaces.insert("transaction".to_owned());
        Ok(())
    }

    /// Attach a register bank to a device. Registers are stored sorted by offset.
    pub fn add_bank(
        &mut self,
        device: impl Into<ObjectId>,
        bank: impl Into<String>,
        mut registers: Vec<Register>,
    ) -> Result<(), TopologyError> {
        let device = device.into();
        let Some(Entry {
            object: Object::Device { banks },
            ..
        }) = self.objects.get_mut(&device)
        else {
            return Err(TopologyError::UnknownObject(device));
        };
        registers.sort_by_key(|r| r.offset);
        banks.insert(bank.into(), registers);
        Ok(())
    }

    pub fn add_processor(
        &mut self,
        id: impl Into<ObjectId>,
        references: Vec<ObjectId>,
    ) -> Result<(), TopologyError> {
        let entry = self.insert(id.into(), "processor", Object::Processor { references })?;
        entry.interfaces.insert("processor_info".to_owned());
        Ok(())
    }

    pub fn add_interface(
        &mut self,
        id: impl Into<ObjectId>,
        interface: impl Into<String>,
    ) -> Result<(), TopologyError> {
        let id = id.into();
        let Some(entry) = self.objects.get_mut(&id) else {
            return Err(TopologyError::UnknownObject(id));
        };
        entry.interfaces.insert(interface.into());
        Ok(())
    }

    /// Remove an object, as a host would when a component is destroyed.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        self.objects.remove(id).is_some()
    }

    /// Mutable access to a space's table, for hosts that remap at runtime.
    ///
    /// The edited table is validated again before it becomes visible.
    pub fn update_space<F>(&mut self, id: &ObjectId, edit: F) -> Result<(), TopologyError>
    where
        F: FnOnce(&mut AddressSpace),
    {
        let Some(Entry {
            object: Object::Space(space),
            ..
        }) = self.objects.get_mut(id)
        else {
            return Err(TopologyError::UnknownObject(id.clone()));
        };
        let mut edited = space.clone();
        edit(&mut edited);
        validate_space(id, &edited)?;
        *space = edited;
        Ok(())
    }
}

fn validate_space(id: &ObjectId, space: &AddressSpace) -> Result<(), TopologyError> {
    for (index, entry) in space.entries.iter().enumerate() {
        if entry.base.checked_add(entry.offset).is_none() {
            return Err(TopologyError::OffsetOverflow {
                space: id.clone(),
                index,
                base: entry.base,
                offset: entry.offset,
            });
        }
        if space.kind == SpaceKind::Port {
            if entry.length > 4 {
                return Err(TopologyError::PortEntryTooLong {
                    space: id.clone(),
                    index,
                    length: entry.length,
                });
            }
            if entry.priority != 0 {
                return Err(TopologyError::PortEntryPriority {
                    space: id.clone(),
                    index,
                    priority: entry.priority,
                });
            }
        }
    }
    Ok(())
}

impl ObjectRegistry for StaticRegistry {
    fn space_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, e)| matches!(e.object, Object::Space(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn space(&self, id: &ObjectId) -> Option<AddressSpace> {
        match &self.objects.get(id)?.object {
            Object::Space(space) => Some(space.clone()),
            _ => None,
        }
    }

    fn translator(&self, target: &TargetRef) -> Option<&dyn Translator> {
        match &self.objects.get(&target.object)?.object {
            Object::Translator(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    fn transaction_translator(&self, target: &TargetRef) -> Option<&dyn TransactionTranslator> {
        match &self.objects.get(&target.object)?.object {
            Object::TransactionTranslator(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    fn class_name(&self, id: &ObjectId) -> Option<String> {
        self.objects.get(id).map(|e| e.class.clone())
    }

    fn has_interface(&self, id: &ObjectId, interface: &str) -> bool {
        self.objects
            .get(id)
            .is_some_and(|e| e.interfaces.contains(interface))
    }
}

impl RootReferences for StaticRegistry {
    fn referenced_spaces(&self, root: &ObjectId) -> Vec<ObjectId> {
        match self.objects.get(root).map(|e| &e.object) {
            Some(Object::Processor { references }) => references.clone(),
            _ => Vec::new(),
        }
    }
}

impl DeviceMetadata for StaticRegistry {
    fn banks(&self, device: &ObjectId) -> Vec<String> {
        match self.objects.get(device).map(|e| &e.object) {
            Some(Object::Device { banks }) => banks.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn registers(&self, device: &ObjectId, bank: &str) -> Vec<Register> {
        match self.objects.get(device).map(|e| &e.object) {
            Some(Object::Device { banks }) => banks.get(bank).cloned().unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
