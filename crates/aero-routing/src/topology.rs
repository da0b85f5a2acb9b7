//! Read-only snapshot of the address-space graph.
//!
//! A [`Topology`] is captured from an [`ObjectRegistry`] at the start of every routing call and
//! dropped when the call returns. Nothing is cached across calls: objects may be created or
//! destroyed by the host between two invocations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::registry::ObjectRegistry;
use crate::translate::{TransactionTranslator, Translator};

/// Name of an object in the host's object registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ObjectId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Reference to an object, optionally through one of its named ports (e.g. a register bank).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub object: ObjectId,
    pub port: Option<String>,
}

impl TargetRef {
    pub fn new(object: impl Into<ObjectId>) -> Self {
        Self {
            object: object.into(),
            port: None,
        }
    }

    pub fn with_port(object: impl Into<ObjectId>, port: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            port: Some(port.into()),
        }
    }
}

impl From<ObjectId> for TargetRef {
    fn from(object: ObjectId) -> Self {
        Self::new(object)
    }
}

impl From<&str> for TargetRef {
    fn from(object: &str) -> Self {
        Self::new(object)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(f, "{}:{port}", self.object),
            None => write!(f, "{}", self.object),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceKind {
    /// Memory space; entries carry a signed priority.
    Memory,
    /// Port space; priority is always 0 and entries are at most 4 bytes long.
    Port,
}

/// Byte swapping applied by a mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteSwap {
    #[default]
    None,
    Bus,
    Trans,
    BusTrans,
}

/// One row of an address space's map.
///
/// The range `[base, base + length)` of the space is forwarded to `target`, where it appears at
/// `[offset, offset + length)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub base: u64,
    pub length: u64,
    pub target: TargetRef,
    pub function: Option<i32>,
    pub offset: u64,
    /// Lower value wins.
    pub priority: i16,
    pub align_size: u32,
    pub byteswap: ByteSwap,
}

impl MapEntry {
    pub fn new(base: u64, length: u64, target: impl Into<TargetRef>) -> Self {
        Self {
            base,
            length,
            target: target.into(),
            function: None,
            offset: 0,
            priority: 0,
            align_size: 0,
            byteswap: ByteSwap::None,
        }
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn function(mut self, function: i32) -> Self {
        self.function = Some(function);
        self
    }

    pub fn align_size(mut self, align_size: u32) -> Self {
        self.align_size = align_size;
        self
    }

    pub fn byteswap(mut self, byteswap: ByteSwap) -> Self {
        self.byteswap = byteswap;
        self
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.length
    }

    /// First address past the entry, or `None` when the entry reaches the top of the space.
    #[inline]
    pub fn end_exclusive(&self) -> Option<u64> {
        self.base.checked_add(self.length)
    }

    /// Address seen by the target for `addr` in this space.
    #[inline]
    pub fn translate(&self, addr: u64) -> u64 {
        (addr - self.base).wrapping_add(self.offset)
    }
}

/// Catch-all route for addresses not covered by any [`MapEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTarget {
    pub target: TargetRef,
    pub function: Option<i32>,
    pub offset: u64,
}

impl DefaultTarget {
    pub fn new(target: impl Into<TargetRef>) -> Self {
        Self {
            target: target.into(),
            function: None,
            offset: 0,
        }
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    #[inline]
    pub fn translate(&self, addr: u64) -> u64 {
        addr.wrapping_add(self.offset)
    }
}

/// Routing table of a memory or port space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    pub kind: SpaceKind,
    /// Insertion order; never sorted.
    pub entries: Vec<MapEntry>,
    pub default_target: Option<DefaultTarget>,
}

impl AddressSpace {
    pub fn memory() -> Self {
        Self {
            kind: SpaceKind::Memory,
            entries: Vec::new(),
            default_target: None,
        }
    }

    pub fn port() -> Self {
        Self {
            kind: SpaceKind::Port,
            entries: Vec::new(),
            default_target: None,
        }
    }

    pub fn with_entry(mut self, entry: MapEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_default(mut self, default_target: DefaultTarget) -> Self {
        self.default_target = Some(default_target);
        self
    }

    pub fn is_port(&self) -> bool {
        self.kind == SpaceKind::Port
    }
}

/// What a [`TargetRef`] resolves to.
#[derive(Clone, Copy)]
pub enum Node<'a> {
    Space(&'a AddressSpace),
    Translator(&'a dyn Translator),
    TransactionTranslator(&'a dyn TransactionTranslator),
    /// Anything without an address map: a device, a register bank, or an object the registry does
    /// not know about.
    Terminal,
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Space(space) => f.debug_tuple("Space").field(&space.kind).finish(),
            Node::Translator(_) => f.write_str("Translator"),
            Node::TransactionTranslator(_) => f.write_str("TransactionTranslator"),
            Node::Terminal => f.write_str("Terminal"),
        }
    }
}

/// Point-in-time view of every address space known to the registry.
pub struct Topology<'r> {
    registry: &'r dyn ObjectRegistry,
    spaces: BTreeMap<ObjectId, AddressSpace>,
}

impl<'r> Topology<'r> {
    /// Walk the registry once and copy out every space's routing table.
    pub fn capture(registry: &'r dyn ObjectRegistry) -> Self {
        let spaces = registry
            .space_ids()
            .into_iter()
            .filter_map(|id| {
                let space = registry.space(&id)?;
                Some((id, space))
            })
            .collect();
        Self { registry, spaces }
    }

    pub fn registry(&self) -> &'r dyn ObjectRegistry {
        self.registry
    }

    /// All captured spaces, ordered by name.
    pub fn spaces(&self) -> impl Iterator<Item = (&ObjectId, &AddressSpace)> {
        self.spaces.iter()
    }

    pub fn space(&self, id: &ObjectId) -> Option<&AddressSpace> {
        self.spaces.get(id)
    }

    pub fn entries(&self, id: &ObjectId) -> &[MapEntry] {
        self.spaces
            .get(id)
            .map(|space| space.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn default_target(&self, id: &ObjectId) -> Option<&DefaultTarget> {
        self.spaces.get(id)?.default_target.as_ref()
    }

    /// Classify `target`. Unknown objects resolve to [`Node::Terminal`].
    pub fn node(&self, target: &TargetRef) -> Node<'_> {
        if let Some(space) = self.spaces.get(&target.object) {
            return Node::Space(space);
        }
        if let Some(t) = self.registry.transaction_translator(target) {
            return Node::TransactionTranslator(t);
        }
        if let Some(t) = self.registry.translator(target) {
            return Node::Translator(t);
        }
        Node::Terminal
    }

    /// Classify `target`, failing unless it is a space or a translator.
    pub fn lookup(&self, target: &TargetRef) -> Result<Node<'_>, LookupError> {
        match self.node(target) {
            Node::Terminal if !self.registry.contains(&target.object) => {
                Err(LookupError::UnknownObject(target.object.clone()))
            }
            Node::Terminal => Err(LookupError::NotRoutable(target.object.clone())),
            node => Ok(node),
        }
    }

    /// Whether `target` resolves to a port space.
    pub fn is_port_space(&self, id: &ObjectId) -> bool {
        self.spaces.get(id).is_some_and(AddressSpace::is_port)
    }
}
