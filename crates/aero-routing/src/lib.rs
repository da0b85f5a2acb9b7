//! Transaction routing and address-map discovery.
//!
//! Given a starting object (a memory space, port space or translator) and an address, this crate
//! works out which device an access ends up at and what address the device sees:
//! - [`probe`] follows one address hop by hop.
//! - [`memory_map`] tiles an address range into regions with a single destination each.
//! - [`find_mappings`] goes the other way, from a device to every root address it is mapped at.
//! - [`annotate`] names the register at a device-local address.
//!
//! The engine never owns the topology. Every call captures a [`Topology`] from the host's
//! [`ObjectRegistry`] and discards it on return.

mod access;
mod config;
mod error;
mod locate;
mod map;
mod probe;
mod registers;
mod registry;
mod topology;
mod translate;

pub use access::{AccessMask, AtomTraceSuspension, AtomValue, AtomView, Atoms, TraceContext};
pub use config::{
    LocateOptions, MemoryMapOptions, ProbeOptions, RegionFilter, DEFAULT_MAX_REGIONS, MAX_DEPTH,
};
pub use error::{AccessError, LookupError, Result, RoutingError, TopologyError};
pub use locate::{find_mappings, Mapping, Mappings};
pub use map::{memory_map, MemoryMap, Region};
pub use probe::{probe, PathEnd, RouteHop, RoutePath};
pub use registers::{annotate, Register};
pub use registry::{DeviceMetadata, ObjectRegistry, RootReferences, StaticRegistry};
pub use topology::{
    AddressSpace, ByteSwap, DefaultTarget, MapEntry, Node, ObjectId, SpaceKind, TargetRef,
    Topology,
};
pub use translate::{TransactionTranslator, Translation, Translator};

#[cfg(test)]
mod tests;
