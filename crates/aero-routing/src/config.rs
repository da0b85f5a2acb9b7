//! Per-operation options.
//!
//! All option structs implement `Default` and serde's traits so hosts can keep them in their own
//! configuration files.

use serde::{Deserialize, Serialize};

use crate::access::{AccessMask, Atoms};
use crate::topology::ObjectId;

/// Maximum number of hops followed by a single probe, and maximum path length explored by the
/// reverse locator.
pub const MAX_DEPTH: usize = 256;

/// Default cap on the number of regions produced by one memory-map walk.
pub const DEFAULT_MAX_REGIONS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeOptions {
    pub access: AccessMask,
    /// Side-effect-free probe. Forwarded to every translator on the route.
    pub inquiry: bool,
    pub atoms: Atoms,
    pub max_depth: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            access: AccessMask::READ,
            inquiry: true,
            atoms: Atoms::new(),
            max_depth: MAX_DEPTH,
        }
    }
}

/// Which regions a memory-map walk reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionFilter {
    /// Drop regions whose terminus is one of these objects.
    pub exclude_objects: Vec<ObjectId>,
    /// Drop regions whose terminus has one of these classes.
    pub exclude_classes: Vec<String>,
    /// Keep only regions whose terminus name contains this substring.
    pub name_contains: Option<String>,
    /// Keep only regions whose terminus has this class.
    pub require_class: Option<String>,
    /// Keep only regions whose terminus implements this interface.
    pub require_interface: Option<String>,
    /// Drop regions whose route ran into a loop.
    pub skip_loops: bool,
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self {
            exclude_objects: Vec::new(),
            exclude_classes: Vec::new(),
            name_contains: None,
            require_class: None,
            require_interface: None,
            skip_loops: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryMapOptions {
    pub start: u64,
    /// Exclusive.
    pub end: u64,
    /// Access used when a route is not valid for full `rwx`.
    pub fallback_access: AccessMask,
    pub max_depth: usize,
    pub max_regions: usize,
    pub filter: RegionFilter,
}

impl Default for MemoryMapOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: u64::MAX,
            fallback_access: AccessMask::READ,
            max_depth: MAX_DEPTH,
            max_regions: DEFAULT_MAX_REGIONS,
            filter: RegionFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateOptions {
    /// Only report mappings of this bank (port) of the device.
    pub bank: Option<String>,
    /// Only report mappings with this function number.
    pub function: Option<i32>,
    pub max_depth: usize,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            bank: None,
            function: None,
            max_depth: MAX_DEPTH,
        }
    }
}
