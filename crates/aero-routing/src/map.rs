//! Range mapper: tile an address interval into regions that route to the same place.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::{AccessMask, Atoms, TraceContext};
use crate::config::{MemoryMapOptions, RegionFilter};
use crate::error::Result;
use crate::probe::{walk, PathEnd, Request, Walk};
use crate::registry::ObjectRegistry;
use crate::topology::{TargetRef, Topology};

/// Inclusive range of root addresses that all route to `device` at linearly increasing offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub base: u64,
    /// Inclusive.
    pub top: u64,
    /// Terminus, or `None` when nothing is mapped (or the route loops or is too deep).
    pub device: Option<TargetRef>,
    /// Address `base` is seen at by `device`.
    pub offset: u64,
    pub access: AccessMask,
    /// Number of hops from the root to the terminus.
    pub hops: usize,
    pub ambiguous: bool,
    #[serde(rename = "loop")]
    pub loop_detected: bool,
}

impl Region {
    pub fn len(&self) -> u64 {
        self.top - self.base + 1
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr <= self.top
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub regions: Vec<Region>,
    /// The walk stopped because `max_regions` was reached.
    pub truncated: bool,
    /// Where the next walk should start to continue this one.
    pub last_base: u64,
}

/// Walk `[options.start, options.end)` of `root` and report every routing region.
///
/// Each step probes the current base once and learns, from the spaces and translators it passes
/// through, how far the same route extends. Regions whose terminus sits directly in a port space
/// only advance the base by one address.
pub fn memory_map(
    registry: &dyn ObjectRegistry,
    root: &TargetRef,
    options: &MemoryMapOptions,
    trace: &mut TraceContext,
) -> Result<MemoryMap> {
    let topology = Topology::capture(registry);
    let atoms = Atoms::new();
    let request = Request {
        access: options.fallback_access,
        inquiry: true,
        atoms: &atoms,
        max_depth: options.max_depth,
    };

    let mut regions = Vec::new();
    let mut region_count = 0usize;
    let mut base = options.start;

    while base < options.end && region_count < options.max_regions {
        let inspection = walk(&topology, root, base, request, trace)?;
        let region = make_region(base, options, &inspection);
        region_count += 1;

        if passes(&topology, &options.filter, &region) {
            regions.push(region.clone());
        }

        if inspection.via_port_space && region.device.is_some() {
            base += 1;
        } else {
            match region.top.checked_add(1) {
                Some(next) => base = next,
                None => {
                    base = options.end;
                    break;
                }
            }
        }
    }

    let truncated = region_count >= options.max_regions;
    if truncated {
        debug!(%root, last_base = base, region_count, "memory map truncated");
    }

    Ok(MemoryMap {
        regions,
        truncated,
        last_base: base,
    })
}

fn make_region(base: u64, options: &MemoryMapOptions, inspection: &Walk) -> Region {
    let len = inspection.span.min(options.end - base);
    let path = &inspection.path;

    let (device, offset) = match path.terminal_hop() {
        Some(hop) => (hop.target.clone(), hop.local_address),
        None => (None, 0),
    };

    let access = if inspection.valid_access.contains(AccessMask::all()) {
        AccessMask::all()
    } else {
        options.fallback_access
    };

    Region {
        base,
        top: base + (len - 1),
        device,
        offset,
        access,
        hops: path.len(),
        ambiguous: path.is_ambiguous(),
        loop_detected: path.end == PathEnd::Loop,
    }
}

fn passes(topology: &Topology<'_>, filter: &RegionFilter, region: &Region) -> bool {
    if filter.skip_loops && region.loop_detected {
        return false;
    }

    let registry = topology.registry();
    let Some(device) = &region.device else {
        return filter.name_contains.is_none()
            && filter.require_class.is_none()
            && filter.require_interface.is_none();
    };
    let id = &device.object;

    if filter.exclude_objects.contains(id) {
        return false;
    }

    let class = registry.class_name(id);
    if let Some(class) = &class {
        if filter.exclude_classes.iter().any(|c| c == class) {
            return false;
        }
    }
    if let Some(required) = &filter.require_class {
        if class.as_deref() != Some(required.as_str()) {
            return false;
        }
    }
    if let Some(needle) = &filter.name_contains {
        if !device.to_string().contains(needle.as_str()) {
            return false;
        }
    }
    if let Some(interface) = &filter.require_interface {
        if !registry.has_interface(id, interface) {
            return false;
        }
    }
    true
}
