//! Point prober: resolve one address through nested spaces and translators.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::access::{AccessMask, AtomView, Atoms, TraceContext};
use crate::config::ProbeOptions;
use crate::error::Result;
use crate::registry::ObjectRegistry;
use crate::topology::{AddressSpace, ByteSwap, MapEntry, Node, TargetRef, Topology};
use crate::translate::Translation;

/// One step of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHop {
    /// Object reached by this step; `None` for a miss or a loop marker.
    pub target: Option<TargetRef>,
    /// Address as seen by `target`.
    pub local_address: u64,
    /// Base of the mapping used, in the coordinates of the routing object.
    pub region_base: u64,
    /// Where the mapping starts inside `target`.
    pub region_start: u64,
    /// Length of the mapping; 0 means unbounded.
    pub region_len: u64,
    /// Several entries matched at the winning priority.
    pub ambiguous: bool,
    #[serde(rename = "loop")]
    pub loop_detected: bool,
    pub function: Option<i32>,
    pub byteswap: ByteSwap,
    pub align_size: u32,
    pub added_atoms: Atoms,
    pub inspected_atoms: Vec<String>,
    pub missed_atoms: Vec<String>,
}

impl RouteHop {
    fn miss(local_address: u64) -> Self {
        Self {
            target: None,
            local_address,
            region_base: local_address,
            region_start: 0,
            region_len: 0,
            ambiguous: false,
            loop_detected: false,
            function: None,
            byteswap: ByteSwap::None,
            align_size: 0,
            added_atoms: Atoms::new(),
            inspected_atoms: Vec::new(),
            missed_atoms: Vec::new(),
        }
    }

    fn through_entry(entry: &MapEntry, addr: u64, ambiguous: bool) -> Self {
        Self {
            target: Some(entry.target.clone()),
            local_address: entry.translate(addr),
            region_base: entry.base,
            region_start: entry.offset,
            region_len: entry.length,
            ambiguous,
            function: entry.function,
            byteswap: entry.byteswap,
            align_size: entry.align_size,
            ..Self::miss(addr)
        }
    }

    fn through_translator(t: Translation, addr: u64) -> Self {
        Self {
            target: Some(t.target),
            local_address: t.address,
            region_base: addr,
            region_start: t.address,
            region_len: t.valid_len.unwrap_or(0),
            added_atoms: t.added_atoms,
            ..Self::miss(addr)
        }
    }
}

/// Why a route stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathEnd {
    /// The last hop reached a terminal object.
    Terminus,
    /// No mapping at the address; the last hop has no target.
    Miss,
    /// The route revisited a `(target, address, access)` triple; the last hop is a loop marker.
    Loop,
    /// Stopped after the maximum number of hops without reaching a terminus.
    DepthLimit,
}

/// Route from a root object to wherever an access ends up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePath {
    pub root: TargetRef,
    pub address: u64,
    pub hops: Vec<RouteHop>,
    pub end: PathEnd,
}

impl RoutePath {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn terminal_hop(&self) -> Option<&RouteHop> {
        match self.end {
            PathEnd::Terminus => self.hops.last(),
            _ => None,
        }
    }

    pub fn terminus(&self) -> Option<&TargetRef> {
        self.terminal_hop()?.target.as_ref()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.hops.iter().any(|h| h.ambiguous)
    }

    pub fn hit_loop(&self) -> bool {
        self.end == PathEnd::Loop
    }
}

/// Resolve `address` in `root` down to its terminus.
///
/// The registry is captured once for this call. Misses, loops, ambiguity and the depth limit are
/// reported on the returned path; only an unroutable root ([`crate::LookupError`]) or a translator
/// fault ([`crate::AccessError`]) is an error.
pub fn probe(
    registry: &dyn ObjectRegistry,
    root: &TargetRef,
    address: u64,
    options: &ProbeOptions,
    trace: &mut TraceContext,
) -> Result<RoutePath> {
    let topology = Topology::capture(registry);
    let walk = walk(
        &topology,
        root,
        address,
        Request {
            access: options.access,
            inquiry: options.inquiry,
            atoms: &options.atoms,
            max_depth: options.max_depth,
        },
        trace,
    )?;
    Ok(walk.path)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Request<'a> {
    pub access: AccessMask,
    pub inquiry: bool,
    pub atoms: &'a Atoms,
    pub max_depth: usize,
}

/// Result of a walk, including what the range mapper needs to size a region.
#[derive(Debug)]
pub(crate) struct Walk {
    pub path: RoutePath,
    /// Number of root addresses, starting at the probed one, that take the same route.
    pub span: u64,
    /// Access modes every hop on the route is valid for.
    pub valid_access: AccessMask,
    /// The hop producing the last target came out of a port space.
    pub via_port_space: bool,
}

struct Selected<'a> {
    entry: Option<&'a MapEntry>,
    ambiguous: bool,
    span: u64,
}

/// Pick the entry routing `addr` in `space`.
///
/// The lowest priority value wins; ties go to the first entry in table order and are flagged as
/// ambiguous. `span` is the distance to the nearest entry boundary above `addr`, since the choice
/// may change there.
fn select(space: &AddressSpace, addr: u64) -> Selected<'_> {
    let mut best: Option<(&MapEntry, i16)> = None;
    let mut ties = 0usize;
    let mut span = (u64::MAX - addr).saturating_add(1);

    for entry in &space.entries {
        if entry.contains(addr) {
            if let Some(end) = entry.end_exclusive() {
                span = span.min(end - addr);
            }
            let priority = if space.is_port() { 0 } else { entry.priority };
            match best {
                Some((_, p)) if priority > p => {}
                Some((_, p)) if priority == p => ties += 1,
                _ => {
                    best = Some((entry, priority));
                    ties = 0;
                }
            }
        } else if entry.base > addr {
            span = span.min(entry.base - addr);
        }
    }

    Selected {
        entry: best.map(|(e, _)| e),
        ambiguous: ties > 0,
        span,
    }
}

pub(crate) fn walk(
    topology: &Topology<'_>,
    root: &TargetRef,
    address: u64,
    req: Request<'_>,
    trace: &mut TraceContext,
) -> Result<Walk> {
    let mut node = topology.lookup(root)?;
    let mut current = root.clone();
    let mut addr = address;
    let mut atoms = req.atoms.clone();

    let mut visited = HashSet::new();
    visited.insert((current.clone(), addr, req.access));

    let mut hops: Vec<RouteHop> = Vec::new();
    let mut span = u64::MAX;
    let mut valid_access = AccessMask::all();
    let mut via_port_space = false;

    let end = loop {
        if matches!(node, Node::Terminal) {
            break PathEnd::Terminus;
        }
        if hops.len() >= req.max_depth {
            debug!(%root, address, depth = hops.len(), "probe stopped at depth limit");
            break PathEnd::DepthLimit;
        }

        let hop = match node {
            Node::Terminal => break PathEnd::Terminus,
            Node::Space(space) => {
                let sel = select(space, addr);
                span = span.min(sel.span);
                via_port_space = space.is_port();
                if let Some(entry) = sel.entry {
                    if sel.ambiguous {
                        warn!(
                            space = %current,
                            addr,
                            target = %entry.target,
                            "several mappings match at the same priority; using the first"
                        );
                    }
                    RouteHop::through_entry(entry, addr, sel.ambiguous)
                } else if let Some(default) = &space.default_target {
                    RouteHop {
                        target: Some(default.target.clone()),
                        local_address: default.translate(addr),
                        region_base: 0,
                        region_start: default.offset,
                        function: default.function,
                        ..RouteHop::miss(addr)
                    }
                } else {
                    hops.push(RouteHop::miss(addr));
                    break PathEnd::Miss;
                }
            }
            Node::Translator(t) => {
                via_port_space = false;
                match t.translate(addr, req.access, req.inquiry)? {
                    Some(translation) => {
                        if let Some(len) = translation.valid_len {
                            span = span.min(len);
                        }
                        valid_access &= translation.access;
                        RouteHop::through_translator(translation, addr)
                    }
                    None => {
                        if let Some(len) = t.unmapped_len(addr, req.access) {
                            span = span.min(len.max(1));
                        }
                        hops.push(RouteHop::miss(addr));
                        break PathEnd::Miss;
                    }
                }
            }
            Node::TransactionTranslator(t) => {
                via_port_space = false;
                let mut view = AtomView::new(&atoms);
                let result = {
                    let suspended = trace.suspend_atom_tracing();
                    t.translate(addr, req.access, req.inquiry, &mut view, &suspended)
                };
                let (inspected, missed) = view.into_parts();
                match result? {
                    Some(translation) => {
                        if let Some(len) = translation.valid_len {
                            span = span.min(len);
                        }
                        valid_access &= translation.access;
                        atoms.extend(
                            translation
                                .added_atoms
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone())),
                        );
                        RouteHop {
                            inspected_atoms: inspected,
                            missed_atoms: missed,
                            ..RouteHop::through_translator(translation, addr)
                        }
                    }
                    None => {
                        if let Some(len) = t.unmapped_len(addr, req.access) {
                            span = span.min(len.max(1));
                        }
                        hops.push(RouteHop {
                            inspected_atoms: inspected,
                            missed_atoms: missed,
                            ..RouteHop::miss(addr)
                        });
                        break PathEnd::Miss;
                    }
                }
            }
        };

        let Some(next) = hop.target.clone() else {
            hops.push(hop);
            break PathEnd::Miss;
        };
        let next_addr = hop.local_address;
        trace!(from = %current, to = %next, addr, next_addr, "hop");
        hops.push(hop);

        if !visited.insert((next.clone(), next_addr, req.access)) {
            debug!(%root, address, target = %next, next_addr, "routing loop detected");
            hops.push(RouteHop {
                loop_detected: true,
                ..RouteHop::miss(next_addr)
            });
            break PathEnd::Loop;
        }

        node = topology.node(&next);
        current = next;
        addr = next_addr;
    };

    Ok(Walk {
        path: RoutePath {
            root: root.clone(),
            address,
            hops,
            end,
        },
        span: span.max(1),
        valid_access,
        via_port_space,
    })
}
