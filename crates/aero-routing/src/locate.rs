//! Reverse locator: find every physical address a device is reachable at.
//!
//! The topology is turned into a graph whose nodes are spaces (plus processor-like roots) and whose
//! edges are map entries and default targets. All simple paths from each root to the device are
//! enumerated with an explicit stack, and each path is folded back into a root address.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LocateOptions;
use crate::error::{LookupError, Result};
use crate::registry::{DeviceMetadata, ObjectRegistry, RootReferences};
use crate::topology::{ObjectId, TargetRef, Topology};

/// A place a device can be reached from.
///
/// `address` is where the mapping window starts in the root; the device sees that address at
/// `device_offset`. Windows onto different parts of one device are told apart by the latter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub address: u64,
    pub root: TargetRef,
    pub device_offset: u64,
    /// `address` is in a port space rather than a memory space.
    pub port_space: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mappings {
    pub mappings: BTreeSet<Mapping>,
    /// Some branch was abandoned at `max_depth`; the result may be incomplete.
    pub limit_reached: bool,
}

#[derive(Debug)]
struct Edge {
    to: TargetRef,
    to_node: Option<usize>,
    function: Option<i32>,
    map_base: u64,
    map_start: u64,
    /// 0 means unbounded.
    map_len: u64,
}

/// Arena-backed routing graph for one locate call.
#[derive(Default)]
struct Graph {
    nodes: HashMap<ObjectId, usize>,
    adjacency: Vec<Vec<usize>>,
    edges: Vec<Edge>,
}

impl Graph {
    fn node(&mut self, id: &ObjectId) -> usize {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.adjacency.len();
        self.adjacency.push(Vec::new());
        self.nodes.insert(id.clone(), idx);
        idx
    }

    fn add_edge(&mut self, from: usize, edge: Edge) {
        let idx = self.edges.len();
        self.edges.push(edge);
        self.adjacency[from].push(idx);
    }

    fn build(topology: &Topology<'_>) -> Self {
        let mut graph = Graph::default();
        for (id, _) in topology.spaces() {
            graph.node(id);
        }
        for (id, space) in topology.spaces() {
            let from = graph.nodes[id];
            for entry in &space.entries {
                graph.add_edge(
                    from,
                    Edge {
                        to: entry.target.clone(),
                        to_node: None,
                        function: entry.function,
                        map_base: entry.base,
                        map_start: entry.offset,
                        map_len: entry.length,
                    },
                );
            }
            if let Some(default) = &space.default_target {
                graph.add_edge(
                    from,
                    Edge {
                        to: default.target.clone(),
                        to_node: None,
                        function: default.function,
                        map_base: 0,
                        map_start: default.offset,
                        map_len: 0,
                    },
                );
            }
        }
        graph.link();
        graph
    }

    fn link(&mut self) {
        for edge in &mut self.edges {
            edge.to_node = self.nodes.get(&edge.to.object).copied();
        }
    }

    /// Spaces no other space maps.
    fn top_level(&self, topology: &Topology<'_>) -> Vec<ObjectId> {
        let targeted: BTreeSet<&ObjectId> = self.edges.iter().map(|e| &e.to.object).collect();
        topology
            .spaces()
            .map(|(id, _)| id)
            .filter(|id| !targeted.contains(id))
            .cloned()
            .collect()
    }
}

/// A root and the node its search starts from.
struct Start {
    root: TargetRef,
    node: usize,
    /// Root is a space itself; otherwise the first edge leads from the root into its space.
    is_space: bool,
}

/// Find every address of `terminal` reachable from `roots`.
///
/// With an empty `roots` set every top-level space (one that no other space maps) is used. Roots
/// that are not spaces contribute the spaces [`RootReferences`] reports for them. Paths whose
/// offsets fall outside a mapping's window are unreachable and dropped without error.
pub fn find_mappings<H>(
    host: &H,
    terminal: &TargetRef,
    roots: &BTreeSet<TargetRef>,
    options: &LocateOptions,
) -> Result<Mappings>
where
    H: ObjectRegistry + RootReferences + DeviceMetadata,
{
    let topology = Topology::capture(host);
    let mut graph = Graph::build(&topology);

    let mut starts = Vec::new();
    if roots.is_empty() {
        for id in graph.top_level(&topology) {
            starts.push(Start {
                node: graph.nodes[&id],
                root: TargetRef::new(id),
                is_space: true,
            });
        }
    }
    for root in roots {
        let id = &root.object;
        if !host.contains(id) {
            return Err(LookupError::UnknownObject(id.clone()).into());
        }
        if topology.space(id).is_some() {
            starts.push(Start {
                root: root.clone(),
                node: graph.nodes[id],
                is_space: true,
            });
            continue;
        }
        let from = graph.node(id);
        if graph.adjacency[from].is_empty() {
            for space in host.referenced_spaces(id) {
                let to_node = graph.nodes.get(&space).copied();
                graph.add_edge(
                    from,
                    Edge {
                        to: TargetRef::new(space),
                        to_node,
                        function: None,
                        map_base: 0,
                        map_start: 0,
                        map_len: 0,
                    },
                );
            }
        }
        starts.push(Start {
            root: root.clone(),
            node: from,
            is_space: false,
        });
    }

    let bank = options.bank.as_deref().or(terminal.port.as_deref());
    let banks = host.banks(&terminal.object);
    let matches = |edge: &Edge| -> bool {
        if edge.to.object != terminal.object {
            return false;
        }
        if let Some(function) = options.function {
            if edge.function != Some(function) {
                return false;
            }
        }
        match (bank, edge.to.port.as_deref()) {
            (None, _) => true,
            (Some(want), Some(port)) => want == port,
            (Some(want), None) => banks.len() == 1 && banks[0] == want,
        }
    };

    let mut result = Mappings::default();
    for start in &starts {
        search(&graph, &topology, start, options.max_depth, &matches, &mut result);
    }
    Ok(result)
}

struct Frame {
    node: usize,
    next: usize,
}

fn search(
    graph: &Graph,
    topology: &Topology<'_>,
    start: &Start,
    max_depth: usize,
    matches: &dyn Fn(&Edge) -> bool,
    out: &mut Mappings,
) {
    let mut stack = vec![Frame {
        node: start.node,
        next: 0,
    }];
    let mut path: Vec<usize> = Vec::new();
    let mut on_path = vec![false; graph.edges.len()];

    while let Some(frame) = stack.last_mut() {
        let Some(&e) = graph.adjacency[frame.node].get(frame.next) else {
            stack.pop();
            if let Some(done) = path.pop() {
                on_path[done] = false;
            }
            continue;
        };
        frame.next += 1;
        if on_path[e] {
            continue;
        }
        let edge = &graph.edges[e];

        if path.len() >= max_depth {
            out.limit_reached = true;
            continue;
        }

        if matches(edge) {
            path.push(e);
            accept(graph, topology, start, &path, out);
            path.pop();
            continue;
        }

        let Some(to) = edge.to_node else {
            continue;
        };
        if path.len() + 1 >= max_depth && !graph.adjacency[to].is_empty() {
            debug!(root = %start.root, depth = path.len() + 1, "reverse search hit depth limit");
            out.limit_reached = true;
            continue;
        }
        path.push(e);
        on_path[e] = true;
        stack.push(Frame { node: to, next: 0 });
    }
}

/// Fold a root-to-device path into a root address, or drop it if some window does not cover the
/// running offset.
fn accept(graph: &Graph, topology: &Topology<'_>, start: &Start, path: &[usize], out: &mut Mappings) {
    let Some(&last) = path.last() else {
        return;
    };
    let device_offset = graph.edges[last].map_start;
    let mut addr = device_offset;
    for &e in path.iter().rev() {
        let edge = &graph.edges[e];
        let Some(rel) = addr.checked_sub(edge.map_start) else {
            debug!(target = %edge.to, addr, "path below mapping window, dropped");
            return;
        };
        if edge.map_len != 0 && rel >= edge.map_len {
            debug!(target = %edge.to, addr, "path outside mapping window, dropped");
            return;
        }
        let Some(next) = edge.map_base.checked_add(rel) else {
            return;
        };
        addr = next;
    }

    let top_space = if start.is_space {
        &start.root.object
    } else {
        &graph.edges[path[0]].to.object
    };
    out.mappings.insert(Mapping {
        address: addr,
        root: start.root.clone(),
        device_offset,
        port_space: topology.is_port_space(top_space),
    });
}
