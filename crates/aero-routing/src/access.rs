//! Access modes, transaction atoms and atom tracing.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Access modes a probe is issued with, or a route is valid for.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct AccessMask: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl Default for AccessMask {
    fn default() -> Self {
        AccessMask::READ
    }
}

/// Value of a single transaction atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AtomValue {
    Bool(bool),
    Int(u64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Named out-of-band metadata carried by a transaction.
///
/// A `BTreeMap` keeps iteration order stable so that two probes over an unchanged topology produce
/// identical paths.
pub type Atoms = BTreeMap<String, AtomValue>;

/// Read access to the atoms of an in-flight transaction.
///
/// Every lookup is recorded: names that were present end up in the inspected set, names that were
/// asked for but absent end up in the missed set. The prober copies both sets onto the hop.
#[derive(Debug)]
pub struct AtomView<'a> {
    atoms: &'a Atoms,
    inspected: BTreeSet<String>,
    missed: BTreeSet<String>,
}

impl<'a> AtomView<'a> {
    pub fn new(atoms: &'a Atoms) -> Self {
        Self {
            atoms,
            inspected: BTreeSet::new(),
            missed: BTreeSet::new(),
        }
    }

    pub fn get(&mut self, name: &str) -> Option<&'a AtomValue> {
        let value = self.atoms.get(name);
        let set = if value.is_some() {
            &mut self.inspected
        } else {
            &mut self.missed
        };
        if !set.contains(name) {
            set.insert(name.to_owned());
        }
        value
    }

    pub fn get_int(&mut self, name: &str) -> Option<u64> {
        match self.get(name)? {
            AtomValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn inspected(&self) -> &BTreeSet<String> {
        &self.inspected
    }

    pub fn missed(&self) -> &BTreeSet<String> {
        &self.missed
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (
            self.inspected.into_iter().collect(),
            self.missed.into_iter().collect(),
        )
    }
}

/// Tracing state threaded through every routing call.
///
/// Hosts that log transaction atoms as they are read keep `atom_tracing` enabled. The prober
/// switches it off while a translator inspects atoms so that the inspection itself is not logged
/// as guest activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    atom_tracing: bool,
}

impl TraceContext {
    pub fn new(atom_tracing: bool) -> Self {
        Self { atom_tracing }
    }

    pub fn atom_tracing(&self) -> bool {
        self.atom_tracing
    }

    pub fn set_atom_tracing(&mut self, enabled: bool) {
        self.atom_tracing = enabled;
    }

    /// Disable atom tracing until the returned guard is dropped.
    ///
    /// The previous setting is restored on every exit path, including early returns via `?` and
    /// unwinding.
    pub fn suspend_atom_tracing(&mut self) -> AtomTraceSuspension<'_> {
        let saved = self.atom_tracing;
        self.atom_tracing = false;
        AtomTraceSuspension { ctx: self, saved }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Scope guard returned by [`TraceContext::suspend_atom_tracing`].
pub struct AtomTraceSuspension<'a> {
    ctx: &'a mut TraceContext,
    saved: bool,
}

impl core::ops::Deref for AtomTraceSuspension<'_> {
    type Target = TraceContext;

    fn deref(&self) -> &TraceContext {
        self.ctx
    }
}

impl Drop for AtomTraceSuspension<'_> {
    fn drop(&mut self) {
        self.ctx.atom_tracing = self.saved;
    }
}
