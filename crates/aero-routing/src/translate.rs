//! Dynamic routing capabilities.
//!
//! Translators decide per access where a transaction goes next, instead of consulting a static
//! map. Implementations must honour `inquiry`: an inquiry translation may not have side effects on
//! the model.

use crate::access::{AccessMask, AtomValue, AtomView, Atoms, TraceContext};
use crate::error::AccessError;
use crate::topology::TargetRef;

/// Successful translation of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub target: TargetRef,
    pub address: u64,
    /// Number of consecutive input addresses, starting at the translated one, that map linearly
    /// onto `target`. `None` leaves the extent to the enclosing space.
    pub valid_len: Option<u64>,
    /// Access modes this translation holds for.
    pub access: AccessMask,
    /// Atoms to attach to the transaction for the rest of the route.
    pub added_atoms: Atoms,
}

impl Translation {
    pub fn new(target: impl Into<TargetRef>, address: u64) -> Self {
        Self {
            target: target.into(),
            address,
            valid_len: None,
            access: AccessMask::all(),
            added_atoms: Atoms::new(),
        }
    }

    pub fn valid_len(mut self, len: u64) -> Self {
        self.valid_len = Some(len.max(1));
        self
    }

    pub fn access(mut self, access: AccessMask) -> Self {
        self.access = access;
        self
    }

    pub fn add_atom(mut self, name: impl Into<String>, value: AtomValue) -> Self {
        self.added_atoms.insert(name.into(), value);
        self
    }
}

/// Classic translator: maps an address to a new target and address.
pub trait Translator {
    /// Returns `Ok(None)` when nothing is mapped at `address` for `access`.
    fn translate(
        &self,
        address: u64,
        access: AccessMask,
        inquiry: bool,
    ) -> Result<Option<Translation>, AccessError>;

    /// After a miss at `address`: how many consecutive addresses, starting there, are unmapped
    /// too. `None` leaves the extent to the enclosing space.
    fn unmapped_len(&self, _address: u64, _access: AccessMask) -> Option<u64> {
        None
    }
}

/// Transaction translator: may consult the atoms carried by the transaction.
pub trait TransactionTranslator {
    /// Returns `Ok(None)` when nothing is mapped at `address` for `access`.
    ///
    /// Atoms are read through `atoms`, which records every lookup. Atom tracing is suspended in
    /// `trace` for the duration of the call.
    fn translate(
        &self,
        address: u64,
        access: AccessMask,
        inquiry: bool,
        atoms: &mut AtomView<'_>,
        trace: &TraceContext,
    ) -> Result<Option<Translation>, AccessError>;

    /// See [`Translator::unmapped_len`].
    fn unmapped_len(&self, _address: u64, _access: AccessMask) -> Option<u64> {
        None
    }
}
