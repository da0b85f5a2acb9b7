
use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::access::{AccessMask, AtomValue, AtomView, TraceContext};
use crate::error::AccessError;
use crate::registry::StaticRegistry;
use crate::topology::{AddressSpace, MapEntry, ObjectId, TargetRef};
use crate::translate::{TransactionTranslator, Translation, Translator};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Registry holding `spaces` plus a plain device for every name in `devices`.
pub(crate) fn registry(spaces: Vec<(&str, AddressSpace)>, devices: &[&str]) -> StaticRegistry {
    let mut reg = StaticRegistry::new();
    for (name, space) in spaces {
        reg.add_space(name, space).unwrap();
    }
    for name in devices {
        reg.add_device(*name, "test-device").unwrap();
    }
    reg
}

/// `bus` maps `bridge` at 0x2000; `bridge` maps `dev2` at 0x10.
pub(crate) fn bus_bridge() -> StaticRegistry {
    registry(
        vec![
            (
                "bus",
                AddressSpace::memory().with_entry(MapEntry::new(0x2000, 0x1000, "bridge")),
            ),
            (
                "bridge",
                AddressSpace::memory().with_entry(MapEntry::new(0x10, 0x10, "dev2")),
            ),
        ],
        &["dev2"],
    )
}

pub(crate) fn t(name: &str) -> TargetRef {
    TargetRef::new(name)
}

pub(crate) fn id(name: &str) -> ObjectId {
    ObjectId::new(name)
}

/// Adds `delta` to every address and forwards to `target`, in windows of `window` addresses.
pub(crate) struct Shift {
    pub target: &'static str,
    pub delta: u64,
    pub window: u64,
    pub access: AccessMask,
}

impl Translator for Shift {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        _inquiry: bool,
    ) -> Result<Option<Translation>, AccessError> {
        let left = self.window - address % self.window;
        Ok(Some(
            Translation::new(self.target, address.wrapping_add(self.delta))
                .valid_len(left)
                .access(self.access),
        ))
    }
}

/// Maps nothing.
pub(crate) struct Nothing;

impl Translator for Nothing {
    fn translate(
        &self,
        _address: u64,
        _access: AccessMask,
        _inquiry: bool,
    ) -> Result<Option<Translation>, AccessError> {
        Ok(None)
    }
}

/// Forwards a list of `(base, len, target)` windows and reports the gaps between them.
pub(crate) struct Windows(pub Vec<(u64, u64, &'static str)>);

impl Translator for Windows {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        _inquiry: bool,
    ) -> Result<Option<Translation>, AccessError> {
        Ok(self
            .0
            .iter()
            .find(|&&(base, len, _)| address >= base && address - base < len)
            .map(|&(base, len, to)| {
                Translation::new(to, address - base).valid_len(base + len - address)
            }))
    }

    fn unmapped_len(&self, address: u64, _access: AccessMask) -> Option<u64> {
        self.0
            .iter()
            .filter(|&&(base, _, _)| base > address)
            .map(|&(base, _, _)| base - address)
            .min()
    }
}

/// Fails every non-inquiry access.
pub(crate) struct Faulty;

impl Translator for Faulty {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        inquiry: bool,
    ) -> Result<Option<Translation>, AccessError> {
        if inquiry {
            return Ok(None);
        }
        Err(AccessError::new(id("faulty"), address, "bus error"))
    }
}

/// Forwards to `to` only when atom `needs` is present; optionally tags the transaction.
pub(crate) struct AtomGate {
    pub needs: &'static str,
    pub to: &'static str,
    pub adds: Option<&'static str>,
    pub fail: bool,
    pub tracing_seen: Cell<Option<bool>>,
}

impl AtomGate {
    pub fn new(needs: &'static str, to: &'static str) -> Self {
        Self {
            needs,
            to,
            adds: None,
            fail: false,
            tracing_seen: Cell::new(None),
        }
    }
}

impl TransactionTranslator for AtomGate {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        _inquiry: bool,
        atoms: &mut AtomView<'_>,
        trace: &TraceContext,
    ) -> Result<Option<Translation>, AccessError> {
        self.tracing_seen.set(Some(trace.atom_tracing()));
        let present = atoms.get(self.needs).is_some();
        if self.fail {
            return Err(AccessError::new(id("gate"), address, "gate fault"));
        }
        if !present {
            return Ok(None);
        }
        let mut translation = Translation::new(self.to, address).valid_len(0x100);
        if let Some(tag) = self.adds {
            translation = translation.add_atom(tag, AtomValue::Bool(true));
        }
        Ok(Some(translation))
    }
}

/// Routes into a 4 KiB window per stream, picked by the integer atom `stream_id`.
pub(crate) struct ByStream {
    pub to: &'static str,
    /// Inspected and missed names as the view reported them inside the call.
    pub seen: RefCell<(Vec<String>, Vec<String>)>,
}

impl ByStream {
    pub fn new(to: &'static str) -> Self {
        Self {
            to,
            seen: RefCell::new((Vec::new(), Vec::new())),
        }
    }
}

impl TransactionTranslator for ByStream {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        _inquiry: bool,
        atoms: &mut AtomView<'_>,
        _trace: &TraceContext,
    ) -> Result<Option<Translation>, AccessError> {
        let stream = atoms.get_int("stream_id");
        let _ = atoms.get("secure");
        *self.seen.borrow_mut() = (
            atoms.inspected().iter().cloned().collect(),
            atoms.missed().iter().cloned().collect(),
        );
        Ok(stream.map(|s| Translation::new(self.to, s * 0x1000 + address % 0x1000)))
    }
}

pub(crate) fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
