use serde::{Deserialize, Serialize};

use crate::registry::DeviceMetadata;
use crate::topology::TargetRef;

/// Named register inside a device bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

impl Register {
    pub fn new(name: impl Into<String>, offset: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.offset && addr - self.offset < self.size
    }
}

/// Name the register `terminus` exposes at `address`.
///
/// The bank is the terminus port; a terminus without a port uses the device's only bank, if it has
/// exactly one.
pub fn annotate(
    metadata: &dyn DeviceMetadata,
    terminus: &TargetRef,
    address: u64,
) -> Option<Register> {
    let bank = match &terminus.port {
        Some(port) => port.clone(),
        None => {
            let mut banks = metadata.banks(&terminus.object);
            if banks.len() != 1 {
                return None;
            }
            banks.pop()?
        }
    };

    let registers = metadata.registers(&terminus.object, &bank);
    let idx = registers.partition_point(|r| r.offset <= address);
    let candidate = registers.get(idx.checked_sub(1)?)?;
    candidate.contains(address).then(|| candidate.clone())
}
