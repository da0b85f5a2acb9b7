use thiserror::Error;

use crate::topology::ObjectId;

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Failure to resolve the object a routing operation starts from.
///
/// Only raised for the initial root. Objects reached mid-traversal that are unknown to the
/// registry are treated as termini instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown object `{0}`")]
    UnknownObject(ObjectId),

    /// The object exists but has neither an address map nor a translator capability.
    #[error("object `{0}` is neither an address space nor a translator")]
    NotRoutable(ObjectId),
}

/// A non-inquiry access failed, or a translator reported a fault other than a plain miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("access to `{object}` at 0x{address:x} failed: {description}")]
pub struct AccessError {
    pub object: ObjectId,
    pub address: u64,
    pub description: String,
}

impl AccessError {
    pub fn new(object: ObjectId, address: u64, description: impl Into<String>) -> Self {
        Self {
            object,
            address,
            description: description.into(),
        }
    }
}

/// Rejected topology descriptions (see [`crate::StaticRegistry`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("object `{0}` is already registered")]
    DuplicateObject(ObjectId),

    #[error("port space `{space}` entry {index} is {length} bytes long (at most 4 allowed)")]
    PortEntryTooLong {
        space: ObjectId,
        index: usize,
        length: u64,
    },

    #[error("port space `{space}` entry {index} has priority {priority} (must be 0)")]
    PortEntryPriority {
        space: ObjectId,
        index: usize,
        priority: i16,
    },

    #[error("space `{space}` entry {index}: base 0x{base:x} + offset 0x{offset:x} overflows")]
    OffsetOverflow {
        space: ObjectId,
        index: usize,
        base: u64,
        offset: u64,
    },

    #[error("unknown object `{0}`")]
    UnknownObject(ObjectId),
}

/// Errors surfaced by the public routing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Access(#[from] AccessError),
}
