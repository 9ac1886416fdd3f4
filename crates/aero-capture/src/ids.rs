use std::sync::atomic::{AtomicU64, Ordering};

use crate::shadow::MAX_CONTEXTS;

/// Unique identifier of a tracked GPU resource.
///
/// `ResourceId::NULL` never names a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub const NULL: ResourceId = ResourceId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl core::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ResID::{}", self.0)
    }
}

/// Ordered identifier of a recorded chunk.
///
/// Chunk ids are handed out in recording order, so sorting by id yields replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u64);

impl core::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a recording context in a record's shadow/context tables.
///
/// Slot 0 is reserved for the immediate context; deferred contexts use 1..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u8);

impl ContextId {
    pub const IMMEDIATE: ContextId = ContextId(0);

    /// Returns `None` if `raw` is outside the fixed context table.
    pub fn new(raw: u8) -> Option<Self> {
        (usize::from(raw) < MAX_CONTEXTS).then_some(Self(raw))
    }

    pub fn is_immediate(self) -> bool {
        self == Self::IMMEDIATE
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl core::fmt::Display for ContextId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_immediate() {
            f.write_str("immediate")
        } else {
            write!(f, "deferred#{}", self.0)
        }
    }
}

/// Monotonic generator for [`ResourceId`]s. Never yields `ResourceId::NULL`.
#[derive(Debug)]
pub struct ResourceIdGen {
    next: AtomicU64,
}

impl ResourceIdGen {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ResourceId {
        ResourceId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ResourceIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic generator for [`ChunkId`]s.
///
/// Shared by every recording thread so chunk ids stay globally ordered.
#[derive(Debug)]
pub struct ChunkIdGen {
    next: AtomicU64,
}

impl ChunkIdGen {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ChunkId {
        ChunkId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ChunkIdGen {
    fn default() -> Self {
        Self::new()
    }
}
