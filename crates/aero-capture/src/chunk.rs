use std::collections::btree_map::{self, BTreeMap};
use std::sync::Arc;

use crate::ids::ChunkId;

/// Opaque operation code of a chunk. The encoding is owned by the serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKind(pub u32);

/// One recorded operation.
///
/// The payload bytes are produced and interpreted by the external serializer; this crate only
/// orders and deduplicates chunks by [`ChunkId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub kind: ChunkKind,
    pub payload: Arc<[u8]>,
}

impl Chunk {
    pub fn new(id: ChunkId, kind: ChunkKind, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
        }
    }

    /// Convenience for bookkeeping-only chunks that carry no payload.
    pub fn empty(id: ChunkId, kind: ChunkKind) -> Self {
        Self::new(id, kind, Vec::new())
    }
}

/// Ordered, duplicate-free set of chunks accumulated by record resolution.
///
/// Iteration is in ascending [`ChunkId`] order, which is replay order.
#[derive(Debug, Clone, Default)]
pub struct ChunkCollection {
    chunks: BTreeMap<ChunkId, Arc<Chunk>>,
}

impl ChunkCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    /// Insert a chunk unless one with the same id is already present.
    ///
    /// Returns `true` if the chunk was inserted.
    pub fn insert(&mut self, chunk: Arc<Chunk>) -> bool {
        match self.chunks.entry(chunk.id) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(chunk);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Merge every chunk from `chunks`, keeping existing entries on id collisions.
    pub(crate) fn merge<'a>(&mut self, chunks: impl IntoIterator<Item = &'a Arc<Chunk>>) {
        for chunk in chunks {
            self.insert(Arc::clone(chunk));
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chunk>> + '_ {
        self.chunks.values()
    }

    pub fn into_vec(self) -> Vec<Arc<Chunk>> {
        self.chunks.into_values().collect()
    }
}
