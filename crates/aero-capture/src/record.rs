//! Resource records and the arena that owns them.
//!
//! A [`Record`] is the capture-side shadow of one live resource: the chunks that created and
//! modified it, the records it depends on, its subresources, and per-context shadow storage for
//! mapped writes. Records refer to each other by [`ResourceId`]; the [`RecordStore`] owns every
//! record, including subresources, so parent edges may point anywhere in the graph (cycles
//! included) without ownership cycles.

use std::collections::btree_map::{self, BTreeMap};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::chunk::Chunk;
use crate::context::ContextSlots;
use crate::error::{CaptureError, Result};
use crate::ids::{ChunkId, ContextId, ResourceId};
use crate::shadow::{ShadowSide, ShadowStorage};

/// Backing pointer of a mapped resource.
///
/// Only stored and handed back; this crate never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentPtr(NonNull<u8>);

// SAFETY: the pointer is treated as an opaque address and never dereferenced here.
unsafe impl Send for ContentPtr {}
// SAFETY: as above.
unsafe impl Sync for ContentPtr {}

impl ContentPtr {
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }
}

#[derive(Debug)]
pub struct Record {
    id: ResourceId,
    chunks: BTreeMap<ChunkId, Arc<Chunk>>,
    parents: Vec<ResourceId>,
    // Write-once per capture: set by resolution, cleared when a capture begins.
    committed: bool,
    subresources: Vec<ResourceId>,
    owner: Option<ResourceId>,
    ignore_serialise: bool,
    content_ptr: Option<ContentPtr>,
    shadow: ShadowStorage,
    contexts: ContextSlots,
}

impl Record {
    fn new(id: ResourceId, owner: Option<ResourceId>) -> Self {
        Self {
            id,
            chunks: BTreeMap::new(),
            parents: Vec::new(),
            committed: false,
            subresources: Vec::new(),
            owner,
            ignore_serialise: false,
            content_ptr: None,
            shadow: ShadowStorage::new(),
            contexts: ContextSlots::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Append a recorded chunk.
    ///
    /// Chunk ids are unique per record; a second chunk with an existing id is dropped.
    pub fn add_chunk(&mut self, chunk: impl Into<Arc<Chunk>>) {
        let chunk = chunk.into();
        match self.chunks.entry(chunk.id) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(chunk);
            }
            btree_map::Entry::Occupied(_) => {
                warn!(resource = %self.id, chunk = %chunk.id, "duplicate chunk id dropped");
            }
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk>> + '_ {
        self.chunks.values()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drop every chunk reference held by this record.
    pub fn delete_chunks(&mut self) {
        self.chunks.clear();
    }

    pub fn parents(&self) -> &[ResourceId] {
        &self.parents
    }

    pub fn subresources(&self) -> &[ResourceId] {
        &self.subresources
    }

    /// Owning record if this is a subresource.
    pub fn owner(&self) -> Option<ResourceId> {
        self.owner
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn ignore_serialise(&self) -> bool {
        self.ignore_serialise
    }

    pub fn set_ignore_serialise(&mut self, ignore: bool) {
        self.ignore_serialise = ignore;
    }

    pub fn content_pointer(&self) -> Option<ContentPtr> {
        self.content_ptr
    }

    pub fn allocate_shadow(&mut self, ctx: ContextId, size: usize) -> bool {
        self.shadow.allocate(ctx, size)
    }

    pub fn verify_shadow(&self, ctx: ContextId) -> bool {
        self.shadow.verify(ctx)
    }

    pub fn free_shadow(&mut self) {
        self.shadow.free_all();
    }

    pub fn shadow(&self, ctx: ContextId, side: ShadowSide) -> Option<&[u8]> {
        self.shadow.get(ctx, side)
    }

    pub fn shadow_mut(&mut self, ctx: ContextId, side: ShadowSide) -> Option<&mut [u8]> {
        self.shadow.get_mut(ctx, side)
    }

    pub fn shadow_with_guard_mut(
        &mut self,
        ctx: ContextId,
        side: ShadowSide,
    ) -> Option<&mut [u8]> {
        self.shadow.get_with_guard_mut(ctx, side)
    }

    pub fn shadow_storage(&self) -> &ShadowStorage {
        &self.shadow
    }

    pub fn allocate_context_slot(&mut self) -> ContextId {
        self.contexts.allocate()
    }

    pub fn try_allocate_context_slot(&mut self) -> Result<ContextId> {
        self.contexts.try_allocate()
    }

    pub fn release_context_slot(&mut self, ctx: ContextId) {
        self.contexts.release(ctx);
    }

    pub fn context_slots(&self) -> &ContextSlots {
        &self.contexts
    }

    pub(crate) fn commit(&mut self) -> bool {
        std::mem::replace(&mut self.committed, true)
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        self.free_shadow();
    }
}

/// Owner of every [`Record`], keyed by resource id.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<ResourceId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: ResourceId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Record> {
        self.records.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.records.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values()
    }

    /// Create the record for a newly created resource.
    pub fn create(&mut self, id: ResourceId) -> Result<&mut Record> {
        self.insert(id, None)
    }

    /// Create a subresource record owned by `owner`.
    pub fn create_subresource(&mut self, owner: ResourceId, id: ResourceId) -> Result<&mut Record> {
        if !self.records.contains_key(&owner) {
            return Err(CaptureError::UnknownRecord(owner));
        }
        if id.is_null() {
            return Err(CaptureError::NullResource);
        }
        if self.records.contains_key(&id) {
            return Err(CaptureError::DuplicateRecord(id));
        }
        if let Some(parent) = self.records.get_mut(&owner) {
            parent.subresources.push(id);
        }
        self.insert(id, Some(owner))
    }

    fn insert(&mut self, id: ResourceId, owner: Option<ResourceId>) -> Result<&mut Record> {
        if id.is_null() {
            return Err(CaptureError::NullResource);
        }
        match self.records.entry(id) {
            btree_map::Entry::Vacant(slot) => Ok(slot.insert(Record::new(id, owner))),
            btree_map::Entry::Occupied(_) => Err(CaptureError::DuplicateRecord(id)),
        }
    }

    /// Record that `child` must be resolved together with (or after) `parent`.
    ///
    /// Self edges and repeated edges are ignored.
    pub fn add_parent(&mut self, child: ResourceId, parent: ResourceId) -> Result<()> {
        if !self.records.contains_key(&parent) {
            return Err(CaptureError::UnknownRecord(parent));
        }
        let record = self
            .records
            .get_mut(&child)
            .ok_or(CaptureError::UnknownRecord(child))?;
        if child != parent && !record.parents.contains(&parent) {
            record.parents.push(parent);
        }
        Ok(())
    }

    /// Store the mapped backing pointer of `id` and every (nested) subresource.
    pub fn set_content_pointer(&mut self, id: ResourceId, ptr: Option<ContentPtr>) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(CaptureError::UnknownRecord(id))?;
        record.content_ptr = ptr;

        let mut pending = record.subresources.clone();
        while let Some(sub) = pending.pop() {
            if let Some(record) = self.records.get_mut(&sub) {
                record.content_ptr = ptr;
                pending.extend_from_slice(&record.subresources);
            }
        }
        Ok(())
    }

    /// Destroy `id` together with all of its subresources.
    ///
    /// Subresource chunks are cleared before the records are dropped; dropping a record frees
    /// its shadow storage. Destroying a subresource directly unlinks it from its owner. Parent
    /// edges that other records hold to destroyed ids are left in place and skipped during
    /// resolution.
    pub fn destroy(&mut self, id: ResourceId) -> Result<()> {
        let record = self
            .records
            .remove(&id)
            .ok_or(CaptureError::UnknownRecord(id))?;

        if let Some(owner) = record.owner {
            if let Some(owner) = self.records.get_mut(&owner) {
                owner.subresources.retain(|&sub| sub != id);
            }
        }

        let mut pending = record.subresources.clone();
        drop(record);
        while let Some(sub) = pending.pop() {
            if let Some(mut sub_record) = self.records.remove(&sub) {
                sub_record.delete_chunks();
                pending.extend_from_slice(&sub_record.subresources);
                trace!(resource = %sub, owner = %id, "subresource destroyed");
            }
        }
        Ok(())
    }

    /// Set the commit latch of `id`, returning its previous value.
    pub(crate) fn commit(&mut self, id: ResourceId) -> Option<bool> {
        self.records.get_mut(&id).map(Record::commit)
    }

    /// Re-arm every commit latch so the next capture collects all chunks again.
    pub(crate) fn reset_commit_latches(&mut self) {
        for record in self.records.values_mut() {
            record.committed = false;
        }
    }
}
