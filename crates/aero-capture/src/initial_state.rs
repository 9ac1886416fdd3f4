//! Initial-state protocol: per-kind hooks that snapshot a resource's contents at the start of a
//! captured frame and restore them on replay.
//!
//! Not every kind takes part in every phase. Each kind advertises the phases it implements via
//! [`InitialStateCaps`]; the manager only invokes hooks whose capability bit is set.
//!
//! | kind | phases |
//! |---|---|
//! | `Buffer`, `Texture`, `Heap` | all |
//! | `DescriptorHeap` | all (descriptor contents) |
//! | `View` | `CHUNK` only (views are re-created from their creation chunk) |
//! | everything else | none |

use std::sync::Arc;

use bitflags::bitflags;

use crate::descriptor::Descriptor;
use crate::error::{CaptureError, Result};
use crate::ids::ResourceId;

/// Identity of the live (wrapped) API object, e.g. the wrapper's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LiveHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Heap,
    DescriptorHeap,
    View,
    Sampler,
    PipelineState,
    RootSignature,
    CommandAllocator,
    CommandList,
    Fence,
    QueryHeap,
}

impl ResourceKind {
    /// Kinds whose contents live in GPU-visible memory.
    pub fn is_memory_backed(self) -> bool {
        matches!(
            self,
            ResourceKind::Buffer | ResourceKind::Texture | ResourceKind::Heap
        )
    }
}

/// Snapshot of a resource's contents.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialContents {
    Bytes(Arc<[u8]>),
    Descriptors(Arc<[Descriptor]>),
}

impl InitialContents {
    /// Bytes for memory-backed kinds, descriptor count for descriptor heaps.
    pub fn len(&self) -> usize {
        match self {
            InitialContents::Bytes(bytes) => bytes.len(),
            InitialContents::Descriptors(descriptors) => descriptors.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resources referenced by the snapshot (descriptor targets).
    pub fn referenced_resources(&self) -> Vec<ResourceId> {
        match self {
            InitialContents::Bytes(_) => Vec::new(),
            InitialContents::Descriptors(descriptors) => {
                let mut ids: Vec<ResourceId> =
                    descriptors.iter().flat_map(Descriptor::resources).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        }
    }
}

/// A live API object as seen by the capture bookkeeping.
///
/// Implemented by the interception layer's wrappers.
pub trait LiveResource: core::fmt::Debug {
    fn handle(&self) -> LiveHandle;

    fn kind(&self) -> ResourceKind;

    /// Content length in the unit of [`InitialContents::len`].
    fn content_len(&self) -> usize {
        0
    }

    /// Helper objects that exist only to service other operations are never serialized.
    fn is_transient(&self) -> bool {
        false
    }

    /// Read back the current contents.
    ///
    /// Fails when the contents cannot be read right now (e.g. the resource lives in memory the
    /// CPU cannot see and no readback path exists).
    fn read_contents(&self) -> Result<InitialContents>;

    fn write_contents(&self, contents: &InitialContents) -> Result<()>;

    /// Kind-specific teardown once the manager drops its last reference.
    fn release(&self) {}
}

/// External encoder for initial-state chunks.
pub trait InitialStateSerializer {
    fn write_initial_state(
        &mut self,
        id: ResourceId,
        kind: ResourceKind,
        contents: &InitialContents,
    ) -> Result<()>;
}

bitflags! {
    /// Initial-state phases a resource kind implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InitialStateCaps: u8 {
        const FORCE = 1 << 0;
        const CHUNK = 1 << 1;
        const PREPARE = 1 << 2;
        const SERIALIZE = 1 << 3;
        const CREATE = 1 << 4;
        const APPLY = 1 << 5;
    }
}

/// Per-kind initial-state policy.
///
/// Defaults describe a kind that takes no part in the protocol.
pub trait InitialStateHooks: Sync {
    fn caps(&self) -> InitialStateCaps;

    /// Capture this resource's initial contents even when it was not written before the frame.
    fn needs_forced_initial_state(&self, _live: &dyn LiveResource) -> bool {
        false
    }

    /// Whether replay needs a serialized snapshot (as opposed to re-deriving the contents).
    fn needs_initial_state_chunk(&self, _live: &dyn LiveResource) -> bool {
        false
    }

    fn prepare_initial_state(
        &self,
        id: ResourceId,
        _live: &dyn LiveResource,
    ) -> Result<InitialContents> {
        Err(CaptureError::Readback {
            id,
            reason: "kind has no initial state".to_string(),
        })
    }

    fn serialize_initial_state(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        contents: &InitialContents,
        serializer: &mut dyn InitialStateSerializer,
    ) -> Result<()> {
        serializer.write_initial_state(id, kind, contents)
    }

    /// Build replay-side contents from decoded chunk data, or a default when `data` is `None`.
    fn create_initial_state(
        &self,
        id: ResourceId,
        _live: &dyn LiveResource,
        _data: Option<InitialContents>,
    ) -> Result<InitialContents> {
        Err(CaptureError::ContentsMismatch {
            id,
            reason: "kind has no initial state",
        })
    }

    /// Write `contents` into the live resource. Must tolerate being called once per replay.
    fn apply_initial_state(
        &self,
        live: &dyn LiveResource,
        contents: &InitialContents,
    ) -> Result<()> {
        live.write_contents(contents)
    }
}

/// Buffers, textures and heaps.
#[derive(Debug)]
struct MemoryHooks;

impl InitialStateHooks for MemoryHooks {
    fn caps(&self) -> InitialStateCaps {
        InitialStateCaps::all()
    }

    fn needs_forced_initial_state(&self, _live: &dyn LiveResource) -> bool {
        // Only dirty memory is snapshotted; untouched resources replay from their creation data.
        false
    }

    fn needs_initial_state_chunk(&self, _live: &dyn LiveResource) -> bool {
        true
    }

    fn prepare_initial_state(
        &self,
        id: ResourceId,
        live: &dyn LiveResource,
    ) -> Result<InitialContents> {
        match live.read_contents()? {
            contents @ InitialContents::Bytes(_) => Ok(contents),
            InitialContents::Descriptors(_) => Err(CaptureError::ContentsMismatch {
                id,
                reason: "memory resource returned descriptors",
            }),
        }
    }

    fn create_initial_state(
        &self,
        id: ResourceId,
        live: &dyn LiveResource,
        data: Option<InitialContents>,
    ) -> Result<InitialContents> {
        match data {
            Some(InitialContents::Bytes(bytes)) => {
                if bytes.len() != live.content_len() {
                    return Err(CaptureError::ContentsMismatch {
                        id,
                        reason: "byte length differs from resource size",
                    });
                }
                Ok(InitialContents::Bytes(bytes))
            }
            Some(InitialContents::Descriptors(_)) => Err(CaptureError::ContentsMismatch {
                id,
                reason: "memory resource given descriptors",
            }),
            None => Ok(InitialContents::Bytes(vec![0u8; live.content_len()].into())),
        }
    }
}

#[derive(Debug)]
struct DescriptorHeapHooks;

impl InitialStateHooks for DescriptorHeapHooks {
    fn caps(&self) -> InitialStateCaps {
        InitialStateCaps::all()
    }

    fn needs_forced_initial_state(&self, _live: &dyn LiveResource) -> bool {
        // Descriptor writes are CPU-side and not tracked as dirty; always snapshot.
        true
    }

    fn needs_initial_state_chunk(&self, _live: &dyn LiveResource) -> bool {
        true
    }

    fn prepare_initial_state(
        &self,
        id: ResourceId,
        live: &dyn LiveResource,
    ) -> Result<InitialContents> {
        match live.read_contents()? {
            contents @ InitialContents::Descriptors(_) => Ok(contents),
            InitialContents::Bytes(_) => Err(CaptureError::ContentsMismatch {
                id,
                reason: "descriptor heap returned bytes",
            }),
        }
    }

    fn create_initial_state(
        &self,
        id: ResourceId,
        live: &dyn LiveResource,
        data: Option<InitialContents>,
    ) -> Result<InitialContents> {
        match data {
            Some(InitialContents::Descriptors(descriptors)) => {
                if descriptors.len() > live.content_len() {
                    return Err(CaptureError::ContentsMismatch {
                        id,
                        reason: "more descriptors than heap slots",
                    });
                }
                Ok(InitialContents::Descriptors(descriptors))
            }
            Some(InitialContents::Bytes(_)) => Err(CaptureError::ContentsMismatch {
                id,
                reason: "descriptor heap given bytes",
            }),
            None => Ok(InitialContents::Descriptors(
                vec![Descriptor::Null; live.content_len()].into(),
            )),
        }
    }
}

/// Views are recreated from their creation chunk; no snapshot is needed.
#[derive(Debug)]
struct ViewHooks;

impl InitialStateHooks for ViewHooks {
    fn caps(&self) -> InitialStateCaps {
        InitialStateCaps::CHUNK
    }
}

#[derive(Debug)]
struct NoInitialState;

impl InitialStateHooks for NoInitialState {
    fn caps(&self) -> InitialStateCaps {
        InitialStateCaps::empty()
    }
}

static MEMORY_HOOKS: MemoryHooks = MemoryHooks;
static DESCRIPTOR_HEAP_HOOKS: DescriptorHeapHooks = DescriptorHeapHooks;
static VIEW_HOOKS: ViewHooks = ViewHooks;
static NO_INITIAL_STATE: NoInitialState = NoInitialState;

/// Initial-state policy for `kind`.
pub fn hooks_for(kind: ResourceKind) -> &'static dyn InitialStateHooks {
    match kind {
        ResourceKind::Buffer | ResourceKind::Texture | ResourceKind::Heap => &MEMORY_HOOKS,
        ResourceKind::DescriptorHeap => &DESCRIPTOR_HEAP_HOOKS,
        ResourceKind::View => &VIEW_HOOKS,
        ResourceKind::Sampler
        | ResourceKind::PipelineState
        | ResourceKind::RootSignature
        | ResourceKind::CommandAllocator
        | ResourceKind::CommandList
        | ResourceKind::Fence
        | ResourceKind::QueryHeap => &NO_INITIAL_STATE,
    }
}
