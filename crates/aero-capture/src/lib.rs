//! `aero-capture` is the bookkeeping core of Aero's GPU capture/replay path.
//!
//! Currently this crate provides:
//! - Per-resource [`Record`]s holding recorded chunks, dependency edges and subresources, owned
//!   by a [`RecordStore`].
//! - Finalize-time chunk collection ([`RecordStore::resolve`]): a write-once walk of the record
//!   graph that yields a duplicate-free, replay-ordered [`ChunkCollection`].
//! - Guarded per-context shadow storage for mapped writes ([`ShadowStorage`]) and the bounded
//!   context-slot table that multiplexes deferred recording contexts ([`ContextSlots`]).
//! - The [`ResourceManager`] registry and its initial-state protocol, dispatched per
//!   [`ResourceKind`] (see [`initial_state`]).
//!
//! Chunk encoding, API interception and GPU execution live elsewhere.

mod chunk;
mod context;
mod error;
mod ids;
mod manager;
mod options;
mod record;
mod resolve;
mod shadow;

pub mod descriptor;
pub mod initial_state;

pub use chunk::{Chunk, ChunkCollection, ChunkKind};
pub use context::ContextSlots;
pub use error::{CaptureError, InitialStatePhase, Result};
pub use ids::{ChunkId, ChunkIdGen, ContextId, ResourceId, ResourceIdGen};
pub use initial_state::{
    InitialContents, InitialStateCaps, InitialStateSerializer, LiveHandle, LiveResource,
    ResourceKind,
};
pub use manager::{CaptureState, ReplayReport, ResourceManager};
pub use options::{
    CaptureOptions, ENV_REF_ALL_RESOURCES, ENV_SAVE_ALL_INITIALS, ENV_VERIFY_SHADOW_STORAGE,
};
pub use record::{ContentPtr, Record, RecordStore};
pub use shadow::{ShadowSide, ShadowStorage, GUARD_LEN, MAX_CONTEXTS, SHADOW_GUARD};
