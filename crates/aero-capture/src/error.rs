use thiserror::Error;

use crate::ids::{ContextId, ResourceId};
use crate::initial_state::LiveHandle;
use crate::manager::CaptureState;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Phase of the initial-state protocol an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStatePhase {
    Prepare,
    Serialize,
    Create,
    Apply,
}

impl core::fmt::Display for InitialStatePhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            InitialStatePhase::Prepare => "prepare",
            InitialStatePhase::Serialize => "serialize",
            InitialStatePhase::Create => "create",
            InitialStatePhase::Apply => "apply",
        })
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{0} already has a resource record")]
    DuplicateRecord(ResourceId),

    #[error("no resource record for {0}")]
    UnknownRecord(ResourceId),

    #[error("{0} is already registered as a live resource")]
    DuplicateResource(ResourceId),

    #[error("no live resource registered for {0}")]
    UnknownResource(ResourceId),

    #[error("live object {0:?} is not registered")]
    UnknownHandle(LiveHandle),

    #[error("the null resource id cannot be tracked")]
    NullResource,

    #[error("all deferred context slots are in use")]
    ContextSlotsExhausted,

    #[error("shadow storage of {id} for {context} context overran its guard")]
    ShadowCorrupted { id: ResourceId, context: ContextId },

    #[error("contents of {id} cannot be read back: {reason}")]
    Readback { id: ResourceId, reason: String },

    #[error("contents of {id} cannot be written: {reason}")]
    Writeback { id: ResourceId, reason: String },

    #[error("initial contents for {id} do not match the resource ({reason})")]
    ContentsMismatch { id: ResourceId, reason: &'static str },

    #[error("initial-state serializer failed: {0}")]
    Serializer(String),

    #[error("{phase} of initial state for {id} failed")]
    InitialState {
        id: ResourceId,
        phase: InitialStatePhase,
        #[source]
        source: Box<CaptureError>,
    },

    #[error("operation requires {expected:?} state but manager is {actual:?}")]
    WrongState {
        expected: CaptureState,
        actual: CaptureState,
    },

    #[error("invalid capture option {name}={value:?}")]
    InvalidOption { name: &'static str, value: String },
}

impl CaptureError {
    pub(crate) fn in_phase(self, id: ResourceId, phase: InitialStatePhase) -> Self {
        CaptureError::InitialState {
            id,
            phase,
            source: Box::new(self),
        }
    }
}
