//! Resource registry and capture/replay orchestration.
//!
//! The manager owns every [`Record`] (through its [`RecordStore`]) and maps resource ids to the
//! live objects the interception layer wraps. At capture time it snapshots initial contents
//! and flattens the record graph into the chunk set the serializer writes out; at replay time
//! it rebuilds initial contents and reapplies them to live objects.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::chunk::ChunkCollection;
use crate::error::{CaptureError, InitialStatePhase, Result};
use crate::ids::ResourceId;
use crate::initial_state::{
    hooks_for, InitialContents, InitialStateCaps, InitialStateSerializer, LiveHandle,
    LiveResource,
};
use crate::options::CaptureOptions;
use crate::record::{Record, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Recording, no frame being captured.
    BackgroundCapturing,
    /// Recording inside a captured frame.
    ActiveCapturing,
    /// Reading a capture and creating replay resources.
    Loading,
    /// Executing a loaded capture.
    Replaying,
}

impl CaptureState {
    pub fn is_capturing(self) -> bool {
        matches!(
            self,
            CaptureState::BackgroundCapturing | CaptureState::ActiveCapturing
        )
    }
}

/// Outcome of a replay-side initial-state pass.
///
/// Replay continues past individual failures.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub succeeded: usize,
    pub failures: Vec<(ResourceId, CaptureError)>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, id: ResourceId, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(err) => {
                warn!(resource = %id, error = %err, "initial state failed on replay");
                self.failures.push((id, err));
            }
        }
    }
}

#[derive(Debug)]
struct LiveEntry {
    object: Arc<dyn LiveResource>,
    refs: u32,
}

#[derive(Debug)]
pub struct ResourceManager {
    options: CaptureOptions,
    state: CaptureState,
    records: RecordStore,
    live: HashMap<ResourceId, LiveEntry>,
    by_handle: HashMap<LiveHandle, ResourceId>,
    dirty: BTreeSet<ResourceId>,
    frame_refs: BTreeSet<ResourceId>,
    initial_contents: BTreeMap<ResourceId, InitialContents>,
    // Frame-referenced objects released mid-capture; torn down after finalization.
    deferred_release: BTreeMap<ResourceId, Arc<dyn LiveResource>>,
}

impl ResourceManager {
    pub fn new(state: CaptureState, options: CaptureOptions) -> Self {
        Self {
            options,
            state,
            records: RecordStore::new(),
            live: HashMap::new(),
            by_handle: HashMap::new(),
            dirty: BTreeSet::new(),
            frame_refs: BTreeSet::new(),
            initial_contents: BTreeMap::new(),
            deferred_release: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn set_state(&mut self, state: CaptureState) {
        self.state = state;
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    // ---------------------------------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------------------------------

    /// Register a live object under `id` with one manager-held reference.
    pub fn add_live_resource(
        &mut self,
        id: ResourceId,
        object: Arc<dyn LiveResource>,
    ) -> Result<()> {
        if id.is_null() {
            return Err(CaptureError::NullResource);
        }
        let handle = object.handle();
        if self.live.contains_key(&id) || self.by_handle.contains_key(&handle) {
            return Err(CaptureError::DuplicateResource(id));
        }
        self.by_handle.insert(handle, id);
        self.live.insert(id, LiveEntry { object, refs: 1 });
        Ok(())
    }

    pub fn add_resource_record(&mut self, id: ResourceId) -> Result<&mut Record> {
        self.records.create(id)
    }

    pub fn add_subresource_record(
        &mut self,
        owner: ResourceId,
        id: ResourceId,
    ) -> Result<&mut Record> {
        self.records.create_subresource(owner, id)
    }

    pub fn live(&self, id: ResourceId) -> Option<&Arc<dyn LiveResource>> {
        self.live.get(&id).map(|entry| &entry.object)
    }

    pub fn has_live_resource(&self, id: ResourceId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_by_handle(&self, handle: LiveHandle) -> Option<&Arc<dyn LiveResource>> {
        let id = self.by_handle.get(&handle)?;
        self.live(*id)
    }

    /// Capture id of a live object, if it is registered.
    pub fn resolve_id(&self, object: &dyn LiveResource) -> Option<ResourceId> {
        self.by_handle.get(&object.handle()).copied()
    }

    pub fn record(&self, id: ResourceId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn record_mut(&mut self, id: ResourceId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut RecordStore {
        &mut self.records
    }

    /// Take another manager-held reference on `id`. Returns the new count.
    pub fn add_ref(&mut self, id: ResourceId) -> Result<u32> {
        let entry = self
            .live
            .get_mut(&id)
            .ok_or(CaptureError::UnknownResource(id))?;
        entry.refs += 1;
        Ok(entry.refs)
    }

    /// Drop one manager-held reference on `object`. Returns the remaining count.
    ///
    /// When the count reaches zero the registry forgets the object. Teardown and record
    /// destruction run immediately, unless a capture is active and the resource is referenced
    /// by the captured frame: then the object, its record and its initial contents are kept
    /// until [`ResourceManager::finalize_capture`] returns.
    pub fn release(&mut self, object: &dyn LiveResource) -> Result<u32> {
        let handle = object.handle();
        let id = *self
            .by_handle
            .get(&handle)
            .ok_or(CaptureError::UnknownHandle(handle))?;
        let entry = self
            .live
            .get_mut(&id)
            .ok_or(CaptureError::UnknownResource(id))?;

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return Ok(entry.refs);
        }

        self.by_handle.remove(&handle);
        self.dirty.remove(&id);
        let Some(entry) = self.live.remove(&id) else {
            return Ok(0);
        };

        if self.state == CaptureState::ActiveCapturing && self.frame_refs.contains(&id) {
            debug!(resource = %id, "release deferred until capture ends");
            self.deferred_release.insert(id, entry.object);
            return Ok(0);
        }

        entry.object.release();
        self.initial_contents.remove(&id);
        if self.records.contains(id) {
            self.records.destroy(id)?;
        }
        Ok(0)
    }

    // ---------------------------------------------------------------------------------------
    // Capture bookkeeping
    // ---------------------------------------------------------------------------------------

    /// Note that `id`'s contents were written outside the captured frame. Ignored on replay.
    pub fn mark_dirty(&mut self, id: ResourceId) {
        if self.state.is_capturing() {
            self.dirty.insert(id);
        }
    }

    pub fn mark_clean(&mut self, id: ResourceId) {
        self.dirty.remove(&id);
    }

    pub fn is_dirty(&self, id: ResourceId) -> bool {
        self.dirty.contains(&id)
    }

    /// Note that the captured frame uses `id`, making its record a resolution root.
    pub fn mark_frame_referenced(&mut self, id: ResourceId) {
        if self.state == CaptureState::ActiveCapturing {
            self.frame_refs.insert(id);
        }
    }

    pub fn is_frame_referenced(&self, id: ResourceId) -> bool {
        self.frame_refs.contains(&id)
    }

    /// Whether `record` may be written into a capture.
    pub fn is_serialisable(&self, id: ResourceId, record: &Record) -> bool {
        if record.ignore_serialise() {
            return false;
        }
        match self.live_object(id) {
            Ok(object) => !object.is_transient(),
            Err(_) => true,
        }
    }

    /// Fail on the first record whose shadow guard has been overwritten.
    pub fn verify_shadow_storage(&self) -> Result<()> {
        for record in self.records.iter() {
            if let Some(context) = record.shadow_storage().first_corrupted() {
                error!(resource = %record.id(), %context, "shadow storage guard overwritten");
                return Err(CaptureError::ShadowCorrupted {
                    id: record.id(),
                    context,
                });
            }
        }
        Ok(())
    }

    pub fn initial_contents(&self, id: ResourceId) -> Option<&InitialContents> {
        self.initial_contents.get(&id)
    }

    // ---------------------------------------------------------------------------------------
    // Initial-state hooks
    // ---------------------------------------------------------------------------------------

    // Registered objects, plus those whose release is deferred to the end of the capture.
    fn live_object(&self, id: ResourceId) -> Result<Arc<dyn LiveResource>> {
        self.live
            .get(&id)
            .map(|entry| &entry.object)
            .or_else(|| self.deferred_release.get(&id))
            .map(Arc::clone)
            .ok_or(CaptureError::UnknownResource(id))
    }

    pub fn needs_forced_initial_state(&self, id: ResourceId) -> Result<bool> {
        let live = self.live_object(id)?;
        let hooks = hooks_for(live.kind());
        Ok(hooks.caps().contains(InitialStateCaps::FORCE)
            && hooks.needs_forced_initial_state(live.as_ref()))
    }

    pub fn needs_initial_state_chunk(&self, id: ResourceId) -> Result<bool> {
        let live = self.live_object(id)?;
        let hooks = hooks_for(live.kind());
        Ok(hooks.caps().contains(InitialStateCaps::CHUNK)
            && hooks.needs_initial_state_chunk(live.as_ref()))
    }

    /// Snapshot `id`'s contents now.
    ///
    /// Resources referenced by a descriptor snapshot become frame referenced so their chunks
    /// are written alongside the heap.
    pub fn prepare_initial_state(&mut self, id: ResourceId) -> Result<()> {
        let live = self.live_object(id)?;
        let hooks = hooks_for(live.kind());
        if !hooks.caps().contains(InitialStateCaps::PREPARE) {
            return Ok(());
        }
        let contents = hooks
            .prepare_initial_state(id, live.as_ref())
            .map_err(|err| err.in_phase(id, InitialStatePhase::Prepare))?;

        for referenced in contents.referenced_resources() {
            self.mark_frame_referenced(referenced);
        }
        self.initial_contents.insert(id, contents);
        Ok(())
    }

    pub fn serialize_initial_state(
        &self,
        id: ResourceId,
        serializer: &mut dyn InitialStateSerializer,
    ) -> Result<()> {
        let live = self.live_object(id)?;
        let kind = live.kind();
        let hooks = hooks_for(kind);
        if !hooks.caps().contains(InitialStateCaps::SERIALIZE)
            || !self.needs_initial_state_chunk(id)?
        {
            return Ok(());
        }
        let Some(contents) = self.initial_contents.get(&id) else {
            return Ok(());
        };
        hooks
            .serialize_initial_state(id, kind, contents, serializer)
            .map_err(|err| err.in_phase(id, InitialStatePhase::Serialize))
    }

    /// Build replay contents for `id` from decoded chunk data (`None` if the capture had none).
    ///
    /// If the data cannot be used, default contents are stored instead and the error is
    /// returned for reporting.
    pub fn create_initial_state(
        &mut self,
        id: ResourceId,
        data: Option<InitialContents>,
    ) -> Result<()> {
        let live = self.live_object(id)?;
        let hooks = hooks_for(live.kind());
        if !hooks.caps().contains(InitialStateCaps::CREATE) {
            return Ok(());
        }
        match hooks.create_initial_state(id, live.as_ref(), data) {
            Ok(contents) => {
                self.initial_contents.insert(id, contents);
                Ok(())
            }
            Err(err) => {
                let err = err.in_phase(id, InitialStatePhase::Create);
                warn!(resource = %id, error = %err, "falling back to default initial contents");
                if let Ok(contents) = hooks.create_initial_state(id, live.as_ref(), None) {
                    self.initial_contents.insert(id, contents);
                }
                Err(err)
            }
        }
    }

    /// Write the stored initial contents of `id` back into its live object.
    pub fn apply_initial_state(&self, id: ResourceId) -> Result<()> {
        let live = self.live_object(id)?;
        let hooks = hooks_for(live.kind());
        if !hooks.caps().contains(InitialStateCaps::APPLY) {
            return Ok(());
        }
        let Some(contents) = self.initial_contents.get(&id) else {
            return Ok(());
        };
        hooks
            .apply_initial_state(live.as_ref(), contents)
            .map_err(|err| err.in_phase(id, InitialStatePhase::Apply))
    }

    // ---------------------------------------------------------------------------------------
    // Capture orchestration
    // ---------------------------------------------------------------------------------------

    /// Snapshot every serialisable resource whose initial contents are needed. Run by
    /// [`ResourceManager::begin_capture`].
    ///
    /// The first failure aborts.
    pub fn prepare_initial_states(&mut self) -> Result<usize> {
        let mut ids: Vec<ResourceId> = self.live.keys().copied().collect();
        ids.sort_unstable();

        let mut prepared = 0;
        for id in ids {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if !self.is_serialisable(id, record) {
                continue;
            }
            let live = self.live_object(id)?;
            if !hooks_for(live.kind())
                .caps()
                .contains(InitialStateCaps::PREPARE)
            {
                continue;
            }
            let needed = self.options.save_all_initials
                || self.dirty.contains(&id)
                || self.needs_forced_initial_state(id)?;
            if !needed {
                continue;
            }
            self.prepare_initial_state(id)?;
            prepared += 1;
        }
        Ok(prepared)
    }

    pub fn serialize_initial_states(
        &self,
        serializer: &mut dyn InitialStateSerializer,
    ) -> Result<usize> {
        let mut written = 0;
        for &id in self.initial_contents.keys() {
            if self.live_object(id).is_err() || !self.needs_initial_state_chunk(id)? {
                continue;
            }
            self.serialize_initial_state(id, serializer)?;
            written += 1;
        }
        Ok(written)
    }

    /// Start capturing a frame.
    ///
    /// Initial contents are snapshotted here, before the frame writes anything. If a snapshot
    /// fails the capture is abandoned and the manager stays in background capturing.
    pub fn begin_capture(&mut self) -> Result<()> {
        if self.state != CaptureState::BackgroundCapturing {
            return Err(CaptureError::WrongState {
                expected: CaptureState::BackgroundCapturing,
                actual: self.state,
            });
        }
        self.state = CaptureState::ActiveCapturing;
        self.frame_refs.clear();
        self.initial_contents.clear();
        self.records.reset_commit_latches();

        match self.prepare_initial_states() {
            Ok(prepared) => {
                debug!(initial_states_prepared = prepared, "capture started");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "capture aborted while snapshotting initial states");
                self.end_capture();
                Err(err)
            }
        }
    }

    /// Finish the captured frame and return the chunks to serialize, in replay order.
    ///
    /// Roots are `roots` plus every frame-referenced record, or every record when
    /// `ref_all_resources` is set. Non-serialisable records are never roots (they may still be
    /// pulled in as dependencies). Whether this succeeds or fails, the manager returns to
    /// background capturing and records released during the frame are destroyed.
    pub fn finalize_capture(
        &mut self,
        roots: impl IntoIterator<Item = ResourceId>,
        serializer: &mut dyn InitialStateSerializer,
    ) -> Result<ChunkCollection> {
        if self.state != CaptureState::ActiveCapturing {
            return Err(CaptureError::WrongState {
                expected: CaptureState::ActiveCapturing,
                actual: self.state,
            });
        }
        let result = self.finalize_frame(roots, serializer);
        if let Err(err) = &result {
            error!(error = %err, "capture finalization aborted");
        }
        self.end_capture();
        result
    }

    fn finalize_frame(
        &mut self,
        roots: impl IntoIterator<Item = ResourceId>,
        serializer: &mut dyn InitialStateSerializer,
    ) -> Result<ChunkCollection> {
        if self.options.verify_shadow_storage {
            self.verify_shadow_storage()?;
        }

        let written = self.serialize_initial_states(serializer)?;

        let mut candidates: BTreeSet<ResourceId> = roots.into_iter().collect();
        if self.options.ref_all_resources {
            candidates.extend(self.records.ids());
        } else {
            candidates.extend(self.frame_refs.iter().copied());
        }
        let roots: Vec<ResourceId> = candidates
            .into_iter()
            .filter(|&id| {
                self.records
                    .get(id)
                    .is_some_and(|record| self.is_serialisable(id, record))
            })
            .collect();

        let mut collected = ChunkCollection::new();
        self.records.resolve_all(roots.iter().copied(), &mut collected);

        debug!(
            roots = roots.len(),
            chunks = collected.len(),
            initial_states_written = written,
            "capture finalized"
        );
        Ok(collected)
    }

    fn end_capture(&mut self) {
        self.state = CaptureState::BackgroundCapturing;
        self.frame_refs.clear();
        self.initial_contents.clear();
        for (id, object) in std::mem::take(&mut self.deferred_release) {
            object.release();
            if let Err(err) = self.records.destroy(id) {
                debug!(resource = %id, error = %err, "deferred record already gone");
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Replay orchestration
    // ---------------------------------------------------------------------------------------

    /// Create replay contents for each `(id, data)` pair decoded from a capture.
    pub fn load_initial_states(
        &mut self,
        states: impl IntoIterator<Item = (ResourceId, Option<InitialContents>)>,
    ) -> ReplayReport {
        let mut report = ReplayReport::default();
        for (id, data) in states {
            let result = self.create_initial_state(id, data);
            report.record(id, result);
        }
        report
    }

    /// Reapply every stored initial state. Safe to run before each replay of the same capture.
    pub fn apply_initial_states(&self) -> ReplayReport {
        let mut report = ReplayReport::default();
        for &id in self.initial_contents.keys() {
            report.record(id, self.apply_initial_state(id));
        }
        report
    }
}
