//! Per-context shadow copies of mapped memory.
//!
//! Every recording context that writes through a mapping gets its own pair of buffers: the
//! `Before` buffer holds the contents as of the map, the `After` buffer receives the context's
//! writes. Diffing the two at unmap time tells the capture which bytes changed without locking
//! the shared resource for the whole mapped-write window.
//!
//! Each buffer is followed by [`SHADOW_GUARD`]. Instrumented writers that run past the tracked
//! extent clobber the guard, which [`ShadowStorage::verify`] detects.

use crate::ids::ContextId;

/// Number of recording contexts a single record can track (immediate + 31 deferred).
pub const MAX_CONTEXTS: usize = 32;

/// Length of the guard trailing every shadow buffer.
pub const GUARD_LEN: usize = 32;

/// Canonical guard bytes.
pub const SHADOW_GUARD: [u8; GUARD_LEN] = [
    0xAA, 0xBB, 0xCC, 0xDD, 0x88, 0x77, 0x66, 0x55, 0x01, 0x23, 0x45, 0x67, 0x98, 0x76, 0x54, 0x32,
    0xAE, 0x0C, 0x51, 0xF1, 0x5A, 0xDE, 0xC0, 0xDE, 0x33, 0xCC, 0x33, 0xCC, 0xE7, 0x7E, 0xE7, 0x7E,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowSide {
    /// Snapshot taken when the mapping was opened.
    Before,
    /// Buffer the context writes into.
    After,
}

impl ShadowSide {
    fn index(self) -> usize {
        match self {
            ShadowSide::Before => 0,
            ShadowSide::After => 1,
        }
    }
}

#[derive(Debug)]
struct ShadowPair {
    // Both buffers are `size + GUARD_LEN` bytes.
    buffers: [Box<[u8]>; 2],
    size: usize,
}

impl ShadowPair {
    fn new(size: usize) -> Self {
        let make = || {
            let mut buf = vec![0u8; size + GUARD_LEN].into_boxed_slice();
            buf[size..].copy_from_slice(&SHADOW_GUARD);
            buf
        };
        Self {
            buffers: [make(), make()],
            size,
        }
    }

    fn guard_intact(&self) -> bool {
        self.buffers
            .iter()
            .all(|buf| buf[self.size..] == SHADOW_GUARD)
    }
}

/// Fixed table of shadow buffer pairs, one per recording context.
#[derive(Debug)]
pub struct ShadowStorage {
    slots: [Option<ShadowPair>; MAX_CONTEXTS],
}

impl ShadowStorage {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Allocate the buffer pair for `ctx` with `size` data bytes each.
    ///
    /// Does nothing if `ctx` already owns buffers (even of a different size). Returns whether an
    /// allocation happened.
    pub fn allocate(&mut self, ctx: ContextId, size: usize) -> bool {
        let slot = &mut self.slots[ctx.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(ShadowPair::new(size));
        true
    }

    /// `false` iff the guard behind either buffer of `ctx` has been overwritten.
    ///
    /// An unallocated slot verifies as intact.
    pub fn verify(&self, ctx: ContextId) -> bool {
        self.slots[ctx.index()]
            .as_ref()
            .map_or(true, ShadowPair::guard_intact)
    }

    /// First context whose guard is damaged, if any.
    pub fn first_corrupted(&self) -> Option<ContextId> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.as_ref().is_some_and(|pair| !pair.guard_intact()))
            .and_then(|(idx, _)| u8::try_from(idx).ok().and_then(ContextId::new))
    }

    /// Release every slot. Safe to call any number of times.
    pub fn free_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn is_allocated(&self, ctx: ContextId) -> bool {
        self.slots[ctx.index()].is_some()
    }

    /// Data size of the slot, excluding the guard.
    pub fn size(&self, ctx: ContextId) -> Option<usize> {
        self.slots[ctx.index()].as_ref().map(|pair| pair.size)
    }

    pub fn allocated_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Data region of one buffer (guard excluded).
    pub fn get(&self, ctx: ContextId, side: ShadowSide) -> Option<&[u8]> {
        let pair = self.slots[ctx.index()].as_ref()?;
        Some(&pair.buffers[side.index()][..pair.size])
    }

    pub fn get_mut(&mut self, ctx: ContextId, side: ShadowSide) -> Option<&mut [u8]> {
        let pair = self.slots[ctx.index()].as_mut()?;
        let size = pair.size;
        Some(&mut pair.buffers[side.index()][..size])
    }

    /// Whole allocation including the trailing guard.
    ///
    /// Handed to instrumented writers whose extent is not bounds-checked.
    pub fn get_with_guard_mut(&mut self, ctx: ContextId, side: ShadowSide) -> Option<&mut [u8]> {
        let pair = self.slots[ctx.index()].as_mut()?;
        Some(&mut pair.buffers[side.index()][..])
    }
}

impl Default for ShadowStorage {
    fn default() -> Self {
        Self::new()
    }
}
