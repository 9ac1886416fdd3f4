use tracing::error;

use crate::error::{CaptureError, Result};
use crate::ids::ContextId;
use crate::shadow::MAX_CONTEXTS;

/// Allocation table for recording-context ids.
///
/// Slot 0 belongs to the immediate context and is never handed out. The table is not
/// synchronized; all allocation and release must happen from one coordinating thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextSlots {
    // Bit `i` set => slot `i` in use. Bit 0 is never set.
    used: u32,
}

const _: () = assert!(MAX_CONTEXTS == u32::BITS as usize);

impl ContextSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lowest free deferred slot.
    pub fn try_allocate(&mut self) -> Result<ContextId> {
        for raw in 1..MAX_CONTEXTS as u8 {
            let bit = 1u32 << raw;
            if self.used & bit == 0 {
                self.used |= bit;
                return ContextId::new(raw).ok_or(CaptureError::ContextSlotsExhausted);
            }
        }
        Err(CaptureError::ContextSlotsExhausted)
    }

    /// Like [`ContextSlots::try_allocate`], but degrades to [`ContextId::IMMEDIATE`] when the
    /// table is full.
    ///
    /// The sentinel is indistinguishable from a real immediate-context id; callers that need to
    /// tell the two apart should use `try_allocate`.
    pub fn allocate(&mut self) -> ContextId {
        match self.try_allocate() {
            Ok(ctx) => ctx,
            Err(_) => {
                error!(
                    "more than {} deferred contexts wanted an id; either a leak, or many contexts \
                     mapping the same resource",
                    MAX_CONTEXTS - 1
                );
                ContextId::IMMEDIATE
            }
        }
    }

    /// Return `ctx` to the pool. Releasing the immediate slot does nothing.
    pub fn release(&mut self, ctx: ContextId) {
        if ctx.is_immediate() {
            return;
        }
        self.used &= !(1u32 << ctx.get());
    }

    pub fn is_in_use(&self, ctx: ContextId) -> bool {
        self.used & (1u32 << ctx.get()) != 0
    }

    /// Number of deferred slots currently handed out.
    pub fn in_use(&self) -> usize {
        self.used.count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn hands_out_31_distinct_deferred_ids() {
        let mut slots = ContextSlots::new();
        let ids: BTreeSet<u8> = (0..31).map(|_| slots.allocate().get()).collect();
        assert_eq!(ids.len(), 31);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&31));
        assert_eq!(slots.in_use(), 31);
    }

    #[test]
    fn exhaustion_returns_immediate_sentinel() {
        let mut slots = ContextSlots::new();
        for _ in 0..31 {
            slots.allocate();
        }
        assert_eq!(slots.allocate(), ContextId::IMMEDIATE);
        assert!(matches!(
            slots.try_allocate(),
            Err(CaptureError::ContextSlotsExhausted)
        ));
    }

    #[test]
    fn released_slot_becomes_eligible_again() {
        let mut slots = ContextSlots::new();
        for _ in 0..31 {
            slots.allocate();
        }
        let freed = ContextId::new(17).unwrap();
        slots.release(freed);
        assert!(!slots.is_in_use(freed));
        assert_eq!(slots.allocate(), freed);
    }

    #[test]
    fn releasing_immediate_is_a_no_op() {
        let mut slots = ContextSlots::new();
        let ctx = slots.allocate();
        slots.release(ContextId::IMMEDIATE);
        assert!(slots.is_in_use(ctx));
        assert!(!slots.is_in_use(ContextId::IMMEDIATE));
    }
}
