//! Finalize-time chunk collection.
//!
//! Resolving a record pulls in its own chunks, the chunks of every record it transitively
//! depends on (parent edges), and the chunks of its subresources. Each record's own chunks are
//! merged at most once per capture: the record's commit latch is set on first visit and only
//! cleared when the next capture begins.

use tracing::trace;

use crate::chunk::ChunkCollection;
use crate::ids::ResourceId;
use crate::record::RecordStore;

/// Pending work of one resolution, run from an explicit stack so graph depth is unbounded.
enum Step {
    /// Latch `id` and schedule its parents, then its own merge.
    Visit(ResourceId),
    /// Visit `parent` unless it was committed by an earlier step.
    Parent { child: ResourceId, parent: ResourceId },
    /// All parents of `id` are done: merge its chunks and visit its subresources.
    Merge { id: ResourceId, was_committed: bool },
}

impl RecordStore {
    /// Merge every chunk needed to reconstruct `id` into `collected`.
    ///
    /// The latch is set before any parent is visited, so a cyclic parent graph terminates and
    /// each record contributes its chunks once. Parents that are already committed are not
    /// revisited. Subresources are walked whenever their owner is newly committed, even if the
    /// subresource itself was committed earlier (its parents may still be pending).
    ///
    /// Unknown ids (e.g. parent edges to destroyed records) are skipped.
    pub fn resolve(&mut self, id: ResourceId, collected: &mut ChunkCollection) {
        let mut stack = vec![Step::Visit(id)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(id) => {
                    let Some(was_committed) = self.commit(id) else {
                        trace!(resource = %id, "resolve skipped unknown record");
                        continue;
                    };
                    stack.push(Step::Merge { id, was_committed });
                    if let Some(record) = self.get(id) {
                        // Reversed so the first parent is popped (and finished) first.
                        stack.extend(
                            record
                                .parents()
                                .iter()
                                .rev()
                                .map(|&parent| Step::Parent { child: id, parent }),
                        );
                    }
                }
                Step::Parent { child, parent } => match self.get(parent) {
                    Some(record) if !record.is_committed() => stack.push(Step::Visit(parent)),
                    Some(_) => {}
                    None => trace!(resource = %child, %parent, "dangling parent edge"),
                },
                Step::Merge { id, was_committed } => {
                    if was_committed {
                        continue;
                    }
                    if let Some(record) = self.get(id) {
                        collected.merge(record.chunks());
                        stack.extend(
                            record
                                .subresources()
                                .iter()
                                .rev()
                                .map(|&sub| Step::Visit(sub)),
                        );
                    }
                }
            }
        }
    }

    /// Resolve several roots in order into one collection.
    pub fn resolve_all(
        &mut self,
        roots: impl IntoIterator<Item = ResourceId>,
        collected: &mut ChunkCollection,
    ) {
        for root in roots {
            self.resolve(root, collected);
        }
    }
}
