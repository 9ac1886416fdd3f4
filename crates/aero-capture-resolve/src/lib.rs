//! Offline inspection of capture record graphs.
//!
//! A graph dump is a JSON document listing records, their parent edges, their chunk ids and
//! their subresources:
//!
//! ```json
//! {
//!   "records": [
//!     { "id": 1, "parents": [2], "chunks": [10], "subresources": [{ "id": 3, "chunks": [30] }] },
//!     { "id": 2, "chunks": [5], "ignore": true }
//!   ],
//!   "roots": [1]
//! }
//! ```
//!
//! [`resolve_graph`] rebuilds a [`RecordStore`] from the dump and reports the chunk ids a
//! capture finalized with those roots would serialize, in replay order.

pub mod config;

use std::fs;
use std::path::Path;

use aero_capture::{Chunk, ChunkCollection, ChunkId, ChunkKind, RecordStore, ResourceId};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDump {
    pub records: Vec<RecordDump>,
    #[serde(default)]
    pub roots: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDump {
    pub id: u64,
    #[serde(default)]
    pub parents: Vec<u64>,
    #[serde(default)]
    pub chunks: Vec<u64>,
    /// Never used as a resolution root.
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub subresources: Vec<SubresourceDump>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubresourceDump {
    pub id: u64,
    #[serde(default)]
    pub chunks: Vec<u64>,
}

pub fn load_graph(path: &Path) -> Result<GraphDump> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn add_chunks(store: &mut RecordStore, id: ResourceId, chunks: &[u64]) -> Result<()> {
    let record = store
        .get_mut(id)
        .with_context(|| format!("{id} vanished while loading"))?;
    for &chunk in chunks {
        record.add_chunk(Chunk::empty(ChunkId(chunk), ChunkKind(0)));
    }
    Ok(())
}

/// Rebuild the record store described by `graph`. Every record is created before any parent
/// edge, so edges may point forward in the file.
pub fn build_store(graph: &GraphDump) -> Result<RecordStore> {
    let mut store = RecordStore::new();
    for dump in &graph.records {
        let id = ResourceId(dump.id);
        store
            .create(id)
            .with_context(|| format!("creating record {id}"))?
            .set_ignore_serialise(dump.ignore);
        add_chunks(&mut store, id, &dump.chunks)?;

        for sub in &dump.subresources {
            let sub_id = ResourceId(sub.id);
            store
                .create_subresource(id, sub_id)
                .with_context(|| format!("creating subresource {sub_id} of {id}"))?;
            add_chunks(&mut store, sub_id, &sub.chunks)?;
        }
    }

    for dump in &graph.records {
        for &parent in &dump.parents {
            store
                .add_parent(ResourceId(dump.id), ResourceId(parent))
                .with_context(|| format!("linking {} to parent {}", dump.id, parent))?;
        }
    }
    Ok(store)
}

/// Roots are `cli_roots` if any were given, otherwise the dump's own roots. With `all_records`
/// every record is a root as well. Ignored records are never roots.
pub fn resolve_graph(
    graph: &GraphDump,
    cli_roots: &[u64],
    all_records: bool,
) -> Result<Vec<ChunkId>> {
    let mut store = build_store(graph)?;

    let requested = if cli_roots.is_empty() {
        graph.roots.as_slice()
    } else {
        cli_roots
    };
    let mut roots = Vec::new();
    for &raw in requested {
        let id = ResourceId(raw);
        let Some(record) = store.get(id) else {
            bail!("root {id} is not a record in the graph");
        };
        if record.ignore_serialise() {
            warn!(resource = %id, "skipping ignored root");
            continue;
        }
        roots.push(id);
    }
    if all_records {
        roots.extend(
            store
                .iter()
                .filter(|record| !record.ignore_serialise())
                .map(|record| record.id()),
        );
    }
    if roots.is_empty() {
        warn!("no resolution roots; nothing to collect");
    }

    let mut collected = ChunkCollection::new();
    store.resolve_all(roots.iter().copied(), &mut collected);
    debug!(
        records = store.len(),
        roots = roots.len(),
        chunks = collected.len(),
        "graph resolved"
    );
    Ok(collected.ids().collect())
}
