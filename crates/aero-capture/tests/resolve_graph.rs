use std::collections::BTreeSet;

use aero_capture::{Chunk, ChunkCollection, ChunkId, ChunkKind, RecordStore, ResourceId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn add_chunks(store: &mut RecordStore, id: u64, chunks: &[u64]) {
    let record = store.get_mut(ResourceId(id)).expect("record exists");
    for &chunk in chunks {
        record.add_chunk(Chunk::empty(ChunkId(chunk), ChunkKind(0)));
    }
}

fn chunk_ids(collected: &ChunkCollection) -> Vec<u64> {
    collected.ids().map(|id| id.0).collect()
}

#[test]
fn dependency_scenario_resolves_in_chunk_order() {
    let mut store = RecordStore::new();
    store.create(ResourceId(1)).unwrap(); // A
    store.create(ResourceId(2)).unwrap(); // B
    add_chunks(&mut store, 2, &[10, 11]);
    add_chunks(&mut store, 1, &[20]);
    store.add_parent(ResourceId(1), ResourceId(2)).unwrap();

    let mut collected = ChunkCollection::new();
    store.resolve(ResourceId(1), &mut collected);

    assert_eq!(chunk_ids(&collected), vec![10, 11, 20]);
    assert!(store.get(ResourceId(1)).unwrap().is_committed());
    assert!(store.get(ResourceId(2)).unwrap().is_committed());

    store.resolve(ResourceId(1), &mut collected);
    assert_eq!(chunk_ids(&collected), vec![10, 11, 20]);
}

#[test]
fn resolving_a_committed_root_still_walks_uncommitted_parents() {
    let mut store = RecordStore::new();
    for id in 1..=3 {
        store.create(ResourceId(id)).unwrap();
    }
    add_chunks(&mut store, 1, &[1]);
    add_chunks(&mut store, 3, &[3]);

    let mut first = ChunkCollection::new();
    store.resolve(ResourceId(1), &mut first);

    // Edge added after the root was committed: the new parent is pulled in, the root is not.
    store.add_parent(ResourceId(1), ResourceId(3)).unwrap();
    let mut second = ChunkCollection::new();
    store.resolve(ResourceId(1), &mut second);

    assert_eq!(chunk_ids(&second), vec![3]);
}

#[test]
fn subresources_are_resolved_and_destroyed_with_their_owner() {
    let mut store = RecordStore::new();
    store.create(ResourceId(1)).unwrap();
    add_chunks(&mut store, 1, &[100]);
    for (sub, chunk) in [(2, 101), (3, 102)] {
        store
            .create_subresource(ResourceId(1), ResourceId(sub))
            .unwrap()
            .add_chunk(Chunk::empty(ChunkId(chunk), ChunkKind(0)));
    }

    let mut collected = ChunkCollection::new();
    store.resolve(ResourceId(1), &mut collected);
    assert_eq!(chunk_ids(&collected), vec![100, 101, 102]);

    store.destroy(ResourceId(1)).unwrap();
    assert!(store.is_empty());
    // The collection keeps its own references to the chunks.
    assert_eq!(collected.len(), 3);
}

#[test]
fn self_referencing_and_mutual_cycles_terminate() {
    let mut store = RecordStore::new();
    for id in 1..=4 {
        store.create(ResourceId(id)).unwrap();
        add_chunks(&mut store, id, &[id * 10]);
    }
    store.add_parent(ResourceId(1), ResourceId(2)).unwrap();
    store.add_parent(ResourceId(2), ResourceId(1)).unwrap();
    store.add_parent(ResourceId(2), ResourceId(3)).unwrap();
    store.add_parent(ResourceId(3), ResourceId(4)).unwrap();
    store.add_parent(ResourceId(4), ResourceId(2)).unwrap();

    let mut collected = ChunkCollection::new();
    store.resolve(ResourceId(3), &mut collected);
    assert_eq!(chunk_ids(&collected), vec![10, 20, 30, 40]);
    assert!(store.iter().all(|record| record.is_committed()));
}

#[test]
fn deep_parent_chains_resolve_without_recursion() {
    const DEPTH: u64 = 100_000;
    let mut store = RecordStore::new();
    for id in 1..=DEPTH {
        store
            .create(ResourceId(id))
            .unwrap()
            .add_chunk(Chunk::empty(ChunkId(id), ChunkKind(0)));
        if id > 1 {
            store.add_parent(ResourceId(id), ResourceId(id - 1)).unwrap();
        }
    }
    // A deep subresource nesting on the last record as well.
    let mut owner = ResourceId(DEPTH);
    for sub in DEPTH + 1..=2 * DEPTH {
        store
            .create_subresource(owner, ResourceId(sub))
            .unwrap()
            .add_chunk(Chunk::empty(ChunkId(sub), ChunkKind(0)));
        owner = ResourceId(sub);
    }

    let mut collected = ChunkCollection::new();
    store.resolve(ResourceId(DEPTH), &mut collected);
    assert_eq!(collected.len(), 2 * DEPTH as usize);
    assert!(store.iter().all(|record| record.is_committed()));

    store.destroy(ResourceId(DEPTH)).unwrap();
    assert_eq!(store.len(), DEPTH as usize - 1);
}

#[derive(Debug)]
struct Graph {
    parents: Vec<Vec<usize>>,
    chunk_counts: Vec<usize>,
    root: usize,
}

fn graphs() -> impl Strategy<Value = Graph> {
    (1usize..12).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n),
            proptest::collection::vec(0usize..4, n),
            0..n,
        )
            .prop_map(move |(matrix, chunk_counts, root)| Graph {
                // Parents only point at lower indices, so the graph is acyclic.
                parents: (0..n)
                    .map(|i| (0..i).filter(|&j| matrix[i][j]).collect())
                    .collect(),
                chunk_counts,
                root,
            })
    })
}

fn node_id(index: usize) -> ResourceId {
    ResourceId(index as u64 + 1)
}

fn node_chunks(index: usize, count: usize) -> impl Iterator<Item = u64> {
    (0..count).map(move |k| (index * 10 + k) as u64)
}

fn build(graph: &Graph) -> RecordStore {
    let mut store = RecordStore::new();
    for (index, &count) in graph.chunk_counts.iter().enumerate() {
        let record = store.create(node_id(index)).unwrap();
        for chunk in node_chunks(index, count) {
            record.add_chunk(Chunk::empty(ChunkId(chunk), ChunkKind(0)));
        }
    }
    for (index, parents) in graph.parents.iter().enumerate() {
        for &parent in parents {
            store.add_parent(node_id(index), node_id(parent)).unwrap();
        }
    }
    store
}

fn ancestors(graph: &Graph, root: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        if seen.insert(node) {
            pending.extend(graph.parents[node].iter().copied());
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0xCA_97_0E),
        .. ProptestConfig::default()
    })]

    #[test]
    fn resolution_collects_exactly_the_ancestor_closure(graph in graphs()) {
        let mut store = build(&graph);
        let closure = ancestors(&graph, graph.root);

        let mut collected = ChunkCollection::new();
        store.resolve(node_id(graph.root), &mut collected);

        let expected: BTreeSet<u64> = closure
            .iter()
            .flat_map(|&node| node_chunks(node, graph.chunk_counts[node]))
            .collect();
        let actual = chunk_ids(&collected);
        prop_assert_eq!(actual.len(), expected.len(), "duplicate or missing chunks");
        prop_assert_eq!(actual.iter().copied().collect::<BTreeSet<_>>(), expected);

        for &node in &closure {
            prop_assert!(store.get(node_id(node)).unwrap().is_committed());
        }

        let before = chunk_ids(&collected);
        store.resolve(node_id(graph.root), &mut collected);
        prop_assert_eq!(chunk_ids(&collected), before);
    }

    #[test]
    fn resolving_every_root_never_duplicates(graph in graphs()) {
        let mut store = build(&graph);
        let mut collected = ChunkCollection::new();
        store.resolve_all((0..graph.chunk_counts.len()).map(node_id), &mut collected);

        let total: usize = graph.chunk_counts.iter().sum();
        prop_assert_eq!(collected.len(), total);
        prop_assert!(store.iter().all(|record| record.is_committed()));
    }
}
