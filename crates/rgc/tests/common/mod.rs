//! Test Utilities for the RGC test suite
//!
//! Fixtures build small spaces over anonymous mappings and hand out fully
//! initialized objects. Root sets are heap-allocated words so the
//! collector can rewrite them in place.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rgc::{
    CollectionSetSelector, HeaderObjectModel, MmapPageSource, ObjectModel, ObjectReference,
    RegionId, RegionSpace, SpaceConfig,
};
use std::collections::HashSet;

/// Four pages per region unless a test needs bigger regions
pub const PAGES_PER_REGION: usize = 4;

/// ============================================================================
/// SPACE FIXTURE
/// ============================================================================

/// Test fixture owning one region space
pub struct SpaceFixture {
    pub space: RegionSpace,
}

impl SpaceFixture {
    /// Space with `regions` regions of [`PAGES_PER_REGION`] pages
    pub fn new(regions: usize) -> Self {
        Self::with_config(SpaceConfig {
            pages_per_region: PAGES_PER_REGION,
            region_count: regions,
            ..Default::default()
        })
    }

    pub fn with_config(config: SpaceConfig) -> Self {
        let space = RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel)
            .expect("space construction should succeed with a valid config");
        Self { space }
    }

    /// Same fixture with another collection-set policy
    pub fn with_selector(self, selector: impl CollectionSetSelector + 'static) -> Self {
        Self {
            space: self.space.with_selector(selector),
        }
    }

    /// Allocate, initialize and stamp an object with `refs` null slots
    pub fn object(&self, size: usize, refs: usize) -> ObjectReference {
        let address = self
            .space
            .allocate(size)
            .expect("allocation should succeed in a fresh fixture");
        let object = unsafe { HeaderObjectModel::initialize(address, size, refs) }
            .expect("object header should fit");
        self.space.post_alloc(object);
        object
    }

    /// Point slot `index` of `from` at `to`
    pub fn link(&self, from: ObjectReference, index: usize, to: ObjectReference) {
        let model = self.space.model();
        model.store_slot(model.slot_address(from, index), to);
    }

    /// Reference held in slot `index` of `from`
    pub fn child(&self, from: ObjectReference, index: usize) -> ObjectReference {
        let model = self.space.model();
        model.load_slot(model.slot_address(from, index))
    }

    pub fn region_of(&self, object: ObjectReference) -> RegionId {
        self.space
            .region_of_object(object)
            .expect("object should be inside the space")
    }

    pub fn size_of(&self, object: ObjectReference) -> usize {
        self.space.model().size_of(object)
    }
}

/// ============================================================================
/// ROOTS
/// ============================================================================

/// Root words the collector may rewrite
pub struct Roots {
    words: Box<[usize]>,
}

impl Roots {
    pub fn new(objects: &[ObjectReference]) -> Self {
        Self {
            words: objects.iter().map(|o| o.to_address()).collect(),
        }
    }

    /// Addresses of the root words
    pub fn slots(&mut self) -> Vec<usize> {
        self.words
            .iter_mut()
            .map(|w| w as *mut usize as usize)
            .collect()
    }

    pub fn get(&self, index: usize) -> ObjectReference {
        unsafe { ObjectReference::from_raw_address(self.words[index]) }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}

/// ============================================================================
/// RANDOM GRAPHS
/// ============================================================================

/// Object graph with a content fingerprint per node
pub struct Graph {
    pub nodes: Vec<ObjectReference>,
    pub roots: Vec<ObjectReference>,
}

/// Build `count` objects with up to `max_refs` slots each and random edges.
///
/// Each object's first payload word after its slots holds its index, so
/// the graph can be checked after objects have moved.
pub fn random_graph(fixture: &SpaceFixture, count: usize, max_refs: usize, seed: u64) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nodes = Vec::with_capacity(count);
    for index in 0..count {
        let refs = rng.gen_range(0..=max_refs);
        let size = rgc::object::ObjectHeader::min_size(refs) + 8 * rng.gen_range(1..4);
        let object = fixture.object(size, refs);
        unsafe { *(payload_address(fixture, object) as *mut usize) = index };
        nodes.push(object);
    }
    for &node in &nodes {
        for slot in 0..fixture.space.model().ref_count(node) {
            if rng.gen_bool(0.7) {
                let target = nodes[rng.gen_range(0..count)];
                fixture.link(node, slot, target);
            }
        }
    }
    let roots = (0..count.div_ceil(10).max(1))
        .map(|_| nodes[rng.gen_range(0..count)])
        .collect();
    Graph { nodes, roots }
}

fn payload_address(fixture: &SpaceFixture, object: ObjectReference) -> usize {
    let refs = fixture.space.model().ref_count(object);
    object.to_address() + rgc::object::ObjectHeader::min_size(refs)
}

/// Index stored in a graph node's payload
pub fn node_index(fixture: &SpaceFixture, object: ObjectReference) -> usize {
    unsafe { *(payload_address(fixture, object) as *const usize) }
}

/// Graph shape as (node index, slot, target index) triples reachable from
/// `roots`, in a canonical order
pub fn reachable_edges(fixture: &SpaceFixture, roots: &[ObjectReference]) -> Vec<(usize, usize, usize)> {
    let mut seen = HashSet::new();
    let mut stack: Vec<_> = roots.to_vec();
    let mut edges = Vec::new();
    while let Some(object) = stack.pop() {
        if !seen.insert(object) {
            continue;
        }
        let from = node_index(fixture, object);
        for slot in 0..fixture.space.model().ref_count(object) {
            let target = fixture.child(object, slot);
            if target.is_null() {
                continue;
            }
            edges.push((from, slot, node_index(fixture, target)));
            stack.push(target);
        }
    }
    edges.sort_unstable();
    edges
}

/// Reachable objects from `roots`
pub fn reachable(fixture: &SpaceFixture, roots: &[ObjectReference]) -> HashSet<ObjectReference> {
    let mut seen = HashSet::new();
    let mut stack: Vec<_> = roots.to_vec();
    while let Some(object) = stack.pop() {
        if !seen.insert(object) {
            continue;
        }
        for slot in 0..fixture.space.model().ref_count(object) {
            let target = fixture.child(object, slot);
            if !target.is_null() {
                stack.push(target);
            }
        }
    }
    seen
}

/// ============================================================================
/// ASSERTIONS
/// ============================================================================

/// Every region's live bytes equal the sizes of the given live objects in it
pub fn assert_live_bytes_match(
    fixture: &SpaceFixture,
    live: &HashSet<ObjectReference>,
    context: &str,
) {
    let mut expected = vec![0usize; fixture.space.region_count()];
    for &object in live {
        expected[fixture.region_of(object).index()] += fixture.size_of(object);
    }
    for region in fixture.space.table().iter() {
        assert_eq!(
            region.live_bytes(),
            expected[region.id().index()],
            "{}: live bytes of {}",
            context,
            region.id()
        );
    }
}
