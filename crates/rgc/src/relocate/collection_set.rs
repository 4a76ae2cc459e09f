//! Collection Set - Choosing which regions to evacuate
//!
//! Selection runs once per cycle, after the mark closure has recorded
//! live bytes and before the evacuating closure starts. A selector only
//! sees a [`LivenessView`]; the space applies the result by setting the
//! relocation-required flag of every chosen consumed region.

use crate::config::SpaceConfig;
use crate::heap::RegionId;
use crate::marker::LivenessView;
use indexmap::IndexSet;

/// Regions chosen for evacuation, in selection order
pub type CollectionSet = IndexSet<RegionId>;

/// Policy that picks the collection set
pub trait CollectionSetSelector: Send + Sync {
    /// Choose regions to evacuate this cycle
    fn select(&self, view: &LivenessView) -> CollectionSet;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Never evacuates anything
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySelector;

impl CollectionSetSelector for EmptySelector {
    fn select(&self, _view: &LivenessView) -> CollectionSet {
        CollectionSet::new()
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

/// Evacuates a fixed set of regions every cycle
#[derive(Debug, Default, Clone)]
pub struct ExplicitSelector {
    regions: CollectionSet,
}

impl ExplicitSelector {
    pub fn new(regions: impl IntoIterator<Item = RegionId>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
        }
    }
}

impl CollectionSetSelector for ExplicitSelector {
    fn select(&self, view: &LivenessView) -> CollectionSet {
        self.regions
            .iter()
            .filter(|id| view.consumed.contains_key(*id))
            .copied()
            .collect()
    }

    fn name(&self) -> &'static str {
        "explicit"
    }
}

/// Evacuates the emptiest regions that fit in the copy reserve.
///
/// Consumed regions are visited in ascending order of live bytes. A region
/// is taken if its live bytes are at most `max_live_ratio` of a region and
/// still fit in the remaining reserve, which starts at
/// `copy_reserve_ratio` of the free-region bytes.
#[derive(Debug, Clone, Copy)]
pub struct LiveRatioSelector {
    pub max_live_ratio: f64,
    pub copy_reserve_ratio: f64,
}

impl LiveRatioSelector {
    pub fn new(max_live_ratio: f64, copy_reserve_ratio: f64) -> Self {
        Self {
            max_live_ratio,
            copy_reserve_ratio,
        }
    }

    pub fn from_config(config: &SpaceConfig) -> Self {
        Self::new(config.max_live_ratio, config.copy_reserve_ratio)
    }
}

impl Default for LiveRatioSelector {
    fn default() -> Self {
        Self::from_config(&SpaceConfig::default())
    }
}

impl CollectionSetSelector for LiveRatioSelector {
    fn select(&self, view: &LivenessView) -> CollectionSet {
        let max_live = (view.region_size as f64 * self.max_live_ratio) as usize;
        let mut reserve = (view.available_bytes() as f64 * self.copy_reserve_ratio) as usize;

        let mut candidates: Vec<(RegionId, usize)> =
            view.consumed.iter().map(|(&id, &live)| (id, live)).collect();
        candidates.sort_by_key(|&(id, live)| (live, id));

        let mut selected = CollectionSet::new();
        for (id, live) in candidates {
            if live <= max_live && live <= reserve {
                selected.insert(id);
                reserve -= live;
            }
        }
        selected
    }

    fn name(&self) -> &'static str {
        "live-ratio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    const REGION: usize = 1000;

    fn view(available_regions: usize, live: &[usize]) -> LivenessView {
        LivenessView {
            region_size: REGION,
            available_regions,
            consumed: live
                .iter()
                .enumerate()
                .map(|(i, &l)| (RegionId::new(i), l))
                .collect::<IndexMap<_, _>>(),
        }
    }

    fn ids(set: &CollectionSet) -> Vec<usize> {
        set.iter().map(|id| id.index()).collect()
    }

    #[test]
    fn test_empty_selector() {
        assert!(EmptySelector.select(&view(4, &[0, 10, 20])).is_empty());
    }

    #[test]
    fn test_explicit_selector_ignores_unconsumed() {
        let selector = ExplicitSelector::new([RegionId::new(1), RegionId::new(7)]);
        assert_eq!(ids(&selector.select(&view(4, &[0, 10]))), vec![1]);
    }

    #[test]
    fn test_live_ratio_threshold() {
        let selector = LiveRatioSelector::new(0.65, 1.0);
        // 650 is exactly at the threshold, 651 is above it.
        let set = selector.select(&view(10, &[900, 651, 650, 100]));
        assert_eq!(ids(&set), vec![3, 2]);
    }

    #[test]
    fn test_live_ratio_respects_reserve() {
        let selector = LiveRatioSelector::new(0.65, 0.5);
        // Reserve is 500 bytes: 100 + 300 fit, 400 does not.
        let set = selector.select(&view(1, &[400, 300, 100]));
        assert_eq!(ids(&set), vec![2, 1]);
    }

    #[test]
    fn test_dead_regions_selected_without_reserve() {
        let selector = LiveRatioSelector::new(0.65, 0.9);
        let set = selector.select(&view(0, &[0, 10, 0]));
        assert_eq!(ids(&set), vec![0, 2]);
    }
}
