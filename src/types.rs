use geo::{BoundingRect, MultiPolygon, Rect};
use serde::Serialize;
use std::collections::BTreeMap;

/// Stable handle for a region: its index in the loaded [`Dataset`].
///
/// Focus comparisons go through this handle, so two regions with identical
/// attributes are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegionId(pub usize);

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub alt_name: Option<String>,
    pub geometry: MultiPolygon<f64>,
    // Map<Year, Count>
    pub population: BTreeMap<String, u64>,
}

impl Region {
    /// The English/alternate name when present, otherwise the primary one.
    pub fn display_name(&self) -> &str {
        self.alt_name.as_deref().unwrap_or(&self.name)
    }

    pub fn population_in(&self, year: &str) -> Option<u64> {
        self.population.get(year).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub regions: Vec<Region>,
}

impl Dataset {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().enumerate().map(|(i, r)| (RegionId(i), r))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Combined lon/lat extent of every region.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.regions
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn display_name_prefers_alternate() {
        let bavaria = square_region("Bayern", Some("Bavaria"), 0.0, 0.0, 1.0, 1);
        let hesse = square_region("Hessen", None, 0.0, 0.0, 1.0, 1);
        assert_eq!(bavaria.display_name(), "Bavaria");
        assert_eq!(hesse.display_name(), "Hessen");
    }

    #[test]
    fn bounds_cover_all_regions() {
        let bounds = two_states().bounds().unwrap();
        assert_eq!(bounds.min().x, 8.0);
        assert_eq!(bounds.min().y, 47.5);
        assert_eq!(bounds.max().x, 12.0);
        assert_eq!(bounds.max().y, 52.5);
    }

    #[test]
    fn empty_dataset_has_no_bounds() {
        assert!(Dataset::default().bounds().is_none());
    }
}
