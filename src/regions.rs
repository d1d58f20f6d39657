use crate::types::{LatLng, Region};
use anyhow::{bail, Result};
use geo::{BoundingRect, Contains, Coord, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Read-only province collection in document order, with a bounding-box
/// index for click lookups. Never empty.
pub struct RegionSet {
    regions: Vec<Region>,
    tree: RTree<RegionEnvelope>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Result<Self> {
        if regions.is_empty() {
            bail!("Region dataset contains no named polygons");
        }

        // Regions with empty geometry stay listed but can never be hit.
        let items: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let rect = region.geometry.bounding_rect()?;
                Some(RegionEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Ok(Self {
            regions,
            tree: RTree::bulk_load(items),
        })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn first(&self) -> &Region {
        &self.regions[0]
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    /// Union of all region bounding boxes.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.regions
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }

    /// Region strictly containing the coordinate. Points on a boundary are
    /// outside; overlapping regions resolve to the earliest in the dataset.
    pub fn locate(&self, at: LatLng) -> Option<&Region> {
        let point = Point::new(at.lng, at.lat);
        let envelope = AABB::from_point([at.lng, at.lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| self.regions[candidate.index].geometry.contains(&point))
            .map(|candidate| candidate.index)
            .min()
            .map(|index| &self.regions[index])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    pub(crate) fn square(name: &str, x0: f64, y0: f64, size: f64) -> Region {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ];
        Region {
            name: name.to_string(),
            geometry: MultiPolygon::new(vec![poly]),
        }
    }

    pub(crate) fn grid() -> RegionSet {
        RegionSet::new(vec![
            square("Madrid", -4.0, 40.0, 1.0),
            square("Toledo", -5.0, 39.0, 1.0),
            square("Cuenca", -3.0, 39.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn locates_containing_region() {
        let set = grid();
        assert_eq!(set.locate(LatLng::new(40.5, -3.5)).map(|r| r.name.as_str()), Some("Madrid"));
        assert_eq!(set.locate(LatLng::new(39.2, -4.8)).map(|r| r.name.as_str()), Some("Toledo"));
    }

    #[test]
    fn point_outside_every_region_is_none() {
        let set = grid();
        assert!(set.locate(LatLng::new(45.0, 2.0)).is_none());
        // inside Madrid's envelope row but between squares
        assert!(set.locate(LatLng::new(39.5, -3.5)).is_none());
    }

    #[test]
    fn boundary_point_is_not_within() {
        let set = grid();
        assert!(set.locate(LatLng::new(40.0, -3.5)).is_none());
    }

    #[test]
    fn overlap_resolves_to_document_order() {
        let set = RegionSet::new(vec![square("A", 0.0, 0.0, 2.0), square("B", 1.0, 1.0, 2.0)]).unwrap();
        assert_eq!(set.locate(LatLng::new(1.5, 1.5)).unwrap().name, "A");
        assert_eq!(set.locate(LatLng::new(2.5, 2.5)).unwrap().name, "B");
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(RegionSet::new(Vec::new()).is_err());
    }

    #[test]
    fn lookups_and_bounds() {
        let set = grid();
        assert_eq!(set.first().name, "Madrid");
        assert_eq!(set.len(), 3);
        assert!(set.get("Cuenca").is_some());
        assert!(set.get("Lugo").is_none());
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["Madrid", "Toledo", "Cuenca"]);

        let b = set.bounds().unwrap();
        assert_eq!((b.min().x, b.min().y), (-5.0, 39.0));
        assert_eq!((b.max().x, b.max().y), (-2.0, 41.0));
    }
}
