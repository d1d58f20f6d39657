use crate::regions::RegionSet;
use crate::types::LatLng;
use serde::Serialize;

/// Currently selected province plus the last map click. `previous` is the
/// province that was selected before the last change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub province: String,
    pub previous: String,
    pub last_click: Option<LatLng>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Changed { from: String, to: String },
    Unchanged,
    Outside,
}

impl Selection {
    pub fn new(regions: &RegionSet) -> Self {
        let first = regions.first().name.clone();
        Self {
            province: first.clone(),
            previous: first,
            last_click: None,
        }
    }

    /// Records the click and switches province when it resolves to a
    /// different region. Clicks outside every region only move `last_click`.
    pub fn apply_click(&mut self, regions: &RegionSet, at: LatLng) -> ClickOutcome {
        self.last_click = Some(at);

        match regions.locate(at) {
            None => ClickOutcome::Outside,
            Some(region) if region.name == self.province => ClickOutcome::Unchanged,
            Some(region) => {
                let from = std::mem::replace(&mut self.province, region.name.clone());
                self.previous = from.clone();
                ClickOutcome::Changed {
                    from,
                    to: self.province.clone(),
                }
            }
        }
    }

    /// Picks a province by name, bypassing the map.
    pub fn select(&mut self, regions: &RegionSet, name: &str) -> bool {
        match regions.get(name) {
            Some(region) => {
                self.previous = std::mem::replace(&mut self.province, region.name.clone());
                true
            }
            None => false,
        }
    }
}
