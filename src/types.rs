use geo::{BoundingRect, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    // EPSG:4326, x = lon, y = lat
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One observed trip. Column names match the mobility CSV header.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MobilityRecord {
    pub province: String,
    pub no_of_trips: f64,
    pub trip_kms: f64,
    pub frequency: String,
    pub destination_place: String,
    pub age_bin: String,
    pub sex: String,
    pub revenue: String,
}
