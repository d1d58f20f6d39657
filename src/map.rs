use crate::regions::RegionSet;
use crate::types::LatLng;
use anyhow::Result;
use geo::{LineString, Rect};
use plotters::prelude::*;
use std::f64::consts::PI;

// Constants for Web Mercator
const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_78;

const SEA: RGBColor = RGBColor(170, 211, 223);

/// Screen window onto the Web Mercator plane at a fixed zoom. The same
/// viewport that draws the map converts click pixels back to coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    center_x: f64,
    center_y: f64,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, width: u32, height: u32) -> Self {
        let (center_x, center_y) = world_pixel(center, zoom);
        Self {
            width,
            height,
            zoom,
            center_x,
            center_y,
        }
    }

    /// Centred on the middle of `bounds` (x = lon, y = lat).
    pub fn centered_on(bounds: Rect<f64>, zoom: f64, width: u32, height: u32) -> Self {
        let center = LatLng::new(
            (bounds.min().y + bounds.max().y) / 2.0,
            (bounds.min().x + bounds.max().x) / 2.0,
        );
        Self::new(center, zoom, width, height)
    }

    pub fn center(&self) -> LatLng {
        self.to_geo(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    pub fn to_screen(&self, at: LatLng) -> (f64, f64) {
        let (x, y) = world_pixel(at, self.zoom);
        (
            x - self.center_x + self.width as f64 / 2.0,
            y - self.center_y + self.height as f64 / 2.0,
        )
    }

    pub fn to_geo(&self, x: f64, y: f64) -> LatLng {
        let scale = world_size(self.zoom);
        let wx = x - self.width as f64 / 2.0 + self.center_x;
        let wy = y - self.height as f64 / 2.0 + self.center_y;

        let lng = wx / scale * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * wy / scale)).sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }

    fn project_ring(&self, ring: &LineString<f64>) -> Vec<(i32, i32)> {
        ring.coords()
            .map(|c| {
                let (x, y) = self.to_screen(LatLng::new(c.y, c.x));
                (x.round() as i32, y.round() as i32)
            })
            .collect()
    }
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2.0_f64.powf(zoom)
}

fn world_pixel(at: LatLng, zoom: f64) -> (f64, f64) {
    let scale = world_size(zoom);
    let lat_rad = at.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (at.lng + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * scale;
    (x, y)
}

/// Draws every province, the selected one highlighted and on top, plus an
/// optional marker for the last click.
pub fn render_map(
    regions: &RegionSet,
    selected: &str,
    viewport: &Viewport,
    marker: Option<LatLng>,
) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (viewport.width, viewport.height)).into_drawing_area();
        root.fill(&SEA)?;

        let (others, chosen): (Vec<_>, Vec<_>) = regions.iter().partition(|r| r.name != selected);

        for (region, fill) in others
            .into_iter()
            .map(|r| (r, BLUE.mix(0.6)))
            .chain(chosen.into_iter().map(|r| (r, RED.mix(0.9))))
        {
            for polygon in &region.geometry {
                let exterior = viewport.project_ring(polygon.exterior());
                if exterior.len() < 3 {
                    continue;
                }
                root.draw(&Polygon::new(exterior.clone(), fill.filled()))?;
                root.draw(&PathElement::new(exterior, BLACK.stroke_width(1)))?;

                // holes show the sea through
                for interior in polygon.interiors() {
                    let hole = viewport.project_ring(interior);
                    if hole.len() >= 3 {
                        root.draw(&Polygon::new(hole.clone(), SEA.filled()))?;
                    }
                    root.draw(&PathElement::new(hole, BLACK.stroke_width(1)))?;
                }
            }
        }

        if let Some(at) = marker {
            let (x, y) = viewport.to_screen(at);
            root.draw(&Circle::new((x.round() as i32, y.round() as i32), 4, BLACK.filled()))?;
        }

        root.present()?;
    }
    Ok(svg)
}
