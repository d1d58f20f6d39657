use crate::charts::ChartRenderer;
use crate::config::{AppConfig, MapConfig};
use crate::map::{render_map, Viewport};
use crate::mobility::MobilityTable;
use crate::regions::RegionSet;
use crate::selection::Selection;
use crate::types::LatLng;
use anyhow::Result;
use geo::{Coord, Rect};
use std::fmt::Write;
use tracing::debug;

// Used only when neither the province nor the dataset has a bounding box.
const SPAIN: LatLng = LatLng { lat: 40.0, lng: -3.7 };

/// Viewport the map is drawn with while `province` is selected. Clicks are
/// converted back through the same viewport.
pub fn viewport_for(map: &MapConfig, regions: &RegionSet, province: &str) -> Viewport {
    let bounds = regions
        .get(province)
        .and_then(|r| r.bounds())
        .or_else(|| regions.bounds());

    match bounds {
        Some(rect) => Viewport::centered_on(rect, map.zoom, map.width, map.height),
        None => Viewport::centered_on(
            Rect::new(Coord { x: SPAIN.lng, y: SPAIN.lat }, Coord { x: SPAIN.lng, y: SPAIN.lat }),
            map.zoom,
            map.width,
            map.height,
        ),
    }
}

/// Output of one render cycle.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub province: String,
    pub last_click: Option<LatLng>,
    pub map_svg: String,
    pub charts: Vec<String>,
}

impl Dashboard {
    /// Re-reads the mobility CSV, then draws the map and every chart for the
    /// selected province.
    pub fn render(
        config: &AppConfig,
        regions: &RegionSet,
        charts: &ChartRenderer,
        selection: &Selection,
    ) -> Result<Self> {
        let table = MobilityTable::load(&config.mobility.csv)?;
        let rows = table.for_province(&selection.province);
        debug!(
            "Rendering {} with {} of {} mobility rows",
            selection.province,
            rows.len(),
            table.len()
        );

        let viewport = viewport_for(&config.map, regions, &selection.province);
        let map_svg = render_map(regions, &selection.province, &viewport, selection.last_click)?;
        let charts = charts.render_panel(&selection.province, &rows)?;

        Ok(Self {
            province: selection.province.clone(),
            last_click: selection.last_click,
            map_svg,
            charts,
        })
    }

    pub fn to_html(&self) -> String {
        let mut html = String::with_capacity(self.map_svg.len() + self.charts.iter().map(String::len).sum::<usize>() + 4096);

        html.push_str(HEAD);
        let _ = write!(html, "<title>Mobility in {}</title>", escape(&self.province));
        html.push_str(STYLE);
        html.push_str("</head>\n<body>\n");

        let _ = write!(html, "<div id=\"map\" data-province=\"{}\">", escape(&self.province));
        html.push_str(&self.map_svg);
        html.push_str("<div id=\"tooltip\"></div></div>\n");

        let _ = writeln!(
            html,
            "<p>The selected Province is <span style=\"color:red;\">{}</span></p>",
            escape(&self.province)
        );
        if let Some(at) = self.last_click {
            let _ = writeln!(
                html,
                "<p class=\"click\">Last click: {:.4}, {:.4}</p>",
                at.lat, at.lng
            );
        }

        html.push_str("<div class=\"grid\">\n");
        for (i, chart) in self.charts.iter().enumerate() {
            let _ = writeln!(html, "<div class=\"chart\" id=\"chart-{}\">{}</div>", i + 1, chart);
        }
        html.push_str("</div>\n");

        html.push_str(SCRIPT);
        html.push_str("</body>\n</html>\n");
        html
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const HEAD: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n";

const STYLE: &str = r#"<style>
body { font-family: sans-serif; margin: 1rem; }
#map { position: relative; display: inline-block; cursor: crosshair; }
#tooltip { position: absolute; pointer-events: none; background: #fff; border: 1px solid #333; padding: 2px 6px; font-size: 12px; display: none; }
.grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 1rem; }
.chart svg { max-width: 100%; height: auto; }
.click { color: #555; font-size: 0.9em; }
</style>
"#;

const SCRIPT: &str = r#"<script>
const map = document.getElementById('map');
const tooltip = document.getElementById('tooltip');
let hoverTimer = null;

function offset(ev) {
  const rect = map.getBoundingClientRect();
  return { x: ev.clientX - rect.left, y: ev.clientY - rect.top };
}

map.addEventListener('click', async (ev) => {
  const resp = await fetch('/api/click', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify({ ...offset(ev), view: map.dataset.province }),
  });
  if (resp.ok) {
    window.location.reload();
  }
});

map.addEventListener('mousemove', (ev) => {
  const p = offset(ev);
  clearTimeout(hoverTimer);
  hoverTimer = setTimeout(async () => {
    const view = encodeURIComponent(map.dataset.province);
    const resp = await fetch(`/api/region?x=${p.x}&y=${p.y}&view=${view}`);
    const hit = resp.ok ? await resp.json() : null;
    if (hit) {
      tooltip.textContent = hit.name;
      tooltip.style.left = `${p.x + 12}px`;
      tooltip.style.top = `${p.y + 12}px`;
      tooltip.style.display = 'block';
    } else {
      tooltip.style.display = 'none';
    }
  }, 150);
});

map.addEventListener('mouseleave', () => {
  clearTimeout(hoverTimer);
  tooltip.style.display = 'none';
});
</script>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartsConfig;
    use crate::data::tests::write_fixture;
    use crate::mobility::tests::MOBILITY_CSV;
    use crate::regions::tests::grid;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("A Coruña"), "A Coruña");
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn viewport_follows_selection() {
        let regions = grid();
        let map = MapConfig::default();
        let c = viewport_for(&map, &regions, "Cuenca").center();
        assert!((c.lat - 39.5).abs() < 1e-9);
        assert!((c.lng + 2.5).abs() < 1e-9);

        // unknown name falls back to the whole dataset
        let c = viewport_for(&map, &regions, "Atlantis").center();
        assert!((c.lat - 40.0).abs() < 1e-9);
        assert!((c.lng + 3.5).abs() < 1e-9);
    }

    #[test]
    fn render_cycle_builds_full_page() {
        let csv = write_fixture("page.csv", MOBILITY_CSV);
        let mut config = AppConfig::default();
        config.mobility.csv = csv;

        let regions = grid();
        let renderer = ChartRenderer::new(&ChartsConfig::default()).unwrap();
        let mut selection = Selection::new(&regions);
        selection.apply_click(&regions, LatLng::new(40.5, -3.5));

        let dashboard = Dashboard::render(&config, &regions, &renderer, &selection).unwrap();
        assert_eq!(dashboard.province, "Madrid");
        assert_eq!(dashboard.charts.len(), 12);

        let html = dashboard.to_html();
        assert!(html.contains("The selected Province is <span style=\"color:red;\">Madrid</span>"));
        assert!(html.contains("Last click: 40.5000, -3.5000"));
        assert_eq!(html.matches("class=\"chart\"").count(), 12);
        assert!(html.contains("id=\"chart-12\""));
        assert!(html.contains("/api/click"));
        assert!(html.contains("<div id=\"map\" data-province=\"Madrid\">"));
        assert!(html.contains("view: map.dataset.province"));
    }

    #[test]
    fn missing_mobility_file_fails_the_cycle() {
        let mut config = AppConfig::default();
        config.mobility.csv = "/nonexistent/mobility.csv".into();

        let regions = grid();
        let renderer = ChartRenderer::new(&ChartsConfig::default()).unwrap();
        let selection = Selection::new(&regions);

        assert!(Dashboard::render(&config, &regions, &renderer, &selection).is_err());
    }
}
