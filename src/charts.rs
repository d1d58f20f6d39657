use crate::config::ChartsConfig;
use crate::stats::{self, Bin, BoxStats, Dimension, Grouped, Measure};
use crate::types::MobilityRecord;
use anyhow::{anyhow, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use rayon::prelude::*;
use std::collections::HashMap;

pub const CHART_COUNT: usize = 12;

const FALLBACK: [RGBColor; 10] = [
    RGBColor(0x63, 0x6E, 0xFA),
    RGBColor(0xEF, 0x55, 0x3B),
    RGBColor(0x00, 0xCC, 0x96),
    RGBColor(0xAB, 0x63, 0xFA),
    RGBColor(0xFF, 0xA1, 0x5A),
    RGBColor(0x19, 0xD3, 0xF3),
    RGBColor(0xFF, 0x66, 0x92),
    RGBColor(0xB6, 0xE8, 0x80),
    RGBColor(0xFF, 0x97, 0xFF),
    RGBColor(0xFE, 0xCB, 0x52),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartKind {
    Histogram(Measure),
    Box(Measure),
    Count { dim: Dimension, per_category_color: bool },
    GroupedMean { x: Dimension, series: Dimension, measure: Measure },
}

#[derive(Debug, Clone, Copy)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: &'static str,
}

impl ChartSpec {
    pub fn title_for(&self, province: &str) -> String {
        format!("{} in {}", self.title, province)
    }
}

/// The dashboard grid, read left to right, top to bottom.
pub const PANEL: [ChartSpec; CHART_COUNT] = [
    ChartSpec {
        kind: ChartKind::Histogram(Measure::Trips),
        title: "No of Trips Distribution",
    },
    ChartSpec {
        kind: ChartKind::Box(Measure::Kms),
        title: "Trip Kms Distribution",
    },
    ChartSpec {
        kind: ChartKind::Count { dim: Dimension::Frequency, per_category_color: false },
        title: "Frequency Distribution",
    },
    ChartSpec {
        kind: ChartKind::Count { dim: Dimension::DestinationPlace, per_category_color: true },
        title: "Destination Place Distribution",
    },
    ChartSpec {
        kind: ChartKind::Count { dim: Dimension::AgeBin, per_category_color: true },
        title: "Age Bin Distribution",
    },
    ChartSpec {
        kind: ChartKind::Count { dim: Dimension::Sex, per_category_color: true },
        title: "Sex Distribution",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::AgeBin, series: Dimension::Sex, measure: Measure::Kms },
        title: "Average Trip Kms by Age Group and Gender",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::AgeBin, series: Dimension::Sex, measure: Measure::Trips },
        title: "Average number of Trips by Age Group and Gender",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::Revenue, series: Dimension::AgeBin, measure: Measure::Trips },
        title: "Average number of Trips by Age Group and their Revenue",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::Revenue, series: Dimension::AgeBin, measure: Measure::Kms },
        title: "Average Trip Kms by Age Group and their Revenue",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::Sex, series: Dimension::Revenue, measure: Measure::Trips },
        title: "Average number of Trips by Gender and Revenue",
    },
    ChartSpec {
        kind: ChartKind::GroupedMean { x: Dimension::AgeBin, series: Dimension::Revenue, measure: Measure::Trips },
        title: "Average number of Trips by Age Group and their Revenue",
    },
];

pub fn parse_hex(hex: &str) -> Result<RGBColor> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(anyhow!("Invalid colour '{}', expected #RRGGBB", hex));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| anyhow!("Invalid colour '{}', expected #RRGGBB", hex))
    };
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

/// Category colours. Unknown categories fall back to a fixed cycle.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: HashMap<String, RGBColor>,
}

impl Palette {
    pub fn from_config(colors: &HashMap<String, String>) -> Result<Self> {
        let colors = colors
            .iter()
            .map(|(name, hex)| Ok((name.clone(), parse_hex(hex)?)))
            .collect::<Result<_>>()?;
        Ok(Self { colors })
    }

    pub fn color_for(&self, category: &str, index: usize) -> RGBColor {
        self.colors
            .get(category)
            .copied()
            .unwrap_or(FALLBACK[index % FALLBACK.len()])
    }

    /// Colour of the single-series charts.
    pub fn primary(&self) -> RGBColor {
        self.color_for("frequent", 0)
    }
}

struct BarSeries {
    name: String,
    color: RGBColor,
    values: Vec<Option<f64>>,
}

pub struct ChartRenderer {
    palette: Palette,
    width: u32,
    height: u32,
    histogram_bins: Option<usize>,
}

impl ChartRenderer {
    pub fn new(config: &ChartsConfig) -> Result<Self> {
        Ok(Self {
            palette: Palette::from_config(&config.colors)?,
            width: config.width,
            height: config.height,
            histogram_bins: config.histogram_bins,
        })
    }

    /// All twelve charts for one province, rendered in parallel.
    pub fn render_panel(&self, province: &str, rows: &[&MobilityRecord]) -> Result<Vec<String>> {
        PANEL[..]
            .par_iter()
            .map(|spec| self.render(spec, province, rows))
            .collect()
    }

    pub fn render(&self, spec: &ChartSpec, province: &str, rows: &[&MobilityRecord]) -> Result<String> {
        let title = spec.title_for(province);

        match spec.kind {
            ChartKind::Histogram(measure) => {
                let values: Vec<f64> = rows.iter().map(|r| measure.of(r)).collect();
                let bins = stats::histogram(&values, self.histogram_bins);
                self.svg(|root| draw_histogram(root, &title, measure, &bins, self.palette.primary()))
            }
            ChartKind::Box(measure) => {
                let values: Vec<f64> = rows.iter().map(|r| measure.of(r)).collect();
                let summary = stats::box_stats(&values);
                self.svg(|root| draw_box(root, &title, measure, summary.as_ref(), self.palette.primary()))
            }
            ChartKind::Count { dim, per_category_color } => {
                let counts = stats::counts(rows, dim);
                let categories: Vec<String> = counts.iter().map(|(c, _)| c.clone()).collect();
                let series = if per_category_color {
                    // one single-bar series per category so each gets its own colour
                    counts
                        .iter()
                        .enumerate()
                        .map(|(i, (name, n))| BarSeries {
                            name: name.clone(),
                            color: self.palette.color_for(name, i),
                            values: (0..counts.len()).map(|j| (j == i).then_some(*n as f64)).collect(),
                        })
                        .collect()
                } else {
                    vec![BarSeries {
                        name: dim.column().to_string(),
                        color: self.palette.primary(),
                        values: counts.iter().map(|(_, n)| Some(*n as f64)).collect(),
                    }]
                };
                self.svg(|root| draw_bars(root, &title, dim.column(), "count", &categories, &series))
            }
            ChartKind::GroupedMean { x, series, measure } => {
                let grouped = stats::grouped_mean(rows, x, series, measure);
                let bars = self.grouped_series(&grouped);
                self.svg(|root| draw_bars(root, &title, x.column(), measure.column(), &grouped.categories, &bars))
            }
        }
    }

    fn grouped_series(&self, grouped: &Grouped) -> Vec<BarSeries> {
        grouped
            .series
            .iter()
            .enumerate()
            .map(|(i, s)| BarSeries {
                name: s.name.clone(),
                color: self.palette.color_for(&s.name, i),
                values: s.values.clone(),
            })
            .collect()
    }

    fn svg<F>(&self, draw: F) -> Result<String>
    where
        F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> Result<()>,
    {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE)?;
            draw(&root)?;
            root.present()?;
        }
        Ok(svg)
    }
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi <= lo {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn draw_histogram(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    measure: Measure,
    bins: &[Bin],
    color: RGBColor,
) -> Result<()> {
    let (x0, x1) = match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => (0.0, 1.0),
    };
    let y_max = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(x0..x1, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(measure.column())
        .y_desc("count")
        .draw()?;

    chart.draw_series(
        bins.iter()
            .map(|b| Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.filled())),
    )?;
    chart.draw_series(
        bins.iter()
            .map(|b| Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], WHITE.stroke_width(1))),
    )?;

    Ok(())
}

fn draw_box(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    measure: Measure,
    stats: Option<&BoxStats>,
    color: RGBColor,
) -> Result<()> {
    let (y0, y1) = match stats {
        Some(s) => {
            let lo = s.outliers.iter().copied().fold(s.lower_whisker, f64::min);
            let hi = s.outliers.iter().copied().fold(s.upper_whisker, f64::max);
            padded(lo, hi)
        }
        None => (0.0, 1.0),
    };

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(45)
        .build_cartesian_2d(-1f64..1f64, y0..y1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_| String::new())
        .y_desc(measure.column())
        .draw()?;

    let Some(s) = stats else {
        return Ok(());
    };

    chart.draw_series([
        Rectangle::new([(-0.3, s.q1), (0.3, s.q3)], color.mix(0.5).filled()),
        Rectangle::new([(-0.3, s.q1), (0.3, s.q3)], color.stroke_width(2)),
    ])?;
    chart.draw_series([
        PathElement::new(vec![(-0.3, s.median), (0.3, s.median)], color.stroke_width(2)),
        PathElement::new(vec![(0.0, s.q3), (0.0, s.upper_whisker)], color.stroke_width(1)),
        PathElement::new(vec![(0.0, s.q1), (0.0, s.lower_whisker)], color.stroke_width(1)),
        PathElement::new(vec![(-0.15, s.upper_whisker), (0.15, s.upper_whisker)], color.stroke_width(1)),
        PathElement::new(vec![(-0.15, s.lower_whisker), (0.15, s.lower_whisker)], color.stroke_width(1)),
    ])?;
    chart.draw_series(s.outliers.iter().map(|v| Circle::new((0.0, *v), 3, color.filled())))?;

    Ok(())
}

/// Label for a tick on a category axis whose slots are centred on integers.
fn category_label(categories: &[String], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    categories.get(i as usize).cloned().unwrap_or_default()
}

/// Horizontal extent of series `si` within category `ci`. Only series with
/// a value there share the slot.
fn bar_extent(series: &[BarSeries], ci: usize, si: usize) -> (f64, f64) {
    let present: Vec<usize> = series
        .iter()
        .enumerate()
        .filter(|(_, s)| s.values.get(ci).copied().flatten().is_some())
        .map(|(i, _)| i)
        .collect();
    let slot = present.iter().position(|i| *i == si).unwrap_or(0);
    let width = 0.8 / present.len().max(1) as f64;
    let left = ci as f64 - 0.4 + slot as f64 * width;
    (left, left + width)
}

fn draw_bars(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    categories: &[String],
    series: &[BarSeries],
) -> Result<()> {
    let n = categories.len().max(1);
    let y_max = series
        .iter()
        .flat_map(|s| s.values.iter().flatten())
        .copied()
        .fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..y_max)?;

    let labels = |x: &f64| category_label(categories, *x);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&labels)
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    let with_legend = series.len() > 1;

    for (si, s) in series.iter().enumerate() {
        let bars: Vec<_> = s
            .values
            .iter()
            .enumerate()
            .filter_map(|(ci, v)| {
                let v = (*v)?;
                let (left, right) = bar_extent(series, ci, si);
                Some(Rectangle::new([(left, 0.0), (right, v)], s.color.filled()))
            })
            .collect();

        let color = s.color;
        let anno = chart.draw_series(bars)?;
        if with_legend {
            anno.label(s.name.as_str())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }
    }

    if with_legend {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    Ok(())
}
