use crate::types::MobilityRecord;
use std::collections::BTreeMap;

/// Categorical column of a mobility record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Frequency,
    DestinationPlace,
    AgeBin,
    Sex,
    Revenue,
}

impl Dimension {
    pub fn of<'a>(&self, record: &'a MobilityRecord) -> &'a str {
        match self {
            Dimension::Frequency => &record.frequency,
            Dimension::DestinationPlace => &record.destination_place,
            Dimension::AgeBin => &record.age_bin,
            Dimension::Sex => &record.sex,
            Dimension::Revenue => &record.revenue,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Frequency => "frequency",
            Dimension::DestinationPlace => "destination_place",
            Dimension::AgeBin => "age_bin",
            Dimension::Sex => "sex",
            Dimension::Revenue => "revenue",
        }
    }
}

/// Numeric column of a mobility record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Trips,
    Kms,
}

impl Measure {
    pub fn of(&self, record: &MobilityRecord) -> f64 {
        match self {
            Measure::Trips => record.no_of_trips,
            Measure::Kms => record.trip_kms,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Measure::Trips => "no_of_trips",
            Measure::Kms => "trip_kms",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Bin count by Sturges' rule.
pub fn sturges(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    (n as f64).log2().ceil() as usize + 1
}

/// Equal-width histogram. The last bin is closed so the maximum lands in it.
pub fn histogram(values: &[f64], bins: Option<usize>) -> Vec<Bin> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if min == max {
        return vec![Bin {
            start: min - 0.5,
            end: max + 0.5,
            count: values.len(),
        }];
    }

    let n_bins = bins.unwrap_or_else(|| sturges(values.len())).max(1);
    let width = (max - min) / n_bins as f64;

    let mut counts = vec![0usize; n_bins];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(n_bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            start: min + width * i as f64,
            end: min + width * (i + 1) as f64,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Tukey box: whiskers reach the furthest points within 1.5 IQR of the box.
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile(&sorted, 0.25);
    let median = quantile(&sorted, 0.5);
    let q3 = quantile(&sorted, 0.75);
    let fence = 1.5 * (q3 - q1);
    let (lo_fence, hi_fence) = (q1 - fence, q3 + fence);

    let lower_whisker = sorted.iter().copied().filter(|v| *v >= lo_fence).fold(f64::INFINITY, f64::min);
    let upper_whisker = sorted.iter().copied().filter(|v| *v <= hi_fence).fold(f64::NEG_INFINITY, f64::max);
    let outliers = sorted.iter().copied().filter(|v| *v < lo_fence || *v > hi_fence).collect();

    Some(BoxStats {
        lower_whisker,
        q1,
        median,
        q3,
        upper_whisker,
        outliers,
    })
}

/// Row count per category, categories sorted.
pub fn counts(records: &[&MobilityRecord], dim: Dimension) -> Vec<(String, usize)> {
    let mut map: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        *map.entry(dim.of(r)).or_default() += 1;
    }
    map.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSeries {
    pub name: String,
    /// One slot per category; `None` where the pair never occurs.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grouped {
    pub categories: Vec<String>,
    pub series: Vec<GroupSeries>,
}

/// Mean of `measure` for every (x, series) pair present in the rows.
pub fn grouped_mean(records: &[&MobilityRecord], x: Dimension, series: Dimension, measure: Measure) -> Grouped {
    let mut sums: BTreeMap<(&str, &str), (f64, usize)> = BTreeMap::new();
    for r in records {
        let slot = sums.entry((series.of(r), x.of(r))).or_insert((0.0, 0));
        slot.0 += measure.of(r);
        slot.1 += 1;
    }

    let mut categories: Vec<&str> = sums.keys().map(|(_, c)| *c).collect();
    categories.sort_unstable();
    categories.dedup();

    let mut names: Vec<&str> = sums.keys().map(|(s, _)| *s).collect();
    names.dedup();

    let series = names
        .into_iter()
        .map(|name| GroupSeries {
            name: name.to_string(),
            values: categories
                .iter()
                .map(|c| sums.get(&(name, *c)).map(|(sum, n)| sum / *n as f64))
                .collect(),
        })
        .collect();

    Grouped {
        categories: categories.into_iter().map(String::from).collect(),
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobility::tests::table;

    fn values(m: Measure) -> Vec<f64> {
        let t = table();
        let v = t.for_province("Madrid").iter().map(|r| m.of(r)).collect();
        v
    }

    #[test]
    fn sturges_rule() {
        assert_eq!(sturges(0), 1);
        assert_eq!(sturges(1), 1);
        assert_eq!(sturges(5), 4);
        assert_eq!(sturges(100), 8);
    }

    #[test]
    fn histogram_of_trip_counts() {
        let bins = histogram(&values(Measure::Trips), None);
        let counts: Vec<_> = bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 1, 1]);
        assert_eq!(bins[0].start, 1.0);
        assert_eq!(bins[3].end, 5.0);
    }

    #[test]
    fn histogram_with_configured_bins() {
        let bins = histogram(&[0.0, 1.0, 9.0, 10.0], Some(2));
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 2);
    }

    #[test]
    fn histogram_of_constant_values_is_one_bin() {
        let bins = histogram(&[3.0, 3.0, 3.0], None);
        assert_eq!(bins, vec![Bin { start: 2.5, end: 3.5, count: 3 }]);
        assert!(histogram(&[], None).is_empty());
    }

    #[test]
    fn box_of_trip_kms() {
        let b = box_stats(&values(Measure::Kms)).unwrap();
        assert_eq!(b.q1, 8.0);
        assert_eq!(b.median, 10.0);
        assert_eq!(b.q3, 12.5);
        assert_eq!(b.lower_whisker, 4.0);
        assert_eq!(b.upper_whisker, 12.5);
        assert_eq!(b.outliers, vec![30.0]);
        assert!(box_stats(&[]).is_none());
    }

    #[test]
    fn quartiles_interpolate() {
        let b = box_stats(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(b.q1, 1.75);
        assert_eq!(b.median, 2.5);
        assert_eq!(b.q3, 3.25);
        assert!(b.outliers.is_empty());
    }

    #[test]
    fn counts_are_sorted_by_category() {
        let t = table();
        let rows = t.for_province("Madrid");
        assert_eq!(
            counts(&rows, Dimension::Frequency),
            vec![("frequent".to_string(), 3), ("not_frequent".to_string(), 2)]
        );
        assert_eq!(
            counts(&rows, Dimension::AgeBin),
            vec![("25-45".to_string(), 3), ("45-65".to_string(), 1), ("65-100".to_string(), 1)]
        );
    }

    #[test]
    fn grouped_mean_leaves_gaps_for_missing_pairs() {
        let t = table();
        let rows = t.for_province("Madrid");
        let g = grouped_mean(&rows, Dimension::AgeBin, Dimension::Sex, Measure::Kms);

        assert_eq!(g.categories, vec!["25-45", "45-65", "65-100"]);
        assert_eq!(g.series.len(), 2);
        assert_eq!(g.series[0].name, "man");
        assert_eq!(g.series[0].values, vec![Some(11.25), None, Some(30.0)]);
        assert_eq!(g.series[1].name, "woman");
        assert_eq!(g.series[1].values, vec![Some(8.0), Some(4.0), None]);
    }

    #[test]
    fn grouped_mean_of_nothing_is_empty() {
        let g = grouped_mean(&[], Dimension::Revenue, Dimension::AgeBin, Measure::Trips);
        assert!(g.categories.is_empty());
        assert!(g.series.is_empty());
    }
}
