//! Weighted composite index construction.
//!
//! Given validated weights, one raw series per weighted series id, and the
//! benchmark series, produce one row per date shared by *all* of them:
//!
//! - `composite = Σ weight_i × value_i` (optionally after rebasing to 100)
//! - `yoy = composite[d] / composite[d − 12 months] − 1`, only when that
//!   earlier row exists in the output
//! - `gap = composite[d] − benchmark[d]`
//!
//! There is no interpolation or fill: a date missing from any input is
//! missing from the output.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Months, NaiveDate};

use crate::domain::{BuildOptions, RawSeries, SeverityRow, SeverityTable, WeightsTable};
use crate::error::BuildError;

type DatedValues = BTreeMap<NaiveDate, f64>;

pub fn build_index(
    weights: &WeightsTable,
    components: &HashMap<String, RawSeries>,
    benchmark: &RawSeries,
    options: &BuildOptions,
) -> Result<SeverityTable, BuildError> {
    let mut component_values: Vec<(f64, DatedValues)> = Vec::with_capacity(weights.entries.len());
    for entry in &weights.entries {
        let series = components
            .get(&entry.series_id)
            .ok_or_else(|| BuildError::MissingSeries {
                category: entry.category.clone(),
                series_id: entry.series_id.clone(),
                path: None,
            })?;
        let values = prepare(series, options)?;
        component_values.push((entry.weight, values));
    }
    let benchmark_values = prepare(benchmark, options)?;

    let dates = common_dates(
        component_values
            .iter()
            .map(|(_, v)| v)
            .chain(std::iter::once(&benchmark_values)),
    );
    if dates.is_empty() {
        let mut series: Vec<String> = weights.series_ids().map(str::to_string).collect();
        series.push(benchmark.series_id.clone());
        return Err(BuildError::EmptyIntersection { series });
    }

    let mut composite_by_date: DatedValues = BTreeMap::new();
    let mut rows = Vec::with_capacity(dates.len());
    for &date in &dates {
        let mut composite = 0.0;
        let mut used = Vec::with_capacity(component_values.len());
        for (weight, values) in &component_values {
            // `dates` only holds dates present in every input.
            let value = values[&date];
            composite += weight * value;
            used.push(value);
        }
        if !composite.is_finite() {
            return Err(BuildError::NonFinite { date });
        }
        composite_by_date.insert(date, composite);

        let benchmark_value = benchmark_values[&date];
        rows.push(SeverityRow {
            date,
            composite_value: composite,
            components: used,
            yoy_change: None,
            benchmark_value,
            gap: composite - benchmark_value,
            benchmark_yoy_change: None,
        });
    }

    let benchmark_by_date: DatedValues = rows.iter().map(|r| (r.date, r.benchmark_value)).collect();
    for row in &mut rows {
        row.yoy_change = year_over_year(&composite_by_date, row.date);
        row.benchmark_yoy_change = year_over_year(&benchmark_by_date, row.date);
    }

    Ok(SeverityTable {
        component_ids: weights.series_ids().map(str::to_string).collect(),
        rows,
    })
}

/// Relative change against the value exactly twelve months earlier.
pub fn year_over_year(values: &DatedValues, date: NaiveDate) -> Option<f64> {
    let prior_date = date.checked_sub_months(Months::new(12))?;
    let prior = *values.get(&prior_date)?;
    let current = *values.get(&date)?;
    if prior == 0.0 {
        return None;
    }
    Some(current / prior - 1.0)
}

/// Check ordering, then optionally rebase.
fn prepare(series: &RawSeries, options: &BuildOptions) -> Result<DatedValues, BuildError> {
    let values = validate_order(series)?;
    match options.base_date {
        Some(base_date) => rebase(&series.series_id, values, base_date),
        None => Ok(values),
    }
}

/// Dates must be strictly increasing.
pub fn validate_order(series: &RawSeries) -> Result<DatedValues, BuildError> {
    let mut out = BTreeMap::new();
    let mut previous: Option<NaiveDate> = None;
    for obs in &series.observations {
        if let Some(prev) = previous {
            if obs.date == prev {
                return Err(BuildError::DuplicateDate {
                    series_id: series.series_id.clone(),
                    date: obs.date,
                });
            }
            if obs.date < prev {
                return Err(BuildError::UnorderedDates {
                    series_id: series.series_id.clone(),
                    previous: prev,
                    date: obs.date,
                });
            }
        }
        previous = Some(obs.date);
        out.insert(obs.date, obs.value);
    }
    Ok(out)
}

fn rebase(series_id: &str, values: DatedValues, base_date: NaiveDate) -> Result<DatedValues, BuildError> {
    let base = *values.get(&base_date).ok_or_else(|| BuildError::MissingBaseDate {
        series_id: series_id.to_string(),
        base_date,
    })?;
    if !(base.is_finite() && base > 0.0) {
        return Err(BuildError::InvalidBaseValue {
            series_id: series_id.to_string(),
            base_date,
            value: base,
        });
    }
    Ok(values.into_iter().map(|(d, v)| (d, v / base * 100.0)).collect())
}

fn common_dates<'a>(mut inputs: impl Iterator<Item = &'a DatedValues>) -> BTreeSet<NaiveDate> {
    let Some(first) = inputs.next() else {
        return BTreeSet::new();
    };
    let mut common: BTreeSet<NaiveDate> = first.keys().copied().collect();
    for values in inputs {
        common.retain(|d| values.contains_key(d));
    }
    common
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::{Observation, WeightEntry};

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn series(id: &str, points: &[(NaiveDate, f64)]) -> RawSeries {
        RawSeries::new(id, points.iter().map(|&(date, v)| Observation::new(date, v)).collect())
    }

    fn weights(entries: &[(&str, &str, f64)]) -> WeightsTable {
        WeightsTable {
            source: PathBuf::from("weights.csv"),
            entries: entries
                .iter()
                .map(|&(category, series_id, weight)| WeightEntry {
                    category: category.to_string(),
                    series_id: series_id.to_string(),
                    weight,
                })
                .collect(),
        }
    }

    fn components(list: Vec<RawSeries>) -> HashMap<String, RawSeries> {
        list.into_iter().map(|s| (s.series_id.clone(), s)).collect()
    }

    const RAW: BuildOptions = BuildOptions { base_date: None };

    #[test]
    fn composite_is_weighted_sum() {
        let w = weights(&[("A", "SA", 0.25), ("B", "SB", 0.75)]);
        let comps = components(vec![
            series("SA", &[(d(2024, 1), 100.0), (d(2024, 2), 104.0)]),
            series("SB", &[(d(2024, 1), 200.0), (d(2024, 2), 208.0)]),
        ]);
        let bench = series("BM", &[(d(2024, 1), 170.0), (d(2024, 2), 180.0)]);

        let table = build_index(&w, &comps, &bench, &RAW).unwrap();
        assert_eq!(table.component_ids, vec!["SA", "SB"]);
        assert_eq!(table.rows.len(), 2);
        assert!((table.rows[0].composite_value - 175.0).abs() < 1e-9);
        assert_eq!(table.rows[0].components, vec![100.0, 200.0]);
        assert!((table.rows[0].gap - 5.0).abs() < 1e-9);
        assert!((table.rows[1].composite_value - 182.0).abs() < 1e-9);
        assert!((table.rows[1].gap - 2.0).abs() < 1e-9);
    }

    #[test]
    fn output_dates_are_the_intersection() {
        let w = weights(&[("A", "SA", 0.5), ("B", "SB", 0.5)]);
        let comps = components(vec![
            series("SA", &[(d(2024, 1), 1.0), (d(2024, 2), 1.0), (d(2024, 3), 1.0), (d(2024, 4), 1.0)]),
            series("SB", &[(d(2024, 2), 1.0), (d(2024, 3), 1.0), (d(2024, 4), 1.0)]),
        ]);
        // Benchmark is missing the latest month.
        let bench = series("BM", &[(d(2024, 1), 1.0), (d(2024, 2), 1.0), (d(2024, 3), 1.0)]);

        let table = build_index(&w, &comps, &bench, &RAW).unwrap();
        assert_eq!(table.dates(), vec![d(2024, 2), d(2024, 3)]);
    }

    #[test]
    fn yoy_uses_exact_twelve_month_match() {
        let w = weights(&[("A", "SA", 1.0)]);
        let comps = components(vec![series(
            "SA",
            &[(d(2023, 5), 150.5), (d(2024, 4), 154.0), (d(2024, 5), 155.3)],
        )]);
        let bench = series("BM", &[(d(2023, 5), 140.0), (d(2024, 4), 143.0), (d(2024, 5), 147.0)]);

        let table = build_index(&w, &comps, &bench, &RAW).unwrap();
        assert_eq!(table.rows[0].yoy_change, None);
        // 2023-04 is absent, so April 2024 has no YoY.
        assert_eq!(table.rows[1].yoy_change, None);
        let yoy = table.rows[2].yoy_change.unwrap();
        assert!((yoy - (155.3 / 150.5 - 1.0)).abs() < 1e-12);
        assert!((yoy * 100.0 - 3.19).abs() < 0.005);
        let bench_yoy = table.rows[2].benchmark_yoy_change.unwrap();
        assert!((bench_yoy - (147.0 / 140.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn yoy_ignores_dates_dropped_from_the_intersection() {
        let w = weights(&[("A", "SA", 1.0)]);
        let comps = components(vec![series("SA", &[(d(2023, 1), 100.0), (d(2024, 1), 110.0)])]);
        let bench = series("BM", &[(d(2024, 1), 100.0)]);

        let table = build_index(&w, &comps, &bench, &RAW).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].yoy_change, None);
    }

    #[test]
    fn rebasing_sets_base_period_to_100() {
        let w = weights(&[("A", "SA", 0.5), ("B", "SB", 0.5)]);
        let comps = components(vec![
            series("SA", &[(d(2010, 1), 50.0), (d(2011, 1), 55.0)]),
            series("SB", &[(d(2010, 1), 400.0), (d(2011, 1), 420.0)]),
        ]);
        let bench = series("BM", &[(d(2010, 1), 200.0), (d(2011, 1), 206.0)]);
        let options = BuildOptions { base_date: Some(d(2010, 1)) };

        let table = build_index(&w, &comps, &bench, &options).unwrap();
        assert!((table.rows[0].composite_value - 100.0).abs() < 1e-9);
        assert!((table.rows[0].benchmark_value - 100.0).abs() < 1e-9);
        assert!((table.rows[1].composite_value - 107.5).abs() < 1e-9);
        assert!((table.rows[1].gap - 4.5).abs() < 1e-9);
    }

    #[test]
    fn rebasing_requires_base_observation() {
        let w = weights(&[("A", "SA", 1.0)]);
        let comps = components(vec![series("SA", &[(d(2011, 1), 55.0)])]);
        let bench = series("BM", &[(d(2010, 1), 200.0), (d(2011, 1), 206.0)]);
        let options = BuildOptions { base_date: Some(d(2010, 1)) };

        assert!(matches!(
            build_index(&w, &comps, &bench, &options),
            Err(BuildError::MissingBaseDate { series_id, .. }) if series_id == "SA"
        ));
    }

    #[test]
    fn missing_component_names_category() {
        let w = weights(&[("Shelter", "SH", 1.0)]);
        let bench = series("BM", &[(d(2024, 1), 1.0)]);
        match build_index(&w, &HashMap::new(), &bench, &RAW).unwrap_err() {
            BuildError::MissingSeries { category, series_id, .. } => {
                assert_eq!(category, "Shelter");
                assert_eq!(series_id, "SH");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disjoint_inputs_fail_instead_of_emitting_nothing() {
        let w = weights(&[("A", "SA", 1.0)]);
        let comps = components(vec![series("SA", &[(d(2024, 1), 1.0)])]);
        let bench = series("BM", &[(d(2024, 2), 1.0)]);
        assert!(matches!(
            build_index(&w, &comps, &bench, &RAW),
            Err(BuildError::EmptyIntersection { .. })
        ));
    }

    #[test]
    fn duplicate_and_unordered_dates_are_rejected() {
        let dup = series("SA", &[(d(2024, 1), 1.0), (d(2024, 1), 2.0)]);
        assert!(matches!(validate_order(&dup), Err(BuildError::DuplicateDate { .. })));

        let unordered = series("SA", &[(d(2024, 2), 1.0), (d(2024, 1), 2.0)]);
        assert!(matches!(validate_order(&unordered), Err(BuildError::UnorderedDates { .. })));
    }

    #[test]
    fn same_inputs_same_table() {
        let w = weights(&[("A", "SA", 0.4), ("B", "SB", 0.6)]);
        let comps = components(vec![
            series("SA", &[(d(2023, 1), 101.3), (d(2024, 1), 104.9)]),
            series("SB", &[(d(2023, 1), 98.1), (d(2024, 1), 103.2)]),
        ]);
        let bench = series("BM", &[(d(2023, 1), 100.0), (d(2024, 1), 103.0)]);

        let first = build_index(&w, &comps, &bench, &RAW).unwrap();
        let second = build_index(&w, &comps, &bench, &RAW).unwrap();
        assert_eq!(first, second);
    }
}
