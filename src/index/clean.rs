//! Cleaning stage between raw load and index build.
//!
//! No cleaning rules are defined yet, so series pass through unchanged.

use crate::domain::RawSeries;
use crate::logging::Reporter;

// TODO: apply outlier/revision rules here once the cleaning requirements are written down.
pub fn clean_series(series: RawSeries, reporter: &dyn Reporter) -> RawSeries {
    reporter.debug(&format!(
        "clean: {} passed through ({} observations)",
        series.series_id,
        series.len()
    ));
    series
}
