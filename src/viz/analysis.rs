//! Renderability checks and chart-type compatibility.
//!
//! Everything here is a pure function of its inputs. Thresholds for the
//! cardinality checks are decided by the caller; the constants below are
//! the values the chart components use.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use super::Row;
use super::spec::{ChartKind, ChartSpec};
use super::temporal::is_date_value;
use super::value::{display_string, is_blank, is_numeric_field, sample_values};

/// Visual dimensions a chart can carry before it falls back to a table.
pub const DEFAULT_MAX_DIMENSIONS: usize = 5;

/// Most series a grouped or stacked bar chart renders.
pub const MAX_BAR_SERIES: usize = 15;

/// Most distinct values on either heatmap axis.
pub const MAX_HEATMAP_AXIS: usize = 30;

/// Most color groups in a scatter plot.
pub const MAX_SCATTER_COLORS: usize = 20;

/// Slices kept by the pie adapter.
pub const MAX_PIE_SLICES: usize = 10;

/// Rows inspected for per-column type checks.
const ANALYSIS_SAMPLE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionCheck {
    pub overloaded: bool,
    pub dimension_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Count the populated channels of `spec` and compare against
/// `max_dimensions`.
pub fn check_dimension_overload(spec: &ChartSpec, max_dimensions: usize) -> DimensionCheck {
    let dimension_count = spec.dimension_count();
    let overloaded = dimension_count > max_dimensions;
    let message = overloaded.then(|| {
        debug!(dimension_count, max_dimensions, "chart spec overloaded");
        format!(
            "chart uses {dimension_count} dimensions, more than the {max_dimensions} that can be displayed clearly"
        )
    });
    DimensionCheck {
        overloaded,
        dimension_count,
        message,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardinalityCheck {
    pub valid: bool,
    pub cardinality: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Count the distinct values of `field` and compare against
/// `max_cardinality`. Rows without the field, and blank cells, are skipped.
pub fn check_field_cardinality(rows: &[Row], field: &str, max_cardinality: usize) -> CardinalityCheck {
    let cardinality = distinct_count(rows, field);
    let valid = cardinality <= max_cardinality;
    let message = (!valid).then(|| {
        format!("'{field}' has {cardinality} distinct values; at most {max_cardinality} can be displayed")
    });
    CardinalityCheck {
        valid,
        cardinality,
        message,
    }
}

fn distinct_count(rows: &[Row], field: &str) -> usize {
    rows.iter()
        .filter_map(|row| row.get(field))
        .filter(|v| !is_blank(v))
        .map(display_string)
        .collect::<HashSet<_>>()
        .len()
}

/// Shape of a row set as seen by the chart picker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataCharacteristics {
    pub row_count: usize,
    /// An x field was named.
    pub has_x_field: bool,
    pub has_numeric_y: bool,
    pub x_is_temporal: bool,
    pub x_is_categorical: bool,
    pub unique_x_values: usize,
    pub unique_series_values: usize,
    /// Columns whose sampled values are all numeric.
    pub numeric_column_count: usize,
}

/// Classify `rows` for [`get_compatible_chart_types`].
///
/// Without a `y_field`, y counts as numeric when any column other than x
/// is numeric.
pub fn analyze_data_characteristics(
    rows: &[Row],
    x_field: Option<&str>,
    y_field: Option<&str>,
    series_field: Option<&str>,
) -> DataCharacteristics {
    if rows.is_empty() {
        return DataCharacteristics::default();
    }

    let columns: BTreeSet<&str> = rows
        .iter()
        .take(ANALYSIS_SAMPLE)
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let numeric_columns: Vec<&str> = columns
        .into_iter()
        .filter(|column| is_numeric_field(rows, column, ANALYSIS_SAMPLE))
        .collect();

    let has_numeric_y = match y_field {
        Some(y) => is_numeric_field(rows, y, ANALYSIS_SAMPLE),
        None => numeric_columns.iter().any(|c| Some(*c) != x_field),
    };

    let (x_is_temporal, x_is_categorical) = match x_field {
        Some(x) => {
            let samples = sample_values(rows, x, ANALYSIS_SAMPLE);
            let temporal = !samples.is_empty() && samples.iter().all(|v| is_date_value(v));
            let numeric = is_numeric_field(rows, x, ANALYSIS_SAMPLE);
            (temporal, !samples.is_empty() && !temporal && !numeric)
        }
        None => (false, false),
    };

    DataCharacteristics {
        row_count: rows.len(),
        has_x_field: x_field.is_some(),
        has_numeric_y,
        x_is_temporal,
        x_is_categorical,
        unique_x_values: x_field.map_or(0, |x| distinct_count(rows, x)),
        unique_series_values: series_field.map_or(0, |s| distinct_count(rows, s)),
        numeric_column_count: numeric_columns.len(),
    }
}

/// A chart kind the data can be rendered as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartTypeOption {
    pub kind: ChartKind,
    pub label: &'static str,
    pub recommended: bool,
}

/// Chart kinds `chars` can be rendered as, recommended first and then by
/// label. A table is always offered; `current` is marked recommended when
/// it is in the list.
pub fn get_compatible_chart_types(
    chars: &DataCharacteristics,
    current: Option<ChartKind>,
) -> Vec<ChartTypeOption> {
    let unique_x = chars.unique_x_values;
    let numeric_y = chars.has_numeric_y;

    let candidates = [
        (ChartKind::Table, true),
        (ChartKind::Bar, numeric_y && (chars.x_is_categorical || unique_x <= 20)),
        (ChartKind::Line, numeric_y && (chars.x_is_temporal || unique_x >= 3)),
        (ChartKind::Pie, numeric_y && (2..=10).contains(&unique_x)),
        (
            ChartKind::GroupedBar,
            numeric_y && chars.numeric_column_count >= 2 && (1..=15).contains(&unique_x),
        ),
        (
            ChartKind::Scatter,
            chars.numeric_column_count >= 2 && chars.row_count >= 5 && chars.has_x_field,
        ),
    ];

    let mut options: Vec<ChartTypeOption> = candidates
        .into_iter()
        .filter(|(_, compatible)| *compatible)
        .map(|(kind, _)| ChartTypeOption {
            kind,
            label: kind.label(),
            recommended: current == Some(kind),
        })
        .collect();
    options.sort_by(|a, b| b.recommended.cmp(&a.recommended).then(a.label.cmp(b.label)));
    options
}
