//! Chart data adapters.
//!
//! Turn a [`ChartSpec`] plus raw rows into chart-ready structures in which
//! every displayed value is already formatted. Renderers only lay out
//! strings and numbers.

use std::cmp::Ordering;

use chrono::Timelike;
use serde::Serialize;
use serde_json::Value;

use super::Row;
use super::format::{
    FormatConfig, FormatKind, TimeGranularity, create_format_config, format_tooltip, format_value,
};
use super::spec::{Channel, ChartSpec, Encoding, FieldType};
use super::temporal::{parse_datetime, parse_time_of_day};
use super::value::as_number;
use crate::{InsightError, Result};

/// One row reduced to its x/y pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedPoint {
    /// Axis label for x.
    pub x: String,
    /// Axis label for y.
    pub y: String,
    pub x_raw: Value,
    pub y_raw: Value,
    /// Numeric reading of `y_raw`, if it has one.
    pub y_value: Option<f64>,
    /// Verbose x for tooltips.
    pub x_tooltip: String,
    /// Verbose y for tooltips.
    pub tooltip: String,
}

/// Output of [`adapt_visualization_data`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedChartData {
    pub points: Vec<FormattedPoint>,
    /// Sum of all numeric y values.
    pub total: f64,
    pub has_time_data: bool,
    pub is_percentage: bool,
    pub is_currency: bool,
    pub x_label: String,
    pub y_label: String,
    pub x_format: FormatConfig,
    pub y_format: FormatConfig,
}

/// Base transform shared by every two-dimensional chart.
///
/// Fails with [`InsightError::MissingEncoding`] when `x` or `y` is absent
/// and [`InsightError::EmptyData`] when there are no rows.
pub fn adapt_visualization_data(spec: &ChartSpec, rows: &[Row]) -> Result<FormattedChartData> {
    let (x, y) = xy_encodings(spec, rows)?;
    Ok(format_pairs(x, y, rows))
}

fn xy_encodings<'a>(spec: &'a ChartSpec, rows: &[Row]) -> Result<(&'a Encoding, &'a Encoding)> {
    let x = spec.x.as_ref().ok_or(InsightError::MissingEncoding(Channel::X))?;
    let y = spec.y.as_ref().ok_or(InsightError::MissingEncoding(Channel::Y))?;
    if rows.is_empty() {
        return Err(InsightError::EmptyData);
    }
    Ok((x, y))
}

fn format_pairs(x: &Encoding, y: &Encoding, rows: &[Row]) -> FormattedChartData {
    let x_format = create_format_config(x, rows);
    let y_format = create_format_config(y, rows);

    let points: Vec<FormattedPoint> = rows
        .iter()
        .map(|row| format_point(row, x, y, &x_format, &y_format))
        .collect();
    let total = points.iter().filter_map(|p| p.y_value).sum();

    FormattedChartData {
        total,
        has_time_data: x_format.is_temporal(),
        is_percentage: y_format.kind == FormatKind::Percentage,
        is_currency: y_format.kind == FormatKind::Currency,
        x_label: x.display_label(),
        y_label: y.display_label(),
        points,
        x_format,
        y_format,
    }
}

fn format_point(
    row: &Row,
    x: &Encoding,
    y: &Encoding,
    x_format: &FormatConfig,
    y_format: &FormatConfig,
) -> FormattedPoint {
    let x_raw = row.get(&x.field).cloned().unwrap_or(Value::Null);
    let y_raw = row.get(&y.field).cloned().unwrap_or(Value::Null);
    FormattedPoint {
        x: format_value(&x_raw, x_format),
        y: format_value(&y_raw, y_format),
        y_value: as_number(&y_raw),
        x_tooltip: format_tooltip(&x_raw, x_format),
        tooltip: format_tooltip(&y_raw, y_format),
        x_raw,
        y_raw,
    }
}

// ============================================================================
// Pie
// ============================================================================

/// A pie slice: the point plus its share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    #[serde(flatten)]
    pub point: FormattedPoint,
    /// Share of the total, 0–1.
    pub percent: f64,
    /// `percent * 100` with one decimal, no `%` sign.
    pub percent_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieChartData {
    pub slices: Vec<PieSlice>,
    /// Sum of the kept slices.
    pub total: f64,
    /// Rows dropped by the slice limit.
    pub omitted: usize,
    pub is_currency: bool,
    pub is_percentage: bool,
    pub x_label: String,
    pub y_label: String,
}

/// Pie data: the first `max_slices` rows in input order (not the largest),
/// each with its share of the kept total.
///
/// Encodings and emptiness are checked against all of `rows`; a limit of
/// zero yields no slices with every row counted as omitted.
pub fn adapt_pie_chart_data(spec: &ChartSpec, rows: &[Row], max_slices: usize) -> Result<PieChartData> {
    let (x, y) = xy_encodings(spec, rows)?;
    let kept = &rows[..rows.len().min(max_slices)];
    let base = format_pairs(x, y, kept);
    let total = base.total;

    let slices = base
        .points
        .into_iter()
        .map(|point| {
            let percent = match point.y_value {
                Some(v) if total != 0.0 => v / total,
                _ => 0.0,
            };
            PieSlice {
                percent,
                percent_display: format!("{:.1}", percent * 100.0),
                point,
            }
        })
        .collect();

    Ok(PieChartData {
        slices,
        total,
        omitted: rows.len() - kept.len(),
        is_currency: base.is_currency,
        is_percentage: base.is_percentage,
        x_label: base.x_label,
        y_label: base.y_label,
    })
}

// ============================================================================
// Line
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineChartData {
    #[serde(flatten)]
    pub data: FormattedChartData,
    /// Points were sorted by time.
    pub is_temporal: bool,
}

/// Line data. A temporal x axis is sorted ascending by parsed time;
/// otherwise input order is kept.
pub fn adapt_line_chart_data(spec: &ChartSpec, rows: &[Row]) -> Result<LineChartData> {
    let mut data = adapt_visualization_data(spec, rows)?;
    let is_temporal = spec
        .x
        .as_ref()
        .is_some_and(|x| x.field_type == FieldType::Temporal)
        || data.has_time_data;

    if is_temporal {
        // Stable: equal or unparseable keys keep input order, unparseable last.
        data.points
            .sort_by(|a, b| compare_time(temporal_sort_key(&a.x_raw), temporal_sort_key(&b.x_raw)));
    }
    Ok(LineChartData { data, is_temporal })
}

fn temporal_sort_key(value: &Value) -> Option<i64> {
    parse_datetime(value)
        .map(|dt| dt.and_utc().timestamp_millis())
        .or_else(|| {
            value
                .as_str()
                .and_then(parse_time_of_day)
                .map(|t| i64::from(t.num_seconds_from_midnight()) * 1000)
        })
}

fn compare_time(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// Bar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChartData {
    #[serde(flatten)]
    pub data: FormattedChartData,
    /// Render x as discrete bands rather than a continuous scale.
    pub is_categorical_x: bool,
}

/// Bar data. The x axis is categorical when its values are strings or it
/// is a date axis at day granularity or coarser; hourly and finer dates,
/// and plain numbers, stay continuous.
pub fn adapt_bar_chart_data(spec: &ChartSpec, rows: &[Row]) -> Result<BarChartData> {
    let data = adapt_visualization_data(spec, rows)?;
    let is_categorical_x = match data.x_format.kind {
        FormatKind::Date => data
            .x_format
            .granularity
            .is_none_or(|g| g <= TimeGranularity::Day),
        FormatKind::Time => false,
        FormatKind::String => true,
        _ => data.points.iter().any(|p| p.x_raw.is_string()),
    };
    Ok(BarChartData {
        data,
        is_categorical_x,
    })
}

// ============================================================================
// Multi-dimensional
// ============================================================================

/// Field and display label of an optional extra dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionInfo {
    pub field: String,
    pub label: String,
}

impl DimensionInfo {
    fn from_encoding(encoding: &Encoding) -> Self {
        Self {
            field: encoding.field.clone(),
            label: encoding.display_label(),
        }
    }
}

/// One row with every encoded dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiDimensionalPoint {
    #[serde(flatten)]
    pub point: FormattedPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiDimensionalChartData {
    pub points: Vec<MultiDimensionalPoint>,
    pub x: DimensionInfo,
    pub y: DimensionInfo,
    /// The y field was not declared and was picked from the data.
    pub y_inferred: bool,
    pub series: Option<DimensionInfo>,
    pub color: Option<DimensionInfo>,
    pub size: Option<DimensionInfo>,
    pub facet: Option<DimensionInfo>,
    /// 2 plus the number of populated extra dimensions.
    pub dimension_count: usize,
    pub total: f64,
    pub x_format: FormatConfig,
    pub y_format: FormatConfig,
}

/// Data for grouped/stacked bars, multi-series lines, scatter with
/// color/size, heatmaps and faceted grids.
///
/// Requires `x`. Without a `y` encoding, the first numeric column of the
/// first row, in column-name order, that no other channel claims is used.
pub fn adapt_multi_dimensional_data(
    spec: &ChartSpec,
    rows: &[Row],
) -> Result<MultiDimensionalChartData> {
    let x = spec.x.as_ref().ok_or(InsightError::MissingEncoding(Channel::X))?;
    if rows.is_empty() {
        return Err(InsightError::EmptyData);
    }

    let (y, y_inferred) = match &spec.y {
        Some(y) => (y.clone(), false),
        None => (infer_y_encoding(spec, &rows[0])?, true),
    };

    let base = format_pairs(x, &y, rows);
    let extra = |encoding: &Option<Encoding>, row: &Row| {
        encoding
            .as_ref()
            .map(|e| row.get(&e.field).cloned().unwrap_or(Value::Null))
    };
    let points = base
        .points
        .into_iter()
        .zip(rows)
        .map(|(point, row)| MultiDimensionalPoint {
            point,
            series: extra(&spec.series, row),
            color: extra(&spec.color, row),
            size: extra(&spec.size, row),
            facet: extra(&spec.facet, row),
        })
        .collect();

    let series = spec.series.as_ref().map(DimensionInfo::from_encoding);
    let color = spec.color.as_ref().map(DimensionInfo::from_encoding);
    let size = spec.size.as_ref().map(DimensionInfo::from_encoding);
    let facet = spec.facet.as_ref().map(DimensionInfo::from_encoding);
    let dimension_count = 2 + [&series, &color, &size, &facet]
        .iter()
        .filter(|d| d.is_some())
        .count();

    Ok(MultiDimensionalChartData {
        points,
        x: DimensionInfo::from_encoding(x),
        y: DimensionInfo::from_encoding(&y),
        y_inferred,
        series,
        color,
        size,
        facet,
        dimension_count,
        total: base.total,
        x_format: base.x_format,
        y_format: base.y_format,
    })
}

fn infer_y_encoding(spec: &ChartSpec, first_row: &Row) -> Result<Encoding> {
    let claimed: Vec<&str> = [&spec.x, &spec.series, &spec.color, &spec.size, &spec.facet]
        .into_iter()
        .flatten()
        .map(|e| e.field.as_str())
        .collect();

    first_row
        .iter()
        .find(|(name, value)| !claimed.contains(&name.as_str()) && as_number(value).is_some())
        .map(|(name, _)| Encoding::quantitative(name.clone()))
        .ok_or(InsightError::NoNumericField)
}
