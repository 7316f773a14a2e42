//! Visualization data adapter.
//!
//! Pure, synchronous transforms from query-result rows plus a chart
//! specification into chart-ready structures with preformatted labels,
//! and the checks the chart components run before choosing what to draw.
//!
//! # Example
//!
//! ```
//! use insightkit::viz::{ChartKind, ChartSpec, Encoding, Row, adapt_pie_chart_data};
//! use serde_json::json;
//!
//! let rows: Vec<Row> = [json!({"cat": "A", "val": 30}), json!({"cat": "B", "val": 70})]
//!     .into_iter()
//!     .filter_map(|v| v.as_object().cloned())
//!     .collect();
//! let spec = ChartSpec::new(ChartKind::Pie)
//!     .x(Encoding::categorical("cat"))
//!     .y(Encoding::quantitative("val"));
//!
//! let pie = adapt_pie_chart_data(&spec, &rows, 10)?;
//! assert_eq!(pie.slices[1].percent_display, "70.0");
//! # Ok::<(), insightkit::InsightError>(())
//! ```

pub mod adapter;
pub mod analysis;
pub mod format;
pub mod spec;
pub mod temporal;
pub mod value;

/// One query-result row, keyed by column name.
///
/// Keys iterate in sorted order, so column scans are deterministic.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use adapter::{
    BarChartData, DimensionInfo, FormattedChartData, FormattedPoint, LineChartData,
    MultiDimensionalChartData, MultiDimensionalPoint, PieChartData, PieSlice,
    adapt_bar_chart_data, adapt_line_chart_data, adapt_multi_dimensional_data,
    adapt_pie_chart_data, adapt_visualization_data,
};
pub use analysis::{
    CardinalityCheck, ChartTypeOption, DEFAULT_MAX_DIMENSIONS, DataCharacteristics,
    DimensionCheck, MAX_BAR_SERIES, MAX_HEATMAP_AXIS, MAX_PIE_SLICES, MAX_SCATTER_COLORS,
    analyze_data_characteristics, check_dimension_overload, check_field_cardinality,
    get_compatible_chart_types,
};
pub use format::{FormatConfig, FormatKind, TimeGranularity, create_format_config};
pub use spec::{
    Channel, ChannelRef, ChartKind, ChartSpec, Encoding, FieldType, RawChartSpec,
    infer_field_type,
};
