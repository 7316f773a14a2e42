//! Chart specification types.
//!
//! The recommendation service emits chart specs in two shapes:
//!
//! - legacy flat dimensions: `{"chart_type": "bar", "dimensions": {"x": "region", "y": "sales"}}`
//! - encodings: `{"chart_type": "bar", "encoding": {"x": {"field": "region", "type": "nominal"}}}`
//!
//! Both deserialize into [`RawChartSpec`], whose channels are a
//! [`ChannelRef`] union. [`RawChartSpec::normalize()`] is the one place the
//! two shapes are reconciled; everything downstream works on [`ChartSpec`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Row;
use super::temporal::is_date_value;
use super::value::{is_numeric_field, sample_values};

/// Rows inspected when inferring a field type.
const TYPE_INFERENCE_SAMPLE: usize = 100;

/// Semantic type of an encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "nominal", alias = "ordinal")]
    Categorical,
    Quantitative,
    Temporal,
}

/// Visual channel a field is encoded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    Series,
    Color,
    Size,
    Facet,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::X => "x",
            Channel::Y => "y",
            Channel::Series => "series",
            Channel::Color => "color",
            Channel::Size => "size",
            Channel::Facet => "facet",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of chart to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    StackedBar,
    Line,
    MultiLine,
    Area,
    Pie,
    Scatter,
    Heatmap,
    #[default]
    Table,
}

impl ChartKind {
    /// Human-readable name, also the secondary sort key for chart options.
    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar Chart",
            ChartKind::GroupedBar => "Grouped Bar Chart",
            ChartKind::StackedBar => "Stacked Bar Chart",
            ChartKind::Line => "Line Chart",
            ChartKind::MultiLine => "Multi-Line Chart",
            ChartKind::Area => "Area Chart",
            ChartKind::Pie => "Pie Chart",
            ChartKind::Scatter => "Scatter Plot",
            ChartKind::Heatmap => "Heatmap",
            ChartKind::Table => "Table",
        }
    }
}

/// A field bound to a channel, with its semantic type and display hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Explicit format hint, e.g. `"$,.2f"`, `".1%"`, `"~s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Encoding {
    pub fn new(field: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field: field.into(),
            field_type,
            label: None,
            format: None,
        }
    }

    pub fn categorical(field: impl Into<String>) -> Self {
        Self::new(field, FieldType::Categorical)
    }

    pub fn quantitative(field: impl Into<String>) -> Self {
        Self::new(field, FieldType::Quantitative)
    }

    pub fn temporal(field: impl Into<String>) -> Self {
        Self::new(field, FieldType::Temporal)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn format(mut self, hint: impl Into<String>) -> Self {
        self.format = Some(hint.into());
        self
    }

    /// The explicit label, or the field name humanised
    /// (`total_sales` → `Total Sales`).
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| humanize_field_name(&self.field))
    }
}

fn humanize_field_name(field: &str) -> String {
    field
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised chart specification consumed by the adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet: Option<Encoding>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn x(mut self, encoding: Encoding) -> Self {
        self.x = Some(encoding);
        self
    }

    pub fn y(mut self, encoding: Encoding) -> Self {
        self.y = Some(encoding);
        self
    }

    pub fn series(mut self, encoding: Encoding) -> Self {
        self.series = Some(encoding);
        self
    }

    pub fn color(mut self, encoding: Encoding) -> Self {
        self.color = Some(encoding);
        self
    }

    pub fn size(mut self, encoding: Encoding) -> Self {
        self.size = Some(encoding);
        self
    }

    pub fn facet(mut self, encoding: Encoding) -> Self {
        self.facet = Some(encoding);
        self
    }

    /// The encoding on `channel`, if any.
    pub fn encoding(&self, channel: Channel) -> Option<&Encoding> {
        match channel {
            Channel::X => self.x.as_ref(),
            Channel::Y => self.y.as_ref(),
            Channel::Series => self.series.as_ref(),
            Channel::Color => self.color.as_ref(),
            Channel::Size => self.size.as_ref(),
            Channel::Facet => self.facet.as_ref(),
        }
    }

    /// Number of populated channels.
    pub fn dimension_count(&self) -> usize {
        [
            Channel::X,
            Channel::Y,
            Channel::Series,
            Channel::Color,
            Channel::Size,
            Channel::Facet,
        ]
        .into_iter()
        .filter(|c| self.encoding(*c).is_some())
        .count()
    }
}

/// A channel as it arrives on the wire: a bare field name (legacy) or a
/// full encoding object whose type may be omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Field(String),
    Encoding(RawEncoding),
}

/// Encoding object with an optional type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEncoding {
    pub field: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Channel map in either wire shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawChannels {
    #[serde(default)]
    pub x: Option<ChannelRef>,
    #[serde(default)]
    pub y: Option<ChannelRef>,
    #[serde(default)]
    pub series: Option<ChannelRef>,
    #[serde(default)]
    pub color: Option<ChannelRef>,
    #[serde(default)]
    pub size: Option<ChannelRef>,
    #[serde(default)]
    pub facet: Option<ChannelRef>,
}

/// Chart spec as emitted by the recommendation service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawChartSpec {
    #[serde(default, alias = "type", alias = "kind")]
    pub chart_type: ChartKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "dimensions")]
    pub encoding: RawChannels,
}

impl RawChartSpec {
    /// Convert to the encoding shape.
    ///
    /// Channels without a declared type get one inferred from `rows`:
    /// numeric values are quantitative, date strings temporal, anything
    /// else categorical.
    pub fn normalize(self, rows: &[Row]) -> ChartSpec {
        let resolve = |channel: Option<ChannelRef>| channel.map(|c| resolve_channel(c, rows));
        ChartSpec {
            kind: self.chart_type,
            title: self.title,
            x: resolve(self.encoding.x),
            y: resolve(self.encoding.y),
            series: resolve(self.encoding.series),
            color: resolve(self.encoding.color),
            size: resolve(self.encoding.size),
            facet: resolve(self.encoding.facet),
        }
    }
}

fn resolve_channel(channel: ChannelRef, rows: &[Row]) -> Encoding {
    match channel {
        ChannelRef::Field(field) => {
            let field_type = infer_field_type(rows, &field);
            Encoding::new(field, field_type)
        }
        ChannelRef::Encoding(raw) => {
            let field_type = raw
                .field_type
                .unwrap_or_else(|| infer_field_type(rows, &raw.field));
            Encoding {
                field: raw.field,
                field_type,
                label: raw.label,
                format: raw.format,
            }
        }
    }
}

/// Infer the semantic type of `field` from its values.
pub fn infer_field_type(rows: &[Row], field: &str) -> FieldType {
    let samples = sample_values(rows, field, TYPE_INFERENCE_SAMPLE);
    if samples.is_empty() {
        return FieldType::Categorical;
    }
    if samples.iter().all(|v| is_date_value(v)) {
        FieldType::Temporal
    } else if is_numeric_field(rows, field, TYPE_INFERENCE_SAMPLE) {
        FieldType::Quantitative
    } else {
        FieldType::Categorical
    }
}
