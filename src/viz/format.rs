//! Display format derivation.
//!
//! A [`FormatConfig`] is derived per field for each adaptation call, from
//! the field's encoding and a sample of its values. Priority for
//! quantitative fields is explicit format hint, then field-name pattern,
//! then generic number formatting.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use serde_json::Value;

use super::spec::{Encoding, FieldType};
use super::temporal::{looks_like_time, parse_datetime, parse_time_of_day};
use super::value::{as_number, display_string, sample_values};
use super::Row;

/// Values inspected when deriving a format.
const FORMAT_SAMPLE: usize = 100;

/// Field-name fragments that mark a percentage. Checked before currency,
/// since names like `profit_margin_pct` carry both.
const PERCENT_NAME_PATTERNS: &[&str] = &["percent", "pct", "rate", "ratio", "share"];

/// Field-name fragments that mark a monetary amount.
const CURRENCY_NAME_PATTERNS: &[&str] = &[
    "price", "cost", "revenue", "sales", "amount", "income", "profit", "spend", "budget",
    "salary", "fee", "usd", "dollar",
];

/// How a field's values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Number,
    Currency,
    Percentage,
    Date,
    Time,
    String,
}

/// Finest component that varies across a temporal field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Rendering rules for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatConfig {
    pub kind: FormatKind,
    /// Fixed decimal places; `None` picks them from each value's magnitude.
    pub decimals: Option<u8>,
    /// Abbreviate values of 1000 and above with K/M/B.
    pub compact: bool,
    pub granularity: Option<TimeGranularity>,
    /// Multiplier applied to percentage values before display: 100 when
    /// the data holds fractions, 1 when it already holds percents.
    pub percent_scale: f64,
    pub currency_symbol: String,
}

impl FormatConfig {
    fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            decimals: None,
            compact: false,
            granularity: None,
            percent_scale: 1.0,
            currency_symbol: "$".to_string(),
        }
    }

    /// Plain string rendering.
    pub fn string() -> Self {
        Self::new(FormatKind::String)
    }

    /// Generic number with magnitude-dependent decimals and compact notation.
    pub fn number() -> Self {
        Self {
            compact: true,
            ..Self::new(FormatKind::Number)
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self.kind, FormatKind::Date | FormatKind::Time)
    }
}

/// Derive the format for `encoding` from a sample of `rows`.
pub fn create_format_config(encoding: &Encoding, rows: &[Row]) -> FormatConfig {
    let samples = sample_values(rows, &encoding.field, FORMAT_SAMPLE);
    match encoding.field_type {
        FieldType::Temporal => temporal_config(&samples),
        FieldType::Quantitative => numeric_config(encoding, &samples),
        FieldType::Categorical => FormatConfig::string(),
    }
}

fn temporal_config(samples: &[&Value]) -> FormatConfig {
    let time_only = !samples.is_empty()
        && samples
            .iter()
            .all(|v| matches!(v, Value::String(s) if looks_like_time(s)));
    if time_only {
        let has_seconds = samples.iter().any(|v| {
            v.as_str()
                .and_then(parse_time_of_day)
                .is_some_and(|t| t.second() != 0)
        });
        return FormatConfig {
            granularity: Some(if has_seconds {
                TimeGranularity::Second
            } else {
                TimeGranularity::Minute
            }),
            ..FormatConfig::new(FormatKind::Time)
        };
    }

    let parsed: Vec<NaiveDateTime> = samples.iter().filter_map(|v| parse_datetime(v)).collect();
    if parsed.is_empty() {
        return FormatConfig::string();
    }
    FormatConfig {
        granularity: Some(detect_granularity(&parsed)),
        ..FormatConfig::new(FormatKind::Date)
    }
}

/// Granularity from the spread of parsed dates.
///
/// Any non-zero time component escalates to that component. Otherwise the
/// finest calendar component that differs between samples wins; a single
/// distinct date is treated as daily.
pub fn detect_granularity(dates: &[NaiveDateTime]) -> TimeGranularity {
    use chrono::Datelike;

    if dates.iter().any(|d| d.second() != 0 || d.nanosecond() != 0) {
        return TimeGranularity::Second;
    }
    if dates.iter().any(|d| d.minute() != 0) {
        return TimeGranularity::Minute;
    }
    if dates.iter().any(|d| d.hour() != 0) {
        return TimeGranularity::Hour;
    }
    let Some(first) = dates.first() else {
        return TimeGranularity::Day;
    };
    if dates.iter().any(|d| d.day() != first.day()) {
        TimeGranularity::Day
    } else if dates.iter().any(|d| d.month() != first.month()) {
        TimeGranularity::Month
    } else if dates.iter().any(|d| d.year() != first.year()) {
        TimeGranularity::Year
    } else {
        TimeGranularity::Day
    }
}

fn numeric_config(encoding: &Encoding, samples: &[&Value]) -> FormatConfig {
    let numbers: Vec<f64> = samples.iter().filter_map(|v| as_number(v)).collect();

    if let Some(config) = encoding
        .format
        .as_deref()
        .and_then(|hint| config_from_hint(hint, &numbers))
    {
        return config;
    }

    let tokens = name_tokens(&encoding.field);
    let matches_any = |patterns: &[&str]| {
        tokens
            .iter()
            .any(|t| patterns.iter().any(|p| t.starts_with(p)))
    };
    if matches_any(PERCENT_NAME_PATTERNS) {
        return percentage_config(&numbers, None);
    }
    if matches_any(CURRENCY_NAME_PATTERNS) {
        return FormatConfig {
            compact: true,
            ..FormatConfig::new(FormatKind::Currency)
        };
    }
    FormatConfig::number()
}

/// Interpret a d3-style hint (`"$,.2f"`, `".1%"`, `"~s"`, `",.0f"`).
///
/// Returns `None` when the hint says nothing recognisable, letting the
/// name heuristics decide.
fn config_from_hint(hint: &str, numbers: &[f64]) -> Option<FormatConfig> {
    let decimals = hint_precision(hint);
    let compact = hint.contains('s') || decimals.is_none();

    if let Some(symbol) = ['$', '€', '£'].into_iter().find(|c| hint.contains(*c)) {
        return Some(FormatConfig {
            decimals,
            compact,
            currency_symbol: symbol.to_string(),
            ..FormatConfig::new(FormatKind::Currency)
        });
    }
    if hint.contains('%') {
        return Some(percentage_config(numbers, decimals));
    }
    if decimals.is_some() || hint.contains(',') || hint.contains('s') {
        return Some(FormatConfig {
            decimals,
            compact: hint.contains('s'),
            ..FormatConfig::new(FormatKind::Number)
        });
    }
    None
}

/// Digits after the `.` in a hint, e.g. `2` for `",.2f"`.
fn hint_precision(hint: &str) -> Option<u8> {
    let (_, after) = hint.split_once('.')?;
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn percentage_config(numbers: &[f64], decimals: Option<u8>) -> FormatConfig {
    let fractional = !numbers.is_empty() && numbers.iter().all(|n| n.abs() <= 1.0);
    FormatConfig {
        decimals,
        percent_scale: if fractional { 100.0 } else { 1.0 },
        ..FormatConfig::new(FormatKind::Percentage)
    }
}

/// Lower-cased words of a field name, split on separators and camelCase.
fn name_tokens(field: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in field.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// ============================================================================
// Value formatting
// ============================================================================

/// Axis label for a value.
pub fn format_value(value: &Value, config: &FormatConfig) -> String {
    render(value, config, Verbosity::Axis)
}

/// Tooltip text for a value: no compact notation, more decimals, verbose
/// dates.
pub fn format_tooltip(value: &Value, config: &FormatConfig) -> String {
    render(value, config, Verbosity::Tooltip)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Axis,
    Tooltip,
}

fn render(value: &Value, config: &FormatConfig, verbosity: Verbosity) -> String {
    let rendered = match config.kind {
        FormatKind::Number => as_number(value).map(|n| format_number(n, config, verbosity)),
        FormatKind::Currency => as_number(value).map(|n| format_currency(n, config, verbosity)),
        FormatKind::Percentage => as_number(value).map(|n| format_percent(n, config, verbosity)),
        FormatKind::Date => parse_datetime(value).map(|dt| {
            let granularity = config.granularity.unwrap_or(TimeGranularity::Day);
            dt.format(date_pattern(granularity, verbosity)).to_string()
        }),
        FormatKind::Time => value.as_str().and_then(parse_time_of_day).map(|t| {
            let pattern = match (config.granularity, verbosity) {
                (Some(TimeGranularity::Second), _) | (_, Verbosity::Tooltip) => "%H:%M:%S",
                _ => "%H:%M",
            };
            t.format(pattern).to_string()
        }),
        FormatKind::String => None,
    };
    rendered.unwrap_or_else(|| display_string(value))
}

fn date_pattern(granularity: TimeGranularity, verbosity: Verbosity) -> &'static str {
    match (granularity, verbosity) {
        (TimeGranularity::Year, _) => "%Y",
        (TimeGranularity::Month, Verbosity::Axis) => "%b %Y",
        (TimeGranularity::Month, Verbosity::Tooltip) => "%B %Y",
        (TimeGranularity::Day, Verbosity::Axis) => "%b %-d, %Y",
        (TimeGranularity::Day, Verbosity::Tooltip) => "%A, %B %-d, %Y",
        (TimeGranularity::Hour, Verbosity::Axis) => "%b %-d, %H:00",
        (TimeGranularity::Hour, Verbosity::Tooltip) => "%b %-d, %Y %H:00",
        (TimeGranularity::Minute, Verbosity::Axis) => "%b %-d, %H:%M",
        (TimeGranularity::Minute, Verbosity::Tooltip) => "%b %-d, %Y %H:%M",
        (TimeGranularity::Second, Verbosity::Axis) => "%H:%M:%S",
        (TimeGranularity::Second, Verbosity::Tooltip) => "%b %-d, %Y %H:%M:%S",
    }
}

/// Decimal places picked from magnitude: ≥1000 → 0, ≥1 → 2, <1 → 4.
pub fn auto_decimals(abs: f64) -> usize {
    if abs == 0.0 || abs >= 1000.0 {
        0
    } else if abs >= 1.0 {
        2
    } else {
        4
    }
}

fn format_number(n: f64, config: &FormatConfig, verbosity: Verbosity) -> String {
    if config.compact && verbosity == Verbosity::Axis && n.abs() >= 1000.0 {
        return compact_number(n);
    }
    match (config.decimals, verbosity) {
        (Some(d), _) => group_thousands(n, usize::from(d), false),
        (None, Verbosity::Axis) => group_thousands(n, auto_decimals(n.abs()), true),
        (None, Verbosity::Tooltip) => group_thousands(n, auto_decimals(n.abs()).max(2), true),
    }
}

fn format_currency(n: f64, config: &FormatConfig, verbosity: Verbosity) -> String {
    let sign = if n < 0.0 { "-" } else { "" };
    let abs = n.abs();
    let body = if config.compact && verbosity == Verbosity::Axis && abs >= 1000.0 {
        compact_number(abs)
    } else {
        let decimals = match (config.decimals, verbosity) {
            (Some(d), _) => usize::from(d),
            (None, Verbosity::Axis) if abs >= 1000.0 => 0,
            (None, _) => 2,
        };
        group_thousands(abs, decimals, false)
    };
    format!("{sign}{}{body}", config.currency_symbol)
}

fn format_percent(n: f64, config: &FormatConfig, verbosity: Verbosity) -> String {
    let decimals = match (config.decimals, verbosity) {
        (Some(d), _) => usize::from(d),
        (None, Verbosity::Axis) => 1,
        (None, Verbosity::Tooltip) => 2,
    };
    format!("{:.*}%", decimals, n * config.percent_scale)
}

/// `1234.5` → `1.2K`, `2_500_000` → `2.5M`, `3e9` → `3B`.
pub fn compact_number(n: f64) -> String {
    const UNITS: [(f64, &str); 3] = [(1e9, "B"), (1e6, "M"), (1e3, "K")];
    let abs = n.abs();
    let sign = if n < 0.0 { "-" } else { "" };
    for (i, (unit, suffix)) in UNITS.iter().enumerate() {
        if abs >= *unit {
            let scaled = (abs / unit * 10.0).round() / 10.0;
            // 999_950 rounds to 1000.0K; promote to the next unit.
            if scaled >= 1000.0 && i > 0 {
                let (next_unit, next_suffix) = UNITS[i - 1];
                return format!("{sign}{}{next_suffix}", trim_decimal(abs / next_unit, 1));
            }
            return format!("{sign}{}{suffix}", trim_decimal(scaled, 1));
        }
    }
    group_thousands(n, auto_decimals(abs), true)
}

fn trim_decimal(n: f64, decimals: usize) -> String {
    let formatted = format!("{n:.decimals$}");
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Fixed-point rendering with `,` thousands separators.
pub fn group_thousands(n: f64, decimals: usize, trim: bool) -> String {
    let formatted = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac)) => (int_part, frac),
        None => (formatted.as_str(), ""),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    if n < 0.0 && !is_zero {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    let frac = if trim {
        frac_part.trim_end_matches('0')
    } else {
        frac_part
    };
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out
}
