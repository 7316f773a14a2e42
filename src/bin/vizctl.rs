//! vizctl: inspect how query results adapt to charts
//!
//! Runs the visualization adapter and the chart compatibility analysis
//! over JSON files, printing the result as pretty JSON.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use insightkit::viz::{
    self, ChartKind, DEFAULT_MAX_DIMENSIONS, MAX_PIE_SLICES, RawChartSpec, Row,
};
use insightkit::{InsightError, Result};
use serde::Serialize;

/// insightkit visualization CLI
#[derive(Parser)]
#[command(name = "vizctl")]
#[command(version)]
#[command(about = "Adapt query results to chart data and list compatible charts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Adapt rows to chart-ready data
    Adapt {
        /// Chart spec JSON (flat `dimensions` or `encoding` shape)
        #[arg(short, long)]
        spec: PathBuf,
        /// Rows JSON array (`-` reads stdin)
        #[arg(short, long)]
        rows: PathBuf,
        /// Adapter to run
        #[arg(short, long, value_enum, default_value_t = Adapter::Base)]
        chart: Adapter,
        /// Slice limit for the pie adapter
        #[arg(long, default_value_t = MAX_PIE_SLICES)]
        max_slices: usize,
    },

    /// Analyze rows and list chart types they can be shown as
    Compat {
        /// Rows JSON array (`-` reads stdin)
        #[arg(short, long)]
        rows: PathBuf,
        /// X field
        #[arg(long)]
        x: Option<String>,
        /// Y field
        #[arg(long)]
        y: Option<String>,
        /// Series field
        #[arg(long)]
        series: Option<String>,
        /// Currently selected chart type (e.g. `bar`, `grouped_bar`)
        #[arg(long, env = "VIZCTL_CURRENT_CHART")]
        current: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Adapter {
    Base,
    Pie,
    Line,
    Bar,
    Multi,
}

#[derive(Serialize)]
struct CompatReport {
    characteristics: viz::DataCharacteristics,
    chart_types: Vec<viz::ChartTypeOption>,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Adapt {
            spec,
            rows,
            chart,
            max_slices,
        } => {
            let rows = read_rows(&rows)?;
            let raw: RawChartSpec = serde_json::from_str(&read_input(&spec)?)?;
            let spec = raw.normalize(&rows);

            let overload = viz::check_dimension_overload(&spec, DEFAULT_MAX_DIMENSIONS);
            if let Some(message) = &overload.message {
                eprintln!("warning: {message}");
            }

            match chart {
                Adapter::Base => print_json(&viz::adapt_visualization_data(&spec, &rows)?)?,
                Adapter::Pie => print_json(&viz::adapt_pie_chart_data(&spec, &rows, max_slices)?)?,
                Adapter::Line => print_json(&viz::adapt_line_chart_data(&spec, &rows)?)?,
                Adapter::Bar => print_json(&viz::adapt_bar_chart_data(&spec, &rows)?)?,
                Adapter::Multi => print_json(&viz::adapt_multi_dimensional_data(&spec, &rows)?)?,
            }
        }

        Command::Compat {
            rows,
            x,
            y,
            series,
            current,
        } => {
            let rows = read_rows(&rows)?;
            let current = current.map(|c| parse_chart_kind(&c)).transpose()?;
            let characteristics = viz::analyze_data_characteristics(
                &rows,
                x.as_deref(),
                y.as_deref(),
                series.as_deref(),
            );
            let chart_types = viz::get_compatible_chart_types(&characteristics, current);
            print_json(&CompatReport {
                characteristics,
                chart_types,
            })?;
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| InsightError::Configuration(format!("failed to read stdin: {e}")))?;
        return Ok(input);
    }
    std::fs::read_to_string(path).map_err(|e| {
        InsightError::Configuration(format!("failed to read {}: {e}", path.display()))
    })
}

fn read_rows(path: &Path) -> Result<Vec<Row>> {
    Ok(serde_json::from_str(&read_input(path)?)?)
}

fn parse_chart_kind(name: &str) -> Result<ChartKind> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| InsightError::Configuration(format!("unknown chart type: {name}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
