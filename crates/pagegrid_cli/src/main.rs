//! Demo driver for the pagegrid paging engine.
//!
//! Generates a synthetic in-memory dataset, opens a table over it and
//! "scrolls" to the requested rows, printing what each row resolved to and
//! how many reads it took.
//!
//! # Usage
//!
//! ```bash
//! # 10k rows, 100-row pages, jump to a few rows
//! cargo run -p pagegrid_cli -- --rows 10000 --scroll 0 --scroll 4321 --scroll 9999
//!
//! # Slow backend, JSON output, loader perf lines on stderr
//! PAGEGRID_LOADER_TRACE=1 cargo run -p pagegrid_cli -- --latency-ms 200 --json
//! ```

use anyhow::Context;
use clap::Parser;
use pagegrid_core::config::TableConfig;
use pagegrid_core::memory::MemoryService;
use pagegrid_core::model::{Record, RecordData, Value};
use pagegrid_core::proxy::BeanProxyFactory;
use pagegrid_core::service::ServiceSet;
use pagegrid_table::{BeanTable, ThreadPoolRunner};
use rand::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Demo driver for the pagegrid paging engine.
#[derive(Parser, Debug)]
#[command(
    name = "pagegrid-demo",
    about = "Scroll a paged table over synthetic data",
    version
)]
struct Args {
    /// Number of records to generate
    #[arg(short, long, default_value = "1000")]
    rows: usize,

    /// Rows per page (overrides PAGEGRID_PAGE_SIZE)
    #[arg(short, long)]
    page_size: Option<usize>,

    /// Simulated latency of every service call, in milliseconds
    #[arg(short, long, default_value = "20")]
    latency_ms: u64,

    /// Rows to visit, in order (repeatable)
    #[arg(short, long = "scroll", value_name = "ROW")]
    scroll: Vec<usize>,

    /// Seed for the generated data
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to wait for the table to settle after each step
    #[arg(short = 't', long, default_value = "10")]
    timeout: u64,

    /// Output in JSON format
    #[arg(short, long)]
    json: bool,
}

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Dennis", "Edsger", "Frances", "Grace", "Guido", "John", "Ken",
    "Linus", "Margaret", "Niklaus", "Radia", "Tony", "Yukihiro",
];

const TEAMS: &[&str] = &["core", "storage", "network", "tools", "docs", "infra"];

/// What one visited row resolved to.
#[derive(Debug, Clone, PartialEq)]
struct RowReport {
    row: usize,
    record_id: Option<String>,
    name: Option<String>,
    team: Option<String>,
    score: Option<i64>,
    loading: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("pagegrid_table=info,pagegrid_core=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn generate_records(count: usize, rng: &mut impl Rng) -> Vec<Record> {
    (0..count)
        .map(|index| {
            let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Anon");
            let team = TEAMS.choose(rng).copied().unwrap_or("core");
            Record::persisted(format!("rec-{:06}", index), 1, RecordData::new())
                .with("name", format!("{} #{}", first, index))
                .with("team", team)
                .with("score", rng.gen_range(0..1000i64))
        })
        .collect()
}

fn snapshot(table: &mut BeanTable, row: usize) -> Option<RowReport> {
    let proxy = table.get_bean(row)?;
    let text = |property: &str| {
        proxy
            .value(property)
            .and_then(Value::as_text)
            .map(ToString::to_string)
    };
    Some(RowReport {
        row,
        record_id: proxy.record_id().map(ToString::to_string),
        name: text("name"),
        team: text("team"),
        score: proxy.value("score").and_then(Value::as_int),
        loading: proxy.is_dummy(),
    })
}

fn format_reports(reports: &[RowReport], json: bool) -> anyhow::Result<String> {
    if json {
        let rows: Vec<serde_json::Value> = reports
            .iter()
            .map(|report| {
                json!({
                    "row": report.row,
                    "id": report.record_id,
                    "name": report.name,
                    "team": report.team,
                    "score": report.score,
                    "loading": report.loading,
                })
            })
            .collect();
        return serde_json::to_string_pretty(&rows).context("report encoding error");
    }

    let lines: Vec<String> = reports
        .iter()
        .map(|report| {
            if report.loading {
                return format!("{:>8}  <loading>", report.row);
            }
            format!(
                "{:>8}  {:<12} {:<24} {:<8} {:>5}",
                report.row,
                report.record_id.as_deref().unwrap_or("-"),
                report.name.as_deref().unwrap_or("-"),
                report.team.as_deref().unwrap_or("-"),
                report.score.map_or_else(|| "-".to_string(), |score| score.to_string()),
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

fn settle(table: &mut BeanTable, timeout: Duration, step: &str) -> anyhow::Result<()> {
    if !table.wait_until_idle(timeout) {
        anyhow::bail!("table did not settle within {:?} ({})", timeout, step);
    }
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<String> {
    let mut config = TableConfig::from_env();
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size);
    }
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let service = Arc::new(
        MemoryService::new(generate_records(args.rows, &mut rng))
            .with_latency(Duration::from_millis(args.latency_ms)),
    );
    let runner =
        Arc::new(ThreadPoolRunner::new(config.worker_threads).context("spawning worker threads")?);
    let factory = BeanProxyFactory::new(["name", "team", "score"]);
    let mut table = BeanTable::new(ServiceSet::full(service.clone()), factory, config, runner);
    let timeout = Duration::from_secs(args.timeout);

    let started = Instant::now();
    table.load();
    settle(&mut table, timeout, "initial load")?;
    info!(
        rows = table.row_count(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "table loaded"
    );

    let rows = if args.scroll.is_empty() {
        vec![0]
    } else {
        args.scroll.clone()
    };
    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        if snapshot(&mut table, row).is_none() {
            warn!(row, row_count = table.row_count(), "row out of range; skipping");
            continue;
        }
        settle(&mut table, timeout, "scroll")?;
        if let Some(report) = snapshot(&mut table, row) {
            reports.push(report);
        }
    }
    settle(&mut table, timeout, "final")?;
    info!(
        reads = service.read_calls().len(),
        pages = ?table.loaded_pages(),
        "scroll finished"
    );

    format_reports(&reports, args.json)
}

fn main() {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(err) => {
            eprintln!("pagegrid-demo failed: {:#}", err);
            std::process::exit(1);
        }
    }
}
