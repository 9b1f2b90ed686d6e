//! issuedebt-report - CLI tool to build metric reports from the cache
//!
//! Runs one or more report types against the cached records and writes each
//! result as `<report>.json` into the output directory. Reports run in
//! sequence; a failing report is printed and the rest still run.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, ValueEnum};
use issuedebt_core::analytics::{
    Granularity, GranularitySelection, KindFilter, LabelPredicate, MetricReport,
};
use issuedebt_core::{
    CacheStore, Config, IssueRecord, ReportBuilder, ReportConfig, ReportOutput, ReportRequest,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportKind {
    /// Time series over the whole cache
    Pdf,
    /// Time series over --start..--end
    DateRange,
    /// Records matching --label
    LabelSearch,
    /// Rejections by reason, author, department and category
    RejectionAnalysis,
    /// Missing and conflicting classification labels
    LabelCheck,
}

#[derive(Parser)]
#[command(name = "issuedebt-report")]
#[command(about = "Build issue debt reports from the local cache")]
#[command(version)]
struct Args {
    /// Report to build (repeatable). Defaults to pdf, plus date-range and
    /// label-search when their options are given
    #[arg(short, long = "report", value_enum)]
    reports: Vec<ReportKind>,

    /// First day of the date-range report (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Last day of the date-range report (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Label for label-search (case-insensitive exact match)
    #[arg(short, long)]
    label: Option<String>,

    /// Match --label as a substring
    #[arg(long, requires = "label")]
    substring: bool,

    /// Bucket granularity: week, month or both
    #[arg(short, long)]
    granularity: Option<GranularitySelection>,

    /// Restrict to issues, prs or all
    #[arg(short, long)]
    kind: Option<KindFilter>,

    /// Only count this author (repeatable)
    #[arg(long = "user", conflicts_with = "exclude_users")]
    include_users: Vec<String>,

    /// Never count this author (repeatable)
    #[arg(long = "exclude-user")]
    exclude_users: Vec<String>,

    /// Skip per-user series
    #[arg(long)]
    no_per_user: bool,

    /// Output directory (defaults to $XDG_DATA_HOME/issuedebt/reports)
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Verbose output (-v prints summary tables)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Apply command-line overrides on top of `[report]`
    fn report_config(&self, mut config: ReportConfig) -> ReportConfig {
        if let Some(granularity) = self.granularity {
            config.granularity = granularity;
        }
        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if !self.include_users.is_empty() {
            config.include_users = self.include_users.clone();
            config.exclude_users.clear();
        }
        if !self.exclude_users.is_empty() {
            config.exclude_users = self.exclude_users.clone();
            config.include_users.clear();
        }
        if self.no_per_user {
            config.per_user = false;
        }
        config
    }

    fn kinds(&self) -> Vec<ReportKind> {
        if !self.reports.is_empty() {
            let mut kinds = Vec::new();
            for kind in &self.reports {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
            return kinds;
        }
        let mut kinds = vec![ReportKind::Pdf];
        if self.start.is_some() {
            kinds.push(ReportKind::DateRange);
        }
        if self.label.is_some() {
            kinds.push(ReportKind::LabelSearch);
        }
        kinds
    }

    fn request(&self, kind: ReportKind) -> Result<ReportRequest> {
        Ok(match kind {
            ReportKind::Pdf => ReportRequest::Pdf,
            ReportKind::DateRange => match (self.start, self.end) {
                (Some(start), Some(end)) => ReportRequest::DateRange { start, end },
                _ => anyhow::bail!("date-range needs --start and --end"),
            },
            ReportKind::LabelSearch => {
                let pattern = self
                    .label
                    .clone()
                    .context("label-search needs --label")?;
                if self.substring {
                    ReportRequest::LabelSearch(LabelPredicate::substring(pattern))
                } else {
                    ReportRequest::LabelSearch(LabelPredicate::exact(pattern))
                }
            }
            ReportKind::RejectionAnalysis => ReportRequest::RejectionAnalysis,
            ReportKind::LabelCheck => ReportRequest::LabelCheck,
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        issuedebt_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("issuedebt-report starting");

    let cache = CacheStore::at(config.resolved_cache_path());
    let records = cache.load().context("failed to load cache")?;
    if records.is_empty() {
        println!("Cache is empty: {}", cache.path().display());
        println!("Run 'issuedebt-sync' first to fetch issues.");
    }

    let out_dir = args.out.clone().unwrap_or_else(Config::reports_dir);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let report_config = args.report_config(config.report.clone());
    let builder = ReportBuilder::new(&config.priorities, &config.labels, &report_config);

    let kinds = args.kinds();
    println!(
        "Building {} report(s) from {} record(s) into {}\n",
        kinds.len(),
        records.len(),
        out_dir.display()
    );

    let mut failed = 0;
    for kind in &kinds {
        let name = kind
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();

        match run_report(&args, *kind, &builder, &records, &out_dir) {
            Ok((output, path)) => {
                if output.is_empty() {
                    println!("{}: no matching records ({})", name, path.display());
                } else {
                    println!("{}: {} ({})", name, describe(&output), path.display());
                }
                if args.verbose >= 1 {
                    print_tables(&output);
                }
            }
            Err(e) => {
                tracing::error!(report = %name, error = %format!("{:#}", e), "Report failed");
                eprintln!("{}: failed: {:#}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} report(s) failed", failed, kinds.len());
    }

    tracing::info!(reports = kinds.len(), "issuedebt-report complete");
    Ok(())
}

/// Build one report and write it as JSON
fn run_report(
    args: &Args,
    kind: ReportKind,
    builder: &ReportBuilder<'_>,
    records: &[IssueRecord],
    out_dir: &Path,
) -> Result<(ReportOutput, PathBuf)> {
    let request = args.request(kind)?;
    let output = builder.build(&request, records)?;

    let path = out_dir.join(format!("{}.json", output.name()));
    let json = serde_json::to_string_pretty(&output).context("failed to serialize report")?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;

    Ok((output, path))
}

/// One-line summary of a report
fn describe(output: &ReportOutput) -> String {
    match output {
        ReportOutput::Pdf(report) | ReportOutput::DateRange(report) => describe_series(report),
        ReportOutput::LabelSearch {
            predicate, matches, ..
        } => format!("{} record(s) labelled '{}'", matches.len(), predicate.pattern),
        ReportOutput::RejectionAnalysis(summary) => format!(
            "{} of {} rejected ({:.1}%)",
            summary.rejected,
            summary.records,
            summary.rejection_rate * 100.0
        ),
        ReportOutput::LabelCheck(summary) => format!(
            "{} record(s), {} without priority, {} conflicting",
            summary.records,
            summary.missing_priority.len(),
            summary.conflicting_priority.len()
        ),
    }
}

fn describe_series(report: &MetricReport) -> String {
    let bundle = report
        .bundle(Granularity::Week)
        .or_else(|| report.bundle(Granularity::Month));
    let (open, score) = bundle
        .map(|b| {
            (
                b.open.last_value().unwrap_or(0),
                b.cumulative_score.last_value().unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));
    let span = report
        .window
        .as_ref()
        .map(|w| format!("{}..{}", w.start, w.end))
        .unwrap_or_default();

    format!(
        "{} record(s) {}, {} open at end, cumulative score {}",
        report.records, span, open, score
    )
}

fn print_tables(output: &ReportOutput) {
    let report = match output {
        ReportOutput::Pdf(report) | ReportOutput::DateRange(report) => report,
        ReportOutput::LabelSearch { series, .. } => series,
        _ => return,
    };

    println!(
        "  {:<16} {:>7} {:>7} {:>7} {:>7}",
        "priority", "created", "closed", "open", "score"
    );
    for row in &report.priorities {
        println!(
            "  {:<16} {:>7} {:>7} {:>7} {:>7}",
            row.priority.as_str(),
            row.tally.created,
            row.tally.closed,
            row.tally.open,
            row.tally.score
        );
    }
    println!(
        "  {:<16} {:>7} {:>7} {:>7} {:>7}",
        "author", "created", "closed", "open", "score"
    );
    for row in &report.authors {
        println!(
            "  {:<16} {:>7} {:>7} {:>7} {:>7}",
            row.author, row.tally.created, row.tally.closed, row.tally.open, row.tally.score
        );
    }
}
