use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pipegoals::metrics::format::{format_gap, format_gap_percent, format_value};
use pipegoals::metrics::{MetricSet, MetricType};

#[derive(Parser)]
#[command(name = "pipegoals", about = "Sales pipeline goal-vs-actual reports")]
struct Cli {
    /// Database path (default: ~/.pipegoals/pipegoals.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare realized pipeline activity against goals
    ///
    /// Days and rounds are cut at one fixed UTC offset, the `utc_offset_minutes`
    /// config key. It is not adjusted for daylight saving, so set it explicitly
    /// when reporting across a DST change.
    Report {
        /// First day (YYYY-MM-DD)
        #[arg(long, requires = "to", conflicts_with = "period")]
        from: Option<String>,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// Period: YYYY-MM-DD, YYYY-MM, YYYY-Www, 30d, today, wtd, mtd
        #[arg(long, short)]
        period: Option<String>,
        /// Filter by funnel id
        #[arg(long)]
        funnel: Option<String>,
        /// Filter by unit id
        #[arg(long)]
        unit: Option<String>,
        /// Filter by seller id
        #[arg(long)]
        seller: Option<String>,
        /// Filter by origin id
        #[arg(long)]
        origin: Option<String>,
        /// Break a single day into rounds. Takes a JSON schedule file, or
        /// uses the configured schedule when given without a value.
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        rounds: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load data from JSON files
    Import {
        #[command(subcommand)]
        target: ImportTarget,
    },
    /// Manage goal rows
    Goals {
        #[command(subcommand)]
        action: GoalsAction,
    },
    /// Manage funnels, units, sellers and origins
    Dims {
        #[command(subcommand)]
        action: DimsAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ImportTarget {
    /// Import opportunities (JSON array of {id, created_at, won_at?, amount?, funnel_id?, ...})
    Events { file: PathBuf },
    /// Import goal rows (JSON array of {dashboard, value, funnel_id?, unit_id?, seller_id?})
    Goals { file: PathBuf },
    /// Import dimension entries (JSON array of {kind, id, name})
    Dims { file: PathBuf },
}

#[derive(Subcommand)]
enum GoalsAction {
    /// List goal rows
    List {
        /// Only rows of this dashboard (e.g. leads_weekday)
        #[arg(long)]
        dashboard: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a goal, replacing the row with the same dashboard and dimensions
    Set {
        dashboard: String,
        value: f64,
        #[arg(long)]
        funnel: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        seller: Option<String>,
    },
    /// Remove every row of a dashboard
    Clear { dashboard: String },
}

#[derive(Subcommand)]
enum DimsAction {
    /// List entries of one kind: funnel, unit, seller, origin
    List { kind: String },
    /// Add or rename an entry
    Add { kind: String, id: String, name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => pipegoals::Database::open_at(path).await?,
        None => pipegoals::Database::open().await?,
    };
    let tracker = pipegoals::GoalTracker::new(db);

    match cli.command {
        Commands::Report {
            from,
            to,
            period,
            funnel,
            unit,
            seller,
            origin,
            rounds,
            json,
        } => {
            let filters = pipegoals::DimensionFilters {
                funnel_id: funnel,
                unit_id: unit,
                seller_id: seller,
                origin_id: origin,
            };
            let range = resolve_range(&tracker, from, to, period).await?;
            handle_report(&tracker, range, filters, rounds, json).await?;
        }
        Commands::Import { target } => {
            handle_import(&tracker, target).await?;
        }
        Commands::Goals { action } => {
            handle_goals(&tracker, action).await?;
        }
        Commands::Dims { action } => {
            handle_dims(&tracker, action).await?;
        }
        Commands::Config { action } => {
            handle_config(&tracker, action).await?;
        }
        Commands::Status { json } => {
            print_status(&tracker, json).await?;
        }
    }

    Ok(())
}

async fn resolve_range(
    tracker: &pipegoals::GoalTracker,
    from: Option<String>,
    to: Option<String>,
    period: Option<String>,
) -> anyhow::Result<pipegoals::DateRange> {
    let today = tracker.today().await?;
    let range = match (from, to, period) {
        (Some(from), Some(to), _) => {
            let parse = |s: &str| {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Use YYYY-MM-DD."))
            };
            pipegoals::DateRange::new(parse(&from)?, parse(&to)?)?
        }
        (_, _, Some(period)) => pipegoals::DateRange::parse_period(&period, today)?,
        _ => pipegoals::DateRange::single(today),
    };
    Ok(range)
}

async fn handle_report(
    tracker: &pipegoals::GoalTracker,
    range: pipegoals::DateRange,
    filters: pipegoals::DimensionFilters,
    rounds: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let request = match rounds {
        None => pipegoals::ReportRequest::daily(range, filters),
        Some(file) => {
            if !range.is_single_day() {
                anyhow::bail!("Round reports cover a single day, got {range}.");
            }
            let schedule = if file.is_empty() {
                tracker.round_schedule().await?
            } else {
                pipegoals::RoundSchedule::from_json(&std::fs::read_to_string(&file)?)?
            };
            pipegoals::ReportRequest::rounds(range.start, filters, schedule)
        }
    };

    let report = tracker.report(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Goal Report: {} ({:?})", report.range, report.granularity);
    let active = report.filters.active();
    if !active.is_empty() {
        let parts: Vec<String> = active.iter().map(|(k, id)| format!("{k}={id}")).collect();
        println!("  Filters: {}", parts.join(", "));
    }
    for warning in &report.warnings {
        println!("  Warning: {warning}");
    }
    if report.buckets.is_empty() {
        println!("No buckets to report.");
        return Ok(());
    }

    for bucket in &report.buckets {
        let note = if bucket.bucket.is_sunday() { " (no goals on Sunday)" } else { "" };
        println!();
        println!("{}{note}", bucket.label());
        print_metric_table(&bucket.metrics);
    }

    println!();
    println!(
        "Period total ({} buckets, {} with goals)",
        report.summary.bucket_count, report.summary.non_sunday_buckets
    );
    print_metric_table(&report.summary.metrics);
    if report.status == pipegoals::ReportStatus::Partial {
        println!();
        println!("Report is partial; see warnings above.");
    }
    Ok(())
}

fn print_metric_table(metrics: &MetricSet) {
    println!(
        "  {:<16} {:>12} {:>12} {:>12} {:>9}",
        "Metric", "Realized", "Goal", "Gap", "Gap %"
    );
    for (metric, result) in metrics.iter() {
        println!(
            "  {:<16} {:>12} {:>12} {:>12} {:>9}",
            metric_label(metric),
            format_value(metric, result.realized),
            format_value(metric, result.goal),
            format_gap(metric, result.gap),
            format_gap_percent(result.gap_percent),
        );
    }
}

fn metric_label(metric: MetricType) -> &'static str {
    match metric {
        MetricType::Leads => "Leads",
        MetricType::Sales => "Sales",
        MetricType::Revenue => "Revenue",
        MetricType::ConversionRate => "Conversion",
        MetricType::AvgTicket => "Avg ticket",
    }
}

async fn handle_import(
    tracker: &pipegoals::GoalTracker,
    target: ImportTarget,
) -> anyhow::Result<()> {
    let report = match target {
        ImportTarget::Events { file } => tracker.import_events(&file).await?,
        ImportTarget::Goals { file } => tracker.import_goals(&file).await?,
        ImportTarget::Dims { file } => tracker.import_dimensions(&file).await?,
    };
    print_import_report(&report);
    Ok(())
}

fn print_import_report(report: &pipegoals::ImportReport) {
    println!("Import: {} from {}", report.kind, report.source);
    println!("  Status:   {:?}", report.status);
    println!("  Imported: {} items", report.items_imported);
    println!("  Failed:   {} items", report.items_failed);
    for reason in &report.rejected {
        println!("    {reason}");
    }
}

async fn handle_goals(tracker: &pipegoals::GoalTracker, action: GoalsAction) -> anyhow::Result<()> {
    match action {
        GoalsAction::List { dashboard, json } => {
            let goals = tracker.goals_list(dashboard.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&goals)?);
            } else if goals.is_empty() {
                println!("No goals configured.");
            } else {
                for g in goals {
                    let key = &g.row.key;
                    println!(
                        "{:<26} {:>10} funnel={} unit={} seller={}",
                        g.row.dashboard,
                        g.row.value,
                        key.funnel_id.as_deref().unwrap_or("*"),
                        key.unit_id.as_deref().unwrap_or("*"),
                        key.seller_id.as_deref().unwrap_or("*"),
                    );
                }
            }
        }
        GoalsAction::Set {
            dashboard,
            value,
            funnel,
            unit,
            seller,
        } => {
            let row = pipegoals::GoalRow {
                dashboard,
                value,
                key: pipegoals::DimensionKey {
                    funnel_id: funnel,
                    unit_id: unit,
                    seller_id: seller,
                },
            };
            tracker.goal_set(row).await?;
            println!("Goal updated.");
        }
        GoalsAction::Clear { dashboard } => {
            let removed = tracker.goals_clear(&dashboard).await?;
            println!("Removed {removed} rows from {dashboard}.");
        }
    }
    Ok(())
}

async fn handle_dims(tracker: &pipegoals::GoalTracker, action: DimsAction) -> anyhow::Result<()> {
    match action {
        DimsAction::List { kind } => {
            let kind = pipegoals::DimensionKind::parse(&kind)?;
            let entries = tracker.dims_list(kind).await?;
            if entries.is_empty() {
                println!("No {kind} entries.");
            } else {
                for e in entries {
                    println!("{:<20} {}", e.id, e.name);
                }
            }
        }
        DimsAction::Add { kind, id, name } => {
            let kind = pipegoals::DimensionKind::parse(&kind)?;
            tracker.dim_add(kind, &id, &name).await?;
            println!("Saved {kind} {id}.");
        }
    }
    Ok(())
}

async fn handle_config(tracker: &pipegoals::GoalTracker, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match tracker.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            tracker.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = tracker.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(tracker: &pipegoals::GoalTracker, json: bool) -> anyhow::Result<()> {
    let status = tracker.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let s = &status.stats;
    println!("Warehouse Status");
    println!("  Opportunities: {} ({} won)", s.opportunities, s.won);
    println!("  Goal rows:     {}", s.goals);
    println!(
        "  Dimensions:    {} funnels, {} units, {} sellers, {} origins",
        s.funnels, s.units, s.sellers, s.origins
    );
    println!("  Page size:     {}", status.config.page_size);
    println!("  UTC offset:    {} min", status.config.utc_offset_minutes);
    println!(
        "  Rounds:        {}",
        status
            .config
            .rounds
            .as_ref()
            .map(|r| format!("{} configured", r.len()))
            .unwrap_or_else(|| "none".to_string())
    );
    if status.last_imports.is_empty() {
        println!("  Last import:   never");
    } else {
        for (kind, st, at) in &status.last_imports {
            println!(
                "  Last import:   {kind} {st} at {}",
                at.as_deref().unwrap_or("?")
            );
        }
    }
    Ok(())
}
