//! capplan CLI - Machine Capacity Planning Engine
//!
//! Command-line interface for validating machine calendars, auto-scheduling
//! task payloads and rendering Gantt grids.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capplan_core::{millis_to_datetime, MachineCalendar, Task};
use capplan_render::{GanttGrid, Period};
use capplan_session::PlanningSession;
use capplan_solver::SortCriterion;

#[derive(Parser)]
#[command(name = "capplan")]
#[command(author, version, about = "Machine capacity-planning engine", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a machine calendar file and print its working hours
    Check {
        /// Calendar JSON file
        #[arg(value_name = "FILE")]
        calendar: PathBuf,
    },

    /// Auto-schedule the in-plan tasks of a task payload
    Schedule {
        /// Task payload JSON file
        #[arg(long, value_name = "FILE")]
        tasks: PathBuf,

        /// Machine calendar JSON file (omit for 7x24 scheduling)
        #[arg(long, value_name = "FILE")]
        calendar: Option<PathBuf>,

        /// Start instant, e.g. 2026-02-02T08:00
        #[arg(long)]
        start: String,

        /// Placement order: order | finish-time
        #[arg(long, default_value = "order")]
        criterion: String,

        /// Write the {"items": [...]} change set here (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a task payload as an HTML Gantt grid
    Gantt {
        /// Task payload JSON file
        #[arg(long, value_name = "FILE")]
        tasks: PathBuf,

        /// Machine calendar JSON file for working-hour shading and bar
        /// segmentation
        #[arg(long, value_name = "FILE")]
        calendar: Option<PathBuf>,

        /// View period: day | week | month | year
        #[arg(long, default_value = "month")]
        period: String,

        /// Anchor date, e.g. 2026-02-15
        #[arg(long)]
        date: NaiveDate,

        /// Visible container width in pixels
        #[arg(long, default_value_t = 1200.0)]
        width: f64,

        /// Page title
        #[arg(long, default_value = "Capacity plan")]
        title: String,

        /// Output HTML file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { calendar } => run_check(&calendar),
        Commands::Schedule {
            tasks,
            calendar,
            start,
            criterion,
            output,
        } => run_schedule(&tasks, calendar.as_deref(), &start, &criterion, output.as_deref()),
        Commands::Gantt {
            tasks,
            calendar,
            period,
            date,
            width,
            title,
            output,
        } => run_gantt(&tasks, calendar.as_deref(), &period, date, width, &title, &output),
    }
}

fn run_check(path: &Path) -> Result<()> {
    let calendar = load_calendar(path)?;

    const WEEKDAYS: [&str; 7] = [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ];

    let mut problems = Vec::new();
    println!("Calendar: {} (zone {})", path.display(), calendar.timezone);

    for (day, name) in WEEKDAYS.iter().enumerate() {
        let windows = calendar.week_template.windows_for(day as u8);
        if windows.is_empty() {
            println!("  {name:<10} closed");
            continue;
        }

        let mut hours = 0.0;
        let mut spans = Vec::new();
        for window in windows {
            let span_minutes = window.end_minutes() - i64::from(window.start.minutes());
            if span_minutes <= 0 {
                problems.push(format!(
                    "{name}: window {}-{} ends before it starts (use end_next_day for overnight shifts)",
                    window.start, window.end
                ));
            }
            hours += span_minutes as f64 / 60.0;
            spans.push(format!("{}-{}", window.start, window.end));
        }
        println!("  {name:<10} {} ({hours:.1}h)", spans.join(", "));
    }

    println!("  Exceptions: {}", calendar.work_exceptions.len());

    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("error: {problem}");
        }
        bail!("calendar has {} invalid window(s)", problems.len());
    }
    Ok(())
}

fn run_schedule(
    tasks_path: &Path,
    calendar_path: Option<&Path>,
    start: &str,
    criterion: &str,
    output: Option<&Path>,
) -> Result<()> {
    let tasks = load_tasks(tasks_path)?;
    let calendar = calendar_path.map(load_calendar).transpose()?;
    let start = parse_start(start)?;
    let criterion: SortCriterion = criterion.parse().map_err(anyhow::Error::msg)?;

    tracing::debug!(
        tasks = tasks.len(),
        has_calendar = calendar.is_some(),
        "loaded task payload"
    );

    let mut session = PlanningSession::new(0, tasks, calendar);
    let outcome = session.autoschedule(start, criterion)?;
    tracing::debug!(placed = outcome.placed.len(), "autoschedule complete");

    if outcome.is_empty() {
        println!("Nothing to schedule: no in-plan tasks in {}", tasks_path.display());
    } else {
        println!("Placed {} task(s):", outcome.placed.len());
        for key in &outcome.placed {
            if let Some(task) = session.task(key) {
                println!(
                    "  {:>3}  {:<12} {} -> {}",
                    task.plan_order.map_or_else(|| "-".into(), |o| o.to_string()),
                    task.key,
                    format_instant(task.planned_start_ms),
                    format_instant(task.planned_end_ms),
                );
            }
        }
    }

    let update = session.plan_update();
    let body = serde_json::to_string_pretty(&update)?;
    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Change set written to {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn run_gantt(
    tasks_path: &Path,
    calendar_path: Option<&Path>,
    period: &str,
    date: NaiveDate,
    width: f64,
    title: &str,
    output: &Path,
) -> Result<()> {
    let tasks = load_tasks(tasks_path)?;
    let calendar = calendar_path.map(load_calendar).transpose()?;
    let period: Period = period.parse()?;

    let mut grid = GanttGrid::new(date).period(period).container_width(width);
    grid.set_machine_calendar(calendar);
    grid.set_tasks(tasks.into_iter().filter(|t| t.in_plan).collect());

    let html = grid.render_document(title, None);
    std::fs::write(output, html)
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("Gantt grid written to {}", output.display());
    Ok(())
}

fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("invalid task payload in {}", path.display()))
}

fn load_calendar(path: &Path) -> Result<MachineCalendar> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("invalid calendar in {}", path.display()))
}

fn parse_start(start: &str) -> Result<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(start, format) {
            return Ok(at);
        }
    }
    bail!("invalid start instant '{start}' (expected e.g. 2026-02-02T08:00)")
}

fn format_instant(ms: Option<i64>) -> String {
    ms.map_or_else(
        || "-".to_string(),
        |ms| millis_to_datetime(ms).format("%Y-%m-%d %H:%M").to_string(),
    )
}
