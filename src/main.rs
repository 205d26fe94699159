use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use haulcheck::config::AppConfig;
use haulcheck::engine::{
    monthly_alert_summary, Business, CheckRegistry, ComputationReport, InMemoryActivityLog,
    InMemoryRegulationStore, RegulationService, RegulationStore, RegulatoryAlert, SubmitterType,
    UserId,
};
use haulcheck::error::AppError;
use haulcheck::ingest;
use haulcheck::telemetry;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "haulcheck",
    about = "Evaluate a mobile worker's activity log against labor-regulation thresholds",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit an activity-log CSV over a period and report alerts
    Audit(AuditArgs),
    /// List the seeded regulation-check threshold rows
    Checks,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Activity log CSV (activity_id, mission_id, user_id, type,
    /// submitter_id, submitter_kind, start, end, view)
    #[arg(long)]
    csv: PathBuf,
    /// Worker to evaluate
    #[arg(long)]
    user: i64,
    /// Business classification of the worker
    #[arg(long, value_parser = parse_business)]
    business: Business,
    /// First day of the audited period (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    from: NaiveDate,
    /// Last day of the audited period (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    to: NaiveDate,
    /// Evaluation instant for open activities (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    reference: Option<DateTime<Utc>>,
    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Audit(args) => run_audit(args),
        Command::Checks => run_checks(),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as RFC 3339 ({err})"))
}

fn parse_business(raw: &str) -> Result<Business, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "long_haul_freight" => Ok(Business::LongHaulFreight),
        "short_distance_freight" => Ok(Business::ShortDistanceFreight),
        "passenger_frequent" => Ok(Business::PassengerFrequent),
        "passenger_occasional" => Ok(Business::PassengerOccasional),
        "taxi" => Ok(Business::Taxi),
        "vtc" => Ok(Business::Vtc),
        _ => Err(format!(
            "unknown business '{raw}' (expected long_haul_freight, short_distance_freight, \
             passenger_frequent, passenger_occasional, taxi, or vtc)"
        )),
    }
}

fn run_audit(args: AuditArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let reference = args.reference.unwrap_or_else(Utc::now);
    let partition = config.calendar.day_partition()?;

    let file = File::open(&args.csv)?;
    let entries = ingest::parse_activities(file)?;
    let log = Arc::new(InMemoryActivityLog::new());
    for entry in &entries {
        log.log(&entry.views, entry.activity.clone());
    }
    info!(activities = entries.len(), "activity log loaded");

    let store = Arc::new(InMemoryRegulationStore::new());
    let service = RegulationService::new(
        store.clone(),
        log,
        Arc::new(CheckRegistry::with_defaults()),
        partition,
    );

    let user = UserId(args.user);
    let mut reports = Vec::new();
    for view in SubmitterType::ALL {
        let report = service.compute_regulations(
            user,
            args.business,
            args.from,
            args.to,
            view,
            reference,
        )?;
        let mut alerts = store
            .alerts_for_user(user, view)
            .map_err(haulcheck::engine::EngineError::from)?;
        alerts.sort_by_key(|alert| (alert.day, alert.check_type));
        reports.push((view, report, alerts));
    }

    if args.json {
        render_json(&reports);
    } else {
        render_text(&args, &reports);
    }
    Ok(())
}

fn render_json(reports: &[(SubmitterType, ComputationReport, Vec<RegulatoryAlert>)]) {
    let views: Vec<serde_json::Value> = reports
        .iter()
        .map(|(view, report, alerts)| {
            json!({
                "view": view.label(),
                "days_evaluated": report.days_evaluated,
                "weeks_evaluated": report.weeks_evaluated,
                "alerts": alerts,
            })
        })
        .collect();
    println!("{}", json!({ "views": views }));
}

fn render_text(
    args: &AuditArgs,
    reports: &[(SubmitterType, ComputationReport, Vec<RegulatoryAlert>)],
) {
    println!(
        "Regulation audit: user {} ({}) from {} to {}",
        args.user,
        args.business.label(),
        args.from,
        args.to
    );

    for (view, report, alerts) in reports {
        println!(
            "\n{} view: {} days and {} weeks evaluated",
            view.label(),
            report.days_evaluated,
            report.weeks_evaluated
        );

        if alerts.is_empty() {
            println!("- compliant, no alerts");
            continue;
        }
        for alert in alerts {
            println!(
                "- {} | {} | {}",
                alert.day,
                alert.check_type.label(),
                alert.extra_json()
            );
        }

        let summary = monthly_alert_summary(alerts);
        for ((year, month), count) in summary {
            println!("  {year}-{month:02}: {count} violation(s)");
        }
    }
}

fn run_checks() -> Result<(), AppError> {
    let registry = CheckRegistry::with_defaults();
    println!("Seeded regulation checks");
    for row in registry.rows() {
        let scope = row
            .business_scope
            .map(|business| business.label())
            .unwrap_or("all businesses");
        println!(
            "- {} ({:?}) from {} for {}",
            row.check_type.label(),
            row.check_type.unit(),
            row.date_application_start,
            scope
        );
    }
    Ok(())
}
