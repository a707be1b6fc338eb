//! Honors - batch recomputation of honor candidates.

mod config;
mod dataset;

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use honor_registry::{
    HonorConfig, HonorRegistry, HonorResultView, InMemoryGradeBook, StaticDirectory,
    TracingDispatcher,
};
use honor_rules::{AcademicLevel, AcademicPeriod};

use crate::config::{Args, Command, OutputFormat};
use crate::dataset::Dataset;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!(
                        "honor_cli={0},honor_registry={0},honor_rules={0},info",
                        log_level
                    )
                    .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Argument error: {}", e);
        std::process::exit(2);
    }

    let config = args.load_config()?;

    match &args.command {
        Command::Recompute {
            dataset,
            level,
            school_year,
            grading_period,
        } => {
            let dataset = Dataset::load(dataset)?;
            let mut period = AcademicPeriod::new(level.as_str(), school_year.as_str());
            if let Some(grading_period) = grading_period {
                period = period.with_grading_period(grading_period.as_str());
            }
            recompute(config, dataset, &period, args.format).await?;
        }
        Command::Criteria { level } => {
            print_criteria(&config, &AcademicLevel::new(level.as_str()), args.format)?;
        }
        Command::ShowConfig => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

async fn recompute(
    config: HonorConfig,
    dataset: Dataset,
    period: &AcademicPeriod,
    format: OutputFormat,
) -> anyhow::Result<()> {
    info!(
        students = dataset.students.len(),
        grades = dataset.grades.len(),
        period = %period,
        "Loaded dataset"
    );

    let registry = HonorRegistry::builder()
        .config(config)
        .grade_source(Arc::new(InMemoryGradeBook::with_records(dataset.grades)))
        .directory(Arc::new(StaticDirectory::with_profiles(dataset.students)))
        .dispatcher(Arc::new(TracingDispatcher))
        .build()?;

    let report = registry.recompute(period).await?;
    let scope = report.scope.clone();
    let results = registry.result_views(&scope).await;
    let stats = registry.stats(&scope).await;

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "report": report,
                "results": results,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{}", report);
            println!();
            print_results(&results);
            println!();
            println!(
                "pending={} approved={} rejected={} overridden={}",
                stats.pending, stats.approved, stats.rejected, stats.overridden
            );
        }
    }
    Ok(())
}

fn print_results(results: &[HonorResultView]) {
    if results.is_empty() {
        println!("No honor candidates.");
        return;
    }
    println!("{:<16} {:>7}  {:<18} {}", "STUDENT", "GPA", "STATUS", "HONOR");
    for view in results {
        println!(
            "{:<16} {:>7.2}  {:<18} {}",
            view.student_id,
            view.gpa,
            view.status,
            view.display_honor()
        );
    }
}

fn print_criteria(
    config: &HonorConfig,
    level: &AcademicLevel,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let criteria = config.criteria_set()?;
    let ladder = criteria.ladder(level);
    let policy = config.qualifier()?.policy(level);

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "level": level,
                "policy": policy,
                "criteria": ladder,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{} ({:?}, {:?})", level, policy.direction, policy.tie_break);
            if ladder.is_empty() {
                println!("  no criteria apply");
            }
            for criterion in ladder {
                match &criterion.eligibility {
                    Some(rule) => println!(
                        "  {:>2}. {:<24} >= {:<6} {:?}",
                        criterion.rank, criterion.name, criterion.minimum_gpa, rule
                    ),
                    None => println!(
                        "  {:>2}. {:<24} >= {}",
                        criterion.rank, criterion.name, criterion.minimum_gpa
                    ),
                }
            }
        }
    }
    Ok(())
}
