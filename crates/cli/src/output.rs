use crate::error::CliError;
use engine_core::comparison::{Comparison, ComparisonReport, RunPoint};
use model::execution::run::{RunRecord, RunSummary};
use serde_json::json;
use std::path::Path;

pub fn print_runs(runs: &[RunRecord], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    println!(
        "{:<44} {:<10} {:<10} {:>6} {:>4} {:>10} {:>10} {:>10}",
        "Run", "Status", "Provider", "Batch", "Conc", "Records", "Secs", "Rec/s"
    );
    for run in runs {
        println!(
            "{:<44} {:<10} {:<10} {:>6} {:>4} {:>10} {:>10} {:>10}",
            run.run_id,
            run.status,
            run.cloud_provider,
            run.batch_size,
            run.concurrency,
            run.total_records
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".into()),
            run.total_duration_seconds
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "-".into()),
            run.average_records_per_second
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "-".into()),
        );
    }
    Ok(())
}

pub fn print_run(record: &RunRecord, summary: Option<&RunSummary>) -> Result<(), CliError> {
    let value = json!({
        "run": record,
        "results": summary,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn print_summary(summary: &RunSummary) {
    println!("Run {} {}", summary.run_id, summary.status);
    println!("{:<22} {}", "Files", summary.total_files);
    println!(
        "{:<22} {} ok / {} failed / {} skipped",
        "Batches", summary.successful_batches, summary.failed_batches, summary.skipped_batches
    );
    println!("{:<22} {}", "Records", summary.total_records);
    println!("{:<22} {:.2}s", "Duration", summary.total_duration_seconds);
    println!("{:<22} {:.1}", "Records/s", summary.average_records_per_second);
    if let Some(message) = &summary.error_message {
        println!("{:<22} {}", "Error", message);
    }
}

pub async fn write_comparison(comparison: &Comparison, path: &Path) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(comparison)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_comparison(comparison: &Comparison) {
    let report = match comparison {
        Comparison::NoData => {
            println!("No completed runs to compare.");
            return;
        }
        Comparison::Ok(report) => report,
    };

    print_extremes(report);

    println!();
    println!("{:<24} {:>5} {:>12} {:>10}", "Provider", "Runs", "Mean rec/s", "Mean secs");
    for (provider, group) in &report.by_provider {
        println!(
            "{:<24} {:>5} {:>12.1} {:>10.1}",
            provider, group.runs, group.mean_records_per_second, group.mean_duration_seconds
        );
    }

    println!();
    println!("{:<24} {:>5} {:>12} {:>10}", "Configuration", "Runs", "Mean rec/s", "Mean secs");
    for (config, group) in &report.by_configuration {
        println!(
            "{:<24} {:>5} {:>12.1} {:>10.1}",
            config, group.runs, group.mean_records_per_second, group.mean_duration_seconds
        );
    }
}

fn print_extremes(report: &ComparisonReport) {
    let line = |label: &str, p: &RunPoint| {
        println!(
            "{:<18} {} ({} {}, b{} c{}): {:.1} rec/s in {:.1}s",
            label,
            p.run_id,
            p.cloud_provider,
            p.instance_type,
            p.batch_size,
            p.concurrency,
            p.records_per_second,
            p.duration_seconds
        );
    };

    println!("Compared {} completed runs", report.total_runs);
    line("Best throughput", &report.best_throughput);
    line("Worst throughput", &report.worst_throughput);
    line("Fastest", &report.fastest);
    line("Slowest", &report.slowest);
    println!(
        "{:<18} {:.1} rec/s, {:.1}s; spread {:.1}%",
        "Average",
        report.average_records_per_second,
        report.average_duration_seconds,
        report.throughput_spread_percent
    );
}
