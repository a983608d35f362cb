use model::execution::run::{RunRecord, RunStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPoint {
    pub run_id: String,
    pub cloud_provider: String,
    pub instance_type: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub records_per_second: f64,
    pub duration_seconds: f64,
    pub total_records: u64,
}

impl RunPoint {
    /// Only completed runs with recorded throughput and duration are comparable.
    fn from_record(record: &RunRecord) -> Option<Self> {
        if record.status != RunStatus::Completed {
            return None;
        }
        Some(Self {
            run_id: record.run_id.clone(),
            cloud_provider: record.cloud_provider.clone(),
            instance_type: record.instance_type.clone(),
            batch_size: record.batch_size,
            concurrency: record.concurrency,
            records_per_second: record.average_records_per_second?,
            duration_seconds: record.total_duration_seconds?,
            total_records: record.total_records.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub runs: usize,
    pub mean_records_per_second: f64,
    pub mean_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Comparison {
    NoData,
    Ok(ComparisonReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub total_runs: usize,
    pub best_throughput: RunPoint,
    pub worst_throughput: RunPoint,
    pub fastest: RunPoint,
    pub slowest: RunPoint,
    pub average_records_per_second: f64,
    pub average_duration_seconds: f64,
    /// Best over worst throughput, as a percentage of the worst.
    pub throughput_spread_percent: f64,
    pub by_provider: BTreeMap<String, GroupStats>,
    /// Keyed `b{batch_size}_c{concurrency}`.
    pub by_configuration: BTreeMap<String, GroupStats>,
}

pub fn compare_runs(records: &[RunRecord]) -> Comparison {
    let points: Vec<RunPoint> = records.iter().filter_map(RunPoint::from_record).collect();
    if points.is_empty() {
        return Comparison::NoData;
    }

    let pick = |better: fn(&RunPoint, &RunPoint) -> bool| {
        let mut chosen = &points[0];
        for point in &points[1..] {
            if better(point, chosen) {
                chosen = point;
            }
        }
        chosen.clone()
    };

    let best = pick(|a, b| a.records_per_second > b.records_per_second);
    let worst = pick(|a, b| a.records_per_second < b.records_per_second);
    let fastest = pick(|a, b| a.duration_seconds < b.duration_seconds);
    let slowest = pick(|a, b| a.duration_seconds > b.duration_seconds);

    let by_provider = group(&points, |p| p.cloud_provider.clone());
    let by_configuration = group(&points, |p| format!("b{}_c{}", p.batch_size, p.concurrency));

    let n = points.len() as f64;
    Comparison::Ok(ComparisonReport {
        total_runs: points.len(),
        average_records_per_second: points.iter().map(|p| p.records_per_second).sum::<f64>() / n,
        average_duration_seconds: points.iter().map(|p| p.duration_seconds).sum::<f64>() / n,
        throughput_spread_percent: percentage_difference(
            best.records_per_second,
            worst.records_per_second,
        ),
        best_throughput: best,
        worst_throughput: worst,
        fastest,
        slowest,
        by_provider,
        by_configuration,
    })
}

/// `(value - baseline) / baseline * 100`, or 0 when the baseline is 0.
pub fn percentage_difference(value: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (value - baseline) / baseline * 100.0
    }
}

fn group(points: &[RunPoint], key: impl Fn(&RunPoint) -> String) -> BTreeMap<String, GroupStats> {
    let mut sums: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
    for point in points {
        let entry = sums.entry(key(point)).or_default();
        entry.0 += 1;
        entry.1 += point.records_per_second;
        entry.2 += point.duration_seconds;
    }

    sums.into_iter()
        .map(|(k, (runs, rps, dur))| {
            (
                k,
                GroupStats {
                    runs,
                    mean_records_per_second: rps / runs as f64,
                    mean_duration_seconds: dur / runs as f64,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::config::RunConfig;
    use std::num::NonZeroUsize;

    fn completed(id: &str, provider: &str, batch: usize, rps: f64, secs: f64) -> RunRecord {
        let config = RunConfig::new(NonZeroUsize::new(batch).unwrap(), NonZeroUsize::new(2).unwrap())
            .with_labels(provider, "x");
        let mut record = RunRecord::pending(id, id, &config);
        record.status = RunStatus::Completed;
        record.average_records_per_second = Some(rps);
        record.total_duration_seconds = Some(secs);
        record.total_records = Some((rps * secs) as u64);
        record
    }

    #[test]
    fn test_no_completed_runs() {
        let config = RunConfig::new(NonZeroUsize::MIN, NonZeroUsize::MIN);
        let pending = RunRecord::pending("p", "p", &config);
        assert_eq!(compare_runs(&[pending]), Comparison::NoData);
        assert_eq!(compare_runs(&[]), Comparison::NoData);
    }

    #[test]
    fn test_extremes_and_groups() {
        let runs = vec![
            completed("a", "GCP", 100, 200.0, 10.0),
            completed("b", "GCP", 500, 400.0, 5.0),
            completed("c", "AWS", 100, 100.0, 20.0),
        ];

        let Comparison::Ok(report) = compare_runs(&runs) else {
            panic!("expected a report");
        };
        assert_eq!(report.total_runs, 3);
        assert_eq!(report.best_throughput.run_id, "b");
        assert_eq!(report.worst_throughput.run_id, "c");
        assert_eq!(report.fastest.run_id, "b");
        assert_eq!(report.slowest.run_id, "c");
        assert_eq!(report.throughput_spread_percent, 300.0);
        assert_eq!(report.by_provider["GCP"].mean_records_per_second, 300.0);
        assert_eq!(report.by_provider["AWS"].runs, 1);
        assert_eq!(report.by_configuration["b100_c2"].runs, 2);
        assert_eq!(report.by_configuration["b100_c2"].mean_duration_seconds, 15.0);

        let json = serde_json::to_value(Comparison::Ok(report)).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn test_percentage_difference() {
        assert_eq!(percentage_difference(150.0, 100.0), 50.0);
        assert_eq!(percentage_difference(5.0, 0.0), 0.0);
    }
}
