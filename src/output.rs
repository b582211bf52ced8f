use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{ArrivalProfile, DurationProfile, LayoutSource, SimConfig};
use crate::state::{LogRecord, Outcome, SimulationResult};

pub trait Formatter {
    fn write(&self, result: &SimulationResult) -> String;

    fn write_comparison(&self, results: &[SimulationResult]) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<15} {:>8} {:>8} {:>9} {:>8} {:>8} {:>9} {:>9}",
            "policy",
            "assigned",
            "rejected",
            "abandoned",
            "avg_wait",
            "avg_walk",
            "avg_route",
            "avg_util%"
        );
        for result in results {
            let m = &result.metrics;
            let _ = writeln!(
                out,
                "{:<15} {:>8} {:>8} {:>9} {:>8} {:>8} {:>9} {:>9}",
                result.metadata.policy.to_string(),
                m.assigned,
                m.rejected,
                m.abandoned,
                m.avg_wait,
                m.avg_walking_distance,
                m.avg_route_cost,
                m.avg_utilization_pct
            );
        }
        out
    }
}

pub struct HumanFormatter;
pub struct SummaryFormatter;
pub struct JsonFormatter;

impl Formatter for HumanFormatter {
    fn write(&self, result: &SimulationResult) -> String {
        let mut out = String::new();
        write_metadata(&mut out, result);
        out.push_str("Assignments:\n");
        for record in &result.log {
            write_assignments(&mut out, record);
        }
        write_summary(&mut out, result);
        out
    }
}

impl Formatter for SummaryFormatter {
    fn write(&self, result: &SimulationResult) -> String {
        let mut out = String::new();
        write_metadata(&mut out, result);
        write_summary(&mut out, result);
        out
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, result: &SimulationResult) -> String {
        to_json(result)
    }

    fn write_comparison(&self, results: &[SimulationResult]) -> String {
        to_json(&results)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(json) => json + "\n",
        Err(err) => format!("{{\"error\": {:?}}}\n", err.to_string()),
    }
}

fn write_metadata(out: &mut String, result: &SimulationResult) {
    let meta = &result.metadata;
    out.push_str("Metadata:\n");
    let _ = writeln!(out, "policy: {}", meta.policy);
    let _ = writeln!(out, "seed: {}", meta.seed);
    let _ = writeln!(out, "facility: {}", meta.facility);
    let _ = writeln!(out, "spots: {}", meta.spots);
    let _ = writeln!(out, "end_time: {}", meta.end_time);
    let _ = writeln!(out, "events: {}", meta.events);
}

fn write_assignments(out: &mut String, record: &LogRecord) {
    for assignment in &record.assignments {
        let _ = write!(out, "t={} vehicle {} -> ", record.time, assignment.vehicle);
        match (&assignment.spot_name, assignment.failure) {
            (Some(spot), _) => {
                out.push_str(spot);
                if let Some(route) = &assignment.route {
                    let _ = write!(out, " (route cost: {})", route.cost);
                }
                if record.outcome == Outcome::Reserved {
                    out.push_str(" [reserved]");
                }
            }
            (None, Some(failure)) => {
                let _ = write!(out, "none ({})", failure);
            }
            (None, None) => out.push_str("none"),
        }
        out.push('\n');
    }
}

fn write_summary(out: &mut String, result: &SimulationResult) {
    let m = &result.metrics;
    out.push_str("Summary:\n");
    let _ = writeln!(out, "arrivals: {}", m.arrivals);
    let _ = writeln!(out, "assigned: {}", m.assigned);
    let _ = writeln!(out, "rejected: {}", m.rejected);
    let _ = writeln!(out, "abandoned: {}", m.abandoned);
    let _ = writeln!(out, "bookings: {} (no-shows: {})", m.bookings, m.no_shows);
    let _ = writeln!(
        out,
        "utilization: {}% (avg: {}%, peak: {} spots)",
        m.utilization_pct, m.avg_utilization_pct, m.peak_occupancy
    );
    let _ = writeln!(out, "avg wait: {} min", m.avg_wait);
    let _ = writeln!(out, "avg walking distance: {}", m.avg_walking_distance);
    let _ = writeln!(out, "avg route cost: {}", m.avg_route_cost);
    let _ = writeln!(
        out,
        "stale discards: {}, recovered conflicts: {}",
        m.stale_discards, m.recovered_conflicts
    );
    for summary in &m.by_spot_type {
        let _ = writeln!(
            out,
            "{}: {} spots, {} free, {} parked",
            summary.spot_type, summary.total, summary.free, summary.parked
        );
    }
}

pub fn format_config(config: &SimConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Policy: {}", config.policy);
    let _ = writeln!(out, "Seed: {}", config.seed);
    match &config.layout {
        LayoutSource::File(path) => {
            let _ = writeln!(out, "Layout: {}", path.display());
        }
        LayoutSource::Grid { grid } => {
            let _ = write!(out, "Layout: grid {}x{}", grid.aisles, grid.aisle_length);
            if grid.floors > 1 {
                let _ = write!(out, " on {} floors", grid.floors);
            }
            let _ = writeln!(
                out,
                " (accessible every {}, ev every {})",
                grid.accessible_every, grid.ev_every
            );
        }
    }
    match config.end_time {
        Some(end) => {
            let _ = writeln!(out, "End time: {}", end);
        }
        None => out.push_str("End time: none\n"),
    }
    match &config.arrivals {
        ArrivalProfile::Poisson {
            rate_per_hour,
            horizon,
            max_vehicles,
        } => {
            let _ = write!(out, "Arrivals: poisson {}/h", rate_per_hour);
            if let Some(horizon) = horizon {
                let _ = write!(out, ", horizon {}", horizon);
            }
            if let Some(max) = max_vehicles {
                let _ = write!(out, ", max {}", max);
            }
            out.push('\n');
        }
        ArrivalProfile::Scripted { vehicles } => {
            let _ = writeln!(out, "Arrivals: scripted ({} vehicles)", vehicles.len());
        }
    }
    match &config.duration {
        DurationProfile::Fixed { minutes } => {
            let _ = writeln!(out, "Duration: fixed {} min", minutes);
        }
        DurationProfile::Normal { mean, std_dev, min } => {
            let _ = writeln!(out, "Duration: normal (mean {}, sd {}, min {})", mean, std_dev, min);
        }
        DurationProfile::Exponential { mean, min } => {
            let _ = writeln!(out, "Duration: exponential (mean {}, min {})", mean, min);
        }
    }
    let _ = writeln!(out, "Max wait: {}", config.max_wait);
    let _ = writeln!(out, "Batch window: {}", config.batch_window);

    out.push_str("Vehicle types:\n");
    for share in &config.vehicle_types {
        let _ = writeln!(out, "- {} (weight: {})", share.vehicle_type, share.weight);
    }
    out.push_str("Preference profiles:\n");
    for profile in &config.preference_profiles {
        let p = &profile.preferences;
        let _ = writeln!(
            out,
            "- {} (weight: {}, proximity: {}, price: {}, availability: {}, exit: {})",
            profile.name, profile.weight, p.proximity, p.price, p.availability, p.exit
        );
    }
    let r = &config.reservations;
    let _ = writeln!(
        out,
        "Reservations: probability {}, lead {}, grace {}, no-show {}",
        r.probability, r.lead_time, r.grace, r.no_show_probability
    );
    if !config.special_conditions.is_empty() {
        out.push_str("Special conditions:\n");
        for condition in &config.special_conditions {
            let _ = writeln!(
                out,
                "- t={} (price x{}, demand x{}, arrivals x{})",
                condition.at,
                condition.price_multiplier,
                condition.demand_multiplier,
                condition.arrival_multiplier
            );
        }
    }
    out
}

pub fn export_log(path: &Path, log: &[LogRecord]) -> Result<()> {
    let mut out = String::new();
    for record in log {
        let line = serde_json::to_string(record)
            .map_err(|err| Error::Export(format!("failed to encode log record: {}", err)))?;
        out.push_str(&line);
        out.push('\n');
    }
    fs::write(path, out).map_err(|err| {
        Error::Export(format!(
            "failed to write log '{}': {}",
            path.display(),
            err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyKind;
    use crate::state::{Metrics, RunMetadata};

    fn result() -> SimulationResult {
        SimulationResult {
            metadata: RunMetadata {
                policy: PolicyKind::Weighted,
                seed: 4,
                facility: "demo".to_string(),
                spots: 2,
                end_time: 30,
                events: 0,
            },
            metrics: Metrics {
                arrivals: 1,
                assigned: 1,
                avg_route_cost: 2.5,
                ..Metrics::default()
            },
            log: Vec::new(),
        }
    }

    #[test]
    fn summary_has_metadata_then_totals() {
        let text = SummaryFormatter.write(&result());
        assert!(text.starts_with("Metadata:\npolicy: weighted\nseed: 4\n"));
        assert!(text.contains("Summary:\narrivals: 1\nassigned: 1\n"));
        assert!(text.contains("avg route cost: 2.5\n"));
        assert!(!text.contains("Assignments:"));
    }

    #[test]
    fn comparison_rows_follow_input_order() {
        let mut second = result();
        second.metadata.policy = PolicyKind::NearestFirst;
        let table = HumanFormatter.write_comparison(&[result(), second]);
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("weighted "));
        assert!(rows[2].starts_with("nearest-first "));
    }

    #[test]
    fn json_comparison_is_an_array() {
        let json = JsonFormatter.write_comparison(&[result()]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
        assert_eq!(value[0]["metadata"]["policy"], "weighted");
    }

    #[test]
    fn default_config_listing() {
        let text = format_config(&SimConfig::default());
        assert!(text.starts_with("Policy: nearest-first\nSeed: 0\n"));
        assert!(text.contains("Arrivals: poisson 30/h, horizon 480\n"));
        assert!(text.contains(
            "- commuter (weight: 0.6, proximity: 1, price: 0.2, availability: 0, exit: 0.4)\n"
        ));
    }
}
