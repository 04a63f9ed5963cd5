use std::fmt::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::model::{
    EventRecord, LocationOccupancy, OccupancySample, OccupancyStatus, RankedResult, RankedSpot,
    SpotCategory, NOT_AVAILABLE,
};
use crate::service::QuickSummary;

/// Format styles supported by every renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }
}

/// Overview of the current snapshot: quick summary followed by both listings.
pub fn render_overview(
    summary: &QuickSummary,
    recreation: &[OccupancySample],
    libraries: &[OccupancySample],
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return to_json(&JsonOverview {
            summary,
            recreation,
            libraries,
        });
    }

    let mut out = String::new();
    writeln!(out, "Snapshot as of {}", summary.as_of)?;
    writeln!(
        out,
        "Best study spot:   {}",
        summary
            .best_study
            .as_ref()
            .map(describe_spot)
            .unwrap_or_else(|| "none available".to_string())
    )?;
    writeln!(
        out,
        "Best workout spot: {}",
        summary
            .best_workout
            .as_ref()
            .map(describe_spot)
            .unwrap_or_else(|| "none available".to_string())
    )?;
    writeln!(out)?;
    write_samples(&mut out, "Recreation facilities", recreation)?;
    writeln!(out)?;
    write_samples(&mut out, "Libraries", libraries)?;
    Ok(out)
}

pub fn render_ranked_spots(
    category: SpotCategory,
    spots: &[RankedSpot],
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return to_json(&spots);
    }

    let mut out = String::new();
    let heading = match category {
        SpotCategory::Study => "Best study spots",
        SpotCategory::Workout => "Best workout spots",
    };
    if spots.is_empty() {
        writeln!(out, "{heading}: no open locations with known occupancy.")?;
        return Ok(out);
    }
    writeln!(out, "{heading}:")?;
    for (rank, spot) in spots.iter().enumerate() {
        writeln!(
            out,
            "  {rank}. {name:<32} {pct:>5.1}%  {badge}  {current}/{capacity} ({seats} free)",
            rank = rank + 1,
            name = spot.name,
            pct = spot.percent_full,
            badge = status_badge(spot.status),
            current = spot.current_count,
            capacity = spot.capacity,
            seats = spot.available_seats,
        )?;
    }
    Ok(out)
}

pub fn render_answer(results: &[RankedResult], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return to_json(&results);
    }

    let mut out = String::new();
    if results.is_empty() {
        writeln!(out, "No suggestions available right now.")?;
        return Ok(out);
    }
    writeln!(out, "Suggestions:")?;
    for (rank, result) in results.iter().enumerate() {
        writeln!(
            out,
            "  {rank}. {name:<32} {pct:>5.1}% full, {seats} seats available",
            rank = rank + 1,
            name = display_name(&result.name),
            pct = result.percent_full,
            seats = result.available_seats,
        )?;
    }
    Ok(out)
}

pub fn render_locations(locations: &[LocationOccupancy], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return to_json(&locations);
    }

    let mut out = String::new();
    writeln!(out, "{} location(s):", locations.len())?;
    for location in locations {
        writeln!(
            out,
            "  - {name:<40} {pct:>7}  [{confidence:?}]",
            name = location.location,
            pct = percent_cell(location.percent_full),
            confidence = location.confidence,
        )?;
    }
    Ok(out)
}

pub fn render_events(events: &[EventRecord], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return to_json(&events);
    }

    let mut out = String::new();
    if events.is_empty() {
        writeln!(out, "No upcoming events.")?;
        return Ok(out);
    }
    writeln!(out, "Upcoming events:")?;
    for event in events {
        writeln!(out, "  - {} @ {}", event.title.bold(), event.location)?;
        writeln!(out, "    {} → {}", event.start_time, event.end_time)?;
        if !event.summary.is_empty() {
            writeln!(out, "    {}", single_line(&event.summary))?;
        }
        writeln!(out, "    {}", event.link.dimmed())?;
    }
    Ok(out)
}

fn write_samples(out: &mut String, heading: &str, samples: &[OccupancySample]) -> anyhow::Result<()> {
    if samples.is_empty() {
        writeln!(out, "{heading}: unavailable")?;
        return Ok(());
    }
    writeln!(out, "{heading}:")?;
    for sample in samples {
        let count = sample
            .current_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        writeln!(
            out,
            "  - {name:<32} {pct:>7}  {badge}  {count}/{capacity}",
            name = sample.name,
            pct = percent_cell(sample.percent_full),
            badge = status_badge(sample.status()),
            capacity = sample.capacity,
        )?;
    }
    Ok(())
}

fn describe_spot(spot: &RankedSpot) -> String {
    format!(
        "{} ({:.1}% full, {} free)",
        spot.name, spot.percent_full, spot.available_seats
    )
}

fn percent_cell(percent: Option<f64>) -> String {
    percent
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

/// Colored status label for terminal output.
pub fn status_badge(status: OccupancyStatus) -> ColoredString {
    let label = status.label();
    match status {
        OccupancyStatus::Quiet => label.green(),
        OccupancyStatus::Moderate => label.yellow(),
        OccupancyStatus::Busy => label.truecolor(255, 140, 0),
        OccupancyStatus::Full => label.red().bold(),
        OccupancyStatus::Closed => label.dimmed(),
        OccupancyStatus::Unknown => label.normal(),
    }
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[derive(Serialize)]
struct JsonOverview<'a> {
    summary: &'a QuickSummary,
    recreation: &'a [OccupancySample],
    libraries: &'a [OccupancySample],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, Coordinate, SourceKind};

    fn spot(name: &str, pct: f64) -> RankedSpot {
        RankedSpot {
            name: name.into(),
            percent_full: pct,
            status: OccupancyStatus::classify(Some(pct), false),
            current_count: pct as u32,
            capacity: 100,
            available_seats: 100 - pct as u32,
        }
    }

    #[test]
    fn human_ranking_lists_spots_in_order() {
        let spots = vec![spot("West Campus", 12.5), spot("Evans", 55.0)];
        let output = render_ranked_spots(SpotCategory::Study, &spots, OutputFormat::Human).unwrap();
        assert!(output.starts_with("Best study spots:"));
        let west = output.find("West Campus").unwrap();
        let evans = output.find("Evans").unwrap();
        assert!(west < evans);
        assert!(output.contains("12.5%"));
        assert!(output.contains("quiet"));
        assert!(output.contains("(45 free)"));
    }

    #[test]
    fn empty_ranking_says_so() {
        let output = render_ranked_spots(SpotCategory::Workout, &[], OutputFormat::Human).unwrap();
        assert!(output.contains("no open locations"));
    }

    #[test]
    fn json_answer_uses_contract_keys() {
        let results = vec![RankedResult {
            name: "PSEL".into(),
            percent_full: 10.0,
            available_seats: 90,
        }];
        let output = render_answer(&results, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["name"], "PSEL");
        assert_eq!(value[0]["percentFull"], 10.0);
        assert_eq!(value[0]["availableSeats"], 90);
    }

    #[test]
    fn human_answer_names_blank_rows() {
        let output = render_answer(&[RankedResult::default()], OutputFormat::Human).unwrap();
        assert!(output.contains("(unnamed)"));
        assert!(output.contains("0 seats available"));
    }

    #[test]
    fn locations_show_unknown_as_not_available() {
        let locations = vec![
            LocationOccupancy {
                location: "Climbing Wall".into(),
                percent_full: None,
                confidence: Confidence::Measured,
            },
            LocationOccupancy {
                location: "Reed Arena".into(),
                percent_full: Some(42.0),
                confidence: Confidence::Estimated,
            },
        ];
        let output = render_locations(&locations, OutputFormat::Human).unwrap();
        assert!(output.contains("2 location(s)"));
        assert!(output.contains("N/A"));
        assert!(output.contains("42.0%"));
        assert!(output.contains("[Estimated]"));
    }

    #[test]
    fn events_render_times_and_link() {
        let events = vec![EventRecord {
            title: "Career Fair".into(),
            location: "Reed Arena".into(),
            latitude: Coordinate::NotAvailable,
            longitude: Coordinate::Value(-96.3),
            start_time: "2023-11-14 04:13 PM".into(),
            end_time: "N/A".into(),
            link: "https://calendar.tamu.edu/live/event/1".into(),
            summary: "Bring\nresumes".into(),
            starts_at: Some(1_700_000_000),
            ends_at: None,
        }];
        let output = render_events(&events, OutputFormat::Human).unwrap();
        assert!(output.contains("Reed Arena"));
        assert!(output.contains("2023-11-14 04:13 PM → N/A"));
        assert!(output.contains("Bring resumes"));
        assert!(output.contains("calendar.tamu.edu/live/event/1"));

        let json = render_events(&events, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["latitude"], "N/A");
    }

    #[test]
    fn overview_marks_missing_sources() {
        let summary = QuickSummary {
            as_of: "2024-01-01T00:00:00+00:00".into(),
            best_study: None,
            best_workout: Some(spot("Main Gym", 30.0)),
        };
        let libraries = vec![OccupancySample::new(
            SourceKind::Library,
            "Evans",
            None,
            100,
            false,
            None,
        )];
        let output = render_overview(&summary, &[], &libraries, OutputFormat::Human).unwrap();
        assert!(output.contains("Best study spot:   none available"));
        assert!(output.contains("Main Gym (30.0% full, 70 free)"));
        assert!(output.contains("Recreation facilities: unavailable"));
        assert!(output.contains("?/100"));
        assert!(output.contains("unknown"));
    }
}
