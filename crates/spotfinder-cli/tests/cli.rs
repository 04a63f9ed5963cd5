use assert_cmd::Command;
use once_cell::sync::Lazy;
use predicates::prelude::*;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn reset_env() {
    for key in [
        "SPOTFINDER_LLM_PROVIDER",
        "SPOTFINDER_LLM_API_KEY",
        "SPOTFINDER_LLM_ENDPOINT",
        "SPOTFINDER_LLM_MODEL",
        "SPOTFINDER_LLM_TIMEOUT_SECS",
        "SPOTFINDER_LLM_MAX_RETRIES",
        "SPOTFINDER_LLM_API_VERSION",
        "SPOTFINDER_DEBUG",
    ] {
        env::remove_var(key);
    }
    env::set_var("NO_COLOR", "1");
}

fn fixture_url(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../spotfinder-core/tests/fixtures")
        .join(name);
    format!("file://{}", path.display())
}

fn config_file(extra: &str) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    let body = format!(
        "[sources]\nrecreation_url = \"{}\"\nlibrary_url = \"{}\"\nevents_url = \"{}\"\nutc_offset_minutes = 0\n\n{}",
        fixture_url("recreation.json"),
        fixture_url("library.json"),
        fixture_url("events.json"),
        extra
    );
    write(file.path(), body).unwrap();
    file
}

fn spotfinder(config: &NamedTempFile) -> Command {
    let mut cmd = Command::cargo_bin("spotfinder").unwrap();
    cmd.args(["--config", config.path().to_str().unwrap()]);
    cmd
}

#[test]
fn best_study_spots_are_ranked() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    let output = spotfinder(&config)
        .args(["best", "--category", "study"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Best study spots:"))
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let psel = stdout.find("Policy Sciences").unwrap();
    let evans = stdout.find("Evans Library").unwrap();
    assert!(psel < evans);
}

#[test]
fn best_respects_limit() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    let output = spotfinder(&config)
        .args(["best", "--category", "workout", "--limit", "1", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let spots: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(spots.as_array().unwrap().len(), 1);
    assert_eq!(spots[0]["name"], "Student Rec Center - Main Gym");
    assert_eq!(spots[0]["status"], "quiet");
}

#[test]
fn ask_with_noop_provider_returns_fallback_json() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("[llm]\nprovider = \"noop\"\n");

    let output = spotfinder(&config)
        .args(["ask", "where is a free seat?", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let answer: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let rows = answer.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["name"], "Evans Library");
    assert_eq!(rows[0]["availableSeats"], 600);
    assert!(rows.iter().all(|row| row["percentFull"].is_number()));
}

#[test]
fn events_listing_honours_limit() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    let output = spotfinder(&config)
        .args(["events", "--limit", "2", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let events: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(events.as_array().unwrap().len(), 2);
    assert_eq!(events[0]["title"], "Untitled Event");
    assert_eq!(events[1]["start_time"], "2023-11-14 10:13 PM");
}

#[test]
fn locations_include_estimated_events() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    spotfinder(&config)
        .arg("locations")
        .assert()
        .success()
        .stdout(predicate::str::contains("11 location(s)"))
        .stdout(predicate::str::contains("[Estimated]"));
}

#[test]
fn default_command_prints_snapshot_overview() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    spotfinder(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Best study spot:   Policy Sciences"))
        .stdout(predicate::str::contains("Climbing Wall"))
        .stdout(predicate::str::contains("Natatorium"));
}

#[test]
fn unreachable_source_degrades_to_empty_listing() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let missing = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write(
        missing.path(),
        format!(
            "[sources]\nrecreation_url = \"file:///definitely/not/here.json\"\nlibrary_url = \"{}\"\nevents_url = \"{}\"\n",
            fixture_url("library.json"),
            fixture_url("events.json"),
        ),
    )
    .unwrap();

    spotfinder(&missing)
        .arg("snapshot")
        .assert()
        .success()
        .stdout(predicate::str::contains("Recreation facilities: unavailable"))
        .stdout(predicate::str::contains("Evans Library"));
}

#[test]
fn unsupported_source_scheme_fails_at_startup() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write(file.path(), "[sources]\nlibrary_url = \"ftp://example.com/occupancy\"\n").unwrap();

    spotfinder(&file)
        .arg("snapshot")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported source location"));
}

#[test]
fn real_provider_without_key_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    reset_env();
    let config = config_file("");

    spotfinder(&config)
        .env("SPOTFINDER_LLM_PROVIDER", "gemini")
        .args(["ask", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SPOTFINDER_LLM_API_KEY"));
}
