use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn courtside(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("courtside"));
    cmd.arg("--config")
        .arg(dir.join("config.yaml"))
        .arg("--data-dir")
        .arg(dir.join("data"))
        .env_remove("COURTSIDE_CONFIG")
        .env_remove("COURTSIDE_DATA_DIR")
        .env_remove("COURTSIDE_API_HOST")
        .env_remove("COURTSIDE_FORMAT");
    cmd
}

#[test]
fn version_prints_package_version() -> Result<(), Box<dyn std::error::Error>> {
    Command::new(assert_cmd::cargo::cargo_bin!("courtside"))
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn status_on_empty_store_works_offline() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;

    courtside(temp.path())
        .arg("status")
        // Nothing listens here; status must not need the network
        .arg("--api-host")
        .arg("http://127.0.0.1:1")
        .assert()
        .success()
        .stdout(predicate::str::contains("never been refreshed"))
        .stdout(predicate::str::contains("all_players"))
        .stdout(predicate::str::contains("trending_drop"));

    assert!(temp.path().join("data").join("snapshots.db").exists());
    Ok(())
}

#[test]
fn status_json_has_envelope() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;

    let assert = courtside(temp.path())
        .arg("status")
        .arg("--format")
        .arg("json")
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout)?;
    assert!(parsed["data"]["last_refresh"].is_null());
    assert_eq!(parsed["data"]["is_refreshing"], false);
    assert_eq!(parsed["data"]["datasets"].as_array().map(Vec::len), Some(3));
    assert_eq!(parsed["data"]["timezone"], "America/New_York");
    assert!(parsed["meta"]["version"].is_string());
    Ok(())
}

#[test]
fn status_uses_timezone_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    fs::write(
        temp.path().join("config.yaml"),
        "refresh:\n  time_of_day: \"04:30\"\n  timezone: Europe/London\n",
    )?;

    courtside(temp.path())
        .arg("status")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("Europe/London"));
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    fs::write(
        temp.path().join("config.yaml"),
        "refresh:\n  timezone: Mars/Olympus\n",
    )?;

    courtside(temp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Mars/Olympus"));
    Ok(())
}

#[test]
fn unknown_dataset_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;

    courtside(temp.path())
        .arg("dataset")
        .arg("injuries")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown dataset 'injuries'"));
    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn refresh_then_read_dataset() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let api_host = server.url();

    let players = server
        .mock("GET", "/players/nfl")
        .with_status(200)
        .with_body(r#"{"4046": {"full_name": "Patrick Mahomes", "position": "QB"}}"#)
        .expect(1)
        .create();
    let _adds = server
        .mock("GET", "/players/nfl/trending/add")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"player_id": "4046", "count": 1200}]"#)
        .create();
    let _drops = server
        .mock("GET", "/players/nfl/trending/drop")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let temp = tempdir()?;

    courtside(temp.path())
        .arg("refresh")
        .arg("--api-host")
        .arg(&api_host)
        .assert()
        .success()
        .stdout(predicate::str::contains("Refreshed 3 datasets"));

    // Served from the store; the mock expects exactly one players fetch
    courtside(temp.path())
        .arg("dataset")
        .arg("all_players")
        .arg("--api-host")
        .arg(&api_host)
        .assert()
        .success()
        .stdout(predicate::str::contains("Patrick Mahomes"));

    players.assert();
    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn failed_refresh_exits_with_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let api_host = server.url();

    let _players = server
        .mock("GET", "/players/nfl")
        .with_status(404)
        .with_body("sport not found")
        .create();
    let _trending = server
        .mock("GET", mockito::Matcher::Regex(r"^/players/nfl/trending/".to_string()))
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let temp = tempdir()?;

    courtside(temp.path())
        .arg("refresh")
        .arg("--api-host")
        .arg(&api_host)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    courtside(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("never been refreshed"));
    Ok(())
}
