use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn geogate() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("geogate"));
    for var in [
        "GEOGATE_CONFIG",
        "GEOGATE_FORMAT",
        "GEOGATE_PROXY_URL",
        "GEOGATE_CACHE_DIR",
        "GEOGATE_BIND",
        "GEOGATE_DEBUG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_commands() {
    geogate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("hint"));
}

#[test]
fn version_prints_package_version() {
    geogate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cache_path_honours_env_override() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let cache_dir = temp.path().join("snapshots");

    geogate()
        .args(["cache", "path", "--config"])
        .arg(temp.path().join("absent.yaml"))
        .env("GEOGATE_CACHE_DIR", &cache_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(cache_dir.to_string_lossy().to_string()));

    Ok(())
}

#[test]
fn cache_path_reads_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");
    fs::write(&config_path, "cache:\n  dir: /srv/geogate-cache\n")?;

    geogate()
        .args(["cache", "path", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/geogate-cache"));

    Ok(())
}

#[test]
fn init_writes_config_and_refuses_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("nested").join("config.yaml");

    geogate()
        .args(["init", "--config"])
        .arg(&config_path)
        .assert()
        .success();

    let written = fs::read_to_string(&config_path)?;
    assert!(written.contains("min_interval_ms: 10000"));
    assert!(written.contains("default_radius_m: 3000"));

    geogate()
        .args(["init", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    geogate()
        .args(["init", "--force", "--config"])
        .arg(&config_path)
        .assert()
        .success();

    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");
    fs::write(&config_path, "hints:\n  default_radius_m: 50\n")?;

    geogate()
        .args(["cache", "path", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_radius_m"));

    Ok(())
}

#[test]
fn completion_bash_generates_script() {
    geogate()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("geogate"));
}

#[test]
fn hint_get_fails_without_proxy() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;

    geogate()
        .args(["hint", "get", "--lat", "42.36", "--lon", "-71.059", "--config"])
        .arg(temp.path().join("absent.yaml"))
        .args(["--proxy-url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn hint_get_reads_from_proxy() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _hint = server
        .mock("GET", "/radius-hint")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("lat".into(), "42.36".into()),
            mockito::Matcher::UrlEncoded("lon".into(), "-71.059".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"radius":1500}"#)
        .create();

    let temp = tempdir()?;
    let assert = geogate()
        .args(["--format", "json", "hint", "get", "--lat", "42.36", "--lon", "-71.059"])
        .arg("--config")
        .arg(temp.path().join("absent.yaml"))
        .args(["--proxy-url", &server.url()])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("\"radius\": 1500"));
    assert!(stdout.contains("\"meta\""));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn cache_stats_renders_proxy_counters() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _stats = server
        .mock("GET", "/cache/stats")
        .with_status(200)
        .with_body(
            r#"{
                "entries": 12,
                "radiusHints": 3,
                "hits": 9,
                "misses": 3,
                "hitRate": 0.75,
                "queueDepth": 0,
                "uniqueElements": 420,
                "opensky": { "requestsLast24h": 5, "remaining": 3595, "backoffLevel": 0 }
            }"#,
        )
        .create();

    let temp = tempdir()?;
    geogate()
        .args(["--format", "table", "cache", "stats", "--config"])
        .arg(temp.path().join("absent.yaml"))
        .args(["--proxy-url", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("75.0%"))
        .stdout(predicate::str::contains("3595"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn cache_clear_with_yes_skips_prompt() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let clear = server
        .mock("POST", "/cache/clear")
        .with_status(200)
        .with_body(r#"{"entries":4,"radiusHints":2,"uniqueElements":10}"#)
        .expect(1)
        .create();

    let temp = tempdir()?;
    geogate()
        .args(["cache", "clear", "--yes", "--config"])
        .arg(temp.path().join("absent.yaml"))
        .args(["--proxy-url", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 4 entries and 2 radius hints"));

    clear.assert();
    Ok(())
}
