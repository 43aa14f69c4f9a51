use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use predicates::str::contains;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const LOGIN_OK: &str = r#"{"body": {"token": "tok-1", "subscriber": {"subscriberId": "sub-1"}}}"#;

fn write_config(dir: &Path, url: &str) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        format!(
            "login_url: {url}/login\nquery_url: {url}/query\nheaders:\n  User-Agent: te-monitor-test\nrate_limit: 1\n"
        ),
    )
    .unwrap();
    path
}

/// A command isolated from the caller's TE_* variables and `.env` files.
fn te_monitor(cwd: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("te-monitor"));
    cmd.current_dir(cwd)
        .env_remove("TE_CONFIG")
        .env_remove("TE_INTERVAL")
        .env_remove("TE_ACCOUNT_ID")
        .env_remove("TE_PASSWORD")
        .env_remove("TE_NOTIFY_ID")
        .env("RUST_LOG", "info");
    cmd
}

#[test]
fn test_help_lists_flags() {
    let dir = tempdir().unwrap();
    te_monitor(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("--config"))
        .stdout(contains("--interval"))
        .stdout(contains("--acct-id"))
        .stdout(contains("--password"));
}

#[test]
fn test_missing_credentials_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    te_monitor(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--acct-id")
        .arg("12345678")
        .assert()
        .failure()
        .stderr(contains("Credentials not provided"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempdir().unwrap();

    te_monitor(dir.path())
        .args(["--config", "does-not-exist.yaml", "--acct-id", "1", "--password", "pw"])
        .assert()
        .failure()
        .stderr(contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "login_url: nope\nquery_url: https://example.com/q\n").unwrap();

    te_monitor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--acct-id", "1", "--password", "pw", "--metrics-port", "0"])
        .assert()
        .failure()
        .stderr(contains("login_url"));
}

#[test]
fn test_rejected_login_fails_startup() {
    let mut server = Server::new();
    let url = server.url();
    let login = server
        .mock("POST", "/login")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "acctId": "FBB12345678",
            "password": "pw"
        })))
        .with_status(401)
        .expect(1)
        .create();
    let query = server.mock("POST", "/query").expect(0).create();

    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), &url);

    te_monitor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--acct-id", "12345678", "--password", "pw", "--metrics-port", "0"])
        .assert()
        .failure()
        .stderr(contains("Initial authentication failed"));

    login.assert();
    query.assert();
}

#[test]
fn test_credentials_from_dotenv_file() {
    let mut server = Server::new();
    let url = server.url();
    let login = server
        .mock("POST", "/login")
        .match_header("user-agent", "te-monitor-test")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "acctId": "FBB55554444",
            "password": "from-dotenv"
        })))
        .with_status(200)
        .with_body(r#"{"body": {}}"#)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    write_config(dir.path(), &url);
    std::fs::write(
        dir.path().join(".env"),
        "TE_ACCOUNT_ID=55554444\nTE_PASSWORD=from-dotenv\n",
    )
    .unwrap();

    // Config defaults to ./config.yaml, credentials come from ./.env
    te_monitor(dir.path())
        .args(["--metrics-port", "0"])
        .assert()
        .failure()
        .stderr(contains("body.token"));

    login.assert();
}

#[cfg(unix)]
#[test]
fn test_interrupt_exits_cleanly() {
    let mut server = Server::new();
    let url = server.url();
    let login = server
        .mock("POST", "/login")
        .with_status(200)
        .with_body(LOGIN_OK)
        .expect(1)
        .create();
    let query = server
        .mock("POST", "/query")
        .match_header("csrftoken", "tok-1")
        .match_body(Matcher::Json(serde_json::json!({"subscriberId": "sub-1"})))
        .with_status(200)
        .with_body(r#"{"body": [{"total": 100, "remain": 25}]}"#)
        .expect_at_least(1)
        .create();

    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), &url);

    let mut child = std::process::Command::new(cargo::cargo_bin!("te-monitor"))
        .current_dir(dir.path())
        .env_remove("TE_NOTIFY_ID")
        .arg("--config")
        .arg(&config)
        .args(["--acct-id", "12345678", "--password", "pw", "--metrics-port", "0"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !query.matched() {
        assert!(Instant::now() < deadline, "monitor never queried usage");
        std::thread::sleep(Duration::from_millis(50));
    }

    let status = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(20);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("monitor did not exit after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    assert_eq!(exit.code(), Some(0));
    login.assert();
}
