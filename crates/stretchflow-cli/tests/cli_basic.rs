//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

struct Cli {
    data_dir: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            data_dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Run a CLI command and return (stdout, stderr, exit code).
    fn run(&self, args: &[&str]) -> (String, String, i32) {
        let output = Command::new(env!("CARGO_BIN_EXE_stretchflow-cli"))
            .args(args)
            .env("STRETCHFLOW_DATA_DIR", self.data_dir.path())
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .output()
            .expect("Failed to execute CLI command");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        (stdout, stderr, code)
    }

    fn run_success(&self, args: &[&str]) -> String {
        let (stdout, stderr, code) = self.run(args);
        assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
        stdout
    }

    fn write_routine(&self, name: &str, json: &str) -> PathBuf {
        let path = self.data_dir.path().join(name);
        std::fs::write(&path, json).expect("Failed to write routine");
        path
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("non-utf8 temp path")
}

const TINY_ROUTINE: &str = r#"{
    "title": "Tiny",
    "stretches": [
        {"name": "Reach", "duration": 2},
        {"name": "Twist", "durationSeconds": 2, "unilateral": true}
    ]
}"#;

#[test]
fn validate_accepts_good_routine() {
    let cli = Cli::new();
    let file = cli.write_routine("tiny.json", TINY_ROUTINE);
    let out = cli.run_success(&["session", "validate", path_str(&file)]);
    assert!(out.contains("'Tiny' has 2 steps"), "{out}");
}

#[test]
fn validate_rejects_empty_routine() {
    let cli = Cli::new();
    let file = cli.write_routine("empty.json", r#"{"title": "Nothing", "steps": []}"#);
    let (_, stderr, code) = cli.run(&["session", "validate", path_str(&file)]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn voice_status_starts_with_full_quota() {
    let cli = Cli::new();
    let out = cli.run_success(&["voice", "status"]);
    let status: serde_json::Value = serde_json::from_str(&out).expect("status is JSON");
    assert_eq!(status["premium"], false);
    assert_eq!(status["used"], 0);
    assert_eq!(status["remaining"], 3);
}

#[test]
fn streak_show_is_zero_on_fresh_install() {
    let cli = Cli::new();
    let out = cli.run_success(&["streak", "show"]);
    let summary: serde_json::Value = serde_json::from_str(&out).expect("summary is JSON");
    assert_eq!(summary["streak"], 0);
    assert_eq!(summary["next_milestone"], 3);
}

#[test]
fn config_set_and_get() {
    let cli = Cli::new();
    cli.run_success(&["config", "set", "voice.weekly_limit", "5"]);
    let out = cli.run_success(&["config", "get", "voice.weekly_limit"]);
    assert_eq!(out.trim(), "5");

    let (_, _, code) = cli.run(&["config", "get", "voice.nope"]);
    assert_eq!(code, 1);
}

#[test]
fn session_run_completes_and_counts_streak() {
    let cli = Cli::new();
    let file = cli.write_routine("tiny.json", TINY_ROUTINE);
    let (stdout, stderr, code) =
        cli.run(&["session", "run", path_str(&file), "--tick-ms", "1"]);
    assert_eq!(code, 0, "{stderr}");

    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("event line is JSON"))
        .collect();
    assert_eq!(events[0]["type"], "StepEntered");
    let finished = events
        .iter()
        .find(|e| e["type"] == "RoutineFinished")
        .expect("routine finished");
    // 2s + 10s rest + 2s
    assert_eq!(finished["elapsed_total_seconds"], 14);
    assert_eq!(events.last().unwrap()["type"], "CompletionRecorded");

    assert!(stderr.contains("[voice] Reach."), "{stderr}");
    assert!(stderr.contains("StretchFlow!"), "{stderr}");

    let out = cli.run_success(&["streak", "show"]);
    let summary: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(summary["streak"], 1);
    assert_eq!(summary["last_routine_title"], "Tiny");

    let out = cli.run_success(&["voice", "status"]);
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["used"], 2);
}

#[test]
fn session_run_exits_when_streak_cannot_be_saved() {
    let cli = Cli::new();
    // Creates the database and its kv table.
    cli.run_success(&["streak", "show"]);
    let conn = rusqlite::Connection::open(cli.data_dir.path().join("stretchflow.db"))
        .expect("Failed to open database");
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES ('stretchflow_user', '{oops')",
        [],
    )
    .expect("Failed to seed profile");
    drop(conn);

    let file = cli.write_routine("tiny.json", TINY_ROUTINE);
    let (stdout, stderr, code) =
        cli.run(&["session", "run", path_str(&file), "--tick-ms", "1", "--premium"]);
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("\"RoutineFinished\""), "{stdout}");
    let last: serde_json::Value =
        serde_json::from_str(stdout.lines().last().expect("no events")).unwrap();
    assert_eq!(last["type"], "CompletionFailed");
    assert!(stderr.contains("streak not saved"), "{stderr}");
}

#[test]
fn silent_preference_keeps_quota_untouched() {
    let cli = Cli::new();
    cli.run_success(&["voice", "silent", "on"]);
    let file = cli.write_routine("tiny.json", TINY_ROUTINE);
    let (_, stderr, code) = cli.run(&["session", "run", path_str(&file), "--tick-ms", "1"]);
    assert_eq!(code, 0, "{stderr}");
    assert!(!stderr.contains("[voice]"), "{stderr}");

    let out = cli.run_success(&["voice", "status"]);
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["used"], 0);
}
