//! CLI integration tests for the offline commands.
//!
//! Each test uses isolated temp directories, so tests can run in parallel.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};
use studytrack::store::{FileStore, SqliteStore, Store};
use studytrack::types::Username;

struct TestContext {
    legacy_dir: TempDir,
    data_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            legacy_dir: TempDir::new().expect("failed to create temp dir"),
            data_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir_str(&self) -> String {
        self.data_dir.path().to_string_lossy().to_string()
    }

    fn write_legacy(&self, name: &str, value: Value) {
        self.legacy_dir
            .child(name)
            .write_str(&value.to_string())
            .expect("write legacy file");
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("studytrack").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn migrate(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "migrate",
                "--legacy-dir",
                &self.legacy_dir.path().to_string_lossy(),
                "--data-dir",
                &self.data_dir_str(),
            ])
            .assert()
    }

    fn leaderboard_json(&self, backend: &str, limit: Option<usize>) -> Value {
        let mut cmd = self.cmd();
        cmd.args([
            "leaderboard",
            "--data-dir",
            &self.data_dir_str(),
            "--backend",
            backend,
            "--json",
        ]);
        if let Some(limit) = limit {
            cmd.args(["--limit", &limit.to_string()]);
        }

        let output = cmd.output().expect("failed to run command");
        assert!(output.status.success(), "leaderboard command failed");
        serde_json::from_slice(&output.stdout).expect("failed to parse JSON")
    }

    fn write_full_legacy_set(&self) {
        self.write_legacy(
            "users.json",
            json!([
                {"username": "alice", "email": "alice@example.com",
                 "password_hash": "$2y$10$abc", "registered_at": "2024-03-01T10:00:00+00:00"},
                {"username": "bob", "email": "bob@example.com", "password_hash": "$2y$10$def"},
                {"username": "", "email": "nobody@example.com", "password_hash": "x"}
            ]),
        );
        self.write_legacy(
            "leaderboard.json",
            json!([
                {"username": "alice", "score": 100, "rank": 1},
                {"username": "Bob", "total_score": 100},
                {"username": "carol", "score": 90},
                {"username": "alice", "score": 20}
            ]),
        );
        self.write_legacy(
            "progress.json",
            json!({"alice": {"t1": "mastered", "t2": "reviewing"}, "bob": {"t1": "confident"}}),
        );
        self.write_legacy(
            "subject.json",
            json!({"subjects": [{
                "subject_name": "Biotechnology",
                "units": [{
                    "unit_name": "Fermentation",
                    "topics": [
                        {"topicId": "t1", "topicName": "Bioreactors"},
                        {"topicId": "t2", "topicName": "Kinetics",
                         "subTopics": [{"topicId": "t3", "topicName": "Monod model"}]}
                    ]
                }]
            }]}),
        );
    }
}

#[test]
fn test_migrate_imports_legacy_data() {
    let ctx = TestContext::new();
    ctx.write_full_legacy_set();

    ctx.migrate()
        .success()
        .stdout(predicate::str::contains("leaderboard"))
        .stdout(predicate::str::contains("migrated"));

    let board = ctx.leaderboard_json("sqlite", None);
    assert_eq!(
        board,
        json!([
            {"username": "alice", "score": 100, "rank": 1},
            {"username": "Bob", "score": 100, "rank": 1},
            {"username": "carol", "score": 90, "rank": 3},
        ])
    );

    let store = SqliteStore::new(ctx.data_dir.path().join(SqliteStore::DB_FILE)).unwrap();
    let syllabus = store.load_syllabus().unwrap().expect("syllabus imported");
    assert_eq!(syllabus.topic_ids(), vec!["t1", "t2", "t3"]);

    let alice = Username::parse("alice").unwrap();
    assert!(store.get_user(&alice).unwrap().is_some());
    assert_eq!(store.get_progress(&alice).unwrap().len(), 2);
}

#[test]
fn test_migrate_twice_does_not_duplicate() {
    let ctx = TestContext::new();
    ctx.write_full_legacy_set();

    ctx.migrate().success();
    ctx.migrate()
        .success()
        .stdout(predicate::str::contains("already populated"));

    assert_eq!(ctx.leaderboard_json("sqlite", None).as_array().unwrap().len(), 3);
}

#[test]
fn test_migrate_reports_malformed_file() {
    let ctx = TestContext::new();
    ctx.legacy_dir
        .child("leaderboard.json")
        .write_str("[{\"username\": ")
        .unwrap();

    ctx.migrate()
        .failure()
        .stdout(predicate::str::contains("failed"))
        .stderr(predicate::str::contains("Migration finished with errors"));
}

#[test]
fn test_migrate_requires_legacy_dir() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args([
            "migrate",
            "--legacy-dir",
            "/nonexistent/legacy",
            "--data-dir",
            &ctx.data_dir_str(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Legacy directory not found"));
}

#[test]
fn test_leaderboard_reads_file_backend() {
    let ctx = TestContext::new();
    {
        let store = FileStore::new(ctx.data_dir.path(), None).unwrap();
        for (user, score) in [("dave", 7), ("erin", 12), ("fred", 7)] {
            store
                .upsert_if_higher(&Username::parse(user).unwrap(), score)
                .unwrap();
        }
    }

    let board = ctx.leaderboard_json("file", Some(2));
    assert_eq!(
        board,
        json!([
            {"username": "erin", "score": 12, "rank": 1},
            {"username": "dave", "score": 7, "rank": 2},
        ])
    );

    ctx.cmd()
        .args(["leaderboard", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("RANK"))
        .stdout(predicate::str::contains("fred"));
}

#[test]
fn test_leaderboard_empty() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["leaderboard", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No scores recorded yet."));
}

#[test]
fn test_leaderboard_refuses_legacy_file() {
    let ctx = TestContext::new();
    ctx.data_dir
        .child("leaderboard.json")
        .write_str(r#"[{"username": "gina", "score": 3, "rank": 1}]"#)
        .unwrap();

    ctx.cmd()
        .args(["leaderboard", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("studytrack migrate"));
}

#[test]
fn test_serve_flag_overrides_session_ttl_from_config() {
    let ctx = TestContext::new();
    let config = ctx.data_dir.child("studytrack.toml");
    config.write_str("session_ttl_hours = 24\n").unwrap();

    ctx.cmd()
        .args([
            "serve",
            "--config",
            &config.path().to_string_lossy(),
            "--session-ttl-hours",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("session_ttl_hours must be positive"));
}
