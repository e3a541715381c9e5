#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};
use ulid::Ulid;

fn mastery_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mastery"))
}

fn mastery_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(mastery_binary_path());
    command.arg("--db").arg(db_path);
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to execute mastery command {:?}: {err}", args),
    }
}

fn remove_db(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

fn parse_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout json: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

#[test]
fn snapshot_attempt_json_v1() {
    let db_path =
        std::env::temp_dir().join(format!("mastery-snapshot-attempt-{}.sqlite3", Ulid::new()));

    let output = mastery_output(
        &db_path,
        &[
            "attempt",
            "--item",
            "水",
            "--type",
            "writing",
            "--wrong",
            "--at",
            "2026-02-07T12:00:00Z",
        ],
    );
    assert!(output.status.success());
    assert_eq!(
        parse_json(&output),
        json!({
            "item_id": "水",
            "score_type": "writing",
            "successes": 0,
            "failures": 1,
            "last_updated": "2026-02-07T12:00:00Z",
            "clamped_balance": 0
        })
    );

    remove_db(&db_path);
}

#[test]
fn snapshot_score_list_json_v1() {
    let db_path =
        std::env::temp_dir().join(format!("mastery-snapshot-list-{}.sqlite3", Ulid::new()));

    for (item, score_type) in [("い", "recognition"), ("あ", "recognition"), ("あ", "reading")] {
        let output = mastery_output(
            &db_path,
            &[
                "attempt",
                "--item",
                item,
                "--type",
                score_type,
                "--correct",
                "--at",
                "2026-02-07T12:00:00Z",
            ],
        );
        assert!(output.status.success());
    }

    let output = mastery_output(&db_path, &["score", "list", "--type", "recognition", "--json"]);
    assert!(output.status.success());
    assert_eq!(
        parse_json(&output),
        json!([
            {
                "item_id": "あ",
                "score_type": "recognition",
                "successes": 1,
                "failures": 0,
                "last_updated": "2026-02-07T12:00:00Z",
                "clamped_balance": 1
            },
            {
                "item_id": "い",
                "score_type": "recognition",
                "successes": 1,
                "failures": 0,
                "last_updated": "2026-02-07T12:00:00Z",
                "clamped_balance": 1
            }
        ])
    );

    remove_db(&db_path);
}

#[test]
fn snapshot_decay_status_on_fresh_store_v1() {
    let db_path =
        std::env::temp_dir().join(format!("mastery-snapshot-status-{}.sqlite3", Ulid::new()));

    let output = mastery_output(&db_path, &["decay", "status", "--json"]);
    assert!(output.status.success());
    assert_eq!(
        parse_json(&output),
        json!({
            "contract_version": "decay_status.v1",
            "active_policy_version": 1,
            "tracked_records": 0,
            "run_count": 0,
            "last_run": null
        })
    );

    remove_db(&db_path);
}

#[test]
fn snapshot_policy_show_v1() {
    let db_path =
        std::env::temp_dir().join(format!("mastery-snapshot-policy-{}.sqlite3", Ulid::new()));

    let output = mastery_output(&db_path, &["policy", "show"]);
    assert!(output.status.success());
    assert_eq!(
        parse_json(&output),
        json!({
            "policy_version": 1,
            "inactivity_threshold_days": 7,
            "decay_percent_per_period": 10,
            "max_decay_percent": 50
        })
    );

    remove_db(&db_path);
}

#[test]
fn snapshot_progress_json_v1() {
    let db_path =
        std::env::temp_dir().join(format!("mastery-snapshot-progress-{}.sqlite3", Ulid::new()));
    let catalog_path =
        std::env::temp_dir().join(format!("mastery-snapshot-catalog-{}.json", Ulid::new()));
    let catalog = json!({
        "hiragana": ["あ", "い"],
        "levels": {
            "sections": {
                "kana": {
                    "name": "Kana",
                    "sort_order": 1,
                    "levels": [{
                        "id": "hiragana",
                        "name": "Hiragana",
                        "sort_order": 1,
                        "global_step": 1,
                        "activities": {
                            "recognition": { "data_file": "hiragana", "enabled": true },
                            "writing": { "data_file": "hiragana", "enabled": false }
                        }
                    }]
                }
            }
        }
    });
    if let Err(err) = std::fs::write(&catalog_path, catalog.to_string()) {
        panic!("failed to write catalog: {err}");
    }

    for _ in 0..10 {
        let output = mastery_output(
            &db_path,
            &["attempt", "--item", "あ", "--type", "recognition", "--correct"],
        );
        assert!(output.status.success());
    }

    let catalog_arg = catalog_path.to_string_lossy().to_string();
    let output = mastery_output(
        &db_path,
        &["--catalog", catalog_arg.as_str(), "progress", "--json"],
    );
    assert!(output.status.success());
    assert_eq!(
        parse_json(&output),
        json!([{
            "level_id": "hiragana",
            "title": "Hiragana",
            "section": "Kana",
            "score_type": "recognition",
            "data_file": "hiragana",
            "percentage": 50.0,
            "sort_order": 1
        }])
    );

    remove_db(&db_path);
    let _ = std::fs::remove_file(&catalog_path);
}
