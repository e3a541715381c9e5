use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use jsonschema::JSONSchema;
use serde_json::{json, Value};
use ulid::Ulid;

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn remove_db(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

fn read_json(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()))
}

fn schema_errors(schema_path: &Path, value: &Value) -> Vec<String> {
    let schema = read_json(schema_path);
    let compiled = JSONSchema::compile(&schema)
        .unwrap_or_else(|err| panic!("failed to compile {}: {err}", schema_path.display()));
    compiled
        .validate(value)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>())
        .unwrap_or_default()
}

fn assert_schema(schema_path: &Path, value: &Value) {
    let errors = schema_errors(schema_path, value);
    assert!(
        errors.is_empty(),
        "schema validation failed for {}:\n{}",
        schema_path.display(),
        errors.join("\n")
    );
}

fn run_mastery(db_path: &Path, args: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_mastery"))
        .arg("--db")
        .arg(db_path)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to run mastery {args:?}: {err}"));
    assert!(
        output.status.success(),
        "mastery {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|err| panic!("stdout of mastery {args:?} is not JSON: {err}"))
}

#[test]
fn backup_export_matches_contract_and_restores() {
    let repo = repo_root();
    let source_db = std::env::temp_dir().join(format!("mastery-backup-src-{}.sqlite3", Ulid::new()));
    let target_db = std::env::temp_dir().join(format!("mastery-backup-dst-{}.sqlite3", Ulid::new()));
    let backup_path = std::env::temp_dir().join(format!("mastery-backup-{}.json", Ulid::new()));

    for (item, score_type, flag) in [
        ("水", "reading", "--correct"),
        ("水", "writing", "--wrong"),
        ("は", "grammar", "--wrong"),
    ] {
        let _ = run_mastery(
            &source_db,
            &["attempt", "--item", item, "--type", score_type, flag],
        );
    }

    let backup = run_mastery(&source_db, &["backup", "export"]);
    assert_schema(&repo.join("contracts/backup/v1/backup.schema.json"), &backup);
    assert_eq!(backup["review_lists"]["Writing_List"], json!(["水"]));

    fs::write(&backup_path, backup.to_string())
        .unwrap_or_else(|err| panic!("failed to write backup: {err}"));
    let backup_arg = backup_path.to_string_lossy().to_string();
    let report = run_mastery(&target_db, &["backup", "restore", "--input", backup_arg.as_str()]);
    assert_eq!(report["restored_scores"], json!(3));
    assert_eq!(report["restored_review_items"], json!(2));
    assert_eq!(report["skipped"], json!([]));

    let restored = run_mastery(&target_db, &["backup", "export"]);
    assert_eq!(restored["scores"], backup["scores"]);
    assert_eq!(restored["review_lists"], backup["review_lists"]);

    remove_db(&source_db);
    remove_db(&target_db);
    let _ = fs::remove_file(&backup_path);
}

#[test]
fn backup_schema_rejects_foreign_payloads() {
    let schema = repo_root().join("contracts/backup/v1/backup.schema.json");
    let foreign = json!({
        "contract_version": "backup.v0",
        "exported_at": "2026-02-07T12:00:00+09:00",
        "scores": { "reading_水": "three-one" },
        "review_lists": { "Favorites": ["水"] }
    });
    assert!(schema_errors(&schema, &foreign).len() >= 4);
}

#[test]
fn decay_report_matches_contract() {
    let repo = repo_root();
    let db_path = std::env::temp_dir().join(format!("mastery-decay-contract-{}.sqlite3", Ulid::new()));

    let _ = run_mastery(
        &db_path,
        &[
            "attempt",
            "--item",
            "ア",
            "--type",
            "recognition",
            "--correct",
            "--at",
            "2026-01-01T00:00:00Z",
        ],
    );
    let changed = run_mastery(
        &db_path,
        &["decay", "run", "--at", "2026-03-01T00:00:00Z", "--json"],
    );
    let unchanged = run_mastery(
        &db_path,
        &["decay", "run", "--at", "2026-03-01T00:00:00Z", "--json"],
    );

    let schema = repo.join("contracts/decay/v1/decay-report.schema.json");
    assert_schema(&schema, &changed);
    assert_schema(&schema, &unchanged);
    assert!(changed["reminder"].is_string());
    assert!(unchanged["reminder"].is_null());

    remove_db(&db_path);
}
