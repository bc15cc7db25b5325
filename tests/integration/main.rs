//! Integration tests for the `langpref` CLI.

#![allow(clippy::unwrap_used)] // Tests can use unwrap for cleaner assertions

mod common;

use common::TestEnv;
use predicates::prelude::*;

/// Test that the CLI shows help.
#[test]
fn test_help() {
    let env = TestEnv::new();
    env.cmd().arg("--help").assert().success().stdout(predicate::str::contains("Usage: langpref"));
}

/// Test that the CLI shows version.
#[test]
fn test_version() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

/// Test that unrecognized commands fail.
#[test]
fn test_unknown_command() {
    let env = TestEnv::new();
    env.cmd().arg("unknown-command").assert().failure();
}

#[test]
fn test_resolve_maps_browser_region() {
    let env = TestEnv::new();
    env.cmd()
        .args(["resolve", "--lang", "zh-TW", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#))
        .stdout(predicate::str::contains(r#""source": "browser""#));
}

#[test]
fn test_resolve_unsupported_falls_back_to_default() {
    let env = TestEnv::new();
    env.cmd()
        .args(["resolve", "--lang", "fr-FR", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "en""#))
        .stdout(predicate::str::contains(r#""source": "default""#));
}

#[test]
fn test_resolve_rejects_prototype_probe() {
    let env = TestEnv::new();
    env.cmd()
        .args(["resolve", "--lang", "__proto__", "--lang", "constructor", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""source": "default""#));
}

#[test]
fn test_resolve_reads_accept_language() {
    let env = TestEnv::new();
    env.cmd()
        .args(["resolve", "--accept-language", "fr;q=0.9, zh-HK", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#));
}

#[test]
fn test_override_wins_over_browser_language() {
    let env = TestEnv::new();
    env.cmd().args(["override", "set", "zh"]).assert().success();
    env.cmd()
        .args(["override", "get", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""override": "zh""#));
    env.cmd()
        .args(["resolve", "--lang", "en-US", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#))
        .stdout(predicate::str::contains(r#""source": "user""#))
        .stdout(predicate::str::contains(r#""confidence": 1.0"#));

    env.cmd().args(["override", "clear"]).assert().success();
    env.cmd()
        .args(["resolve", "--lang", "en-US", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""source": "browser""#));
}

#[test]
fn test_override_rejects_unsupported_locale() {
    let env = TestEnv::new();
    env.cmd().args(["override", "set", "fr"]).assert().failure().code(2);
}

#[test]
fn test_history_add_clamps_confidence() {
    let env = TestEnv::new();
    env.cmd()
        .args(["history", "add", "zh", "--confidence", "5", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""confidence": 1.0"#));
    env.cmd()
        .args(["history", "add", "en", "--source", "browser", "--confidence", "-3", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""confidence": 0.0"#));
}

#[test]
fn test_empty_history_lists_nothing() {
    let env = TestEnv::new();
    env.cmd()
        .args(["history", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No records"));
}

#[test]
fn test_detect_records_history() {
    let env = TestEnv::new();
    env.cmd().args(["detect", "--lang", "zh-TW", "--meta", "page=home"]).assert().success();
    env.cmd()
        .args(["history", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#))
        .stdout(predicate::str::contains(r#""matched": "zh-TW""#))
        .stdout(predicate::str::contains(r#""page": "home""#));
    env.cmd()
        .args(["history", "search", "HOME", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#));
}

#[test]
fn test_history_filters() {
    let env = TestEnv::new();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd().args(["history", "add", "en", "--source", "default"]).assert().success();
    env.cmd()
        .args(["history", "list", "--locale", "en", "-o", "jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale":"en""#))
        .stdout(predicate::str::contains(r#""locale":"zh""#).not());
    env.cmd()
        .args(["history", "list", "--min-confidence", "0.9", "--max-confidence", "0.1"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_history_stats() {
    let env = TestEnv::new();
    for locale in ["zh", "zh", "en"] {
        env.cmd().args(["history", "add", locale]).assert().success();
    }
    env.cmd()
        .args(["history", "stats", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""total_records": 3"#))
        .stdout(predicate::str::contains(r#""most_frequent_locale": "zh""#));
}

#[test]
fn test_history_trends_output() {
    let env = TestEnv::new();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd()
        .args(["history", "trends", "--window", "3", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""window_days": 3"#))
        .stdout(predicate::str::contains(r#""direction""#));
}

#[test]
fn test_history_trends_rejects_huge_horizon() {
    let env = TestEnv::new();
    env.cmd()
        .args(["history", "trends", "--predict", "4000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--predict"));
    env.cmd()
        .args(["history", "trends", "--predict", "90", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""predicted_count""#));
}

#[test]
fn test_history_clear_is_idempotent() {
    let env = TestEnv::new();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd().args(["history", "clear", "--yes"]).assert().success();
    env.cmd().args(["history", "clear", "--yes"]).assert().success();
    env.cmd().args(["history", "list", "-o", "json"]).assert().success().stdout("[]\n");
}

#[test]
fn test_export_import_round_trip() {
    let env = TestEnv::new();
    let bundle = env.path("bundle.json");
    env.cmd().args(["override", "set", "zh"]).assert().success();
    env.cmd().args(["history", "add", "zh", "--meta", "page=pricing"]).assert().success();
    env.cmd().args(["export", "--file"]).arg(&bundle).assert().success();

    let contents = std::fs::read_to_string(&bundle).unwrap();
    assert!(contents.contains(r#""version": "1.0.0""#));
    assert!(contents.contains(r#""dataIntegrity""#));

    env.cmd().args(["reset", "--yes"]).assert().success();
    env.cmd().args(["history", "list", "-o", "json"]).assert().success().stdout("[]\n");

    env.cmd().arg("import").arg(&bundle).assert().success();
    env.cmd()
        .args(["history", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""page": "pricing""#));
    env.cmd()
        .args(["override", "get", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""override": "zh""#));
}

#[test]
fn test_import_rejects_foreign_version() {
    let env = TestEnv::new();
    let bundle = env.path("future.json");
    std::fs::write(&bundle, r#"{"version":"2.0.0","timestamp":0}"#).unwrap();
    env.cmd()
        .arg("import")
        .arg(&bundle)
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("2.0.0"));
}

#[test]
fn test_history_import_rejects_tampering() {
    let env = TestEnv::new();
    let bundle = env.path("history.json");
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd().args(["history", "export", "--file"]).arg(&bundle).assert().success();

    let tampered = std::fs::read_to_string(&bundle).unwrap().replace(r#""zh""#, r#""en""#);
    std::fs::write(&bundle, tampered).unwrap();

    env.cmd()
        .args(["history", "import"])
        .arg(&bundle)
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("checksum"));
}

#[test]
fn test_backup_lifecycle() {
    let env = TestEnv::new();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    let output = env.cmd().args(["backup", "create", "nightly"]).output().unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(id.starts_with("nightly-"));

    env.cmd()
        .args(["backup", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "nightly""#));

    env.cmd().args(["history", "clear", "--yes"]).assert().success();
    env.cmd().args(["backup", "restore", &id, "--yes"]).assert().success();
    env.cmd()
        .args(["history", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#));

    env.cmd().args(["backup", "delete", &id, "--yes"]).assert().success();
    env.cmd().args(["backup", "list"]).assert().success().stderr(predicate::str::contains("No backups"));
}

#[test]
fn test_backup_errors() {
    let env = TestEnv::new();
    env.cmd().args(["backup", "create", "bad name!"]).assert().failure().code(2);
    env.cmd().args(["backup", "restore", "missing-1", "--yes"]).assert().failure().code(5);
}

#[test]
fn test_corrupt_history_reads_empty_but_fails_verify() {
    let env = TestEnv::new();
    env.write_local_store(r#"{"langpref.detection_history": "not json"}"#);
    env.cmd()
        .args(["history", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No records"));
    env.cmd()
        .args(["history", "verify"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("history verify"));
}

#[test]
fn test_status_reports_backends() {
    let env = TestEnv::new();
    env.cmd()
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "local""#))
        .stdout(predicate::str::contains(r#""name": "cookie""#))
        .stdout(predicate::str::contains(r#""history_cap": 50"#));
}

#[test]
fn test_project_config_sets_default_locale() {
    let env = TestEnv::new();
    env.write_project_config("detection:\n  default_locale: zh\nhistory:\n  max_records: 2\n");
    env.cmd()
        .args(["resolve", "--lang", "fr", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale": "zh""#));
    for _ in 0..3 {
        env.cmd().args(["history", "add", "en"]).assert().success();
    }
    env.cmd()
        .args(["history", "verify", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""record_count": 2"#))
        .stdout(predicate::str::contains(r#""total_count": 3"#));
}

#[test]
fn test_invalid_config_is_rejected() {
    let env = TestEnv::new();
    env.write_project_config("detection:\n  default_locale: fr\n");
    env.cmd().args(["status"]).assert().failure().code(2);
}

#[test]
fn test_state_dir_flag() {
    let env = TestEnv::new();
    let custom = env.path("custom-state");
    env.cmd().args(["override", "set", "zh", "--state-dir"]).arg(&custom).assert().success();
    assert!(custom.join("local-storage.json").exists());
    assert!(custom.join("cookies.json").exists());
}

#[test]
fn test_cookie_headers() {
    let env = TestEnv::new();
    env.cmd().args(["override", "set", "zh"]).assert().success();
    env.cmd()
        .args(["cookie", "headers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set-Cookie: langpref.user_override="))
        .stdout(predicate::str::contains("SameSite=Lax"));
}

#[test]
fn test_maintain() {
    let env = TestEnv::new();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd().args(["history", "add", "zh"]).assert().success();
    env.cmd()
        .args(["maintain", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""deduplicated""#));
    env.cmd()
        .args(["history", "list", "-o", "jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""locale":"zh""#).count(1));
}

/// Test completion generation.
#[test]
fn test_completion_bash() {
    let env = TestEnv::new();
    env.cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("langpref"));
}
