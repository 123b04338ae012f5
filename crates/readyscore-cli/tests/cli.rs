use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn readyscore(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_readyscore"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run readyscore")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn assess_writes_report_and_markdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("report.json");
    let markdown = dir.path().join("report.md");
    let log = dir.path().join("run.log");
    let input = fixture("customers.csv");
    let template = fixture("ml_training.yaml");

    let output = readyscore(&[
        "assess",
        input.to_str().expect("path"),
        "--template",
        template.to_str().expect("path"),
        "--as-of",
        "2024-06-15T00:00:00Z",
        "--out",
        out.to_str().expect("path"),
        "--markdown",
        markdown.to_str().expect("path"),
        "--log-file",
        log.to_str().expect("path"),
    ]);
    assert!(output.status.success(), "{output:?}");

    let summary = stdout(&output);
    assert!(summary.starts_with("customers: overall "));
    assert!(summary.contains("template ml_training_basic v1.2"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).expect("report")).expect("json");
    assert_eq!(report["source"]["name"], "customers");
    assert_eq!(report["as_of"], "2024-06-15T00:00:00");
    assert_eq!(report["template_evaluations"][0]["template_id"], "ml_training_basic");

    let markdown = std::fs::read_to_string(&markdown).expect("markdown");
    assert!(markdown.starts_with("# Data Readiness Report"));

    let log = std::fs::read_to_string(&log).expect("log");
    let first: serde_json::Value =
        serde_json::from_str(log.lines().next().expect("log line")).expect("json log line");
    assert_eq!(first["fields"]["event"], "run_started");
    assert!(log.contains("assessment_finished"));
}

#[test]
fn failed_gate_exits_with_status_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("report.json");
    let input = fixture("customers.csv");

    let output = readyscore(&[
        "assess",
        input.to_str().expect("path"),
        "--min-score",
        "99.99",
        "--out",
        out.to_str().expect("path"),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("gate failed: overall"));
    assert!(out.exists());
}

#[test]
fn missing_input_is_an_error() {
    let output = readyscore(&["assess", "does-not-exist.csv"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn rules_lists_builtin_catalog() {
    let output = readyscore(&["rules"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).lines().count(), 12);

    let output = readyscore(&["rules", "--dimension", "freshness"]);
    let listed = stdout(&output);
    assert_eq!(listed.lines().count(), 2);
    assert!(listed.lines().all(|line| line.starts_with("freshness.")));
}

#[test]
fn validate_template_reports_issues() {
    let good = fixture("ml_training.yaml");
    let output = readyscore(&["validate-template", good.to_str().expect("path")]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("template 'ml_training_basic' v1.2 is valid"));

    let broken = fixture("broken_template.yaml");
    let output = readyscore(&["validate-template", broken.to_str().expect("path")]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("out_of_range at /requirements/overall_minimum"));
    assert!(text.contains("invalid_expression"));
}

#[test]
fn template_schema_is_json() {
    let output = readyscore(&["template-schema"]);
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("schema");
    assert!(schema["properties"]["template"].is_object());
}
