//! Smoke tests -- verify the binary runs and its subcommands behave.

use assert_cmd::Command;
use std::path::Path;

fn scriptbatch(config_dir: &Path) -> Command {
    let config = config_dir.join("scriptbatch.toml");
    std::fs::write(&config, "[notify]\nenabled = false\n").unwrap();

    let mut cmd = Command::cargo_bin("scriptbatch").unwrap();
    cmd.arg("--config").arg(config).env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("scriptbatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Run today's scheduled scripts"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("scriptbatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("scriptbatch"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["run", "plan", "exec"] {
        Command::cargo_bin("scriptbatch")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_plan_from_tasks_file() {
    let dir = tempfile::tempdir().unwrap();
    let tasks = dir.path().join("tasks.json");
    std::fs::write(
        &tasks,
        r#"{"result":[
            {"id":1,"script":"echo always"},
            {"id":2,"script":""},
            {"id":3,"script":"echo broken","frequency_type":"daily","extra_data":"{}"}
        ]}"#,
    )
    .unwrap();

    scriptbatch(dir.path())
        .args(["plan", "--json", "--tasks-file"])
        .arg(&tasks)
        .assert()
        .success()
        .stdout(predicates::str::contains("echo always"))
        .stdout(predicates::str::contains("\"dropped\": 1"))
        .stdout(predicates::str::contains("no deadline_at"));
}

#[test]
fn test_run_with_nothing_due() {
    let dir = tempfile::tempdir().unwrap();
    let tasks = dir.path().join("tasks.json");
    std::fs::write(
        &tasks,
        r#"[{"id":9,"script":"echo later","frequency_type":"specific_date","specific_date":"1999-01-01"}]"#,
    )
    .unwrap();
    let report = dir.path().join("report.html");

    scriptbatch(dir.path())
        .args(["run", "--tasks-file"])
        .arg(&tasks)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicates::str::contains("No runnable scripts."));
    assert!(!report.exists());
}

#[test]
fn test_run_fails_without_task_list() {
    let dir = tempfile::tempdir().unwrap();
    scriptbatch(dir.path())
        .args(["run", "--tasks-file"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to fetch task list"));
}

#[cfg(unix)]
#[test]
fn test_exec_writes_report_for_mixed_batch() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.sh");
    let second = dir.path().join("second.sh");
    std::fs::write(&first, "echo hello from first\necho '::set shared=yes'\n").unwrap();
    std::fs::write(
        &second,
        "echo \"context: $SCRIPTBATCH_CONTEXT\"\necho failing >&2\nexit 4\n",
    )
    .unwrap();
    let report = dir.path().join("out").join("report.html");

    scriptbatch(dir.path())
        .args(["exec", "--engine", "shell"])
        .arg(&first)
        .arg(&second)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicates::str::contains("1 succeeded, 1 failed"));

    let html = std::fs::read_to_string(&report).unwrap();
    assert!(html.contains("hello from first"));
    assert!(html.contains("script exited with status 4"));
    assert!(html.contains("context: {&quot;shared&quot;:&quot;yes&quot;}"));
}

#[test]
fn test_exec_runs_javascript_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.js");
    let second = dir.path().join("second.js");
    std::fs::write(&first, "this.user = { name: 'ada' };\nconsole.log('stored user');\n").unwrap();
    std::fs::write(
        &second,
        "console.warn('reading', this.user);\nreturn Promise.resolve(this.user.name.toUpperCase());\n",
    )
    .unwrap();
    let report = dir.path().join("report.html");
    let json_report = dir.path().join("report.json");

    scriptbatch(dir.path())
        .arg("exec")
        .arg(&first)
        .arg(&second)
        .arg("--report")
        .arg(&report)
        .arg("--json-report")
        .arg(&json_report)
        .assert()
        .success()
        .stdout(predicates::str::contains("2 succeeded, 0 failed"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_report).unwrap()).unwrap();
    assert_eq!(json["results"][1]["output"], serde_json::json!("ADA"));
    assert_eq!(
        json["results"][1]["logs"][0]["message"],
        serde_json::json!(r#"reading {"name":"ada"}"#)
    );
    assert!(std::fs::read_to_string(&report).unwrap().contains("stored user"));
}
