use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde::Deserialize;
use std::{fs, path::Path, process::Command};

#[derive(Deserialize)]
#[allow(dead_code)]
struct Metadata {
    generation_type: String,
    mode: String,
    fallback_used: bool,
    applied: Vec<String>,
    errors: Vec<String>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct CheckOut {
    checked: usize,
    files: Vec<CheckFile>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct CheckFile {
    path: String,
    valid: bool,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct PathOut {
    input: String,
    valid: bool,
    kind: Option<String>,
    precedence: Option<u32>,
}

const BASELINE: &str =
    "<Root><Amount>0</Amount><PaymentInfo><CreditCard/><Cash/></PaymentInfo><OrderID/></Root>";

const CONFIG: &str = r#"{
  "schema": "s.xsd",
  "mode": "complete",
  "values": { "/Root/Amount": "42.00" },
  "patterns": { "*ID": "generate:uuid" },
  "choices": { "PaymentInfo": "CreditCard" }
}"#;

fn bin_cmd() -> Command {
    let mut cmd = Command::cargo_bin("xforge").expect("xforge built");
    // keep user-level xforge.toml out of the picture
    cmd.env("XDG_CONFIG_HOME", std::env::temp_dir().join("xforge-cli-tests"));
    cmd.env_remove("XFORGE_LOG_DIR");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    fs::write(&p, content).unwrap();
    p
}

#[test]
fn help_lists_commands() {
    bin_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply").and(predicate::str::contains("check")));
}

#[test]
fn apply_prints_enhanced_xml() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write(tmp.path(), "base.xml", BASELINE);
    let config = write(tmp.path(), "cfg.json", CONFIG);
    let meta = tmp.path().join("meta.json");

    let assert = bin_cmd()
        .current_dir(tmp.path())
        .args(["--quiet", "apply", "--compact", "--no-declaration", "--input"])
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .arg("--metadata")
        .arg(&meta)
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(out.contains("<Amount>42.00</Amount>"), "{out}");
    assert!(out.contains("<PaymentInfo><CreditCard/></PaymentInfo>"), "{out}");
    assert!(!out.contains("<Cash/>"));
    assert!(!out.contains("<OrderID/>"));

    let parsed: Metadata = serde_json::from_str(&fs::read_to_string(&meta).unwrap()).unwrap();
    assert_eq!(parsed.generation_type, "enhanced");
    assert_eq!(parsed.mode, "complete");
    assert!(!parsed.fallback_used);
    assert!(parsed.errors.is_empty());
}

#[test]
fn invalid_config_falls_back_unless_strict() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write(tmp.path(), "base.xml", BASELINE);
    let config = write(tmp.path(), "bad.json", r#"{ "mode": "sideways" }"#);

    bin_cmd()
        .current_dir(tmp.path())
        .args(["apply", "--compact", "--no-declaration", "--input"])
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("<Cash/>"))
        .stderr(predicate::str::contains("schema is required"));

    bin_cmd()
        .current_dir(tmp.path())
        .args(["--quiet", "apply", "--strict", "--input"])
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure();
}

#[test]
fn check_reports_each_file() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "good.json", CONFIG);
    write(tmp.path(), "bad.json", r#"{ "schema": "s", "mode": "complete", "values": { "a//b": "x" } }"#);

    let assert = bin_cmd()
        .current_dir(tmp.path())
        .args(["--quiet", "check", "--format", "json"])
        .arg(tmp.path())
        .assert()
        .failure();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let parsed: CheckOut = serde_json::from_str(&out).expect("valid json");
    assert_eq!(parsed.checked, 2);
    let bad = parsed.files.iter().find(|f| f.path.ends_with("bad.json")).unwrap();
    assert!(!bad.valid);
    assert_eq!(bad.errors.len(), 1);
    assert!(parsed.files.iter().any(|f| f.valid));

    bin_cmd()
        .current_dir(tmp.path())
        .args(["--quiet", "check"])
        .arg(tmp.path().join("good.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("good.json"));
}

#[test]
fn path_command_ranks_grammars() {
    let assert = bin_cmd()
        .args(["path", "--format", "json", "/Root/Order/Amount", "*Amount", "Order.Amount"])
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let parsed: Vec<PathOut> = serde_json::from_str(&out).unwrap();
    assert!(parsed.iter().all(|p| p.valid));
    assert_eq!(parsed[1].kind.as_deref(), Some("pattern"));
    assert!(parsed[0].precedence > parsed[2].precedence);
    assert!(parsed[2].precedence > parsed[1].precedence);
    assert_eq!(parsed[0].input, "/Root/Order/Amount");

    bin_cmd().args(["path", "{unterminated"]).assert().failure();
}

#[test]
fn templates_preview_cycles_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write(
        tmp.path(),
        "cfg.json",
        r#"{ "schema": "s", "mode": "complete",
             "templates": { "people": { "data": [ { "First": "Jane", "Last": "Doe" }, { "First": "Ola", "Last": "N" } ],
                                        "computed": { "Full": "concat(First, ' ', Last)" } } } }"#,
    );
    bin_cmd()
        .current_dir(tmp.path())
        .args(["templates", "--count", "3", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Full=Jane Doe").count(2));
}

#[cfg(unix)]
#[test]
fn generate_runs_the_baseline_command() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "base.xml", BASELINE);
    let config = write(tmp.path(), "cfg.json", CONFIG);

    // `sh -c 'cat base.xml' sh --xsd ...` ignores the appended arguments
    bin_cmd()
        .current_dir(tmp.path())
        .args(["--quiet", "generate", "--xsd", "s.xsd", "--compact", "--baseline-cmd", "sh"])
        .args(["--baseline-arg=-c", "--baseline-arg=cat base.xml", "--baseline-arg=sh"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("<Amount>42.00</Amount>"));
}

#[test]
fn schema_writes_report_schemas() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("schemas");
    bin_cmd()
        .current_dir(tmp.path())
        .args(["schema", "--out-dir"])
        .arg(&out)
        .assert()
        .success();
    assert!(out.join("generation_metadata.schema.json").is_file());
    assert!(out.join("config_check_report.schema.json").is_file());
}
