//! Integration tests for the gordo-workflow binary

mod helpers;

use assert_cmd::Command;
use helpers::THREE_MACHINES;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn gordo_cmd() -> Command {
    Command::cargo_bin("gordo-workflow").unwrap()
}

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("config.yaml");
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_help_lists_commands() {
    gordo_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("unique-tags"));
}

#[test]
fn test_generate_to_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);

    gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("apiVersion: argoproj.io/v1alpha1"))
        .stdout(predicate::str::contains("generateName: my-project-"))
        .stdout(predicate::str::contains("model-builder-ct-23-0003"));
}

#[test]
fn test_generate_to_file_matches_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);
    let output = dir.path().join("workflow.yaml");

    let stdout = gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .output()
        .unwrap()
        .stdout;

    gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .arg("--output-file")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(fs::read(&output).unwrap(), stdout);
}

#[test]
fn test_generate_with_owner_references() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);

    gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .args([
            "--owner-references",
            "[{uid: abc-123, name: my-gordo, kind: Gordo, apiVersion: equinor.com/v1}]",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ownerReferences"))
        .stdout(predicate::str::contains("abc-123"));
}

#[test]
fn test_invalid_owner_references_fail() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);

    gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .args(["--owner-references", "[]"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("owner reference"));
}

#[test]
fn test_invalid_config_writes_no_output_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &THREE_MACHINES.replace("2016-11-07T09:11:30+01:00", "2016-11-07T09:11:30"),
    );
    let output = dir.path().join("workflow.yaml");

    gordo_cmd()
        .args(["generate", "--machine-config", &config, "--project-name", "my-project"])
        .arg("--output-file")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing timezone"));

    assert!(!output.exists());
}

#[test]
fn test_missing_config_file_fails() {
    gordo_cmd()
        .args([
            "generate",
            "--machine-config",
            "/nonexistent/config.yaml",
            "--project-name",
            "my-project",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load machine config"));
}

#[test]
fn test_unique_tags_to_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);

    gordo_cmd()
        .args(["unique-tags", "--machine-config", &config])
        .assert()
        .success()
        .stdout(
            "GRA-TE -23-0733.PV\nGRA-TT -23-0719.PV\nGRA-YE -23-0751X.PV\n\
             ASGB.19ZT3950%2FY%2F10MIN\n",
        );
}

#[test]
fn test_unique_tags_with_assets_to_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, THREE_MACHINES);
    let output = dir.path().join("tags.txt");

    gordo_cmd()
        .args(["unique-tags", "--machine-config", &config, "--with-assets"])
        .args(["--tag-asset", "GRA=1755-gra", "--default-asset", "unknown"])
        .arg("--output-file-tag-list")
        .arg(&output)
        .assert()
        .success();

    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(
        content,
        "GRA-TE -23-0733.PV\t1755-gra\n\
         GRA-TT -23-0719.PV\t1755-gra\n\
         GRA-YE -23-0751X.PV\t1755-gra\n\
         ASGB.19ZT3950%2FY%2F10MIN\tunknown\n"
    );
}
