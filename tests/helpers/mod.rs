//! Shared fixtures and accessors for workflow generation tests

#![allow(dead_code)]

use gordo_workflow::core::{ConfigError, NormalizedConfig, PrefixTagResolver};
use gordo_workflow::{compile, render};
use serde_yaml::Value;

pub const PROJECT: &str = "test-project";

/// Three machines sharing a model and training window from the globals
pub const THREE_MACHINES: &str = r#"
machines:
  - name: ct-23-0001
    dataset:
      tags: [GRA-TE -23-0733.PV, GRA-TT -23-0719.PV]
  - name: ct-23-0002
    dataset:
      tags: [GRA-TT -23-0719.PV, GRA-YE -23-0751X.PV]
  - name: ct-23-0003
    dataset:
      tags: [ASGB.19ZT3950%2FY%2F10MIN]
globals:
  model:
    sklearn.decomposition.PCA:
      svd_solver: auto
  dataset:
    train_start_date: 2016-11-07T09:11:30+01:00
    train_end_date: 2017-11-07T09:11:30+01:00
"#;

/// Replace the `globals:` header of a fixture with extra global settings
pub fn with_globals(fixture: &str, extra: &str) -> String {
    fixture.replacen("globals:\n", &format!("globals:\n{}\n", extra), 1)
}

pub fn normalize(yaml: &str) -> Result<NormalizedConfig, ConfigError> {
    NormalizedConfig::from_yaml(yaml, PROJECT, &PrefixTagResolver::new())
}

/// Full pipeline from config text to rendered YAML
pub fn generate(yaml: &str) -> String {
    let config = normalize(yaml).unwrap();
    render(&compile(&config).unwrap()).unwrap()
}

/// Rendered workflow, parsed back into a document
pub fn workflow(yaml: &str) -> Value {
    serde_yaml::from_str(&generate(yaml)).unwrap()
}

pub fn templates(doc: &Value) -> Vec<&Value> {
    doc["spec"]["templates"].as_sequence().unwrap().iter().collect()
}

pub fn template<'a>(doc: &'a Value, name: &str) -> Option<&'a Value> {
    templates(doc).into_iter().find(|t| t["name"] == name)
}

pub fn task_names(doc: &Value) -> Vec<String> {
    template(doc, "do-all").unwrap()["dag"]["tasks"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

pub fn task_names_with_prefix(doc: &Value, prefix: &str) -> Vec<String> {
    task_names(doc)
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect()
}

/// Value of a task argument in the `do-all` DAG
pub fn argument(doc: &Value, task: &str, param: &str) -> String {
    let tasks = template(doc, "do-all").unwrap()["dag"]["tasks"].as_sequence().unwrap();
    let task = tasks.iter().find(|t| t["name"] == task).unwrap();
    task["arguments"]["parameters"]
        .as_sequence()
        .unwrap()
        .iter()
        .find(|p| p["name"] == param)
        .unwrap()["value"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Embedded manifest of a resource template
pub fn manifest(doc: &Value, name: &str) -> Value {
    let text = template(doc, name).unwrap()["resource"]["manifest"].as_str().unwrap();
    serde_yaml::from_str(text).unwrap()
}

/// Env of a container or script template, or of a manifest's first container
pub fn env(doc: &Value, name: &str) -> Vec<(String, String)> {
    let template = template(doc, name).unwrap();
    let entries = if let Some(c) = template.get("container") {
        c["env"].clone()
    } else if let Some(s) = template.get("script") {
        s["env"].clone()
    } else {
        manifest(doc, name)["spec"]["template"]["spec"]["containers"][0]["env"].clone()
    };
    entries
        .as_sequence()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["name"].as_str().unwrap().to_string(),
                e["value"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

pub fn env_value(doc: &Value, name: &str, key: &str) -> Option<String> {
    env(doc, name).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}
