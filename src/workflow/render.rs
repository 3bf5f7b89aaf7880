//! Serializes a [`WorkflowGraph`] into the Argo `Workflow` document

use crate::workflow::compiler::{DO_ALL, PROJECT_LABEL};
use crate::workflow::dag::{DagTask, NamedValue, Payload, Template, TemplateBody, WorkflowGraph};
use crate::workflow::RenderError;
use serde_yaml::{Mapping, Value};
use tracing::debug;

pub const API_VERSION: &str = "argoproj.io/v1alpha1";
pub const MODELS_ANNOTATION: &str = "workflow-models";

/// Render the graph as a single YAML document.
///
/// Key order and task order are fixed, so the same graph always renders to
/// the same bytes.
pub fn render(graph: &WorkflowGraph) -> Result<String, RenderError> {
    let document = workflow_document(graph)?;
    let yaml = serde_yaml::to_string(&document)?;
    debug!("Rendered workflow for {} ({} bytes)", graph.project_name, yaml.len());
    Ok(yaml)
}

fn workflow_document(graph: &WorkflowGraph) -> Result<Value, RenderError> {
    let mut metadata = Mapping::new();
    metadata.insert("generateName".into(), format!("{}-", graph.project_name).into());
    metadata.insert("labels".into(), single(PROJECT_LABEL, graph.project_name.clone().into()));
    metadata.insert(
        "annotations".into(),
        single(MODELS_ANNOTATION, serde_yaml::to_string(&graph.machine_names)?.into()),
    );
    if let Some(refs) = &graph.owner_references {
        metadata.insert(
            "ownerReferences".into(),
            Value::Sequence(refs.iter().map(|r| r.to_value()).collect()),
        );
    }

    let mut templates = vec![do_all(graph)?];
    for template in &graph.templates {
        templates.push(template_value(template)?);
    }

    let mut spec = Mapping::new();
    spec.insert("entrypoint".into(), DO_ALL.into());
    spec.insert("templates".into(), Value::Sequence(templates));

    let mut doc = Mapping::new();
    doc.insert("apiVersion".into(), API_VERSION.into());
    doc.insert("kind".into(), "Workflow".into());
    doc.insert("metadata".into(), Value::Mapping(metadata));
    doc.insert("spec".into(), Value::Mapping(spec));
    Ok(Value::Mapping(doc))
}

fn do_all(graph: &WorkflowGraph) -> Result<Value, RenderError> {
    let tasks = graph
        .tasks
        .iter()
        .map(task_value)
        .collect::<Result<Vec<_>, _>>()?;

    let mut template = Mapping::new();
    template.insert("name".into(), DO_ALL.into());
    template.insert("dag".into(), single("tasks", Value::Sequence(tasks)));
    Ok(Value::Mapping(template))
}

fn task_value(task: &DagTask) -> Result<Value, RenderError> {
    let mut map = Mapping::new();
    map.insert("name".into(), task.name.clone().into());
    map.insert("template".into(), task.template.clone().into());
    if !task.dependencies.is_empty() {
        map.insert(
            "dependencies".into(),
            Value::Sequence(task.dependencies.iter().map(|d| d.clone().into()).collect()),
        );
    }
    if !task.arguments.is_empty() {
        map.insert("arguments".into(), single("parameters", named_values(&task.arguments)?));
    }
    Ok(Value::Mapping(map))
}

fn template_value(template: &Template) -> Result<Value, RenderError> {
    let mut map = Mapping::new();
    map.insert("name".into(), template.name.clone().into());

    if !template.labels.is_empty() {
        let labels: Mapping = template
            .labels
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect();
        map.insert("metadata".into(), single("labels", Value::Mapping(labels)));
    }

    if !template.inputs.is_empty() {
        let params = template
            .inputs
            .iter()
            .map(|name| single("name", name.clone().into()))
            .collect();
        map.insert("inputs".into(), single("parameters", Value::Sequence(params)));
    }

    match &template.body {
        TemplateBody::Container {
            image,
            command,
            env,
            resources,
        } => {
            let mut container = Mapping::new();
            container.insert("image".into(), image.clone().into());
            container.insert("command".into(), strings(command));
            container.insert("env".into(), named_values(env)?);
            container.insert("resources".into(), resources.to_value());
            map.insert("container".into(), Value::Mapping(container));
        }
        TemplateBody::Script {
            image,
            command,
            source,
            env,
            resources,
        } => {
            let mut script = Mapping::new();
            script.insert("image".into(), image.clone().into());
            script.insert("command".into(), strings(command));
            script.insert("source".into(), source.clone().into());
            script.insert("env".into(), named_values(env)?);
            if let Some(resources) = resources {
                script.insert("resources".into(), resources.to_value());
            }
            map.insert("script".into(), Value::Mapping(script));
        }
        TemplateBody::Resource { action, manifest } => {
            let mut resource = Mapping::new();
            resource.insert("action".into(), action.clone().into());
            resource.insert("manifest".into(), serde_yaml::to_string(manifest)?.into());
            map.insert("resource".into(), Value::Mapping(resource));
        }
    }

    Ok(Value::Mapping(map))
}

/// `[{name, value}]` with embedded documents serialized to strings
fn named_values(values: &[NamedValue]) -> Result<Value, RenderError> {
    let mut items = Vec::with_capacity(values.len());
    for item in values {
        let mut map = Mapping::new();
        map.insert("name".into(), item.name.clone().into());
        map.insert("value".into(), payload_string(&item.value)?.into());
        items.push(Value::Mapping(map));
    }
    Ok(Value::Sequence(items))
}

fn payload_string(payload: &Payload) -> Result<String, RenderError> {
    Ok(match payload {
        Payload::Text(s) => s.clone(),
        Payload::Yaml(value) => serde_yaml::to_string(value)?,
        Payload::Json(value) => serde_json::to_string(value)?,
    })
}

fn strings(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| s.clone().into()).collect())
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Mapping::new();
    map.insert(key.into(), value);
    Value::Mapping(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::NormalizedConfig;
    use crate::core::tags::PrefixTagResolver;
    use crate::workflow::compile;

    const CONFIG: &str = r#"
machines:
  - name: ct-23-0001
    dataset:
      tags: [GRA-TE -23-0733.PV, "tag with \"quotes\"", "single 'quoted'"]
    runtime:
      server:
        resources:
          requests: {memory: 121}
          limits: {memory: 100}
  - name: ct-23-0002
    dataset:
      tags: [GRA-TE -23-0733.PV]
globals:
  model:
    sklearn.pipeline.Pipeline:
      steps: [sklearn.preprocessing.MinMaxScaler, "gordo.machine.model.models.KerasAutoEncoder"]
  dataset:
    train_start_date: 2016-11-07T09:11:30+01:00
    train_end_date: 2017-11-07T09:11:30+01:00
"#;

    fn config() -> NormalizedConfig {
        NormalizedConfig::from_yaml(CONFIG, "test-project", &PrefixTagResolver::new()).unwrap()
    }

    fn rendered() -> Value {
        let config = config();
        let yaml = render(&compile(&config).unwrap()).unwrap();
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn templates(doc: &Value) -> &Vec<Value> {
        doc["spec"]["templates"].as_sequence().unwrap()
    }

    fn template<'a>(doc: &'a Value, name: &str) -> &'a Value {
        templates(doc).iter().find(|t| t["name"] == name).unwrap()
    }

    fn argument<'a>(doc: &'a Value, task: &str, param: &str) -> &'a str {
        let tasks = template(doc, DO_ALL)["dag"]["tasks"].as_sequence().unwrap();
        let task = tasks.iter().find(|t| t["name"] == task).unwrap();
        task["arguments"]["parameters"]
            .as_sequence()
            .unwrap()
            .iter()
            .find(|p| p["name"] == param)
            .unwrap()["value"]
            .as_str()
            .unwrap()
    }

    #[test]
    fn test_workflow_header() {
        let doc = rendered();
        assert_eq!(doc["apiVersion"], "argoproj.io/v1alpha1");
        assert_eq!(doc["kind"], "Workflow");
        assert_eq!(doc["metadata"]["generateName"], "test-project-");
        assert_eq!(doc["spec"]["entrypoint"], DO_ALL);
        assert_eq!(templates(&doc)[0]["name"], DO_ALL);
    }

    #[test]
    fn test_models_annotation_lists_machines() {
        let doc = rendered();
        let annotation = doc["metadata"]["annotations"][MODELS_ANNOTATION].as_str().unwrap();
        let names: Vec<String> = serde_yaml::from_str(annotation).unwrap();
        assert_eq!(names, vec!["ct-23-0001", "ct-23-0002"]);
    }

    #[test]
    fn test_machine_parameter_round_trips_tags() {
        let doc = rendered();
        let machine: Value =
            serde_yaml::from_str(argument(&doc, "model-builder-ct-23-0001", "machine")).unwrap();
        let tags: Vec<&str> = machine["dataset"]["tag_list"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["GRA-TE -23-0733.PV", "tag with \"quotes\"", "single 'quoted'"]);
    }

    #[test]
    fn test_model_config_is_json() {
        let doc = rendered();
        let model_config = argument(&doc, "model-builder-ct-23-0002", "model-config");
        let model: serde_json::Value = serde_json::from_str(model_config).unwrap();
        assert!(model.get("sklearn.pipeline.Pipeline").is_some());
    }

    #[test]
    fn test_server_limit_raised_to_request() {
        let doc = rendered();
        let manifest = template(&doc, "gordo-server-ct-23-0001")["resource"]["manifest"]
            .as_str()
            .unwrap();
        let manifest: Value = serde_yaml::from_str(manifest).unwrap();
        let resources = &manifest["spec"]["template"]["spec"]["containers"][0]["resources"];
        assert_eq!(resources["requests"]["memory"], "121M");
        assert_eq!(resources["limits"]["memory"], "121M");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let config = config();
        let graph = compile(&config).unwrap();
        assert_eq!(render(&graph).unwrap(), render(&graph).unwrap());
    }
}
