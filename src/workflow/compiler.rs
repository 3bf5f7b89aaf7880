//! Compiles a normalized config into the `do-all` workflow graph
//!
//! Per machine `m`, in config order:
//!
//! ```text
//! model-builder-m --> gordo-server-m --> gordo-client-waiter --> gordo-client-m
//! influx-cleanup  --> gordo-influx-m -------------------------------^
//! ```
//!
//! The metrics sidecar (`gordo-influx-m`) and the client exist only when the
//! machine has influx enabled; the waiter exists only if any client does.

use crate::core::config::NormalizedConfig;
use crate::core::machine::{is_dns_label, MachineSpec};
use crate::workflow::dag::{
    DagTask, NamedValue, Payload, TaskKind, Template, TemplateBody, WorkflowGraph,
};
use crate::workflow::CompileError;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

pub const DO_ALL: &str = "do-all";
pub const METRICS_CLEANUP: &str = "influx-cleanup";
pub const CLIENT_WAITER: &str = "gordo-client-waiter";

pub const PROJECT_LABEL: &str = "gordo/project-name";
pub const MACHINE_LABEL: &str = "gordo/machine-name";
pub const COMPONENT_LABEL: &str = "gordo/component";

const INFLUX_IMAGE: &str = "influxdb:1.7-alpine";
const INFLUX_PORT: u64 = 8086;
const SERVER_PORT: u64 = 5555;

pub fn model_builder_task(machine: &str) -> String {
    format!("model-builder-{}", machine)
}

pub fn server_task(machine: &str) -> String {
    format!("gordo-server-{}", machine)
}

pub fn metrics_sidecar_task(machine: &str) -> String {
    format!("gordo-influx-{}", machine)
}

pub fn client_task(machine: &str) -> String {
    format!("gordo-client-{}", machine)
}

/// Build the workflow graph for every machine of a normalized config
pub fn compile(config: &NormalizedConfig) -> Result<WorkflowGraph, CompileError> {
    let mut builder = GraphBuilder::new(config);

    builder.add_metrics_cleanup();
    for machine in &config.machines {
        check_machine(machine, &config.project_name)?;
        builder.add_machine(machine);
    }
    builder.add_client_waiter();

    let graph = builder.finish();
    graph.validate()?;

    info!(
        "Compiled {} task(s) for {} machine(s) in project {}",
        graph.tasks.len(),
        graph.machine_names.len(),
        graph.project_name
    );
    Ok(graph)
}

/// Reject machines that could not have come out of normalization
fn check_machine(machine: &MachineSpec, project_name: &str) -> Result<(), CompileError> {
    if !is_dns_label(&machine.name) {
        return Err(CompileError::IncompleteSpecification(format!(
            "machine name '{}' is not normalized",
            machine.name
        )));
    }
    if machine.dataset.tags.is_empty() {
        return Err(CompileError::IncompleteSpecification(format!(
            "machine '{}' has no resolved tags",
            machine.name
        )));
    }
    if machine.project_name != project_name {
        return Err(CompileError::IncompleteSpecification(format!(
            "machine '{}' belongs to project '{}', not '{}'",
            machine.name, machine.project_name, project_name
        )));
    }
    Ok(())
}

struct GraphBuilder<'a> {
    config: &'a NormalizedConfig,
    tasks: Vec<DagTask>,
    templates: Vec<Template>,
    /// Server tasks the client waiter has to wait for
    waiter_dependencies: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    fn new(config: &'a NormalizedConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            templates: Vec::new(),
            waiter_dependencies: Vec::new(),
        }
    }

    fn project(&self) -> &'a str {
        &self.config.project_name
    }

    /// Log level for the shared tasks, which belong to no machine
    fn log_level_env(&self) -> NamedValue {
        NamedValue::new("GORDO_LOG_LEVEL", self.config.globals.runtime.log_level.to_string())
    }

    fn push(&mut self, task: DagTask, template: Template) {
        self.tasks.push(task);
        self.templates.push(template);
    }

    fn add_machine(&mut self, machine: &MachineSpec) {
        debug!(
            "Compiling machine {} (metrics sidecar: {})",
            machine.name, machine.runtime.influx_enabled
        );

        self.add_model_builder(machine);
        self.add_server(machine);
        if machine.runtime.influx_enabled {
            self.add_metrics_sidecar(machine);
            self.add_client(machine);
        }
    }

    fn add_model_builder(&mut self, machine: &MachineSpec) {
        let name = model_builder_task(&machine.name);
        let arguments = vec![
            NamedValue::new("machine-name", machine.name.as_str()),
            NamedValue::new("machine", Payload::Yaml(machine.to_value())),
            NamedValue::new("model-config", Payload::Json(machine.model.clone())),
            NamedValue::new("project-name", self.project()),
            NamedValue::new("log-level", machine.runtime.log_level.to_string()),
        ];

        let env = vec![
            NamedValue::new("MACHINE_NAME", input("machine-name")),
            NamedValue::new("MACHINE", input("machine")),
            NamedValue::new("MODEL_CONFIG", input("model-config")),
            NamedValue::new("PROJECT_NAME", input("project-name")),
            NamedValue::new(
                "OUTPUT_DIR",
                format!("/gordo/models/{}/{}", self.project(), machine.name),
            ),
            NamedValue::new("GORDO_LOG_LEVEL", machine.runtime.log_level.to_string()),
        ];

        let template = Template {
            name: name.clone(),
            inputs: arguments.iter().map(|a| a.name.clone()).collect(),
            labels: self.labels(Some(machine.name.as_str()), "builder"),
            body: TemplateBody::Container {
                image: self.config.globals.images.image("gordo-model-builder"),
                command: vec!["gordo".to_string(), "build".to_string()],
                env,
                resources: machine.runtime.builder.clone(),
            },
        };

        self.push(
            DagTask {
                name: name.clone(),
                kind: TaskKind::ModelBuilder,
                template: name,
                dependencies: vec![],
                arguments,
            },
            template,
        );
    }

    fn add_server(&mut self, machine: &MachineSpec) {
        let name = server_task(&machine.name);
        let labels = self.label_map(Some(machine.name.as_str()), "server");

        let container = map(vec![
            ("name", "gordo-server".into()),
            ("image", self.config.globals.images.image("gordo-model-server").into()),
            (
                "env",
                env_list(&[
                    ("PROJECT_NAME", self.project().to_string()),
                    ("MACHINE_NAME", machine.name.clone()),
                    (
                        "MODEL_COLLECTION_DIR",
                        format!("/gordo/models/{}", self.project()),
                    ),
                    ("GORDO_LOG_LEVEL", machine.runtime.log_level.to_string()),
                ]),
            ),
            ("ports", Value::Sequence(vec![map(vec![("containerPort", SERVER_PORT.into())])])),
            ("resources", machine.runtime.server.to_value()),
        ]);

        let manifest = map(vec![
            ("apiVersion", "apps/v1".into()),
            ("kind", "Deployment".into()),
            ("metadata", self.object_metadata(&name, &labels)),
            (
                "spec",
                map(vec![
                    ("replicas", 1u64.into()),
                    ("selector", map(vec![("matchLabels", Value::Mapping(labels.clone()))])),
                    (
                        "template",
                        map(vec![
                            ("metadata", map(vec![("labels", Value::Mapping(labels))])),
                            ("spec", map(vec![("containers", Value::Sequence(vec![container]))])),
                        ]),
                    ),
                ]),
            ),
        ]);

        let dependencies = vec![model_builder_task(&machine.name)];
        self.push_resource(&name, TaskKind::Server, dependencies, manifest);
    }

    fn add_metrics_sidecar(&mut self, machine: &MachineSpec) {
        let name = metrics_sidecar_task(&machine.name);
        let labels = self.label_map(Some(machine.name.as_str()), "influx");

        let container = map(vec![
            ("name", "influxdb".into()),
            ("image", INFLUX_IMAGE.into()),
            (
                "env",
                env_list(&[
                    ("INFLUXDB_DB", self.project().to_string()),
                    ("GORDO_LOG_LEVEL", machine.runtime.log_level.to_string()),
                ]),
            ),
            ("ports", Value::Sequence(vec![map(vec![("containerPort", INFLUX_PORT.into())])])),
            ("resources", machine.runtime.influx.to_value()),
        ]);

        let manifest = map(vec![
            ("apiVersion", "apps/v1".into()),
            ("kind", "StatefulSet".into()),
            ("metadata", self.object_metadata(&name, &labels)),
            (
                "spec",
                map(vec![
                    ("serviceName", name.clone().into()),
                    ("replicas", 1u64.into()),
                    ("selector", map(vec![("matchLabels", Value::Mapping(labels.clone()))])),
                    (
                        "template",
                        map(vec![
                            ("metadata", map(vec![("labels", Value::Mapping(labels))])),
                            ("spec", map(vec![("containers", Value::Sequence(vec![container]))])),
                        ]),
                    ),
                ]),
            ),
        ]);

        let dependencies = vec![METRICS_CLEANUP.to_string()];
        self.push_resource(&name, TaskKind::MetricsSidecar, dependencies, manifest);
    }

    fn add_client(&mut self, machine: &MachineSpec) {
        let name = client_task(&machine.name);
        let arguments = vec![
            NamedValue::new("machine-name", machine.name.as_str()),
            NamedValue::new(
                "data-provider",
                Payload::Json(machine.dataset.data_provider.to_value()),
            ),
        ];

        let env = vec![
            NamedValue::new("PROJECT_NAME", self.project()),
            NamedValue::new("MACHINE_NAME", input("machine-name")),
            NamedValue::new("DATA_PROVIDER", input("data-provider")),
            NamedValue::new("TRAIN_START_DATE", machine.dataset.train_start_date.to_rfc3339()),
            NamedValue::new("TRAIN_END_DATE", machine.dataset.train_end_date.to_rfc3339()),
            NamedValue::new(
                "INFLUX_URI",
                format!(
                    "{}:{}/{}",
                    metrics_sidecar_task(&machine.name),
                    INFLUX_PORT,
                    self.project()
                ),
            ),
            NamedValue::new("GORDO_LOG_LEVEL", machine.runtime.log_level.to_string()),
        ];

        let source = r#"gordo client --project "$PROJECT_NAME" --target "$MACHINE_NAME" predict \
  --data-provider "$DATA_PROVIDER" \
  --influx-uri "$INFLUX_URI" \
  "$TRAIN_START_DATE" "$TRAIN_END_DATE"
"#;

        let template = Template {
            name: name.clone(),
            inputs: arguments.iter().map(|a| a.name.clone()).collect(),
            labels: self.labels(Some(machine.name.as_str()), "client"),
            body: TemplateBody::Script {
                image: self.config.globals.images.image("gordo-client"),
                command: vec!["bash".to_string()],
                source: source.to_string(),
                env,
                resources: Some(machine.runtime.client.clone()),
            },
        };

        self.waiter_dependencies.push(server_task(&machine.name));
        self.push(
            DagTask {
                name: name.clone(),
                kind: TaskKind::Client,
                template: name,
                dependencies: vec![CLIENT_WAITER.to_string(), metrics_sidecar_task(&machine.name)],
                arguments,
            },
            template,
        );
    }

    /// Always present: removes metrics stores of machines no longer in the project
    fn add_metrics_cleanup(&mut self) {
        let enabled: Vec<&str> = self
            .config
            .machines
            .iter()
            .filter(|m| m.runtime.influx_enabled)
            .map(|m| m.name.as_str())
            .collect();

        let mut selector =
            format!("{}={},{}=influx", PROJECT_LABEL, self.project(), COMPONENT_LABEL);
        if !enabled.is_empty() {
            selector.push_str(&format!(",{} notin ({})", MACHINE_LABEL, enabled.join(",")));
        }

        let source = r#"kubectl delete statefulset -l "$INFLUX_SELECTOR" --ignore-not-found
"#;

        let template = Template {
            name: METRICS_CLEANUP.to_string(),
            inputs: vec![],
            labels: self.labels(None, "influx-cleanup"),
            body: TemplateBody::Script {
                image: self.config.globals.images.image("gordo-deploy"),
                command: vec!["bash".to_string()],
                source: source.to_string(),
                env: vec![
                    NamedValue::new("PROJECT_NAME", self.project()),
                    NamedValue::new("INFLUX_SELECTOR", selector),
                    self.log_level_env(),
                ],
                resources: None,
            },
        };

        self.push(
            DagTask {
                name: METRICS_CLEANUP.to_string(),
                kind: TaskKind::MetricsCleanup,
                template: METRICS_CLEANUP.to_string(),
                dependencies: vec![],
                arguments: vec![],
            },
            template,
        );
    }

    /// Shared gate in front of all clients; only present if some client is
    fn add_client_waiter(&mut self) {
        if self.waiter_dependencies.is_empty() {
            return;
        }

        let source = format!(
            r#"until [ "$(kubectl get pods -l {}=$PROJECT_NAME,{}=client \
    --field-selector=status.phase=Running \
    --no-headers 2>/dev/null | wc -l)" -lt "$GORDO_MAX_CLIENTS" ]; do
  echo "Waiting for running clients to drop below $GORDO_MAX_CLIENTS"
  sleep 10
done
"#,
            PROJECT_LABEL, COMPONENT_LABEL
        );

        let template = Template {
            name: CLIENT_WAITER.to_string(),
            inputs: vec![],
            labels: self.labels(None, "client-waiter"),
            body: TemplateBody::Script {
                image: self.config.globals.images.image("gordo-deploy"),
                command: vec!["bash".to_string()],
                source,
                env: vec![
                    NamedValue::new("PROJECT_NAME", self.project()),
                    NamedValue::new(
                        "GORDO_MAX_CLIENTS",
                        self.config.globals.max_clients.to_string(),
                    ),
                    self.log_level_env(),
                ],
                resources: None,
            },
        };

        let dependencies = std::mem::take(&mut self.waiter_dependencies);
        self.push(
            DagTask {
                name: CLIENT_WAITER.to_string(),
                kind: TaskKind::ClientWaiter,
                template: CLIENT_WAITER.to_string(),
                dependencies,
                arguments: vec![],
            },
            template,
        );
    }

    fn push_resource(
        &mut self,
        name: &str,
        kind: TaskKind,
        dependencies: Vec<String>,
        manifest: Value,
    ) {
        let template = Template {
            name: name.to_string(),
            inputs: vec![],
            labels: vec![],
            body: TemplateBody::Resource {
                action: "apply".to_string(),
                manifest,
            },
        };
        self.push(
            DagTask {
                name: name.to_string(),
                kind,
                template: name.to_string(),
                dependencies,
                arguments: vec![],
            },
            template,
        );
    }

    fn labels(&self, machine: Option<&str>, component: &str) -> Vec<(String, String)> {
        let mut labels = vec![(PROJECT_LABEL.to_string(), self.project().to_string())];
        if let Some(machine) = machine {
            labels.push((MACHINE_LABEL.to_string(), machine.to_string()));
        }
        labels.push((COMPONENT_LABEL.to_string(), component.to_string()));
        labels
    }

    fn label_map(&self, machine: Option<&str>, component: &str) -> Mapping {
        self.labels(machine, component)
            .into_iter()
            .map(|(k, v)| (Value::String(k), Value::String(v)))
            .collect()
    }

    fn object_metadata(&self, name: &str, labels: &Mapping) -> Value {
        let mut entries = vec![
            ("name", Value::from(name)),
            ("labels", Value::Mapping(labels.clone())),
        ];
        if let Some(refs) = &self.config.globals.owner_references {
            entries.push((
                "ownerReferences",
                Value::Sequence(refs.iter().map(|r| r.to_value()).collect()),
            ));
        }
        map(entries)
    }

    fn finish(self) -> WorkflowGraph {
        WorkflowGraph {
            project_name: self.config.project_name.clone(),
            machine_names: self.config.machines.iter().map(|m| m.name.clone()).collect(),
            owner_references: self.config.globals.owner_references.clone(),
            tasks: self.tasks,
            templates: self.templates,
        }
    }
}

/// Reference to a template input parameter
fn input(name: &str) -> String {
    format!("{{{{inputs.parameters.{}}}}}", name)
}

/// Ordered mapping from string keys
fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Mapping(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

fn env_list(pairs: &[(&str, String)]) -> Value {
    Value::Sequence(
        pairs
            .iter()
            .map(|(name, value)| {
                map(vec![("name", Value::from(*name)), ("value", value.clone().into())])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::RESERVED_MACHINE_NAMES;
    use crate::core::tags::PrefixTagResolver;

    fn config(yaml: &str) -> NormalizedConfig {
        NormalizedConfig::from_yaml(yaml, "test-project", &PrefixTagResolver::new()).unwrap()
    }

    fn three_machines(extra_globals: &str, second_machine_runtime: &str) -> String {
        format!(
            r#"
globals:
  model: {{sklearn.decomposition.PCA: {{}}}}
  dataset:
    train_start_date: 2016-11-07T09:11:30+01:00
    train_end_date: 2017-11-07T09:11:30+01:00
{}
machines:
  - name: ct-23-0001
    dataset: {{tags: [A]}}
  - name: ct-23-0002
    dataset: {{tags: [B]}}
{}
  - name: ct-23-0003
    dataset: {{tags: [C]}}
"#,
            extra_globals, second_machine_runtime
        )
    }

    #[test]
    fn test_full_graph_for_enabled_metrics() {
        let graph = compile(&config(&three_machines("", ""))).unwrap();

        let names: Vec<_> = graph.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            &names[..5],
            &[
                "influx-cleanup",
                "model-builder-ct-23-0001",
                "gordo-server-ct-23-0001",
                "gordo-influx-ct-23-0001",
                "gordo-client-ct-23-0001",
            ]
        );
        assert_eq!(names.last(), Some(&"gordo-client-waiter"));
        assert_eq!(graph.task_names(TaskKind::Client).len(), 3);

        let waiter = graph.task(CLIENT_WAITER).unwrap();
        assert_eq!(
            waiter.dependencies,
            vec!["gordo-server-ct-23-0001", "gordo-server-ct-23-0002", "gordo-server-ct-23-0003"]
        );
        assert_eq!(graph.templates.len(), graph.tasks.len());
    }

    #[test]
    fn test_disabled_metrics_drop_sidecars_clients_and_waiter() {
        let disabled = three_machines("  runtime: {influx: {enable: false}}", "");
        let graph = compile(&config(&disabled)).unwrap();

        assert_eq!(graph.task_names(TaskKind::MetricsCleanup), vec!["influx-cleanup"]);
        assert!(graph.task_names(TaskKind::MetricsSidecar).is_empty());
        assert!(graph.task_names(TaskKind::Client).is_empty());
        assert!(graph.task(CLIENT_WAITER).is_none());
        assert_eq!(graph.task_names(TaskKind::ModelBuilder).len(), 3);
    }

    #[test]
    fn test_selective_metrics() {
        let graph = compile(&config(&three_machines(
            "  runtime: {influx: {enable: false}}",
            "    runtime: {influx: {enable: true}}",
        )))
        .unwrap();

        assert_eq!(graph.task_names(TaskKind::MetricsSidecar), vec!["gordo-influx-ct-23-0002"]);
        assert_eq!(graph.task_names(TaskKind::Client), vec!["gordo-client-ct-23-0002"]);
        assert_eq!(
            graph.task(CLIENT_WAITER).unwrap().dependencies,
            vec!["gordo-server-ct-23-0002"]
        );

        match &graph.template(METRICS_CLEANUP).unwrap().body {
            TemplateBody::Script { env, .. } => {
                let selector = env.iter().find(|e| e.name == "INFLUX_SELECTOR").unwrap();
                assert_eq!(
                    selector.value,
                    Payload::Text(
                        "gordo/project-name=test-project,gordo/component=influx,\
                         gordo/machine-name notin (ct-23-0002)"
                            .to_string()
                    )
                );
            }
            other => panic!("expected script template, got {:?}", other),
        }
    }

    #[test]
    fn test_dependencies_are_ordered() {
        let graph = compile(&config(&three_machines("", ""))).unwrap();
        let order = graph.execution_order();
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();

        assert!(pos("model-builder-ct-23-0002") < pos("gordo-server-ct-23-0002"));
        assert!(pos("gordo-server-ct-23-0002") < pos(CLIENT_WAITER));
        assert!(pos(CLIENT_WAITER) < pos("gordo-client-ct-23-0002"));
        assert!(pos(METRICS_CLEANUP) < pos("gordo-influx-ct-23-0002"));
    }

    #[test]
    fn test_unnormalized_machine_is_a_contract_violation() {
        let mut cfg = config(&three_machines("", ""));
        cfg.machines[0].name = "Not Normalized".to_string();
        assert!(matches!(compile(&cfg), Err(CompileError::IncompleteSpecification(_))));

        let mut cfg = config(&three_machines("", ""));
        cfg.machines[1].dataset.tags.clear();
        assert!(matches!(compile(&cfg), Err(CompileError::IncompleteSpecification(_))));
    }

    #[test]
    fn test_shared_task_names_only_derive_from_reserved_machines() {
        let derived: [fn(&str) -> String; 4] =
            [model_builder_task, server_task, metrics_sidecar_task, client_task];

        for shared in [DO_ALL, METRICS_CLEANUP, CLIENT_WAITER] {
            for derive in derived {
                let prefix = derive("");
                if let Some(machine) = shared.strip_prefix(prefix.as_str()) {
                    if is_dns_label(machine) {
                        assert!(
                            RESERVED_MACHINE_NAMES.contains(&machine),
                            "machine '{}' would produce shared task '{}'",
                            machine,
                            shared
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_input_reference_syntax() {
        assert_eq!(input("machine"), "{{inputs.parameters.machine}}");
    }
}
