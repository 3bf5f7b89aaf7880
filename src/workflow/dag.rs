//! Workflow graph: the compiler's output and the renderer's input

use crate::core::owner::OwnerReference;
use crate::core::resources::ResourceBlock;
use crate::workflow::CompileError;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};

/// What a task does; decides its template body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ModelBuilder,
    Server,
    MetricsSidecar,
    Client,
    ClientWaiter,
    MetricsCleanup,
}

/// A parameter or env value; documents are serialized by the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    /// Nested document embedded as a YAML string
    Yaml(Value),
    /// Nested document embedded as a compact JSON string
    Json(Value),
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

/// A `name`/`value` pair, used both for task arguments and container env
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: String,
    pub value: Payload,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<Payload>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// How a template runs
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateBody {
    Container {
        image: String,
        command: Vec<String>,
        env: Vec<NamedValue>,
        resources: ResourceBlock,
    },
    Script {
        image: String,
        command: Vec<String>,
        source: String,
        env: Vec<NamedValue>,
        resources: Option<ResourceBlock>,
    },
    /// Kubernetes manifest applied or deleted by the engine
    Resource { action: String, manifest: Value },
}

/// One template per task, named after the task
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub inputs: Vec<String>,
    pub labels: Vec<(String, String)>,
    pub body: TemplateBody,
}

/// A node of the `do-all` DAG
#[derive(Debug, Clone, PartialEq)]
pub struct DagTask {
    pub name: String,
    pub kind: TaskKind,
    pub template: String,
    pub dependencies: Vec<String>,
    pub arguments: Vec<NamedValue>,
}

/// The compiled workflow, ordered deterministically by machine input order
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    pub project_name: String,
    pub machine_names: Vec<String>,
    pub owner_references: Option<Vec<OwnerReference>>,
    pub tasks: Vec<DagTask>,
    pub templates: Vec<Template>,
}

impl WorkflowGraph {
    /// Get a task by name
    pub fn task(&self, name: &str) -> Option<&DagTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Get a template by name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Task names of one kind, in emission order
    pub fn task_names(&self, kind: TaskKind) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Check structural consistency: unique names, known templates, known dependencies
    pub fn validate(&self) -> Result<(), CompileError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(CompileError::IncompleteSpecification(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
        }

        for task in &self.tasks {
            if self.template(&task.template).is_none() {
                return Err(CompileError::IncompleteSpecification(format!(
                    "task '{}' references unknown template '{}'",
                    task.name, task.template
                )));
            }
            for dep in &task.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(CompileError::IncompleteSpecification(format!(
                        "task '{}' depends on non-existent task '{}'",
                        task.name, dep
                    )));
                }
            }
        }

        self.check_cycles()
    }

    fn tasks_by_name(&self) -> HashMap<&str, &DagTask> {
        self.tasks.iter().map(|t| (t.name.as_str(), t)).collect()
    }

    fn check_cycles(&self) -> Result<(), CompileError> {
        let by_name = self.tasks_by_name();
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();

        for task in &self.tasks {
            Self::dfs_check(task.name.as_str(), &by_name, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn dfs_check<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a DagTask>,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> Result<(), CompileError> {
        if visited.contains(name) {
            return Ok(());
        }
        stack.insert(name);

        if let Some(&task) = by_name.get(name) {
            for dep in &task.dependencies {
                if stack.contains(dep.as_str()) {
                    return Err(CompileError::IncompleteSpecification(format!(
                        "cycle detected involving task '{}'",
                        dep
                    )));
                }
                Self::dfs_check(dep.as_str(), by_name, visited, stack)?;
            }
        }

        stack.remove(name);
        visited.insert(name);
        Ok(())
    }

    /// Task names ordered so every task follows its dependencies
    #[cfg(test)]
    pub(crate) fn execution_order(&self) -> Vec<&str> {
        let by_name = self.tasks_by_name();
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        for task in &self.tasks {
            Self::visit(task.name.as_str(), &by_name, &mut visited, &mut result);
        }
        result
    }

    #[cfg(test)]
    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a DagTask>,
        visited: &mut HashSet<&'a str>,
        result: &mut Vec<&'a str>,
    ) {
        if !visited.insert(name) {
            return;
        }
        if let Some(&task) = by_name.get(name) {
            for dep in &task.dependencies {
                Self::visit(dep.as_str(), by_name, visited, result);
            }
        }
        result.push(name);
    }
}
