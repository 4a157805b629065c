//! Serializable summary of a compiled pipeline

use super::GlobalConnection;
use serde::Serialize;

/// Where a filter input or a pipeline output reads its texture from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    /// Texture appended by the caller for this pipeline input port
    PipelineInput { port: usize },
    /// Attachment of a render target in the pool
    Target { target: usize, attachment: usize },
}

/// Execution plan of a compiled pipeline
///
/// The plan only references filters and targets by index, so it can be dumped as JSON for
/// inspection without touching the device.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Name of the pipeline instance
    pub name: String,
    /// Filters by global index
    pub filters: Vec<PlannedFilter>,
    /// Global filter indices in execution order
    pub schedule: Vec<usize>,
    /// Render target pool
    pub targets: Vec<PlannedTarget>,
    /// Merged connections
    pub connections: Vec<GlobalConnection>,
    /// Input port names of the pipeline
    pub inputs: Vec<String>,
    /// Output ports of the pipeline and their producers
    pub outputs: Vec<PlannedOutput>,
}

/// A filter in the execution plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedFilter {
    /// Global index
    pub index: usize,
    /// Full path, components separated by `::`
    pub path: String,
    pub type_name: String,
    /// Render target the filter writes
    pub target: usize,
    /// Source of every input port
    pub inputs: Vec<Binding>,
}

/// A render target in the execution plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTarget {
    pub id: usize,
    /// Debug rendering of the device format
    pub format: String,
    pub attachments: usize,
    /// Filters writing this target, in execution order
    pub users: Vec<usize>,
}

/// A pipeline output in the execution plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedOutput {
    pub name: String,
    pub binding: Binding,
}

impl ExecutionPlan {
    /// Serializes the plan as pretty-printed JSON
    ///
    /// # Returns
    /// JSON string, or the serialization error
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Finds a filter by its full path
    pub fn filter(&self, path: &str) -> Option<&PlannedFilter> {
        self.filters.iter().find(|f| f.path == path)
    }
}
