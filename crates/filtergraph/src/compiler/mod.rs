//! Pipeline compilation
//!
//! Compilation turns a [`PipelineLayout`] into everything a running [`crate::Pipeline`] needs:
//! one filter instance per flattened filter, an execution order, and a pool of render targets
//! shared between filters whose outputs are never alive at the same time.
//!
//! The work is split in three passes:
//! 1. [`flatten`] expands nested pipelines and merges connections across their boundaries
//! 2. [`schedule`] orders filters and plans the render target pool without touching the device
//! 3. [`compile`] instantiates filters and targets on the device following that plan

mod flatten;
mod plan;
mod schedule;

pub use plan::{Binding, ExecutionPlan, PlannedFilter, PlannedOutput, PlannedTarget};

use crate::device::{Device, Filter, RenderTarget};
use crate::error::{Error, Result, ResultExt};
use crate::layout::PipelineLayout;
use flatten::flatten;
use schedule::{ScheduleNode, schedule};
use serde::Serialize;

/// Node of a flattened graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRef {
    /// Filter with this global index
    Filter(usize),
    /// Boundary of the top-level pipeline
    ThisPipeline,
}

/// Connection between two nodes of a flattened graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalConnection {
    pub source: GlobalRef,
    pub source_port: usize,
    pub destination: GlobalRef,
    pub destination_port: usize,
}

/// Device resources and plan produced by [`compile`]
pub(crate) struct Compiled<D: Device> {
    /// Filter instances by global index
    pub filters: Vec<D::Filter>,
    /// Render target pool, indexed like [`ExecutionPlan::targets`]
    pub targets: Vec<D::Target>,
    pub plan: ExecutionPlan,
}

/// Compiles `layout` into filters and render targets on `device`
///
/// # Arguments
/// * `name` - Name of the pipeline instance, used in logs and errors
/// * `layout` - Top-level layout; it is only read
/// * `device` - Backend instantiating filters and targets
///
/// # Returns
/// Filter instances, the allocated target pool and the execution plan
pub(crate) fn compile<D: Device>(name: &str, layout: &PipelineLayout<D::FilterDescriptor>, device: &mut D) -> Result<Compiled<D>> {
    let graph = flatten(layout).with_context(|| format!("flattening pipeline '{name}'"))?;

    let mut filters = Vec::with_capacity(graph.filters.len());
    for flat in &graph.filters {
        let filter = device
            .create_filter(flat.layout)
            .map_err(Error::device)
            .with_context(|| format!("creating filter '{}' of type '{}'", flat.path, flat.layout.type_name()))?;
        filters.push(filter);
    }

    let nodes: Vec<ScheduleNode<'_, D::Format>> = graph
        .filters
        .iter()
        .zip(&filters)
        .map(|(flat, filter)| ScheduleNode {
            path: &flat.path,
            inputs: flat.layout.inputs(),
            outputs: flat.layout.outputs(),
            format: filter.output_format(),
            footprint: filter.memory_footprint(),
        })
        .collect();
    let schedule = schedule(&nodes, &graph.connections, layout.outputs()).with_context(|| format!("scheduling pipeline '{name}'"))?;

    let mut targets = Vec::with_capacity(schedule.targets.len());
    for (id, slot) in schedule.targets.iter().enumerate() {
        // Allocate for the first user, then grow as later users need more attachments
        let (first, rest) = slot.users.split_first().ok_or_else(|| Error::build(format!("render target #{id} has no user")))?;
        let mut target = device
            .create_target(&slot.format, nodes[*first].outputs.len())
            .map_err(Error::device)
            .with_context(|| format!("allocating render target #{id}"))?;
        for &user in rest {
            while target.attachment_count() < nodes[user].outputs.len() {
                target.add_attachment(device).map_err(Error::device).with_context(|| format!("growing render target #{id}"))?;
            }
        }
        targets.push(target);
    }

    for (index, filter) in filters.iter().enumerate() {
        let target = &targets[schedule.assignments[index]];
        if !target.matches_format(filter) {
            return Err(Error::build(format!(
                "filter '{}' cannot render into render target #{} of format {:?}",
                graph.filters[index].path,
                schedule.assignments[index],
                target.format()
            )));
        }
    }

    let plan = ExecutionPlan {
        name: name.to_string(),
        filters: graph
            .filters
            .iter()
            .enumerate()
            .map(|(index, flat)| PlannedFilter {
                index,
                path: flat.path.clone(),
                type_name: flat.layout.type_name().to_string(),
                target: schedule.assignments[index],
                inputs: schedule.input_bindings[index].clone(),
            })
            .collect(),
        schedule: schedule.order.clone(),
        targets: schedule
            .targets
            .iter()
            .enumerate()
            .map(|(id, slot)| PlannedTarget {
                id,
                format: format!("{:?}", slot.format),
                attachments: slot.attachments,
                users: slot.users.clone(),
            })
            .collect(),
        connections: graph.connections.clone(),
        inputs: layout.inputs().iter().map(str::to_string).collect(),
        outputs: layout
            .outputs()
            .iter()
            .zip(&schedule.output_bindings)
            .map(|(name, binding)| PlannedOutput {
                name: name.to_string(),
                binding: *binding,
            })
            .collect(),
    };

    tracing::info!(
        pipeline = name,
        filters = plan.filters.len(),
        targets = plan.targets.len(),
        connections = plan.connections.len(),
        "compiled pipeline"
    );

    Ok(Compiled { filters, targets, plan })
}
