//! Greedy scheduling with render target reuse
//!
//! Filters are ordered topologically. Among the filters that are ready, the scheduler prefers
//! one that can render into an existing free render target of the same format, so memory is
//! only allocated when no free target fits. A target is free once every consumer of the
//! filter that last wrote it has been scheduled.

use super::{Binding, GlobalConnection, GlobalRef};
use crate::error::{Error, Result};
use crate::layout::Ports;
use std::fmt;

/// Marks a filter already moved into the candidate list
const SELECTED: usize = usize::MAX;

/// Scheduling view of one filter
#[derive(Debug)]
pub(crate) struct ScheduleNode<'a, Fmt> {
    pub path: &'a str,
    pub inputs: &'a Ports,
    pub outputs: &'a Ports,
    pub format: &'a Fmt,
    pub footprint: u64,
}

/// A render target in the planned pool
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TargetSlot<Fmt> {
    pub format: Fmt,
    pub attachments: usize,
    /// Filters rendering into this target, in schedule order
    pub users: Vec<usize>,
}

/// Output of the scheduler
#[derive(Debug)]
pub(crate) struct Schedule<Fmt> {
    /// Global filter indices in execution order
    pub order: Vec<usize>,
    /// Target index of every filter, by global filter index
    pub assignments: Vec<usize>,
    /// Producer of every input port, by global filter index
    pub input_bindings: Vec<Vec<Binding>>,
    /// Producer of every pipeline output port
    pub output_bindings: Vec<Binding>,
    /// Planned render target pool
    pub targets: Vec<TargetSlot<Fmt>>,
}

/// Orders filters and assigns each one a render target
///
/// # Arguments
/// * `nodes` - Filters by global index
/// * `connections` - Merged connections in global coordinates
/// * `pipeline_outputs` - Output ports of the top-level pipeline
pub(crate) fn schedule<Fmt: Clone + PartialEq + fmt::Debug>(nodes: &[ScheduleNode<'_, Fmt>], connections: &[GlobalConnection], pipeline_outputs: &Ports) -> Result<Schedule<Fmt>> {
    let mut scheduler = Scheduler::new(nodes, connections);
    while scheduler.order.len() < nodes.len() {
        scheduler.step()?;
    }
    let output_bindings = scheduler.resolve_outputs(pipeline_outputs)?;

    let assignments = scheduler
        .assignments
        .iter()
        .enumerate()
        .map(|(index, target)| target.ok_or_else(|| Error::build(format!("filter '{}' was never assigned a target", nodes[index].path))))
        .collect::<Result<Vec<_>>>()?;

    Ok(Schedule {
        order: scheduler.order,
        assignments,
        input_bindings: scheduler.input_bindings,
        output_bindings,
        targets: scheduler.targets,
    })
}

struct Scheduler<'n, 'a, Fmt> {
    nodes: &'n [ScheduleNode<'a, Fmt>],
    connections: &'n [GlobalConnection],
    /// Unsatisfied input ports per filter, or `SELECTED`
    availability: Vec<usize>,
    /// Outstanding reads per target
    occupancy: Vec<usize>,
    /// Ready filters, in the order they became ready
    options: Vec<usize>,
    order: Vec<usize>,
    assignments: Vec<Option<usize>>,
    input_bindings: Vec<Vec<Binding>>,
    targets: Vec<TargetSlot<Fmt>>,
}

impl<'n, 'a, Fmt: Clone + PartialEq + fmt::Debug> Scheduler<'n, 'a, Fmt> {
    fn new(nodes: &'n [ScheduleNode<'a, Fmt>], connections: &'n [GlobalConnection]) -> Self {
        let mut availability: Vec<usize> = nodes.iter().map(|node| node.inputs.len()).collect();
        for c in connections.iter().filter(|c| c.source == GlobalRef::ThisPipeline) {
            if let GlobalRef::Filter(index) = c.destination {
                availability[index] = availability[index].saturating_sub(1);
            }
        }

        Self {
            nodes,
            connections,
            availability,
            occupancy: Vec::new(),
            options: Vec::new(),
            order: Vec::with_capacity(nodes.len()),
            assignments: vec![None; nodes.len()],
            input_bindings: vec![Vec::new(); nodes.len()],
            targets: Vec::new(),
        }
    }

    /// Schedules exactly one filter
    fn step(&mut self) -> Result<()> {
        for (index, availability) in self.availability.iter_mut().enumerate() {
            if *availability == 0 {
                self.options.push(index);
                *availability = SELECTED;
            }
        }

        if self.options.is_empty() {
            let blocked: Vec<&str> = self
                .availability
                .iter()
                .enumerate()
                .filter(|(_, a)| **a != SELECTED)
                .map(|(index, _)| self.nodes[index].path)
                .collect();
            return Err(Error::build(format!("scheduler stuck on filters {blocked:?}: likely missing connection or cycle")));
        }

        let (nodes, connections) = (self.nodes, self.connections);
        let chosen = self.options.remove(self.pick_candidate());
        let node = &nodes[chosen];

        if node.outputs.is_empty() {
            return Err(Error::configuration(format!("filter '{}' has no output port", node.path)));
        }
        for (port, name) in node.outputs.iter().enumerate() {
            if !connections.iter().any(|c| c.source == GlobalRef::Filter(chosen) && c.source_port == port) {
                return Err(Error::configuration(format!("output '{}::{name}' is not connected", node.path)));
            }
        }

        let target = self.bind_target(chosen);
        self.assignments[chosen] = Some(target);
        self.order.push(chosen);

        let mut bindings = Vec::with_capacity(node.inputs.len());
        for port in 0..node.inputs.len() {
            let source = connections
                .iter()
                .find(|c| c.destination == GlobalRef::Filter(chosen) && c.destination_port == port)
                .ok_or_else(|| Error::build(format!("input #{port} of filter '{}' has no source", node.path)))?;
            let binding = match source.source {
                GlobalRef::ThisPipeline => Binding::PipelineInput { port: source.source_port },
                GlobalRef::Filter(producer) => {
                    let target = self.assignments[producer]
                        .ok_or_else(|| Error::build(format!("filter '{}' is scheduled before its producer '{}'", node.path, nodes[producer].path)))?;
                    self.occupancy[target] -= 1;
                    Binding::Target {
                        target,
                        attachment: source.source_port,
                    }
                }
            };
            bindings.push(binding);
        }
        self.input_bindings[chosen] = bindings;

        for c in connections.iter().filter(|c| c.source == GlobalRef::Filter(chosen)) {
            if let GlobalRef::Filter(consumer) = c.destination {
                if self.availability[consumer] != SELECTED {
                    self.availability[consumer] -= 1;
                }
            }
        }

        tracing::debug!(filter = node.path, render_target = target, "scheduled filter");
        Ok(())
    }

    /// Position in `options` of the filter to schedule next
    ///
    /// The smallest filter that fits a free target of its format wins; if none fits, the
    /// first ready filter is taken since it needs a new target anyway.
    fn pick_candidate(&self) -> usize {
        let mut best: Option<(usize, u64)> = None;
        for (position, &index) in self.options.iter().enumerate() {
            let node = &self.nodes[index];
            if self.free_target(node.format, 0).is_none() {
                continue;
            }
            if best.is_none_or(|(_, footprint)| node.footprint < footprint) {
                best = Some((position, node.footprint));
            }
        }
        best.map_or(0, |(position, _)| position)
    }

    /// Finds a free target of `format`, preferring one that already has `attachments`
    fn free_target(&self, format: &Fmt, attachments: usize) -> Option<usize> {
        let mut fallback = None;
        for (index, target) in self.targets.iter().enumerate() {
            if self.occupancy[index] != 0 || target.format != *format {
                continue;
            }
            if target.attachments >= attachments {
                return Some(index);
            }
            fallback.get_or_insert(index);
        }
        fallback
    }

    /// Reuses or allocates the target `filter` renders into
    fn bind_target(&mut self, filter: usize) -> usize {
        let nodes = self.nodes;
        let node = &nodes[filter];
        let readers = self.connections.iter().filter(|c| c.source == GlobalRef::Filter(filter)).count();
        let attachments = node.outputs.len();

        let target = match self.free_target(node.format, attachments) {
            Some(index) => {
                let slot = &mut self.targets[index];
                if slot.attachments < attachments {
                    tracing::debug!(render_target = index, from = slot.attachments, to = attachments, "growing render target");
                    slot.attachments = attachments;
                }
                index
            }
            None => {
                tracing::debug!(render_target = self.targets.len(), format = ?node.format, attachments, "planning new render target");
                self.targets.push(TargetSlot {
                    format: node.format.clone(),
                    attachments,
                    users: Vec::new(),
                });
                self.occupancy.push(0);
                self.targets.len() - 1
            }
        };

        self.occupancy[target] = readers;
        self.targets[target].users.push(filter);
        target
    }

    /// Resolves the producer of every top-level output port
    fn resolve_outputs(&self, pipeline_outputs: &Ports) -> Result<Vec<Binding>> {
        pipeline_outputs
            .iter()
            .enumerate()
            .map(|(port, name)| {
                let source = self
                    .connections
                    .iter()
                    .find(|c| c.destination == GlobalRef::ThisPipeline && c.destination_port == port)
                    .ok_or_else(|| Error::configuration(format!("pipeline output '{name}' has no source")))?;
                match source.source {
                    GlobalRef::Filter(producer) => {
                        let target = self.assignments[producer].ok_or_else(|| Error::build(format!("pipeline output '{name}' is fed by an unscheduled filter")))?;
                        Ok(Binding::Target {
                            target,
                            attachment: source.source_port,
                        })
                    }
                    GlobalRef::ThisPipeline => Err(Error::configuration(format!("pipeline output '{name}' is fed directly by a pipeline input"))),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Fixture {
        paths: Vec<String>,
        inputs: Vec<Ports>,
        outputs: Vec<Ports>,
        formats: Vec<&'static str>,
        footprints: Vec<u64>,
        connections: Vec<GlobalConnection>,
        pipeline_outputs: Ports,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                paths: Vec::new(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                formats: Vec::new(),
                footprints: Vec::new(),
                connections: Vec::new(),
                pipeline_outputs: Ports::new(),
            }
        }

        fn filter(&mut self, path: &str, inputs: usize, outputs: usize, format: &'static str, footprint: u64) -> usize {
            let mut ins = Ports::new();
            for i in 0..inputs {
                ins.add(format!("in{i}")).unwrap();
            }
            let mut outs = Ports::new();
            for i in 0..outputs {
                outs.add(format!("out{i}")).unwrap();
            }
            self.paths.push(path.to_string());
            self.inputs.push(ins);
            self.outputs.push(outs);
            self.formats.push(format);
            self.footprints.push(footprint);
            self.paths.len() - 1
        }

        fn output(&mut self, name: &str) -> usize {
            self.pipeline_outputs.add(name).unwrap()
        }

        fn connect(&mut self, source: GlobalRef, source_port: usize, destination: GlobalRef, destination_port: usize) {
            self.connections.push(GlobalConnection {
                source,
                source_port,
                destination,
                destination_port,
            });
        }

        fn run(&self) -> Result<Schedule<&'static str>> {
            let nodes: Vec<_> = (0..self.paths.len())
                .map(|i| ScheduleNode {
                    path: &self.paths[i],
                    inputs: &self.inputs[i],
                    outputs: &self.outputs[i],
                    format: &self.formats[i],
                    footprint: self.footprints[i],
                })
                .collect();
            schedule(&nodes, &self.connections, &self.pipeline_outputs)
        }
    }

    use GlobalRef::{Filter as F, ThisPipeline as This};

    /// in -> a -> b -> c -> out, all with the same format
    fn chain() -> Fixture {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "rgba", 10);
        let c = fx.filter("c", 1, 1, "rgba", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(c), 0);
        fx.connect(F(c), 0, This, 0);
        fx
    }

    #[test]
    fn test_chain_reuses_freed_target() {
        let schedule = chain().run().unwrap();
        assert_eq!(schedule.order, vec![0, 1, 2]);
        // a's target is free once b has read it, so c renders into it again
        assert_eq!(schedule.assignments[0], schedule.assignments[2]);
        assert_ne!(schedule.assignments[0], schedule.assignments[1]);
        assert_eq!(schedule.targets.len(), 2);
        assert_eq!(schedule.targets[schedule.assignments[0]].users, vec![0, 2]);
        assert_eq!(
            schedule.output_bindings,
            vec![Binding::Target {
                target: schedule.assignments[2],
                attachment: 0
            }]
        );
    }

    #[test]
    fn test_input_bindings() {
        let schedule = chain().run().unwrap();
        assert_eq!(schedule.input_bindings[0], vec![Binding::PipelineInput { port: 0 }]);
        assert_eq!(
            schedule.input_bindings[1],
            vec![Binding::Target {
                target: schedule.assignments[0],
                attachment: 0
            }]
        );
    }

    #[test]
    fn test_different_formats_never_share() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "r", 10);
        let c = fx.filter("c", 1, 1, "rg", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(c), 0);
        fx.connect(F(c), 0, This, 0);

        let schedule = fx.run().unwrap();
        assert_eq!(schedule.targets.len(), 3);
    }

    #[test]
    fn test_pipeline_output_targets_are_never_reused() {
        // a feeds the pipeline output and b; c must not overwrite a's target
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "rgba", 10);
        let c = fx.filter("c", 1, 1, "rgba", 10);
        fx.output("first");
        fx.output("last");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, This, 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(c), 0);
        fx.connect(F(c), 0, This, 1);

        let schedule = fx.run().unwrap();
        assert_eq!(schedule.targets.len(), 3);
        assert_ne!(schedule.assignments[a], schedule.assignments[c]);
    }

    #[test]
    fn test_prefers_candidate_matching_free_target() {
        // after a runs and b consumes it, both c ("r") and d ("rgba") are ready;
        // d fits a's freed target so it goes first
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "r", 10);
        let c = fx.filter("c", 1, 1, "rg", 10);
        let d = fx.filter("d", 1, 1, "rgba", 10);
        let e = fx.filter("e", 2, 1, "rgba", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(c), 0);
        fx.connect(F(b), 0, F(d), 0);
        fx.connect(F(c), 0, F(e), 0);
        fx.connect(F(d), 0, F(e), 1);
        fx.connect(F(e), 0, This, 0);

        let schedule = fx.run().unwrap();
        assert_eq!(&schedule.order[..3], &[a, b, d]);
        assert_eq!(schedule.assignments[d], schedule.assignments[a]);
        assert_eq!(schedule.order[3], c);
        assert_eq!(schedule.order[4], e);
    }

    #[test]
    fn test_smaller_footprint_wins_among_matching() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "rgba", 10);
        let big = fx.filter("big", 1, 1, "rgba", 500);
        let small = fx.filter("small", 1, 1, "rgba", 5);
        let join = fx.filter("join", 2, 1, "r", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(big), 0);
        fx.connect(F(b), 0, F(small), 0);
        fx.connect(F(big), 0, F(join), 0);
        fx.connect(F(small), 0, F(join), 1);
        fx.connect(F(join), 0, This, 0);

        let schedule = fx.run().unwrap();
        assert_eq!(&schedule.order[..3], &[a, b, small]);
    }

    #[test]
    fn test_target_grows_for_more_attachments() {
        // a (1 output) is freed before m (2 outputs) runs; m grows a's target
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "rgba", 10);
        let m = fx.filter("m", 1, 2, "rgba", 10);
        let j = fx.filter("j", 2, 1, "r", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(m), 0);
        fx.connect(F(m), 0, F(j), 0);
        fx.connect(F(m), 1, F(j), 1);
        fx.connect(F(j), 0, This, 0);

        let schedule = fx.run().unwrap();
        assert_eq!(schedule.assignments[m], schedule.assignments[a]);
        assert_eq!(schedule.targets[schedule.assignments[m]].attachments, 2);
        assert_eq!(
            schedule.input_bindings[j],
            vec![
                Binding::Target {
                    target: schedule.assignments[m],
                    attachment: 0
                },
                Binding::Target {
                    target: schedule.assignments[m],
                    attachment: 1
                },
            ]
        );
    }

    #[test]
    fn test_cycle_is_stuck() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        let b = fx.filter("b", 1, 1, "rgba", 10);
        fx.output("out");
        fx.connect(F(a), 0, F(b), 0);
        fx.connect(F(b), 0, F(a), 0);
        fx.connect(F(b), 0, This, 0);

        let error = fx.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Build);
        assert!(error.to_string().contains("likely missing connection or cycle"));
    }

    #[test]
    fn test_missing_input_is_stuck() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 2, 1, "rgba", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, This, 0);

        assert_eq!(fx.run().unwrap_err().kind(), ErrorKind::Build);
    }

    #[test]
    fn test_unused_output_is_configuration_error() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 2, "rgba", 10);
        fx.output("out");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, This, 0);

        let error = fx.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().contains("a::out1"));
    }

    #[test]
    fn test_unresolved_pipeline_output() {
        let mut fx = Fixture::new();
        let a = fx.filter("a", 1, 1, "rgba", 10);
        fx.output("out");
        fx.output("orphan");
        fx.connect(This, 0, F(a), 0);
        fx.connect(F(a), 0, This, 0);

        let error = fx.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().contains("orphan"));
    }
}
