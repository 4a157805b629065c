//! Flattening of nested pipeline layouts
//!
//! Nested pipelines are not executable. This pass lists every filter of every nesting level
//! under a global index, rewrites each connection into global coordinates and then splices
//! connections through nested pipeline boundaries until only filter-to-filter and
//! top-level boundary connections remain.

use super::{GlobalConnection, GlobalRef};
use crate::error::{Error, Result};
use crate::layout::{Element, ElementRef, FilterLayout, PATH_SEPARATOR, PipelineLayout};
use std::collections::VecDeque;

/// A filter found while flattening, with its full `::` separated path
#[derive(Debug)]
pub(crate) struct FlatFilter<'a, F> {
    pub path: String,
    pub layout: &'a FilterLayout<F>,
}

/// Result of flattening: global filter list and merged connections
#[derive(Debug)]
pub(crate) struct FlatGraph<'a, F> {
    pub filters: Vec<FlatFilter<'a, F>>,
    pub connections: Vec<GlobalConnection>,
}

/// Global node during flattening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    /// Boundary of the root layout
    Boundary,
    /// Filter with this global index
    Filter(usize),
    /// Boundary of the nested pipeline occupying this slot
    Slot(usize),
}

/// One end of a connection, tagged with the expansion pass that wrote it
///
/// A slot endpoint written by the slot's own expansion refers to the nested pipeline seen
/// from inside; written by the parent's expansion it refers to the same boundary seen from
/// outside. Merging only pairs endpoints seen from opposite sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    node: Node,
    port: usize,
    pass: usize,
}

#[derive(Debug, Clone, Copy)]
struct FlatConnection {
    source: Endpoint,
    destination: Endpoint,
}

impl FlatConnection {
    fn touches_slot(&self) -> bool {
        matches!(self.source.node, Node::Slot(_)) || matches!(self.destination.node, Node::Slot(_))
    }
}

/// A layout waiting to be expanded
struct PendingLayout<'a, F> {
    layout: &'a PipelineLayout<F>,
    slot: Option<usize>,
    prefix: String,
}

/// Flattens `root` breadth first and merges away every nested pipeline boundary
///
/// The layout is only read; global indices live in this pass, so the same layout can be
/// compiled any number of times.
pub(crate) fn flatten<F>(root: &PipelineLayout<F>) -> Result<FlatGraph<'_, F>> {
    let mut queue = VecDeque::new();
    queue.push_back(PendingLayout {
        layout: root,
        slot: None,
        prefix: String::new(),
    });

    let mut filters = Vec::new();
    let mut slot_paths: Vec<String> = Vec::new();
    let mut connections = Vec::new();
    let mut pass = 0;

    while let Some(pending) = queue.pop_front() {
        let mut local_nodes = Vec::with_capacity(pending.layout.num_elements());
        for named in pending.layout.elements() {
            let path = format!("{}{}", pending.prefix, named.name);
            match &named.element {
                Element::Filter(layout) => {
                    filters.push(FlatFilter { path, layout });
                    local_nodes.push(Node::Filter(filters.len() - 1));
                }
                Element::Pipeline(layout) => {
                    let slot = slot_paths.len();
                    queue.push_back(PendingLayout {
                        layout,
                        slot: Some(slot),
                        prefix: format!("{path}{PATH_SEPARATOR}"),
                    });
                    slot_paths.push(path);
                    local_nodes.push(Node::Slot(slot));
                }
            }
        }

        let boundary = pending.slot.map_or(Node::Boundary, Node::Slot);
        let to_global = |element: ElementRef| match element {
            ElementRef::ThisPipeline => boundary,
            ElementRef::Element(index) => local_nodes[index],
        };
        for c in pending.layout.connections() {
            connections.push(FlatConnection {
                source: Endpoint {
                    node: to_global(c.source),
                    port: c.source_port,
                    pass,
                },
                destination: Endpoint {
                    node: to_global(c.destination),
                    port: c.destination_port,
                    pass,
                },
            });
        }
        pass += 1;
    }

    tracing::debug!(
        filters = filters.len(),
        nested = slot_paths.len(),
        connections = connections.len(),
        "flattened pipeline layout '{}'",
        root.type_name()
    );

    let connections = merge(connections, &slot_paths)?;
    Ok(FlatGraph { filters, connections })
}

/// Splices connections through nested pipeline boundaries
///
/// A connection ending on a slot port is joined with every connection leaving the same slot
/// port from the other side, producing direct connections. Repeats until no slot endpoint
/// remains; fails if a full scan makes no progress.
fn merge(mut connections: Vec<FlatConnection>, slot_paths: &[String]) -> Result<Vec<GlobalConnection>> {
    while connections.iter().any(FlatConnection::touches_slot) {
        let mut progressed = false;
        let mut index = 0;
        while index < connections.len() {
            let incoming = connections[index];
            if !matches!(incoming.destination.node, Node::Slot(_)) {
                index += 1;
                continue;
            }

            let outgoing: Vec<usize> = connections
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.source.node == incoming.destination.node && c.source.port == incoming.destination.port && c.source.pass != incoming.destination.pass
                })
                .map(|(i, _)| i)
                .collect();
            if outgoing.is_empty() {
                index += 1;
                continue;
            }

            let spliced: Vec<FlatConnection> = outgoing
                .iter()
                .map(|&i| FlatConnection {
                    source: incoming.source,
                    destination: connections[i].destination,
                })
                .collect();

            let mut removed = outgoing;
            removed.push(index);
            removed.sort_unstable();
            for i in removed.into_iter().rev() {
                connections.remove(i);
            }
            connections.extend(spliced);
            progressed = true;
        }

        if !progressed {
            let stuck: Vec<&str> = connections
                .iter()
                .flat_map(|c| [c.source.node, c.destination.node])
                .filter_map(|node| match node {
                    Node::Slot(slot) => Some(slot_paths[slot].as_str()),
                    _ => None,
                })
                .collect();
            return Err(Error::build(format!(
                "stuck merging connections through nested pipeline(s) {stuck:?}; a nested pipeline port is probably left unconnected"
            )));
        }
    }

    connections
        .into_iter()
        .map(|c| {
            Ok(GlobalConnection {
                source: global_ref(c.source.node)?,
                source_port: c.source.port,
                destination: global_ref(c.destination.node)?,
                destination_port: c.destination.port,
            })
        })
        .collect()
}

fn global_ref(node: Node) -> Result<GlobalRef> {
    match node {
        Node::Boundary => Ok(GlobalRef::ThisPipeline),
        Node::Filter(index) => Ok(GlobalRef::Filter(index)),
        Node::Slot(slot) => Err(Error::build(format!("nested pipeline slot {slot} left after merging"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn filter(name: &str) -> FilterLayout<()> {
        FilterLayout::with_ports(name, &["in"], &["out"], ()).unwrap()
    }

    /// in -> [f] -> out wrapped in a pipeline of the given type
    fn passthrough(type_name: &str) -> PipelineLayout<()> {
        let mut layout = PipelineLayout::new(type_name);
        layout.add_input("in").unwrap();
        layout.add_output("out").unwrap();
        layout.add_filter("f", filter("F")).unwrap();
        layout.connect_to_input_by_name("in", "f", "in").unwrap();
        layout.connect_to_output_by_name("f", "out", "out").unwrap();
        layout
    }

    fn has(connections: &[GlobalConnection], source: GlobalRef, destination: GlobalRef) -> bool {
        connections.iter().any(|c| c.source == source && c.destination == destination)
    }

    #[test]
    fn test_flat_layout_is_unchanged() {
        let layout = passthrough("Main");
        let graph = flatten(&layout).unwrap();
        assert_eq!(graph.filters.len(), 1);
        assert_eq!(graph.filters[0].path, "f");
        assert_eq!(graph.connections.len(), 2);
        assert!(has(&graph.connections, GlobalRef::ThisPipeline, GlobalRef::Filter(0)));
        assert!(has(&graph.connections, GlobalRef::Filter(0), GlobalRef::ThisPipeline));
    }

    #[test]
    fn test_chained_nested_pipelines_become_direct_edges() {
        let mut main = PipelineLayout::new("Main");
        main.add_input("in").unwrap();
        main.add_output("out").unwrap();
        main.add_pipeline("a", passthrough("A")).unwrap();
        main.add_pipeline("b", passthrough("B")).unwrap();
        main.connect_to_input_by_name("in", "a", "in").unwrap();
        main.connect_by_name("a", "out", "b", "in").unwrap();
        main.connect_to_output_by_name("b", "out", "out").unwrap();

        let graph = flatten(&main).unwrap();
        let paths: Vec<_> = graph.filters.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a::f", "b::f"]);
        assert_eq!(graph.connections.len(), 3);
        assert!(has(&graph.connections, GlobalRef::ThisPipeline, GlobalRef::Filter(0)));
        assert!(has(&graph.connections, GlobalRef::Filter(0), GlobalRef::Filter(1)));
        assert!(has(&graph.connections, GlobalRef::Filter(1), GlobalRef::ThisPipeline));
    }

    #[test]
    fn test_deep_nesting_and_fan_out() {
        // outer::middle::inner::f, with the nested output feeding two top-level filters
        let mut middle = PipelineLayout::new("Middle");
        middle.add_input("in").unwrap();
        middle.add_output("out").unwrap();
        middle.add_pipeline("inner", passthrough("Inner")).unwrap();
        middle.connect_to_input_by_name("in", "inner", "in").unwrap();
        middle.connect_to_output_by_name("inner", "out", "out").unwrap();

        let mut main = PipelineLayout::new("Main");
        main.add_input("in").unwrap();
        main.add_output("x").unwrap();
        main.add_output("y").unwrap();
        main.add_pipeline("middle", middle).unwrap();
        main.add_filter("x", filter("X")).unwrap();
        main.add_filter("y", filter("Y")).unwrap();
        main.connect_to_input_by_name("in", "middle", "in").unwrap();
        main.connect_by_name("middle", "out", "x", "in").unwrap();
        main.connect_by_name("middle", "out", "y", "in").unwrap();
        main.connect_to_output_by_name("x", "out", "x").unwrap();
        main.connect_to_output_by_name("y", "out", "y").unwrap();

        let graph = flatten(&main).unwrap();
        let paths: Vec<_> = graph.filters.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["x", "y", "middle::inner::f"]);
        assert_eq!(graph.connections.len(), 5);
        assert!(has(&graph.connections, GlobalRef::ThisPipeline, GlobalRef::Filter(2)));
        assert!(has(&graph.connections, GlobalRef::Filter(2), GlobalRef::Filter(0)));
        assert!(has(&graph.connections, GlobalRef::Filter(2), GlobalRef::Filter(1)));
    }

    #[test]
    fn test_nested_input_fan_out() {
        let mut split = PipelineLayout::new("Split");
        split.add_input("in").unwrap();
        split.add_output("a").unwrap();
        split.add_output("b").unwrap();
        split.add_filter("fa", filter("FA")).unwrap();
        split.add_filter("fb", filter("FB")).unwrap();
        split.connect_to_input_by_name("in", "fa", "in").unwrap();
        split.connect_to_input_by_name("in", "fb", "in").unwrap();
        split.connect_to_output_by_name("fa", "out", "a").unwrap();
        split.connect_to_output_by_name("fb", "out", "b").unwrap();

        let mut main = PipelineLayout::new("Main");
        main.add_input("in").unwrap();
        main.add_output("a").unwrap();
        main.add_output("b").unwrap();
        main.add_pipeline("split", split).unwrap();
        main.connect_to_input_by_name("in", "split", "in").unwrap();
        main.connect_to_output_by_name("split", "a", "a").unwrap();
        main.connect_to_output_by_name("split", "b", "b").unwrap();

        let graph = flatten(&main).unwrap();
        assert_eq!(graph.connections.len(), 4);
        assert!(has(&graph.connections, GlobalRef::ThisPipeline, GlobalRef::Filter(0)));
        assert!(has(&graph.connections, GlobalRef::ThisPipeline, GlobalRef::Filter(1)));
        let to_outputs: Vec<_> = graph.connections.iter().filter(|c| c.destination == GlobalRef::ThisPipeline).map(|c| (c.source, c.destination_port)).collect();
        assert!(to_outputs.contains(&(GlobalRef::Filter(0), 0)));
        assert!(to_outputs.contains(&(GlobalRef::Filter(1), 1)));
    }

    #[test]
    fn test_unconnected_nested_port_is_stuck() {
        let mut main = PipelineLayout::new("Main");
        main.add_input("in").unwrap();
        main.add_output("out").unwrap();
        main.add_pipeline("a", passthrough("A")).unwrap();
        main.connect_to_input_by_name("in", "a", "in").unwrap();

        let error = flatten(&main).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Build);
        assert!(error.to_string().contains("stuck merging"));
        assert!(error.to_string().contains("\"a\""));
    }

    #[test]
    fn test_same_layout_flattens_twice() {
        let mut main = PipelineLayout::new("Main");
        main.add_input("in").unwrap();
        main.add_output("out").unwrap();
        main.add_pipeline("a", passthrough("A")).unwrap();
        main.connect_to_input_by_name("in", "a", "in").unwrap();
        main.connect_to_output_by_name("a", "out", "out").unwrap();

        let first = flatten(&main).unwrap();
        let second = flatten(&main).unwrap();
        assert_eq!(first.connections, second.connections);
        assert_eq!(first.filters.len(), second.filters.len());
    }
}
