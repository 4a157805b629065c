//! Pipeline layouts: nestable graphs of filters wired by connections
//!
//! A [`PipelineLayout`] is pure data. It owns its elements (filters or nested pipeline
//! layouts), its own boundary ports and the connections between them. It is validated on
//! demand with [`PipelineLayout::check`] and compiled by [`crate::Pipeline::new`].

use super::{FilterLayout, PATH_SEPARATOR, Ports, ports::validate_name, split_path};
use crate::error::{Error, Result, ResultExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Reference to one end of a connection inside a pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementRef {
    /// The element with this local index
    Element(usize),
    /// The boundary of the layout that owns the connection
    ThisPipeline,
}

impl ElementRef {
    pub fn is_this_pipeline(&self) -> bool {
        matches!(self, Self::ThisPipeline)
    }
}

/// A directed edge from an output port to an input port
///
/// When the source is [`ElementRef::ThisPipeline`] the source port is one of the layout's own
/// input ports. When the destination is [`ElementRef::ThisPipeline`] the destination port is
/// one of the layout's own output ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Connection {
    pub source: ElementRef,
    pub source_port: usize,
    pub destination: ElementRef,
    pub destination_port: usize,
}

/// Either a leaf filter or a nested pipeline layout
#[derive(Debug, Clone, PartialEq)]
pub enum Element<F> {
    Filter(FilterLayout<F>),
    Pipeline(PipelineLayout<F>),
}

impl<F> Element<F> {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Filter(filter) => filter.type_name(),
            Self::Pipeline(pipeline) => pipeline.type_name(),
        }
    }

    pub fn inputs(&self) -> &Ports {
        match self {
            Self::Filter(filter) => filter.inputs(),
            Self::Pipeline(pipeline) => pipeline.inputs(),
        }
    }

    pub fn outputs(&self) -> &Ports {
        match self {
            Self::Filter(filter) => filter.outputs(),
            Self::Pipeline(pipeline) => pipeline.outputs(),
        }
    }

    pub fn as_filter(&self) -> Option<&FilterLayout<F>> {
        match self {
            Self::Filter(filter) => Some(filter),
            Self::Pipeline(_) => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineLayout<F>> {
        match self {
            Self::Filter(_) => None,
            Self::Pipeline(pipeline) => Some(pipeline),
        }
    }
}

impl<F> From<FilterLayout<F>> for Element<F> {
    fn from(filter: FilterLayout<F>) -> Self {
        Self::Filter(filter)
    }
}

impl<F> From<PipelineLayout<F>> for Element<F> {
    fn from(pipeline: PipelineLayout<F>) -> Self {
        Self::Pipeline(pipeline)
    }
}

/// An element placed in a layout under an instance name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedElement<F> {
    pub name: String,
    pub element: Element<F>,
}

/// Declarative, nestable description of a filter graph
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLayout<F> {
    type_name: String,
    inputs: Ports,
    outputs: Ports,
    elements: Vec<NamedElement<F>>,
    connections: Vec<Connection>,
}

impl<F> PipelineLayout<F> {
    /// Creates an empty layout
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            inputs: Ports::new(),
            outputs: Ports::new(),
            elements: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn inputs(&self) -> &Ports {
        &self.inputs
    }

    pub fn outputs(&self) -> &Ports {
        &self.outputs
    }

    /// Declares a boundary input port and returns its index
    pub fn add_input(&mut self, name: impl Into<String>) -> Result<usize> {
        self.inputs.add(name).with_context(|| format!("in pipeline layout '{}'", self.type_name))
    }

    /// Declares a boundary output port and returns its index
    pub fn add_output(&mut self, name: impl Into<String>) -> Result<usize> {
        self.outputs.add(name).with_context(|| format!("in pipeline layout '{}'", self.type_name))
    }

    /// Adds a filter or a nested pipeline layout under a unique instance name
    ///
    /// # Returns
    /// The local index of the new element
    pub fn add(&mut self, name: impl Into<String>, element: impl Into<Element<F>>) -> Result<usize> {
        let name = name.into();
        validate_name(&name, "element")?;
        if self.elements.iter().any(|e| e.name == name) {
            return Err(Error::configuration(format!(
                "an element named '{name}' already exists in pipeline layout '{}'",
                self.type_name
            )));
        }
        self.elements.push(NamedElement { name, element: element.into() });
        Ok(self.elements.len() - 1)
    }

    /// Adds a filter under a unique instance name
    pub fn add_filter(&mut self, name: impl Into<String>, filter: FilterLayout<F>) -> Result<usize> {
        self.add(name, Element::Filter(filter))
    }

    /// Adds a nested pipeline layout under a unique instance name
    pub fn add_pipeline(&mut self, name: impl Into<String>, pipeline: PipelineLayout<F>) -> Result<usize> {
        self.add(name, Element::Pipeline(pipeline))
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[NamedElement<F>] {
        &self.elements
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the element at local index `index`
    pub fn element(&self, index: usize) -> Result<&NamedElement<F>> {
        self.elements.get(index).ok_or_else(|| {
            Error::configuration(format!(
                "pipeline layout '{}' has no element #{index} (it has {})",
                self.type_name,
                self.elements.len()
            ))
        })
    }

    /// Returns the local index of the element called `name`
    pub fn element_index(&self, name: &str) -> Result<usize> {
        self.elements
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| Error::configuration(format!("pipeline layout '{}' has no element named '{name}'", self.type_name)))
    }

    /// Resolves a `::` separated path through nested layouts
    ///
    /// # Arguments
    /// * `path` - For example `"denoise::blur"` for the element `blur` inside the nested
    ///   pipeline `denoise`
    pub fn element_by_path(&self, path: &str) -> Result<&Element<F>> {
        let parts = split_path(path)?;
        let mut layout = self;
        for (depth, part) in parts.iter().enumerate() {
            let element = &layout.elements[layout.element_index(part)?].element;
            if depth + 1 == parts.len() {
                return Ok(element);
            }
            layout = element
                .as_pipeline()
                .ok_or_else(|| Error::configuration(format!("'{part}' in path '{path}' is a filter, not a pipeline")))?;
        }
        unreachable!("split_path never returns an empty list")
    }

    /// Connects an output port to an input port
    ///
    /// Use [`ElementRef::ThisPipeline`] as source to read one of this layout's input ports and
    /// as destination to feed one of its output ports. Fails when both ends are the boundary,
    /// when a port does not exist or when the destination port already has a source.
    pub fn connect(&mut self, source: ElementRef, source_port: usize, destination: ElementRef, destination_port: usize) -> Result<()> {
        if source.is_this_pipeline() && destination.is_this_pipeline() {
            return Err(Error::configuration(format!(
                "pipeline layout '{}': cannot connect an input directly to an output",
                self.type_name
            )));
        }

        match source {
            ElementRef::Element(index) => {
                let element = self.element(index)?;
                element.element.outputs().check(source_port, &element.name, "output")?;
            }
            ElementRef::ThisPipeline => self.inputs.check(source_port, &self.type_name, "input")?,
        }

        match destination {
            ElementRef::Element(index) => {
                let element = self.element(index)?;
                element.element.inputs().check(destination_port, &element.name, "input")?;
            }
            ElementRef::ThisPipeline => self.outputs.check(destination_port, &self.type_name, "output")?,
        }

        if self.source_of(destination, destination_port).is_some() {
            return Err(Error::configuration(format!(
                "a connection already exists to {}",
                self.port_label(destination, destination_port, Direction::Input)
            )));
        }

        self.connections.push(Connection {
            source,
            source_port,
            destination,
            destination_port,
        });
        Ok(())
    }

    /// Connects two element ports addressed by name
    pub fn connect_by_name(&mut self, source: &str, source_port: &str, destination: &str, destination_port: &str) -> Result<()> {
        let inner = || -> Result<(usize, usize, usize, usize)> {
            let src = self.element_index(source)?;
            let dst = self.element_index(destination)?;
            let src_port = self.elements[src].element.outputs().find(source_port, source, "output")?;
            let dst_port = self.elements[dst].element.inputs().find(destination_port, destination, "input")?;
            Ok((src, src_port, dst, dst_port))
        };
        let (src, src_port, dst, dst_port) = inner().with_context(|| format!("connecting {source}::{source_port} to {destination}::{destination_port}"))?;
        self.connect(ElementRef::Element(src), src_port, ElementRef::Element(dst), dst_port)
    }

    /// Connects one of this layout's input ports to an element input port
    pub fn connect_to_input(&mut self, port: usize, destination: usize, destination_port: usize) -> Result<()> {
        self.connect(ElementRef::ThisPipeline, port, ElementRef::Element(destination), destination_port)
    }

    /// Connects one of this layout's input ports to an element input port, by name
    pub fn connect_to_input_by_name(&mut self, port: &str, destination: &str, destination_port: &str) -> Result<()> {
        let inner = || -> Result<(usize, usize, usize)> {
            let port = self.inputs.find(port, &self.type_name, "input")?;
            let dst = self.element_index(destination)?;
            let dst_port = self.elements[dst].element.inputs().find(destination_port, destination, "input")?;
            Ok((port, dst, dst_port))
        };
        let (port, dst, dst_port) = inner().with_context(|| format!("connecting input '{port}' of '{}'", self.type_name))?;
        self.connect_to_input(port, dst, dst_port)
    }

    /// Connects an element output port to one of this layout's output ports
    pub fn connect_to_output(&mut self, source: usize, source_port: usize, port: usize) -> Result<()> {
        self.connect(ElementRef::Element(source), source_port, ElementRef::ThisPipeline, port)
    }

    /// Connects an element output port to one of this layout's output ports, by name
    pub fn connect_to_output_by_name(&mut self, source: &str, source_port: &str, port: &str) -> Result<()> {
        let inner = || -> Result<(usize, usize, usize)> {
            let port = self.outputs.find(port, &self.type_name, "output")?;
            let src = self.element_index(source)?;
            let src_port = self.elements[src].element.outputs().find(source_port, source, "output")?;
            Ok((src, src_port, port))
        };
        let (src, src_port, port) = inner().with_context(|| format!("connecting output '{port}' of '{}'", self.type_name))?;
        self.connect_to_output(src, src_port, port)
    }

    /// Wires every unconnected port by matching port names
    ///
    /// Each unconnected element input is fed by the unique element output or pipeline input
    /// carrying the same name; each unconnected pipeline output is fed by the unique element
    /// output carrying its name. An element never feeds itself. Nothing is connected if any
    /// name is missing or ambiguous.
    pub fn auto_connect(&mut self) -> Result<()> {
        let mut sources: HashMap<&str, Vec<(ElementRef, usize)>> = HashMap::new();
        for (port, name) in self.inputs.iter().enumerate() {
            sources.entry(name).or_default().push((ElementRef::ThisPipeline, port));
        }
        for (index, element) in self.elements.iter().enumerate() {
            for (port, name) in element.element.outputs().iter().enumerate() {
                sources.entry(name).or_default().push((ElementRef::Element(index), port));
            }
        }

        let mut pending = Vec::new();
        let mut problems = Vec::new();
        let mut resolve = |destination: ElementRef, destination_port: usize, name: &str, label: String| {
            let candidates: Vec<_> = sources
                .get(name)
                .map(|list| list.iter().filter(|(source, _)| *source != destination || destination.is_this_pipeline()).copied().collect())
                .unwrap_or_default();
            match candidates.as_slice() {
                [(source, source_port)] => {
                    if source.is_this_pipeline() && destination.is_this_pipeline() {
                        problems.push(format!("{label} can only be fed by the pipeline input of the same name"));
                    } else {
                        pending.push(Connection {
                            source: *source,
                            source_port: *source_port,
                            destination,
                            destination_port,
                        });
                    }
                }
                [] => problems.push(format!("no source named '{name}' for {label}")),
                _ => problems.push(format!("{} sources named '{name}' for {label}", candidates.len())),
            }
        };

        for (index, element) in self.elements.iter().enumerate() {
            let destination = ElementRef::Element(index);
            for (port, name) in element.element.inputs().iter().enumerate() {
                if self.connections.iter().any(|c| c.destination == destination && c.destination_port == port) {
                    continue;
                }
                resolve(destination, port, name, format!("input {}::{name}", element.name));
            }
        }
        for (port, name) in self.outputs.iter().enumerate() {
            if self.connections.iter().any(|c| c.destination.is_this_pipeline() && c.destination_port == port) {
                continue;
            }
            resolve(ElementRef::ThisPipeline, port, name, format!("pipeline output '{name}'"));
        }

        if !problems.is_empty() {
            return Err(Error::configuration(format!(
                "auto-connect failed in pipeline layout '{}':\n{}",
                self.type_name,
                problems.join("\n")
            )));
        }

        tracing::debug!(layout = %self.type_name, connections = pending.len(), "auto-connected ports");
        self.connections.extend(pending);
        Ok(())
    }

    /// Returns the connection feeding `port` of `element`, if any
    ///
    /// For [`ElementRef::ThisPipeline`] the port is one of this layout's output ports.
    pub fn source_of(&self, element: ElementRef, port: usize) -> Option<&Connection> {
        self.connections.iter().find(|c| c.destination == element && c.destination_port == port)
    }

    /// Returns every connection reading from `port` of `element`
    ///
    /// For [`ElementRef::ThisPipeline`] the port is one of this layout's input ports.
    pub fn destinations_of(&self, element: ElementRef, port: usize) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.source == element && c.source_port == port).collect()
    }

    /// Describes the source of an input port as `element::port`
    pub fn describe_source(&self, element: ElementRef, port: usize) -> Result<String> {
        let connection = self.source_of(element, port).ok_or_else(|| {
            Error::configuration(format!("{} has no source", self.port_label(element, port, Direction::Input)))
        })?;
        Ok(self.port_label(connection.source, connection.source_port, Direction::Output))
    }

    /// Describes every destination of an output port as `element::port`
    pub fn describe_destinations(&self, element: ElementRef, port: usize) -> Vec<String> {
        self.destinations_of(element, port)
            .into_iter()
            .map(|c| self.port_label(c.destination, c.destination_port, Direction::Input))
            .collect()
    }

    /// Validates that every port of this layout and of its nested layouts is wired
    ///
    /// Every element input needs exactly one source, every element output at least one
    /// destination, every pipeline output a source and every pipeline input at least one
    /// destination.
    ///
    /// # Arguments
    /// * `raise_on_error` - Return the diagnostics as a single error instead of a list
    ///
    /// # Returns
    /// One diagnostic line per unmet requirement, empty when the layout is valid
    pub fn check(&self, raise_on_error: bool) -> Result<Vec<String>> {
        let mut diagnostics = Vec::new();
        self.collect_diagnostics("", &mut diagnostics);

        if raise_on_error && !diagnostics.is_empty() {
            return Err(Error::configuration(format!(
                "pipeline layout '{}' is invalid:\n{}",
                self.type_name,
                diagnostics.join("\n")
            )));
        }
        Ok(diagnostics)
    }

    fn collect_diagnostics(&self, prefix: &str, diagnostics: &mut Vec<String>) {
        for (index, element) in self.elements.iter().enumerate() {
            let this = ElementRef::Element(index);
            for (port, name) in element.element.inputs().iter().enumerate() {
                if self.source_of(this, port).is_none() {
                    diagnostics.push(format!("{prefix}{}::{name} (input) has no source", element.name));
                }
            }
            for (port, name) in element.element.outputs().iter().enumerate() {
                if self.destinations_of(this, port).is_empty() {
                    diagnostics.push(format!("{prefix}{}::{name} (output) is not connected", element.name));
                }
            }
            if let Element::Pipeline(nested) = &element.element {
                nested.collect_diagnostics(&format!("{prefix}{}{PATH_SEPARATOR}", element.name), diagnostics);
            }
        }

        let owner = if prefix.is_empty() { self.type_name.clone() } else { prefix.trim_end_matches(PATH_SEPARATOR).to_string() };
        for (port, name) in self.outputs.iter().enumerate() {
            if self.source_of(ElementRef::ThisPipeline, port).is_none() {
                diagnostics.push(format!("pipeline output {owner}::{name} has no source"));
            }
        }
        for (port, name) in self.inputs.iter().enumerate() {
            if self.destinations_of(ElementRef::ThisPipeline, port).is_empty() {
                diagnostics.push(format!("pipeline input {owner}::{name} is not connected"));
            }
        }
    }

    fn port_label(&self, element: ElementRef, port: usize, direction: Direction) -> String {
        let (owner, ports) = match (element, direction) {
            (ElementRef::ThisPipeline, Direction::Input) => (self.type_name.as_str(), &self.outputs),
            (ElementRef::ThisPipeline, Direction::Output) => (self.type_name.as_str(), &self.inputs),
            (ElementRef::Element(index), direction) => match self.elements.get(index) {
                Some(e) => (
                    e.name.as_str(),
                    match direction {
                        Direction::Input => e.element.inputs(),
                        Direction::Output => e.element.outputs(),
                    },
                ),
                None => return format!("#{index}::#{port}"),
            },
        };
        match ports.name(port) {
            Some(name) => format!("{owner}::{name}"),
            None => format!("{owner}::#{port}"),
        }
    }
}

/// Which side of an element a port label refers to
#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

impl<F> fmt::Display for PipelineLayout<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipeline {} {} -> {}", self.type_name, self.inputs, self.outputs)?;
        for element in &self.elements {
            let kind = match element.element {
                Element::Filter(_) => "filter",
                Element::Pipeline(_) => "pipeline",
            };
            writeln!(
                f,
                "  {kind} {}: {} {} -> {}",
                element.name,
                element.element.type_name(),
                element.element.inputs(),
                element.element.outputs()
            )?;
        }
        for c in &self.connections {
            writeln!(
                f,
                "  {} => {}",
                self.port_label(c.source, c.source_port, Direction::Output),
                self.port_label(c.destination, c.destination_port, Direction::Input)
            )?;
        }
        Ok(())
    }
}
