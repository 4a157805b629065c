//! Filter layouts: the static description of one executable stage

use super::Ports;
use crate::error::Result;

/// Description of a single filter: its ports plus backend specific data
///
/// The descriptor `F` is opaque to the graph compiler. It is handed to the device when the
/// filter is instantiated (shader source, output format, sampler settings, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterLayout<F> {
    type_name: String,
    inputs: Ports,
    outputs: Ports,
    descriptor: F,
}

impl<F> FilterLayout<F> {
    /// Creates a filter layout without ports
    pub fn new(type_name: impl Into<String>, descriptor: F) -> Self {
        Self {
            type_name: type_name.into(),
            inputs: Ports::new(),
            outputs: Ports::new(),
            descriptor,
        }
    }

    /// Creates a filter layout with the given input and output port names
    ///
    /// # Arguments
    /// * `type_name` - Name of the filter type, used in diagnostics
    /// * `inputs` - Input port names, in binding order
    /// * `outputs` - Output port names, in attachment order
    /// * `descriptor` - Backend data used to instantiate the filter
    pub fn with_ports(type_name: impl Into<String>, inputs: &[&str], outputs: &[&str], descriptor: F) -> Result<Self> {
        let mut layout = Self::new(type_name, descriptor);
        for name in inputs {
            layout.add_input(*name)?;
        }
        for name in outputs {
            layout.add_output(*name)?;
        }
        Ok(layout)
    }

    /// Builder variant of [`FilterLayout::add_input`]
    pub fn with_input(mut self, name: impl Into<String>) -> Result<Self> {
        self.add_input(name)?;
        Ok(self)
    }

    /// Builder variant of [`FilterLayout::add_output`]
    pub fn with_output(mut self, name: impl Into<String>) -> Result<Self> {
        self.add_output(name)?;
        Ok(self)
    }

    /// Declares a new input port and returns its index
    pub fn add_input(&mut self, name: impl Into<String>) -> Result<usize> {
        self.inputs.add(name)
    }

    /// Declares a new output port and returns its index
    pub fn add_output(&mut self, name: impl Into<String>) -> Result<usize> {
        self.outputs.add(name)
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

    pub fn descriptor(&self) -> &F {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut F {
        &mut self.descriptor
    }
}
