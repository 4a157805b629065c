//! Compiled, executable pipelines
//!
//! A [`Pipeline`] is built once from a [`PipelineLayout`] and then run many times. Every run
//! binds exactly one texture per pipeline input, renders the filters in schedule order and
//! leaves the results readable through [`Pipeline::output`] until the next run.

use crate::compiler::{Binding, ExecutionPlan, compile};
use crate::device::{Device, Filter, RenderTarget};
use crate::error::{Error, Result, ResultExt};
use crate::layout::PipelineLayout;
use crate::monitor::Monitor;
use std::time::{Duration, Instant};

/// What [`Pipeline::run`] should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Render every filter with the bound inputs, then unbind them
    Process,
    /// Unbind every input without rendering
    Reset,
}

/// An executable instance of a [`PipelineLayout`]
///
/// The pipeline owns its filter instances and its render target pool. External input
/// textures are held as handle clones from [`Pipeline::append_input`] until the next
/// successful [`Pipeline::process`] or [`Pipeline::reset`].
pub struct Pipeline<D: Device> {
    name: String,
    layout: PipelineLayout<D::FilterDescriptor>,
    filters: Vec<D::Filter>,
    targets: Vec<D::Target>,
    plan: ExecutionPlan,
    inputs: Vec<D::Texture>,
    monitor: Monitor,
}

impl<D: Device> Pipeline<D> {
    /// Compiles `layout` on `device`
    ///
    /// # Arguments
    /// * `name` - Instance name, used in logs and error messages
    /// * `layout` - Graph to compile; kept for port name lookups
    /// * `device` - Backend instantiating filters and render targets
    ///
    /// # Returns
    /// A pipeline ready to accept inputs, or the configuration, build or device error that
    /// prevented compilation
    pub fn new(name: impl Into<String>, layout: PipelineLayout<D::FilterDescriptor>, device: &mut D) -> Result<Self> {
        let name = name.into();
        let compiled = compile(&name, &layout, device)?;
        let pipeline = Self {
            name,
            layout,
            filters: compiled.filters,
            targets: compiled.targets,
            plan: compiled.plan,
            inputs: Vec::new(),
            monitor: Monitor::default(),
        };
        tracing::info!(pipeline = %pipeline.name, footprint = pipeline.memory_footprint(), "pipeline ready");
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &PipelineLayout<D::FilterDescriptor> {
        &self.layout
    }

    /// Binds `texture` to the next unbound pipeline input
    pub fn append_input(&mut self, texture: &D::Texture) -> Result<()> {
        if self.inputs.len() >= self.layout.inputs().len() {
            return Err(Error::runtime(format!(
                "too many arguments: pipeline '{}' takes {} input(s)",
                self.name,
                self.layout.inputs().len()
            )));
        }
        self.inputs.push(texture.clone());
        Ok(())
    }

    /// Binds every output of `other`, in order, to the next unbound inputs
    ///
    /// Nothing is bound if the outputs do not all fit.
    pub fn append_outputs_of(&mut self, other: &Pipeline<D>) -> Result<()> {
        let outputs = other.outputs().with_context(|| format!("reading outputs of pipeline '{}'", other.name))?;
        if self.inputs.len() + outputs.len() > self.layout.inputs().len() {
            return Err(Error::runtime(format!(
                "too many arguments: pipeline '{}' has {} free input(s), pipeline '{}' provides {}",
                self.name,
                self.layout.inputs().len() - self.inputs.len(),
                other.name,
                outputs.len()
            )));
        }
        self.inputs.extend(outputs.into_iter().cloned());
        Ok(())
    }

    pub fn num_bound_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Processes or resets the pipeline
    pub fn run(&mut self, action: Action, device: &mut D) -> Result<()> {
        match action {
            Action::Process => self.process(device),
            Action::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    /// Renders every filter in schedule order
    ///
    /// Fails without touching any state unless exactly one texture per pipeline input has
    /// been bound. On success the bound inputs are released.
    pub fn process(&mut self, device: &mut D) -> Result<()> {
        let expected = self.layout.inputs().len();
        if self.inputs.len() < expected {
            return Err(Error::runtime(format!(
                "too few arguments: pipeline '{}' takes {expected} input(s), {} bound",
                self.name,
                self.inputs.len()
            )));
        }

        let monitoring = self.monitor.is_enabled();
        let mut samples = Vec::new();
        for &index in &self.plan.schedule {
            let planned = &self.plan.filters[index];
            let filter = &mut self.filters[index];

            for (port, binding) in planned.inputs.iter().enumerate() {
                let texture = match *binding {
                    Binding::PipelineInput { port: input } => &self.inputs[input],
                    Binding::Target { target, attachment } => self.targets[target]
                        .attachment(attachment)
                        .ok_or_else(|| Error::build(format!("render target #{target} has no attachment #{attachment}")))?,
                };
                filter.set_input(port, texture.clone());
            }

            tracing::trace!(pipeline = %self.name, filter = %planned.path, render_target = planned.target, "rendering filter");
            let target = &mut self.targets[planned.target];
            if monitoring {
                let device_timer = device.start_timer();
                let started = Instant::now();
                let rendered = filter.render(device, target);
                let stopped = device.stop_timer();
                let elapsed = started.elapsed();
                rendered.map_err(Error::device).with_context(|| format!("rendering filter '{}'", planned.path))?;
                let measured = stopped.map_err(Error::device).with_context(|| format!("timing filter '{}'", planned.path))?;
                samples.push((index, if device_timer { measured.unwrap_or(elapsed) } else { elapsed }));
            } else {
                filter.render(device, target).map_err(Error::device).with_context(|| format!("rendering filter '{}'", planned.path))?;
            }
        }

        self.monitor.record(&samples);
        self.release_inputs();
        Ok(())
    }

    /// Releases every bound input; calling it again is a no-op
    pub fn reset(&mut self) {
        self.release_inputs();
    }

    /// Drops the bound inputs and every handle the filters still hold
    fn release_inputs(&mut self) {
        self.inputs.clear();
        for filter in &mut self.filters {
            filter.clear_inputs();
        }
    }

    /// Texture holding output port `index`
    pub fn output(&self, index: usize) -> Result<&D::Texture> {
        let output = self.plan.outputs.get(index).ok_or_else(|| {
            Error::runtime(format!(
                "pipeline '{}' has no output #{index} (it has {})",
                self.name,
                self.plan.outputs.len()
            ))
        })?;
        match output.binding {
            Binding::Target { target, attachment } => self.targets[target]
                .attachment(attachment)
                .ok_or_else(|| Error::build(format!("render target #{target} has no attachment #{attachment}"))),
            Binding::PipelineInput { .. } => Err(Error::build(format!("output '{}' is not produced by a filter", output.name))),
        }
    }

    /// Texture holding the output port called `name`
    pub fn output_by_name(&self, name: &str) -> Result<&D::Texture> {
        let index = self
            .layout
            .outputs()
            .index_of(name)
            .ok_or_else(|| Error::runtime(format!("pipeline '{}' has no output named '{name}'", self.name)))?;
        self.output(index)
    }

    /// Textures of every output port, in port order
    pub fn outputs(&self) -> Result<Vec<&D::Texture>> {
        (0..self.plan.outputs.len()).map(|index| self.output(index)).collect()
    }

    /// Filter at `path`, for example `"denoise::blur"`
    pub fn filter(&self, path: &str) -> Result<&D::Filter> {
        let index = self.filter_index(path)?;
        Ok(&self.filters[index])
    }

    /// Mutable access to the filter at `path`, to tweak its parameters between runs
    pub fn filter_mut(&mut self, path: &str) -> Result<&mut D::Filter> {
        let index = self.filter_index(path)?;
        Ok(&mut self.filters[index])
    }

    /// Filter with global index `index`
    pub fn filter_at(&self, index: usize) -> Result<&D::Filter> {
        self.filters
            .get(index)
            .ok_or_else(|| Error::runtime(format!("pipeline '{}' has no filter #{index}", self.name)))
    }

    /// Full path of the filter with global index `index`
    pub fn filter_path(&self, index: usize) -> Result<&str> {
        self.plan
            .filters
            .get(index)
            .map(|f| f.path.as_str())
            .ok_or_else(|| Error::runtime(format!("pipeline '{}' has no filter #{index}", self.name)))
    }

    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    /// Global filter indices in execution order
    pub fn schedule(&self) -> &[usize] {
        &self.plan.schedule
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn target(&self, index: usize) -> Result<&D::Target> {
        self.targets
            .get(index)
            .ok_or_else(|| Error::runtime(format!("pipeline '{}' has no render target #{index}", self.name)))
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Approximate device memory held by filters and render targets, in bytes
    pub fn memory_footprint(&self) -> u64 {
        let filters: u64 = self.filters.iter().map(|f| f.memory_footprint()).sum();
        let targets: u64 = self.targets.iter().map(|t| t.memory_footprint()).sum();
        filters + targets
    }

    /// Starts timing every filter render
    pub fn enable_monitoring(&mut self) {
        self.monitor.enable(self.filters.len());
    }

    /// Stops timing and drops every collected sample
    pub fn disable_monitoring(&mut self) {
        self.monitor.disable();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_enabled()
    }

    /// Render time of the filter at `path` during the last run
    pub fn timing(&self, path: &str) -> Result<Duration> {
        self.monitor.last(self.filter_index(path)?)
    }

    /// Render time of the whole last run
    pub fn total_timing(&self) -> Result<Duration> {
        self.monitor.total()
    }

    /// Mean render time of the filter at `path` over every monitored run
    pub fn mean_timing(&self, path: &str) -> Result<Duration> {
        self.monitor.mean(self.filter_index(path)?)
    }

    /// Number of runs recorded since monitoring was enabled
    pub fn monitored_runs(&self) -> Result<u32> {
        self.monitor.runs()
    }

    fn filter_index(&self, path: &str) -> Result<usize> {
        self.plan
            .filters
            .iter()
            .position(|f| f.path == path)
            .ok_or_else(|| Error::runtime(format!("pipeline '{}' has no filter at path '{path}'", self.name)))
    }
}
