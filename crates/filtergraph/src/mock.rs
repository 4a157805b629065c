//! Deterministic in-memory device for tests
//!
//! Textures are shared strings. A filter renders by writing `Type(input, input, ...)` into
//! every attachment it owns, so the content of any output spells out the exact chain of
//! filters and inputs that produced it.

use crate::device::{Device, Filter, RenderTarget};
use crate::layout::FilterLayout;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub(crate) enum MockError {
    #[error("cannot instantiate filter type '{0}'")]
    Create(String),
    #[error("filter '{0}' failed to render")]
    Render(String),
    #[error("input #{port} of filter '{filter}' is not bound")]
    Unbound { filter: String, port: usize },
}

#[derive(Debug)]
struct TextureData {
    id: usize,
    contents: RefCell<String>,
}

/// Reference counted texture handle
#[derive(Debug, Clone)]
pub(crate) struct MockTexture(Rc<TextureData>);

impl MockTexture {
    pub fn new(id: usize, contents: &str) -> Self {
        Self(Rc::new(TextureData {
            id,
            contents: RefCell::new(contents.to_string()),
        }))
    }

    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn contents(&self) -> String {
        self.0.contents.borrow().clone()
    }

    /// Number of live handles to this texture
    pub fn handles(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockDescriptor {
    pub format: &'static str,
    pub footprint: u64,
}

/// Builds a filter layout with ports `in0..` and `out0..`
pub(crate) fn filter(type_name: &str, inputs: usize, outputs: usize, format: &'static str) -> FilterLayout<MockDescriptor> {
    let mut layout = FilterLayout::new(type_name, MockDescriptor { format, footprint: 16 });
    for i in 0..inputs {
        layout.add_input(format!("in{i}")).unwrap();
    }
    for i in 0..outputs {
        layout.add_output(format!("out{i}")).unwrap();
    }
    layout
}

#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    next_texture: usize,
    /// Duration reported by the device timer; `None` disables timer queries
    pub timer: Option<Duration>,
    pub timer_armed: bool,
    pub timer_stops: usize,
    /// Filter type whose instantiation fails
    pub fail_create: Option<String>,
    /// Filter type whose rendering fails
    pub fail_render: Option<String>,
    /// Type names of rendered filters, in order
    pub renders: Vec<String>,
    pub targets_created: usize,
    pub attachments_added: usize,
}

impl MockDevice {
    /// Creates an external texture with the given contents
    pub fn texture(&mut self, contents: &str) -> MockTexture {
        self.next_texture += 1;
        MockTexture::new(self.next_texture, contents)
    }
}

impl Device for MockDevice {
    type Format = &'static str;
    type Texture = MockTexture;
    type FilterDescriptor = MockDescriptor;
    type Filter = MockFilter;
    type Target = MockTarget;
    type Error = MockError;

    fn create_filter(&mut self, layout: &FilterLayout<MockDescriptor>) -> Result<MockFilter, MockError> {
        if self.fail_create.as_deref() == Some(layout.type_name()) {
            return Err(MockError::Create(layout.type_name().to_string()));
        }
        Ok(MockFilter {
            type_name: layout.type_name().to_string(),
            format: layout.descriptor().format,
            footprint: layout.descriptor().footprint,
            inputs: vec![None; layout.inputs().len()],
            outputs: layout.outputs().len(),
            label: None,
        })
    }

    fn create_target(&mut self, format: &&'static str, attachments: usize) -> Result<MockTarget, MockError> {
        self.targets_created += 1;
        let mut target = MockTarget {
            format: *format,
            attachments: Vec::new(),
        };
        for _ in 0..attachments {
            target.attachments.push(self.texture(""));
        }
        Ok(target)
    }

    fn start_timer(&mut self) -> bool {
        self.timer_armed = self.timer.is_some();
        self.timer_armed
    }

    fn stop_timer(&mut self) -> Result<Option<Duration>, MockError> {
        let armed = std::mem::take(&mut self.timer_armed);
        self.timer_stops += 1;
        Ok(self.timer.filter(|_| armed))
    }
}

#[derive(Debug)]
pub(crate) struct MockFilter {
    pub type_name: String,
    format: &'static str,
    footprint: u64,
    inputs: Vec<Option<MockTexture>>,
    outputs: usize,
    /// Tweakable parameter; replaces the type name in rendered contents
    pub label: Option<String>,
}

impl Filter<MockDevice> for MockFilter {
    fn output_format(&self) -> &&'static str {
        &self.format
    }

    fn memory_footprint(&self) -> u64 {
        self.footprint
    }

    fn set_input(&mut self, port: usize, texture: MockTexture) {
        self.inputs[port] = Some(texture);
    }

    fn clear_inputs(&mut self) {
        self.inputs.fill(None);
    }

    fn render(&mut self, device: &mut MockDevice, target: &mut MockTarget) -> Result<(), MockError> {
        if device.fail_render.as_deref() == Some(self.type_name.as_str()) {
            return Err(MockError::Render(self.type_name.clone()));
        }

        let mut arguments = Vec::with_capacity(self.inputs.len());
        for (port, input) in self.inputs.iter().enumerate() {
            let input = input.as_ref().ok_or_else(|| MockError::Unbound {
                filter: self.type_name.clone(),
                port,
            })?;
            arguments.push(input.contents());
        }

        let name = self.label.as_deref().unwrap_or(&self.type_name);
        for output in 0..self.outputs {
            let contents = if self.outputs == 1 {
                format!("{name}({})", arguments.join(","))
            } else {
                format!("{name}[{output}]({})", arguments.join(","))
            };
            *target.attachments[output].0.contents.borrow_mut() = contents;
        }
        device.renders.push(self.type_name.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MockTarget {
    format: &'static str,
    attachments: Vec<MockTexture>,
}

impl RenderTarget<MockDevice> for MockTarget {
    fn format(&self) -> &&'static str {
        &self.format
    }

    fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    fn add_attachment(&mut self, device: &mut MockDevice) -> Result<(), MockError> {
        device.attachments_added += 1;
        self.attachments.push(device.texture(""));
        Ok(())
    }

    fn attachment(&self, index: usize) -> Option<&MockTexture> {
        self.attachments.get(index)
    }

    fn memory_footprint(&self) -> u64 {
        self.attachments.len() as u64 * 64
    }
}
