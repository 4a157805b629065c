//! Filter graph compiler and scheduler
//!
//! This crate turns declarative image-processing graphs into executable pipelines. A graph is
//! described with [`PipelineLayout`]: filters and nested pipelines wired by connections between
//! named ports. [`Pipeline::new`] compiles a layout for a rendering backend implementing
//! [`Device`]:
//!
//! 1. nested pipelines are flattened and their boundaries merged away
//! 2. filters are ordered topologically, preferring orders that let filters share render targets
//! 3. filters and the minimal render target pool are instantiated on the device
//!
//! The resulting [`Pipeline`] accepts one texture per input, renders every filter in schedule
//! order and exposes its outputs, its filters by `::` separated path and optional per-filter
//! timing.
//!
//! ```ignore
//! let mut layout = PipelineLayout::new("Sharpen");
//! layout.add_input("image")?;
//! layout.add_output("result")?;
//! let blur = layout.add_filter("blur", blur_layout)?;
//! layout.connect_to_input(0, blur, 0)?;
//! layout.connect_to_output(blur, 0, 0)?;
//!
//! let mut pipeline = Pipeline::new("sharpen", layout, &mut device)?;
//! pipeline.append_input(&texture)?;
//! pipeline.process(&mut device)?;
//! let result = pipeline.output(0)?;
//! ```

pub mod compiler;
pub mod device;
pub mod error;
pub mod layout;
mod monitor;
mod pipeline;

#[cfg(test)]
mod mock;

pub use compiler::{Binding, ExecutionPlan, GlobalConnection, GlobalRef, PlannedFilter, PlannedOutput, PlannedTarget};
pub use device::{Device, Filter, RenderTarget};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use layout::{Connection, Element, ElementRef, FilterLayout, NamedElement, PATH_SEPARATOR, PipelineLayout, Ports, split_path};
pub use pipeline::{Action, Pipeline};
