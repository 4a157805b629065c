//! Graph authoring
//!
//! This module provides the declarative description of filter graphs: named ports, filter
//! layouts and nestable pipeline layouts with their connections and validation.

mod filter_layout;
mod pipeline_layout;
mod ports;

pub use filter_layout::FilterLayout;
pub use pipeline_layout::{Connection, Element, ElementRef, NamedElement, PipelineLayout};
pub use ports::{PATH_SEPARATOR, Ports, split_path};
