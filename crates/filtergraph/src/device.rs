//! Contracts between the graph compiler and a rendering backend
//!
//! The compiler never talks to a graphics API directly. A [`Device`] instantiates filters and
//! render targets, a [`Filter`] renders its bound inputs into a target and a [`RenderTarget`]
//! groups one or more output attachments sharing a single format.

use crate::layout::FilterLayout;
use std::fmt;
use std::time::Duration;

/// A rendering backend
pub trait Device: Sized {
    /// Output format of filters and render targets, compared for target reuse
    type Format: Clone + PartialEq + fmt::Debug;
    /// Handle to a texture; cloning is expected to be cheap
    type Texture: Clone;
    /// Backend data carried by every [`FilterLayout`]
    type FilterDescriptor: Clone;
    /// Executable filter instance
    type Filter: Filter<Self>;
    /// Render target instance
    type Target: RenderTarget<Self>;
    /// Backend failure
    type Error: std::error::Error + Send + Sync + 'static;

    /// Instantiates a filter from its layout
    fn create_filter(&mut self, layout: &FilterLayout<Self::FilterDescriptor>) -> Result<Self::Filter, Self::Error>;

    /// Allocates a render target with `attachments` outputs of the given format
    fn create_target(&mut self, format: &Self::Format, attachments: usize) -> Result<Self::Target, Self::Error>;

    /// Arms a device timer around the next filter render
    ///
    /// Returns `false` when the device has no timer queries; callers then measure wall-clock
    /// time instead.
    fn start_timer(&mut self) -> bool {
        false
    }

    /// Waits until every submitted render has finished
    ///
    /// Returns the time measured by the timer armed with [`Device::start_timer`], or `None`
    /// when no timer was armed. Called after every monitored render, including failed ones.
    fn stop_timer(&mut self) -> Result<Option<Duration>, Self::Error> {
        Ok(None)
    }
}

/// An executable filter owned by a compiled pipeline
pub trait Filter<D: Device> {
    /// Format of every output attachment this filter writes
    fn output_format(&self) -> &D::Format;

    /// Approximate device memory held by the filter itself, in bytes
    fn memory_footprint(&self) -> u64;

    /// Binds `texture` to input `port` for the next render
    fn set_input(&mut self, port: usize, texture: D::Texture);

    /// Drops every bound input texture
    fn clear_inputs(&mut self);

    /// Renders into the first attachments of `target`
    fn render(&mut self, device: &mut D, target: &mut D::Target) -> Result<(), D::Error>;
}

/// A group of same-format output attachments
pub trait RenderTarget<D: Device> {
    fn format(&self) -> &D::Format;

    fn attachment_count(&self) -> usize;

    /// Appends one attachment of the target's format
    fn add_attachment(&mut self, device: &mut D) -> Result<(), D::Error>;

    fn attachment(&self, index: usize) -> Option<&D::Texture>;

    /// Approximate device memory held by all attachments, in bytes
    fn memory_footprint(&self) -> u64;

    /// Returns true if `filter` can render into this target
    fn matches_format(&self, filter: &D::Filter) -> bool {
        self.format() == filter.output_format()
    }
}
