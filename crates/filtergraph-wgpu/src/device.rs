//! wgpu implementation of the filter graph device

use crate::error::WgpuError;
use crate::filter::{WgpuFilter, WgpuFilterDescriptor};
use crate::format::WgpuFormat;
use crate::target::WgpuRenderTarget;
use filtergraph::{Device, FilterLayout};
use std::time::Duration;
use wgpu_profiler::{GpuProfiler, GpuProfilerQuery, GpuProfilerSettings};

/// Filter graph device backed by a wgpu device and queue
///
/// Filters are compute shaders and render targets are groups of storage textures. When the
/// device was created with [`wgpu::Features::TIMESTAMP_QUERY`], monitored pipelines time each
/// filter with GPU timestamps through a [`GpuProfiler`]; otherwise they fall back to wall-clock
/// time, measured after waiting for the submitted work to finish.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    profiler: Option<GpuProfiler>,
    timer_armed: bool,
    targets_created: usize,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("device", &self.device)
            .field("timestamps", &self.profiler.is_some())
            .field("timer_armed", &self.timer_armed)
            .field("targets_created", &self.targets_created)
            .finish()
    }
}

impl WgpuDevice {
    /// Wraps `device` and `queue`
    ///
    /// # Returns
    /// The device, or the error raised while creating the GPU profiler
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self, WgpuError> {
        let profiler = if device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            Some(GpuProfiler::new(
                &device,
                GpuProfilerSettings {
                    max_num_pending_frames: 3,
                    enable_timer_queries: true,
                    enable_debug_groups: true,
                },
            )?)
        } else {
            None
        };
        tracing::debug!(timestamps = profiler.is_some(), "created wgpu filter device");
        Ok(Self {
            device,
            queue,
            profiler,
            timer_armed: false,
            targets_created: 0,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns true if filters can be timed with GPU timestamps
    pub fn has_timestamps(&self) -> bool {
        self.profiler.is_some()
    }

    /// Opens a pass query named `label`, if a timer is armed
    pub(crate) fn begin_query(&self, label: &str, encoder: &mut wgpu::CommandEncoder) -> Option<GpuProfilerQuery> {
        let profiler = self.profiler.as_ref().filter(|_| self.timer_armed)?;
        Some(profiler.begin_pass_query(label, encoder))
    }

    /// Closes `query` and records the resolution of every open query
    pub(crate) fn end_query(&mut self, encoder: &mut wgpu::CommandEncoder, query: GpuProfilerQuery) {
        let Some(profiler) = self.profiler.as_mut() else {
            return;
        };
        profiler.end_query(encoder, query);
        profiler.resolve_queries(encoder);
    }
}

impl Device for WgpuDevice {
    type Format = WgpuFormat;
    type Texture = wgpu::Texture;
    type FilterDescriptor = WgpuFilterDescriptor;
    type Filter = WgpuFilter;
    type Target = WgpuRenderTarget;
    type Error = WgpuError;

    fn create_filter(&mut self, layout: &FilterLayout<WgpuFilterDescriptor>) -> Result<WgpuFilter, WgpuError> {
        WgpuFilter::new(&self.device, layout)
    }

    fn create_target(&mut self, format: &WgpuFormat, attachments: usize) -> Result<WgpuRenderTarget, WgpuError> {
        let id = self.targets_created;
        self.targets_created += 1;
        tracing::debug!(render_target = id, ?format, attachments, "allocating render target");
        Ok(WgpuRenderTarget::new(&self.device, id, *format, attachments))
    }

    fn start_timer(&mut self) -> bool {
        self.timer_armed = self.profiler.is_some();
        self.timer_armed
    }

    /// Waits for every submitted render, then reads back the armed timer if any
    fn stop_timer(&mut self) -> Result<Option<Duration>, WgpuError> {
        let armed = std::mem::take(&mut self.timer_armed);
        let Some(profiler) = self.profiler.as_mut().filter(|_| armed) else {
            self.device.poll(wgpu::PollType::Wait)?;
            return Ok(None);
        };

        profiler.end_frame()?;
        self.device.poll(wgpu::PollType::Wait)?;
        let Some(results) = profiler.process_finished_frame(self.queue.get_timestamp_period()) else {
            return Ok(None);
        };
        let seconds: f64 = results.iter().filter_map(|result| result.time.as_ref()).map(|time| time.end - time.start).sum();
        Ok(Some(Duration::from_secs_f64(seconds.max(0.0))))
    }
}
