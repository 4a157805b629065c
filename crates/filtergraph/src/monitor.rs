//! Per-filter timing of pipeline runs

use crate::error::{Error, Result};
use std::time::Duration;

/// Timing samples, present only while monitoring is enabled
#[derive(Debug, Default)]
pub(crate) struct Monitor {
    samples: Option<Samples>,
}

#[derive(Debug)]
struct Samples {
    /// Duration of every filter during the last monitored run
    last: Vec<Duration>,
    /// Sum of every filter over all monitored runs
    sum: Vec<Duration>,
    runs: u32,
}

impl Monitor {
    /// Starts collecting samples for `filters` filters; no-op if already enabled
    pub fn enable(&mut self, filters: usize) {
        self.samples.get_or_insert_with(|| Samples {
            last: vec![Duration::ZERO; filters],
            sum: vec![Duration::ZERO; filters],
            runs: 0,
        });
    }

    /// Stops collecting and drops every sample
    pub fn disable(&mut self) {
        self.samples = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.samples.is_some()
    }

    /// Records one completed run
    ///
    /// # Arguments
    /// * `run` - `(filter index, duration)` for every filter rendered during the run
    pub fn record(&mut self, run: &[(usize, Duration)]) {
        let Some(samples) = self.samples.as_mut() else {
            return;
        };
        samples.last.fill(Duration::ZERO);
        for &(filter, duration) in run {
            samples.last[filter] = duration;
            samples.sum[filter] += duration;
        }
        samples.runs += 1;
    }

    /// Duration of `filter` during the last monitored run
    pub fn last(&self, filter: usize) -> Result<Duration> {
        Ok(self.samples()?.last[filter])
    }

    /// Duration of the whole last monitored run
    pub fn total(&self) -> Result<Duration> {
        Ok(self.samples()?.last.iter().sum())
    }

    /// Mean duration of `filter` over every monitored run
    pub fn mean(&self, filter: usize) -> Result<Duration> {
        let samples = self.samples()?;
        if samples.runs == 0 {
            return Ok(Duration::ZERO);
        }
        Ok(samples.sum[filter] / samples.runs)
    }

    pub fn runs(&self) -> Result<u32> {
        Ok(self.samples()?.runs)
    }

    fn samples(&self) -> Result<&Samples> {
        self.samples.as_ref().ok_or_else(|| Error::runtime("performance monitoring is disabled"))
    }
}
