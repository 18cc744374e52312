use crate::error::SignalError;
use serde::{Deserialize, Serialize};

/// Basic typed time series. Sample `i` sits at `i / fs` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    /// Nearest sample index for a time in seconds (may lie outside the series).
    pub fn index_of(&self, seconds: f64) -> i64 {
        (seconds * self.fs).round() as i64
    }
    pub fn time_of(&self, index: usize) -> f64 {
        index as f64 / self.fs
    }
}

/// R-peak timestamps in seconds, strictly increasing. The position of a
/// peak in this list is its global beat index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RPeaks {
    pub times: Vec<f64>,
}

impl RPeaks {
    pub fn new(times: Vec<f64>) -> Self {
        Self { times }
    }
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// One RR interval: `timestamp` is the later peak, `duration` the time
/// elapsed since the earlier one (both in seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RRInterval {
    pub timestamp: f64,
    pub duration: f64,
}

impl RRInterval {
    pub fn duration_ms(&self) -> f64 {
        self.duration * 1000.0
    }
}

/// RR durations (seconds) without timestamps, as consumed by the HRV metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_intervals(intervals: &[RRInterval]) -> Self {
        Self {
            rr: intervals.iter().map(|i| i.duration).collect(),
        }
    }
}

/// Immutable view of one loaded recording: samples, R-peaks and RR records.
#[derive(Debug, Clone, Serialize)]
pub struct SignalStore {
    series: TimeSeries,
    peaks: RPeaks,
    intervals: Vec<RRInterval>,
}

impl SignalStore {
    pub fn new(
        series: TimeSeries,
        peaks: RPeaks,
        intervals: Vec<RRInterval>,
    ) -> Result<Self, SignalError> {
        validate_series(&series)?;
        validate_peaks(&peaks)?;
        let expected = peaks.len().saturating_sub(1);
        if intervals.len() != expected {
            return Err(SignalError::IntervalCountMismatch {
                expected,
                actual: intervals.len(),
            });
        }
        Ok(Self {
            series,
            peaks,
            intervals,
        })
    }

    /// Build a store whose RR records are derived from consecutive peaks.
    pub fn from_peaks(series: TimeSeries, peaks: RPeaks) -> Result<Self, SignalError> {
        let intervals = intervals_from_peaks(&peaks.times);
        Self::new(series, peaks, intervals)
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }
    pub fn samples(&self) -> &[f64] {
        &self.series.data
    }
    pub fn fs(&self) -> f64 {
        self.series.fs
    }
    pub fn len(&self) -> usize {
        self.series.len()
    }
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.series.duration()
    }
    pub fn peaks(&self) -> &RPeaks {
        &self.peaks
    }
    pub fn intervals(&self) -> &[RRInterval] {
        &self.intervals
    }
    pub fn rr_series(&self) -> RRSeries {
        RRSeries::from_intervals(&self.intervals)
    }
    pub fn amplitude_at(&self, index: usize) -> Option<f64> {
        self.series.data.get(index).copied()
    }
}

pub fn intervals_from_peaks(times: &[f64]) -> Vec<RRInterval> {
    times
        .windows(2)
        .map(|w| RRInterval {
            timestamp: w[1],
            duration: w[1] - w[0],
        })
        .collect()
}

fn validate_series(series: &TimeSeries) -> Result<(), SignalError> {
    if !series.fs.is_finite() || series.fs <= 0.0 {
        return Err(SignalError::InvalidSamplingRate(series.fs));
    }
    if series.is_empty() {
        return Err(SignalError::EmptySeries);
    }
    Ok(())
}

fn validate_peaks(peaks: &RPeaks) -> Result<(), SignalError> {
    for (index, w) in peaks.times.windows(2).enumerate() {
        if w[1].partial_cmp(&w[0]) != Some(std::cmp::Ordering::Greater) {
            return Err(SignalError::NonMonotonicPeaks {
                index: index + 1,
                time: w[1],
            });
        }
    }
    Ok(())
}
