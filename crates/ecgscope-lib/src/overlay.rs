//! Per-viewport derived views: visible samples, R-peaks, RR markers, the RR
//! trace, segment statistics and the vertical axis domain. Everything here
//! is a pure function of the signal store, the window and the labels.

use crate::classification::{BeatClass, ClassificationCache};
use crate::signal::SignalStore;
use crate::viewport::Viewport;
use serde::{Deserialize, Serialize};

/// Fraction of the visible amplitude range added above and below.
const AMPLITUDE_PADDING: f64 = 0.1;
/// RR markers sit this fraction of the visible range below the signal.
const RR_MARKER_DROP: f64 = 0.3;
/// Fixed padding (ms) around the RR trace.
const RR_TRACE_PADDING_MS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceMode {
    #[default]
    Waveform,
    RrTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisiblePeak {
    /// Position in the global R-peak set.
    pub beat_index: usize,
    pub time: f64,
    pub sample_index: usize,
    pub amplitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibleInterval {
    pub interval_index: usize,
    pub timestamp: f64,
    pub duration: f64,
    /// Marker position, moved back onto the earlier peak of the pair.
    pub anchor_time: f64,
    pub anchor_amplitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BeatCounts {
    pub normal: usize,
    pub ventricular: usize,
    pub supraventricular: usize,
    pub fusion: usize,
    pub unknown: usize,
}

impl BeatCounts {
    pub fn add(&mut self, class: BeatClass) {
        match class {
            BeatClass::Normal => self.normal += 1,
            BeatClass::Ventricular => self.ventricular += 1,
            BeatClass::Supraventricular => self.supraventricular += 1,
            BeatClass::Fusion => self.fusion += 1,
            BeatClass::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, class: BeatClass) -> usize {
        match class {
            BeatClass::Normal => self.normal,
            BeatClass::Ventricular => self.ventricular,
            BeatClass::Supraventricular => self.supraventricular,
            BeatClass::Fusion => self.fusion,
            BeatClass::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.normal + self.ventricular + self.supraventricular + self.fusion + self.unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentStats {
    pub counts: BeatCounts,
    pub bpm: u32,
    /// `None` when fewer than two intervals are visible.
    pub sdnn_ms: Option<f64>,
}

/// All derived views for one viewport.
#[derive(Debug, Clone, Serialize)]
pub struct Overlay {
    pub viewport: Viewport,
    pub mode: TraceMode,
    pub samples: Vec<[f64; 2]>,
    pub peaks: Vec<VisiblePeak>,
    pub intervals: Vec<VisibleInterval>,
    pub rr_trace: Vec<[f64; 2]>,
    pub stats: SegmentStats,
    pub y_domain: Option<(f64, f64)>,
}

pub fn project(
    store: &SignalStore,
    viewport: Viewport,
    labels: &ClassificationCache,
    mode: TraceMode,
) -> Overlay {
    let peaks = visible_peaks(store, viewport);
    let intervals = visible_intervals(store, viewport);
    let rr_trace = rr_trace(store, viewport);
    let stats = stats_for(&peaks, &intervals, labels);
    let y_domain = match mode {
        TraceMode::Waveform => amplitude_domain(visible_slice(store, viewport)),
        TraceMode::RrTrace => rr_domain(&rr_trace),
    };
    Overlay {
        viewport,
        mode,
        samples: visible_samples(store, viewport),
        peaks,
        intervals,
        rr_trace,
        stats,
        y_domain,
    }
}

fn visible_slice(store: &SignalStore, viewport: Viewport) -> &[f64] {
    let end = viewport.end.min(store.len());
    let start = viewport.start.min(end);
    &store.samples()[start..end]
}

/// `(time, value)` pairs for the visible samples.
pub fn visible_samples(store: &SignalStore, viewport: Viewport) -> Vec<[f64; 2]> {
    let fs = store.fs();
    visible_slice(store, viewport)
        .iter()
        .enumerate()
        .map(|(offset, &value)| [(viewport.start + offset) as f64 / fs, value])
        .collect()
}

pub fn visible_peaks(store: &SignalStore, viewport: Viewport) -> Vec<VisiblePeak> {
    let series = store.series();
    store
        .peaks()
        .times
        .iter()
        .enumerate()
        .filter_map(|(beat_index, &time)| {
            let index = series.index_of(time);
            if !viewport.contains(index) {
                return None;
            }
            let sample_index = index as usize;
            Some(VisiblePeak {
                beat_index,
                time,
                sample_index,
                amplitude: store.amplitude_at(sample_index).unwrap_or(0.0),
            })
        })
        .collect()
}

/// Intervals whose later peak is visible, anchored on the earlier peak.
pub fn visible_intervals(store: &SignalStore, viewport: Viewport) -> Vec<VisibleInterval> {
    let series = store.series();
    let drop = amplitude_range(visible_slice(store, viewport)) * RR_MARKER_DROP;
    store
        .intervals()
        .iter()
        .enumerate()
        .filter(|(_, rr)| viewport.contains(series.index_of(rr.timestamp)))
        .map(|(interval_index, rr)| {
            let anchor_time = rr.timestamp - rr.duration;
            let anchor = series.index_of(anchor_time);
            let base = usize::try_from(anchor)
                .ok()
                .and_then(|idx| store.amplitude_at(idx))
                .unwrap_or(0.0);
            VisibleInterval {
                interval_index,
                timestamp: rr.timestamp,
                duration: rr.duration,
                anchor_time,
                anchor_amplitude: base - drop,
            }
        })
        .collect()
}

/// `(timestamp, duration_ms)` for intervals inside the window, bounds inclusive.
pub fn rr_trace(store: &SignalStore, viewport: Viewport) -> Vec<[f64; 2]> {
    let (t0, t1) = (viewport.start_s(store.fs()), viewport.end_s(store.fs()));
    store
        .intervals()
        .iter()
        .filter(|rr| rr.timestamp >= t0 && rr.timestamp <= t1)
        .map(|rr| [rr.timestamp, rr.duration_ms()])
        .collect()
}

pub fn segment_stats(
    store: &SignalStore,
    viewport: Viewport,
    labels: &ClassificationCache,
) -> SegmentStats {
    stats_for(
        &visible_peaks(store, viewport),
        &visible_intervals(store, viewport),
        labels,
    )
}

fn stats_for(
    peaks: &[VisiblePeak],
    intervals: &[VisibleInterval],
    labels: &ClassificationCache,
) -> SegmentStats {
    let mut counts = BeatCounts::default();
    for peak in peaks {
        counts.add(labels.class_of(peak.beat_index));
    }
    let durations: Vec<f64> = intervals.iter().map(|rr| rr.duration).collect();
    SegmentStats {
        counts,
        bpm: bpm_from_rr(&durations),
        sdnn_ms: sdnn_ms(&durations),
    }
}

/// `round(60 / mean RR)`, or 0 without usable intervals.
pub fn bpm_from_rr(durations_s: &[f64]) -> u32 {
    if durations_s.is_empty() {
        return 0;
    }
    let mean = durations_s.iter().sum::<f64>() / durations_s.len() as f64;
    if mean > 0.0 {
        (60.0 / mean).round() as u32
    } else {
        0
    }
}

/// Sample standard deviation (n - 1) of RR durations, in milliseconds.
pub fn sdnn_ms(durations_s: &[f64]) -> Option<f64> {
    let n = durations_s.len();
    if n < 2 {
        return None;
    }
    let values: Vec<f64> = durations_s.iter().map(|d| d * 1000.0).collect();
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    Some(var.sqrt())
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn amplitude_range(samples: &[f64]) -> f64 {
    min_max(samples.iter().copied())
        .map(|(lo, hi)| hi - lo)
        .unwrap_or(0.0)
}

/// `[min - 10% range, max + 10% range]` of the visible samples only.
pub fn amplitude_domain(samples: &[f64]) -> Option<(f64, f64)> {
    let (lo, hi) = min_max(samples.iter().copied())?;
    let range = hi - lo;
    let pad = if range > 0.0 {
        range * AMPLITUDE_PADDING
    } else {
        lo.abs().max(1.0) * AMPLITUDE_PADDING
    };
    Some((lo - pad, hi + pad))
}

pub fn rr_domain(trace: &[[f64; 2]]) -> Option<(f64, f64)> {
    let (lo, hi) = min_max(trace.iter().map(|p| p[1]))?;
    Some((lo - RR_TRACE_PADDING_MS, hi + RR_TRACE_PADDING_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::RecordKey;
    use crate::signal::{RPeaks, TimeSeries};
    use serde_json::json;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    /// 10 s at 100 Hz with a spike on every peak.
    fn store_with_peaks(peaks: &[f64]) -> SignalStore {
        let fs = 100.0;
        let mut data: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.05).sin() * 0.1).collect();
        for &t in peaks {
            data[(t * fs).round() as usize] = 1.5;
        }
        SignalStore::from_peaks(TimeSeries { fs, data }, RPeaks::new(peaks.to_vec())).unwrap()
    }

    fn labels(entries: Vec<serde_json::Value>) -> ClassificationCache {
        let mut cache = ClassificationCache::new();
        let req = cache.request(RecordKey::new(1, 1)).unwrap();
        cache.complete(req.tag, Ok(entries));
        cache
    }

    #[test]
    fn bpm_and_sdnn_example() {
        let durations = [0.8, 0.82, 0.78];
        assert_eq!(bpm_from_rr(&durations), 75);
        assert_close(sdnn_ms(&durations).unwrap(), 20.0, 1e-9);
    }

    #[test]
    fn sdnn_needs_two_intervals() {
        assert_eq!(sdnn_ms(&[]), None);
        assert_eq!(sdnn_ms(&[0.8]), None);
        assert_eq!(bpm_from_rr(&[]), 0);
    }

    #[test]
    fn visible_views_follow_the_window() {
        let store = store_with_peaks(&[1.0, 1.8, 2.62, 3.4, 6.0]);
        let vp = Viewport { start: 150, end: 350 };

        let samples = visible_samples(&store, vp);
        assert_eq!(samples.len(), 200);
        assert_close(samples[0][0], 1.5, 1e-12);

        let peaks = visible_peaks(&store, vp);
        let beats: Vec<usize> = peaks.iter().map(|p| p.beat_index).collect();
        assert_eq!(beats, vec![1, 2, 3]);
        assert_eq!(peaks[0].sample_index, 180);
        assert_close(peaks[0].amplitude, 1.5, 1e-12);

        let intervals = visible_intervals(&store, vp);
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].interval_index, 0);
        assert_close(intervals[0].anchor_time, 1.0, 1e-9);
        assert!(intervals[0].anchor_amplitude < 1.5);
    }

    #[test]
    fn end_index_is_exclusive() {
        let store = store_with_peaks(&[1.0, 2.0]);
        let peaks = visible_peaks(&store, Viewport { start: 0, end: 200 });
        assert_eq!(peaks.len(), 1);
        let peaks = visible_peaks(&store, Viewport { start: 0, end: 201 });
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn stats_bucket_every_visible_beat() {
        let store = store_with_peaks(&[0.5, 1.3, 2.12, 2.9, 3.7, 4.5]);
        let cache = labels(vec![
            json!(["0", "Battement normal"]),
            json!(["1", "Battement ectopique ventriculaire"]),
            json!(["2", "Battement ectopique supraventriculaire"]),
            json!(["3", "Battement de fusion"]),
            json!("broken"),
        ]);
        let vp = Viewport { start: 0, end: 1000 };
        let stats = segment_stats(&store, vp, &cache);
        assert_eq!(
            stats.counts,
            BeatCounts {
                normal: 1,
                ventricular: 1,
                supraventricular: 1,
                fusion: 1,
                unknown: 2,
            }
        );
        assert_eq!(stats.counts.total(), visible_peaks(&store, vp).len());
        assert_eq!(stats.bpm, 75);
        assert!(stats.sdnn_ms.is_some());
    }

    #[test]
    fn stats_without_labels_are_unknown() {
        let store = store_with_peaks(&[0.5, 1.3]);
        let vp = Viewport { start: 0, end: 1000 };
        let stats = segment_stats(&store, vp, &ClassificationCache::new());
        assert_eq!(stats.counts.unknown, 2);
        assert_eq!(stats.bpm, 75);
        assert_eq!(stats.sdnn_ms, None);
    }

    #[test]
    fn amplitude_domain_uses_visible_slice_only() {
        let store = store_with_peaks(&[5.0]);
        let quiet = Viewport { start: 0, end: 100 };
        let overlay = project(&store, quiet, &ClassificationCache::new(), TraceMode::Waveform);
        let (lo, hi) = overlay.y_domain.unwrap();
        assert!(hi < 0.2 && lo > -0.2);

        let (lo, hi) = amplitude_domain(&[-1.0, 1.0]).unwrap();
        assert_close(lo, -1.2, 1e-12);
        assert_close(hi, 1.2, 1e-12);
        assert_eq!(amplitude_domain(&[]), None);
    }

    #[test]
    fn rr_trace_mode_domain() {
        let store = store_with_peaks(&[1.0, 1.8, 2.62, 3.4]);
        let overlay = project(
            &store,
            Viewport { start: 0, end: 1000 },
            &ClassificationCache::new(),
            TraceMode::RrTrace,
        );
        assert_eq!(overlay.rr_trace.len(), 3);
        let (lo, hi) = overlay.y_domain.unwrap();
        assert_close(lo, 730.0, 1e-6);
        assert_close(hi, 870.0, 1e-6);
    }
}
