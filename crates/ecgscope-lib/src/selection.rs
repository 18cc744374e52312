//! Clicked R-peak resolution and the single-beat detail panel.

use crate::classification::{BeatClass, ClassificationCache, LabelLookup};
use crate::signal::SignalStore;
use serde::Serialize;

/// Clicked peak times match a stored peak within this many seconds.
pub const PEAK_MATCH_TOLERANCE_S: f64 = 0.001;
/// Excerpt width on each side of the selected sample.
pub const EXCERPT_HALF_WIDTH_S: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectedBeat {
    pub sample_index: usize,
    /// `None` when no stored peak lies within tolerance of the click.
    pub beat_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeatDetail {
    pub position_s: f64,
    pub amplitude: f64,
    pub sample_index: usize,
    pub beat_index: Option<usize>,
    pub label: String,
    pub class: BeatClass,
    pub excerpt: Vec<[f64; 2]>,
}

/// Map a clicked R-peak marker time to a sample and a global beat index.
pub fn resolve_click(store: &SignalStore, peak_time: f64) -> Option<SelectedBeat> {
    if !peak_time.is_finite() {
        return None;
    }
    let last = store.len().checked_sub(1)?;
    let sample_index = store.series().index_of(peak_time).clamp(0, last as i64) as usize;
    let beat_index = store
        .peaks()
        .times
        .iter()
        .position(|t| (t - peak_time).abs() < PEAK_MATCH_TOLERANCE_S);
    Some(SelectedBeat {
        sample_index,
        beat_index,
    })
}

/// `(time, value)` samples within half a second of `center`, clamped to the series.
pub fn excerpt(store: &SignalStore, center: usize) -> Vec<[f64; 2]> {
    let half = (EXCERPT_HALF_WIDTH_S * store.fs()).round() as usize;
    let lo = center.saturating_sub(half).min(store.len());
    let hi = center.saturating_add(half + 1).min(store.len());
    store.samples()[lo..hi]
        .iter()
        .enumerate()
        .map(|(offset, &value)| [store.series().time_of(lo + offset), value])
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SelectionPanel {
    selected: Option<SelectedBeat>,
}

impl SelectionPanel {
    pub fn select(&mut self, store: &SignalStore, peak_time: f64) -> Option<SelectedBeat> {
        let beat = resolve_click(store, peak_time)?;
        self.selected = Some(beat);
        Some(beat)
    }

    pub fn close(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<SelectedBeat> {
        self.selected
    }

    pub fn detail(&self, store: &SignalStore, labels: &ClassificationCache) -> Option<BeatDetail> {
        let beat = self.selected?;
        let lookup = match beat.beat_index {
            Some(index) => labels.lookup(Some(index)),
            None if labels.labels().is_some() => LabelLookup::OutOfBounds,
            None => LabelLookup::NotAvailable,
        };
        Some(BeatDetail {
            position_s: store.series().time_of(beat.sample_index),
            amplitude: store.amplitude_at(beat.sample_index).unwrap_or(0.0),
            sample_index: beat.sample_index,
            beat_index: beat.beat_index,
            label: lookup.to_string(),
            class: lookup.class(),
            excerpt: excerpt(store, beat.sample_index),
        })
    }
}
