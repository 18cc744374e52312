//! Chart state for one loaded recording: the signal store, viewport,
//! classification cache and selection, plus memoized derived views.

use crate::classification::{ClassificationCache, ClassificationOutcome, FetchRequest, RecordKey, RequestTag};
use crate::error::SegmentError;
use crate::overlay::{project, Overlay, TraceMode};
use crate::selection::{BeatDetail, SelectedBeat, SelectionPanel};
use crate::signal::SignalStore;
use crate::viewport::{DragGesture, PanDirection, Viewport, ViewportController, DEFAULT_SEGMENT_S};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    Signal,
    RPeaks,
    RrMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerVisibility {
    pub signal: bool,
    pub r_peaks: bool,
    pub rr_markers: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self::all(true)
    }
}

impl LayerVisibility {
    fn all(visible: bool) -> Self {
        Self {
            signal: visible,
            r_peaks: visible,
            rr_markers: visible,
        }
    }
}

/// Inputs the overlay is a pure function of, besides the signal itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverlayKey {
    viewport: Viewport,
    labels_revision: u64,
    mode: TraceMode,
}

struct Loaded {
    signal: SignalStore,
    viewport: ViewportController,
}

pub struct ChartStore {
    loaded: Option<Loaded>,
    labels: ClassificationCache,
    selection: SelectionPanel,
    mode: TraceMode,
    layers: LayerVisibility,
    segment_error: Option<SegmentError>,
    default_segment_s: f64,
    overlay: Option<(OverlayKey, Overlay)>,
}

impl Default for ChartStore {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_S)
    }
}

impl ChartStore {
    pub fn new(default_segment_s: f64) -> Self {
        Self {
            loaded: None,
            labels: ClassificationCache::new(),
            selection: SelectionPanel::default(),
            mode: TraceMode::default(),
            layers: LayerVisibility::default(),
            segment_error: None,
            default_segment_s,
            overlay: None,
        }
    }

    /// Replace the recording. Returns the classification fetch to perform
    /// when `record` differs from the cached one.
    pub fn load(&mut self, record: Option<RecordKey>, signal: SignalStore) -> Option<FetchRequest> {
        let viewport = ViewportController::for_store(&signal, self.default_segment_s);
        self.loaded = Some(Loaded { signal, viewport });
        self.selection.close();
        self.segment_error = None;
        self.overlay = None;
        match record {
            Some(key) => self.labels.request(key),
            None => {
                self.labels.clear();
                None
            }
        }
    }

    pub fn complete_classification(&mut self, tag: RequestTag, outcome: ClassificationOutcome) -> bool {
        self.labels.complete(tag, outcome)
    }

    pub fn refresh_classification(&mut self) -> Option<FetchRequest> {
        let key = self.labels.key()?;
        Some(self.labels.refresh(key))
    }

    pub fn signal(&self) -> Option<&SignalStore> {
        self.loaded.as_ref().map(|l| &l.signal)
    }

    pub fn viewport(&self) -> Option<&ViewportController> {
        self.loaded.as_ref().map(|l| &l.viewport)
    }

    pub fn window(&self) -> Option<Viewport> {
        self.viewport().map(|vc| vc.window())
    }

    pub fn labels(&self) -> &ClassificationCache {
        &self.labels
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn layers(&self) -> LayerVisibility {
        self.layers
    }

    pub fn segment_error(&self) -> Option<&SegmentError> {
        self.segment_error.as_ref()
    }

    fn controller_mut(&mut self) -> Option<&mut ViewportController> {
        self.loaded.as_mut().map(|l| &mut l.viewport)
    }

    pub fn pan(&mut self, direction: PanDirection) -> Option<Viewport> {
        self.controller_mut().map(|vc| vc.pan(direction))
    }

    pub fn zoom_out(&mut self) -> Option<Viewport> {
        self.controller_mut().map(|vc| vc.zoom_out())
    }

    pub fn set_slider(&mut self, start_s: f64, end_s: f64) -> Option<Viewport> {
        self.controller_mut()?.set_from_slider(start_s, end_s)
    }

    /// Apply the typed segment fields. The error is kept for inline display
    /// and the window stays where it was.
    pub fn apply_segment(&mut self, start: &str, end: &str) -> Result<Viewport, SegmentError> {
        let Some(vc) = self.controller_mut() else {
            return Err(SegmentError::NotANumber);
        };
        let result = vc.set_explicit_range_text(start, end);
        self.segment_error = result.as_ref().err().cloned();
        result
    }

    pub fn reset(&mut self) -> Option<Viewport> {
        self.selection.close();
        self.segment_error = None;
        self.controller_mut().map(|vc| vc.reset())
    }

    pub fn set_drag_enabled(&mut self, enabled: bool) {
        if let Some(vc) = self.controller_mut() {
            vc.set_drag_enabled(enabled);
        }
    }

    pub fn press(&mut self, time_s: Option<f64>) {
        if let Some(vc) = self.controller_mut() {
            vc.press(time_s);
        }
    }

    pub fn drag_to(&mut self, time_s: Option<f64>) {
        if let Some(vc) = self.controller_mut() {
            vc.drag_to(time_s);
        }
    }

    pub fn release(&mut self) -> Option<Viewport> {
        self.controller_mut()?.release()
    }

    pub fn gesture(&self) -> DragGesture {
        self.viewport().map(|vc| vc.gesture()).unwrap_or_default()
    }

    pub fn select_peak(&mut self, peak_time: f64) -> Option<SelectedBeat> {
        let loaded = self.loaded.as_ref()?;
        self.selection.select(&loaded.signal, peak_time)
    }

    pub fn close_selection(&mut self) {
        self.selection.close();
    }

    pub fn selected(&self) -> Option<SelectedBeat> {
        self.selection.selected()
    }

    pub fn beat_detail(&self) -> Option<BeatDetail> {
        let loaded = self.loaded.as_ref()?;
        self.selection.detail(&loaded.signal, &self.labels)
    }

    /// Enabling the RR trace hides the waveform layers; disabling restores them.
    pub fn toggle_rr_trace(&mut self) {
        match self.mode {
            TraceMode::Waveform => {
                self.mode = TraceMode::RrTrace;
                self.layers = LayerVisibility::all(false);
            }
            TraceMode::RrTrace => self.leave_rr_trace(),
        }
    }

    /// Legend click. While the RR trace is shown any layer click leaves it.
    pub fn toggle_layer(&mut self, layer: Layer) {
        if self.mode == TraceMode::RrTrace {
            self.leave_rr_trace();
            return;
        }
        let flag = match layer {
            Layer::Signal => &mut self.layers.signal,
            Layer::RPeaks => &mut self.layers.r_peaks,
            Layer::RrMarkers => &mut self.layers.rr_markers,
        };
        *flag = !*flag;
    }

    fn leave_rr_trace(&mut self) {
        self.mode = TraceMode::Waveform;
        self.layers = LayerVisibility::all(true);
    }

    /// Derived views for the current window, recomputed only when the window,
    /// labels or trace mode changed since the last call.
    pub fn overlay(&mut self) -> Option<&Overlay> {
        let loaded = self.loaded.as_ref()?;
        let key = OverlayKey {
            viewport: loaded.viewport.window(),
            labels_revision: self.labels.revision(),
            mode: self.mode,
        };
        let stale = !matches!(&self.overlay, Some((cached, _)) if *cached == key);
        if stale {
            let overlay = project(&loaded.signal, key.viewport, &self.labels, key.mode);
            self.overlay = Some((key, overlay));
        }
        self.overlay.as_ref().map(|(_, overlay)| overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{RPeaks, TimeSeries};
    use serde_json::json;

    fn signal() -> SignalStore {
        let data: Vec<f64> = (0..3600).map(|i| ((i % 288) as f64 / 288.0) - 0.5).collect();
        let peaks: Vec<f64> = (0..12).map(|i| 0.4 + i as f64 * 0.8).collect();
        SignalStore::from_peaks(TimeSeries { fs: 360.0, data }, RPeaks::new(peaks)).unwrap()
    }

    #[test]
    fn load_issues_one_fetch_per_record() {
        let mut chart = ChartStore::default();
        let key = RecordKey::new(7, 9);
        assert!(chart.load(Some(key), signal()).is_some());
        assert_eq!(chart.window(), Some(Viewport { start: 0, end: 3600 }));
        chart.zoom_out();
        assert!(chart.load(Some(key), signal()).is_none());
        assert!(chart.load(Some(RecordKey::new(7, 10)), signal()).is_some());
    }

    #[test]
    fn overlay_is_memoized_until_inputs_change() {
        let mut chart = ChartStore::new(5.0);
        let req = chart.load(Some(RecordKey::new(1, 1)), signal()).unwrap();
        let first = chart.overlay().unwrap().stats;
        assert_eq!(first.counts.unknown, 6);

        let labels: Vec<_> = (0..12).map(|i| json!([i.to_string(), "Battement normal"])).collect();
        assert!(chart.complete_classification(req.tag, Ok(labels)));
        let second = chart.overlay().unwrap().stats;
        assert_eq!(second.counts.normal, 6);
        assert_eq!(second.counts.unknown, 0);
        assert_eq!(second.bpm, 75);
    }

    #[test]
    fn segment_errors_are_kept_inline() {
        let mut chart = ChartStore::default();
        chart.load(None, signal());
        let before = chart.window();
        assert_eq!(chart.apply_segment("4", "2"), Err(SegmentError::InvertedBounds));
        assert_eq!(chart.segment_error(), Some(&SegmentError::InvertedBounds));
        assert_eq!(chart.window(), before);
        assert!(chart.apply_segment("1", "2").is_ok());
        assert_eq!(chart.segment_error(), None);
    }

    #[test]
    fn reset_clears_selection() {
        let mut chart = ChartStore::default();
        chart.load(None, signal());
        chart.apply_segment("1", "3").unwrap();
        assert!(chart.select_peak(1.2).is_some());
        assert_eq!(chart.beat_detail().unwrap().beat_index, Some(1));
        chart.reset();
        assert!(chart.selected().is_none());
        assert_eq!(chart.window(), Some(Viewport { start: 0, end: 3600 }));
    }

    #[test]
    fn drag_gesture_through_store() {
        let mut chart = ChartStore::default();
        chart.load(None, signal());
        chart.set_drag_enabled(true);
        chart.press(Some(5.0));
        chart.drag_to(Some(2.0));
        assert_eq!(chart.release(), Some(Viewport { start: 720, end: 1800 }));
    }

    #[test]
    fn rr_trace_toggles_layers() {
        let mut chart = ChartStore::default();
        chart.load(None, signal());
        chart.toggle_layer(Layer::RPeaks);
        assert!(!chart.layers().r_peaks);
        chart.toggle_rr_trace();
        assert_eq!(chart.mode(), TraceMode::RrTrace);
        assert_eq!(chart.layers(), LayerVisibility::all(false));
        assert_eq!(chart.overlay().unwrap().mode, TraceMode::RrTrace);
        chart.toggle_layer(Layer::Signal);
        assert_eq!(chart.mode(), TraceMode::Waveform);
        assert_eq!(chart.layers(), LayerVisibility::default());
    }
}
