//! Visible window over a sample series and the navigation operations that
//! move it: pan, zoom-out, reset, typed segments, slider and drag-to-zoom.

use crate::error::SegmentError;
use crate::signal::SignalStore;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEGMENT_S: f64 = 30.0;

/// Half-open index range `[start, end)` into the sample series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub start: usize,
    pub end: usize,
}

impl Viewport {
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    /// Whether a (possibly negative or out-of-range) sample index is visible.
    pub fn contains(&self, index: i64) -> bool {
        index >= self.start as i64 && index < self.end as i64
    }

    pub fn start_s(&self, fs: f64) -> f64 {
        self.start as f64 / fs
    }

    pub fn end_s(&self, fs: f64) -> f64 {
        self.end as f64 / fs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanDirection {
    Previous,
    Next,
}

/// Drag-to-zoom gesture. Edges are chart times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragGesture {
    #[default]
    Idle,
    Anchored {
        left: f64,
    },
    Spanning {
        left: f64,
        right: f64,
    },
}

impl DragGesture {
    /// Selection rectangle to highlight while dragging, sorted ascending.
    pub fn highlight(&self) -> Option<(f64, f64)> {
        match *self {
            DragGesture::Spanning { left, right } => Some((left.min(right), left.max(right))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    len: usize,
    fs: f64,
    initial: Viewport,
    window: Viewport,
    drag: DragGesture,
    drag_enabled: bool,
}

impl ViewportController {
    /// `len` must be non-zero and `fs` positive; [`SignalStore`] guarantees both.
    pub fn new(len: usize, fs: f64, default_segment_s: f64) -> Self {
        let len = len.max(1);
        let end = if default_segment_s.is_finite() && default_segment_s > 0.0 {
            ((default_segment_s * fs).round() as usize).clamp(1, len)
        } else {
            len
        };
        let initial = Viewport { start: 0, end };
        Self {
            len,
            fs,
            initial,
            window: initial,
            drag: DragGesture::Idle,
            drag_enabled: false,
        }
    }

    pub fn for_store(store: &SignalStore, default_segment_s: f64) -> Self {
        Self::new(store.len(), store.fs(), default_segment_s)
    }

    pub fn window(&self) -> Viewport {
        self.window
    }

    pub fn initial_window(&self) -> Viewport {
        self.initial
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn total_duration_s(&self) -> f64 {
        self.len as f64 / self.fs
    }

    /// Current bounds in seconds, for the header label.
    pub fn window_seconds(&self) -> (f64, f64) {
        (self.window.start_s(self.fs), self.window.end_s(self.fs))
    }

    pub fn can_pan(&self, direction: PanDirection) -> bool {
        match direction {
            PanDirection::Previous => self.window.start > 0,
            PanDirection::Next => self.window.end < self.len,
        }
    }

    /// Shift by one window width, keeping the width and staying inside the series.
    pub fn pan(&mut self, direction: PanDirection) -> Viewport {
        let width = self.window.width();
        let start = match direction {
            PanDirection::Previous => self.window.start.saturating_sub(width),
            PanDirection::Next => (self.window.start + width).min(self.len - width),
        };
        self.window = Viewport {
            start,
            end: start + width,
        };
        self.window
    }

    /// Double the width around the current centre, shifted back inside the
    /// series when an edge is hit. A full-series window is a fixed point.
    pub fn zoom_out(&mut self) -> Viewport {
        let width = (self.window.width() * 2).min(self.len);
        let centre = (self.window.start + self.window.end) as f64 / 2.0;
        let start = (centre - width as f64 / 2.0).floor().max(0.0) as usize;
        let start = start.min(self.len - width);
        self.window = Viewport {
            start,
            end: start + width,
        };
        self.window
    }

    /// Apply a typed segment. Invalid input leaves the window untouched.
    pub fn set_explicit_range(
        &mut self,
        start_s: f64,
        end_s: f64,
    ) -> Result<Viewport, SegmentError> {
        if !start_s.is_finite() || !end_s.is_finite() {
            return Err(SegmentError::NotANumber);
        }
        let max_s = self.total_duration_s();
        if start_s < 0.0 || end_s > max_s {
            return Err(SegmentError::OutOfRange { max_s });
        }
        if start_s >= end_s {
            return Err(SegmentError::InvertedBounds);
        }
        self.window = self.clamp_range(self.to_index(start_s), self.to_index(end_s));
        Ok(self.window)
    }

    /// Same as [`Self::set_explicit_range`] for raw text fields.
    pub fn set_explicit_range_text(
        &mut self,
        start: &str,
        end: &str,
    ) -> Result<Viewport, SegmentError> {
        let start = start.trim().parse::<f64>().unwrap_or(f64::NAN);
        let end = end.trim().parse::<f64>().unwrap_or(f64::NAN);
        self.set_explicit_range(start, end)
    }

    /// Apply a drag selection; edges may come in either order. Non-finite or
    /// zero-width selections are ignored.
    pub fn set_from_drag(&mut self, left_s: f64, right_s: f64) -> Option<Viewport> {
        if !left_s.is_finite() || !right_s.is_finite() {
            return None;
        }
        let (lo, hi) = if left_s <= right_s {
            (left_s, right_s)
        } else {
            (right_s, left_s)
        };
        let (start, end) = (self.to_index(lo), self.to_index(hi));
        if start == end {
            return None;
        }
        self.window = self.clamp_range(start, end);
        Some(self.window)
    }

    /// Range slider semantics: floor the start, ceil the end.
    pub fn set_from_slider(&mut self, start_s: f64, end_s: f64) -> Option<Viewport> {
        if !start_s.is_finite() || !end_s.is_finite() {
            return None;
        }
        let start = (start_s * self.fs).floor() as i64;
        let end = (end_s * self.fs).ceil() as i64;
        self.window = self.clamp_range(start.min(end), start.max(end));
        Some(self.window)
    }

    /// Restore the initial window and drop any gesture in progress.
    pub fn reset(&mut self) -> Viewport {
        self.window = self.initial;
        self.drag = DragGesture::Idle;
        self.window
    }

    pub fn drag_enabled(&self) -> bool {
        self.drag_enabled
    }

    pub fn set_drag_enabled(&mut self, enabled: bool) {
        self.drag_enabled = enabled;
        if !enabled {
            self.drag = DragGesture::Idle;
        }
    }

    pub fn gesture(&self) -> DragGesture {
        self.drag
    }

    /// Pointer pressed over the chart. `None` means the event had no chart time.
    pub fn press(&mut self, time_s: Option<f64>) {
        if !self.drag_enabled {
            return;
        }
        if let Some(left) = time_s.filter(|t| t.is_finite()) {
            self.drag = DragGesture::Anchored { left };
        }
    }

    pub fn drag_to(&mut self, time_s: Option<f64>) {
        if !self.drag_enabled {
            return;
        }
        let Some(right) = time_s.filter(|t| t.is_finite()) else {
            return;
        };
        self.drag = match self.drag {
            DragGesture::Idle => DragGesture::Idle,
            DragGesture::Anchored { left } | DragGesture::Spanning { left, .. } => {
                DragGesture::Spanning { left, right }
            }
        };
    }

    /// Pointer released: a complete span becomes the new window.
    pub fn release(&mut self) -> Option<Viewport> {
        if !self.drag_enabled {
            return None;
        }
        match std::mem::take(&mut self.drag) {
            DragGesture::Spanning { left, right } => self.set_from_drag(left, right),
            _ => None,
        }
    }

    fn to_index(&self, seconds: f64) -> i64 {
        (seconds * self.fs).round() as i64
    }

    fn clamp_range(&self, start: i64, end: i64) -> Viewport {
        let len = self.len as i64;
        let mut start = start.clamp(0, len);
        let mut end = end.clamp(0, len);
        if end <= start {
            if start >= len {
                start = len - 1;
                end = len;
            } else {
                end = start + 1;
            }
        }
        Viewport {
            start: start as usize,
            end: end as usize,
        }
    }
}
