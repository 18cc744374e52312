//! Backend-agnostic figure model for a chart window.

use crate::overlay::{Overlay, TraceMode};
use crate::store::LayerVisibility;
use serde::{Deserialize, Serialize};

pub const SIGNAL_COLOR: Color = Color(0x2563EB);
pub const PEAK_COLOR: Color = Color(0xDC2626);
pub const RR_MARKER_COLOR: Color = Color(0x16A34A);
pub const RR_TRACE_COLOR: Color = Color(0x9333EA);

/// Rendering budget for the waveform line.
pub const DEFAULT_MAX_POINTS: usize = 4000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
    pub range: Option<(f64, f64)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Explicit axis ranges when set, else the extent of all points.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let extent = |axis: usize| {
            self.series
                .iter()
                .flat_map(|s| s.points().iter().map(move |p| p[axis]))
                .filter(|v| v.is_finite())
                .fold(None, |acc: Option<(f64, f64)>, v| {
                    Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
                })
        };
        let x = self.x.range.or_else(|| extent(0))?;
        let y = self.y.range.or_else(|| extent(1))?;
        Some((x, y))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

/// Keep at most `max_points` points by taking the first point of each bucket.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points || max_points == 0 {
        return points.to_vec();
    }
    let bucket = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket).floor() as usize)
        .take_while(|&idx| idx < points.len())
        .map(|idx| points[idx])
        .collect()
}

/// Figure for one chart window honouring the trace mode and legend state.
pub fn figure_from_overlay(
    overlay: &Overlay,
    layers: LayerVisibility,
    fs: f64,
    max_points: usize,
) -> Figure {
    let mut fig = Figure::new(Some(format!(
        "{:.2} s - {:.2} s",
        overlay.viewport.start_s(fs),
        overlay.viewport.end_s(fs)
    )));
    fig.x.label = Some("time (s)".into());
    fig.x.range = Some((overlay.viewport.start_s(fs), overlay.viewport.end_s(fs)));
    fig.y.range = overlay.y_domain;
    match overlay.mode {
        TraceMode::RrTrace => {
            fig.y.label = Some("RR (ms)".into());
            fig.add_series(Series::Line(LineSeries {
                name: "RR trace".into(),
                points: overlay.rr_trace.clone(),
                style: Style {
                    width: 2.0,
                    color: RR_TRACE_COLOR,
                },
            }));
        }
        TraceMode::Waveform => {
            fig.y.label = Some("amplitude".into());
            if layers.signal {
                fig.add_series(Series::Line(LineSeries {
                    name: "ECG".into(),
                    points: decimate_points(&overlay.samples, max_points),
                    style: Style {
                        width: 1.4,
                        color: SIGNAL_COLOR,
                    },
                }));
            }
            if layers.r_peaks {
                fig.add_series(Series::Markers(MarkerSeries {
                    name: "R-peaks".into(),
                    points: overlay.peaks.iter().map(|p| [p.time, p.amplitude]).collect(),
                    radius: 4,
                    color: PEAK_COLOR,
                }));
            }
            if layers.rr_markers {
                fig.add_series(Series::Markers(MarkerSeries {
                    name: "RR".into(),
                    points: overlay
                        .intervals
                        .iter()
                        .map(|rr| [rr.anchor_time, rr.anchor_amplitude])
                        .collect(),
                    radius: 3,
                    color: RR_MARKER_COLOR,
                }));
            }
        }
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationCache;
    use crate::overlay::project;
    use crate::signal::{RPeaks, SignalStore, TimeSeries};
    use crate::viewport::Viewport;

    fn overlay(mode: TraceMode) -> (Overlay, f64) {
        let data: Vec<f64> = (0..1000).map(|i| (i as f64 / 50.0).sin()).collect();
        let store = SignalStore::from_peaks(
            TimeSeries { fs: 100.0, data },
            RPeaks::new(vec![1.0, 2.0, 3.0, 4.0]),
        )
        .unwrap();
        let vp = Viewport { start: 0, end: 500 };
        (project(&store, vp, &ClassificationCache::new(), mode), 100.0)
    }

    #[test]
    fn decimation_caps_points() {
        let points: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 4);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], [0.0, 0.0]);
        assert_eq!(out[1], [2.0, 0.0]);
        assert_eq!(decimate_points(&points, 20).len(), 10);
    }

    #[test]
    fn waveform_figure_respects_layers() {
        let (ov, fs) = overlay(TraceMode::Waveform);
        let all = figure_from_overlay(&ov, LayerVisibility::default(), fs, 100);
        assert_eq!(all.series.len(), 3);
        assert_eq!(all.series[0].points().len(), 100);
        assert_eq!(all.series[1].points().len(), 4);
        assert_eq!(all.x.range, Some((0.0, 5.0)));

        let hidden = LayerVisibility {
            signal: false,
            ..LayerVisibility::default()
        };
        let fig = figure_from_overlay(&ov, hidden, fs, 100);
        assert_eq!(fig.series.len(), 2);
    }

    #[test]
    fn rr_trace_figure_has_single_series() {
        let (ov, fs) = overlay(TraceMode::RrTrace);
        let fig = figure_from_overlay(&ov, LayerVisibility::default(), fs, 100);
        assert_eq!(fig.series.len(), 1);
        assert_eq!(fig.series[0].points(), &[[2.0, 1000.0], [3.0, 1000.0], [4.0, 1000.0]][..]);
        assert_eq!(fig.y.label.as_deref(), Some("RR (ms)"));
    }

    #[test]
    fn color_components() {
        assert_eq!(Color(0x2563EB).rgb(), (0x25, 0x63, 0xEB));
    }
}
