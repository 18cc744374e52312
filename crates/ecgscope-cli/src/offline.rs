use crate::render::PngBackend;
use crate::{LayerArg, NavStep, RecordingArgs, WindowArgs};
use anyhow::{bail, Context, Result};
use ecgscope_client::ViewerConfig;
use ecgscope_lib::classification::RecordKey;
use ecgscope_lib::io::{read_csv_column, read_f64_series, read_predictions};
use ecgscope_lib::overlay::{SegmentStats, TraceMode};
use ecgscope_lib::plot::{figure_from_overlay, PlotBackend, DEFAULT_MAX_POINTS};
use ecgscope_lib::report::{build_report, MetricGroups};
use ecgscope_lib::signal::{RPeaks, SignalStore, TimeSeries};
use ecgscope_lib::store::{ChartStore, Layer};
use ecgscope_lib::viewport::{PanDirection, Viewport};
use log::{debug, info};
use serde::Serialize;
use std::path::Path;

/// Key under which labels read from a local file are cached.
const LOCAL_RECORD: RecordKey = RecordKey::new(0, 0);

#[derive(Serialize)]
pub struct ViewSummary {
    pub viewport: Viewport,
    pub window_s: (f64, f64),
    pub duration_s: f64,
    pub mode: TraceMode,
    pub visible_samples: usize,
    pub visible_peaks: usize,
    pub visible_intervals: usize,
    pub rr_trace_points: usize,
    pub stats: SegmentStats,
    pub y_domain: Option<(f64, f64)>,
    pub can_pan_previous: bool,
    pub can_pan_next: bool,
    pub labels: &'static str,
}

pub fn load_signal(args: &RecordingArgs) -> Result<SignalStore> {
    let data = match (&args.samples, &args.csv) {
        (Some(path), _) => read_f64_series(path)?,
        (None, Some(path)) => read_csv_column(path, &args.column)?,
        (None, None) => bail!("one of --samples or --csv is required"),
    };
    let peaks = read_f64_series(&args.peaks)?;
    info!("loaded {} samples and {} peaks", data.len(), peaks.len());
    SignalStore::from_peaks(TimeSeries { fs: args.fs, data }, RPeaks::new(peaks))
        .context("building signal store")
}

/// Chart over a local recording, with labels applied when a file is given.
pub fn load_chart(config: &ViewerConfig, args: &RecordingArgs) -> Result<ChartStore> {
    let signal = load_signal(args)?;
    let mut chart = ChartStore::new(config.default_segment_s);
    match &args.labels {
        Some(path) => {
            let entries = read_predictions(path)?;
            if let Some(request) = chart.load(Some(LOCAL_RECORD), signal) {
                chart.complete_classification(request.tag, Ok(entries));
            }
        }
        None => {
            chart.load(None, signal);
        }
    }
    Ok(chart)
}

/// Apply typed segment, drag selection, then navigation steps. An invalid
/// segment is reported on stderr and leaves the window unchanged.
pub fn apply_window(chart: &mut ChartStore, window: &WindowArgs) {
    if let (Some(start), Some(end)) = (&window.start, &window.end) {
        if let Err(err) = chart.apply_segment(start, end) {
            eprintln!("error: {err}");
        }
    }
    if let (Some(from), Some(to)) = (window.drag_from, window.drag_to) {
        chart.set_drag_enabled(true);
        chart.press(Some(from));
        chart.drag_to(Some(to));
        if chart.release().is_none() {
            debug!("drag selection {from}..{to} ignored");
        }
        chart.set_drag_enabled(false);
    }
    for step in &window.nav {
        match step {
            NavStep::Prev => {
                chart.pan(PanDirection::Previous);
            }
            NavStep::Next => {
                chart.pan(PanDirection::Next);
            }
            NavStep::ZoomOut => {
                chart.zoom_out();
            }
            NavStep::Reset => {
                chart.reset();
            }
        }
    }
    if window.rr_trace {
        chart.toggle_rr_trace();
    }
    for layer in &window.hide {
        let layer = match layer {
            LayerArg::Signal => Layer::Signal,
            LayerArg::Peaks => Layer::RPeaks,
            LayerArg::Rr => Layer::RrMarkers,
        };
        chart.toggle_layer(layer);
    }
}

pub fn summarize(chart: &mut ChartStore) -> Result<ViewSummary> {
    let labels = if chart.labels().is_loading() {
        "loading"
    } else if chart.labels().labels().is_some() {
        "ready"
    } else {
        "unavailable"
    };
    let Some(controller) = chart.viewport().cloned() else {
        bail!("no recording loaded");
    };
    let duration_s = controller.total_duration_s();
    let Some(overlay) = chart.overlay() else {
        bail!("no recording loaded");
    };
    Ok(ViewSummary {
        viewport: overlay.viewport,
        window_s: controller.window_seconds(),
        duration_s,
        mode: overlay.mode,
        visible_samples: overlay.samples.len(),
        visible_peaks: overlay.peaks.len(),
        visible_intervals: overlay.intervals.len(),
        rr_trace_points: overlay.rr_trace.len(),
        stats: overlay.stats,
        y_domain: overlay.y_domain,
        can_pan_previous: controller.can_pan(PanDirection::Previous),
        can_pan_next: controller.can_pan(PanDirection::Next),
        labels,
    })
}

pub fn cmd_view(config: &ViewerConfig, recording: &RecordingArgs, window: &WindowArgs) -> Result<()> {
    let mut chart = load_chart(config, recording)?;
    apply_window(&mut chart, window);
    let summary = summarize(&mut chart)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn cmd_select(config: &ViewerConfig, recording: &RecordingArgs, time: f64) -> Result<()> {
    let mut chart = load_chart(config, recording)?;
    if chart.select_peak(time).is_none() {
        bail!("{time} s is not a valid peak time");
    }
    let detail = chart.beat_detail().context("selection vanished")?;
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

pub fn cmd_report(recording: &RecordingArgs, metrics: Option<&Path>) -> Result<()> {
    let signal = load_signal(recording)?;
    let groups: Option<MetricGroups> = match metrics {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(serde_json::from_str(&text).with_context(|| format!("invalid metrics {}", path.display()))?)
        }
        None => None,
    };
    let report = build_report(&signal, groups.as_ref());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn cmd_render(
    config: &ViewerConfig,
    recording: &RecordingArgs,
    window: &WindowArgs,
    out: &Path,
    size: (u32, u32),
) -> Result<()> {
    let mut chart = load_chart(config, recording)?;
    apply_window(&mut chart, window);
    let layers = chart.layers();
    let fs = recording.fs;
    let overlay = chart.overlay().context("no recording loaded")?;
    let figure = figure_from_overlay(overlay, layers, fs, DEFAULT_MAX_POINTS);
    PngBackend::new(out, size).draw(&figure)?;
    info!("wrote {}", out.display());
    Ok(())
}
