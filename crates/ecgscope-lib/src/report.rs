//! Whole-recording derived views: Poincaré cloud, RR histogram, HRV trend,
//! rhythm assessment and a coarse health score.

use crate::metrics::{self, Nonlinear, Spectrum, TimeDomain, DEFAULT_INTERP_HZ};
use crate::signal::{RRInterval, SignalStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIN_HISTOGRAM_BIN_MS: f64 = 10.0;
const HISTOGRAM_TARGET_BINS: f64 = 20.0;
const TREND_TARGET_POINTS: usize = 50;
const REGULAR_SD_MS: f64 = 80.0;
const CONFIDENCE_SD_SCALE_MS: f64 = 200.0;

/// Metric groups as returned with a segment; values may be null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricGroups {
    #[serde(default)]
    pub time_domain: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub frequency_domain: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub non_linear_domain: BTreeMap<String, Option<f64>>,
}

/// The backend metrics this crate reads; missing keys stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub mean_nn: Option<f64>,
    pub sdnn: Option<f64>,
    pub rmssd: Option<f64>,
    pub pnn50: Option<f64>,
    pub pnn20: Option<f64>,
    pub lf: Option<f64>,
    pub hf: Option<f64>,
    pub lf_hf: Option<f64>,
    pub sd1: Option<f64>,
    pub sd2: Option<f64>,
    pub sd1_sd2: Option<f64>,
    pub dfa_alpha1: Option<f64>,
}

impl BackendMetrics {
    pub fn from_groups(groups: &MetricGroups) -> Self {
        let get = |group: &BTreeMap<String, Option<f64>>, key: &str| {
            group.get(key).copied().flatten().filter(|v| v.is_finite())
        };
        let td = &groups.time_domain;
        let fd = &groups.frequency_domain;
        let nl = &groups.non_linear_domain;
        Self {
            mean_nn: get(td, "HRV_MeanNN"),
            sdnn: get(td, "HRV_SDNN"),
            rmssd: get(td, "HRV_RMSSD"),
            pnn50: get(td, "HRV_pNN50"),
            pnn20: get(td, "HRV_pNN20"),
            lf: get(fd, "HRV_LF"),
            hf: get(fd, "HRV_HF"),
            lf_hf: get(fd, "HRV_LFHF"),
            sd1: get(nl, "HRV_SD1"),
            sd2: get(nl, "HRV_SD2"),
            sd1_sd2: get(nl, "HRV_SD1SD2"),
            dfa_alpha1: get(nl, "HRV_DFA_alpha1"),
        }
    }

    /// Heart rate implied by `HRV_MeanNN` (ms).
    pub fn bpm(&self) -> Option<u32> {
        self.mean_nn
            .filter(|m| *m > 0.0)
            .map(|m| (60_000.0 / m).round() as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start_ms: f64,
    pub end_ms: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RrHistogram {
    pub bin_width_ms: f64,
    pub bins: Vec<HistogramBin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub start_s: f64,
    pub mean_ms: f64,
    pub sd_ms: f64,
    pub bpm: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rhythm {
    NormalSinus,
    SinusBradycardia,
    SinusTachycardia,
    Irregular,
    InsufficientData,
}

impl Rhythm {
    pub fn label(&self) -> &'static str {
        match self {
            Rhythm::NormalSinus => "normal sinus rhythm",
            Rhythm::SinusBradycardia => "sinus bradycardia",
            Rhythm::SinusTachycardia => "sinus tachycardia",
            Rhythm::Irregular => "irregular rhythm",
            Rhythm::InsufficientData => "insufficient data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RhythmAssessment {
    pub rhythm: Rhythm,
    pub label: &'static str,
    pub bpm: u32,
    pub sd_ms: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthScore {
    pub score: u32,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub beats: usize,
    pub duration_s: f64,
    pub time_domain: TimeDomain,
    pub nonlinear: Nonlinear,
    pub spectrum: Spectrum,
    pub backend: Option<BackendMetrics>,
    pub poincare: Vec<[f64; 2]>,
    pub histogram: RrHistogram,
    pub trend: Vec<TrendPoint>,
    pub rhythm: RhythmAssessment,
    pub health: HealthScore,
}

fn mean_and_population_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn bpm_from_mean_ms(mean_ms: f64) -> u32 {
    if mean_ms > 0.0 {
        (60_000.0 / mean_ms).round() as u32
    } else {
        0
    }
}

/// `(RR_n, RR_n+1)` pairs in milliseconds.
pub fn poincare(durations_ms: &[f64]) -> Vec<[f64; 2]> {
    durations_ms.windows(2).map(|w| [w[0], w[1]]).collect()
}

pub fn rr_histogram(durations_ms: &[f64]) -> RrHistogram {
    let Some((lo, hi)) = durations_ms.iter().fold(None, |acc: Option<(f64, f64)>, &v| {
        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
    }) else {
        return RrHistogram {
            bin_width_ms: MIN_HISTOGRAM_BIN_MS,
            bins: Vec::new(),
        };
    };
    let width = ((hi - lo) / HISTOGRAM_TARGET_BINS).max(MIN_HISTOGRAM_BIN_MS);
    let count = (((hi - lo) / width).ceil() as usize).max(1);
    let mut bins: Vec<HistogramBin> = (0..count)
        .map(|i| HistogramBin {
            start_ms: lo + i as f64 * width,
            end_ms: lo + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for &v in durations_ms {
        let idx = (((v - lo) / width).floor() as usize).min(count - 1);
        bins[idx].count += 1;
    }
    RrHistogram {
        bin_width_ms: width,
        bins,
    }
}

/// Consecutive windows of `max(1, n / 50)` intervals.
pub fn hrv_trend(intervals: &[RRInterval]) -> Vec<TrendPoint> {
    let size = (intervals.len() / TREND_TARGET_POINTS).max(1);
    intervals
        .chunks(size)
        .map(|chunk| {
            let ms: Vec<f64> = chunk.iter().map(RRInterval::duration_ms).collect();
            let (mean_ms, sd_ms) = mean_and_population_sd(&ms);
            TrendPoint {
                start_s: chunk[0].timestamp,
                mean_ms,
                sd_ms,
                bpm: bpm_from_mean_ms(mean_ms),
            }
        })
        .collect()
}

pub fn assess_rhythm(durations_ms: &[f64]) -> RhythmAssessment {
    if durations_ms.is_empty() {
        let rhythm = Rhythm::InsufficientData;
        return RhythmAssessment {
            rhythm,
            label: rhythm.label(),
            bpm: 0,
            sd_ms: 0.0,
            confidence: 0.0,
        };
    }
    let (mean_ms, sd_ms) = mean_and_population_sd(durations_ms);
    let bpm = bpm_from_mean_ms(mean_ms);
    let rhythm = match (bpm, sd_ms < REGULAR_SD_MS) {
        (60..=100, true) => Rhythm::NormalSinus,
        (0..=59, true) => Rhythm::SinusBradycardia,
        (101.., true) => Rhythm::SinusTachycardia,
        _ => Rhythm::Irregular,
    };
    RhythmAssessment {
        rhythm,
        label: rhythm.label(),
        bpm,
        sd_ms,
        confidence: (1.0 - (sd_ms / CONFIDENCE_SD_SCALE_MS).min(1.0)).max(0.0),
    }
}

pub fn health_score(bpm: u32, sdnn_ms: f64) -> HealthScore {
    let mut score = 20;
    score += match bpm {
        60..=100 => 40,
        50..=110 => 20,
        _ => 0,
    };
    score += if sdnn_ms >= 50.0 {
        40
    } else if sdnn_ms >= 30.0 {
        20
    } else {
        0
    };
    let status = match score {
        80.. => HealthStatus::Excellent,
        60..=79 => HealthStatus::Good,
        40..=59 => HealthStatus::Fair,
        _ => HealthStatus::Monitor,
    };
    HealthScore { score, status }
}

/// Assemble every report view for `store`. Backend metrics, when present,
/// take precedence for the health score inputs.
pub fn build_report(store: &SignalStore, backend: Option<&MetricGroups>) -> Report {
    let rr = store.rr_series();
    let durations_ms: Vec<f64> = store.intervals().iter().map(RRInterval::duration_ms).collect();
    let time_domain = metrics::time_domain(&rr);
    let backend = backend.map(BackendMetrics::from_groups);
    let local_bpm = bpm_from_mean_ms(time_domain.avnn_ms);
    let bpm = backend.and_then(|b| b.bpm()).unwrap_or(local_bpm);
    let sdnn = backend
        .and_then(|b| b.sdnn)
        .unwrap_or(time_domain.sdnn_ms);
    log::debug!("report over {} intervals, bpm {bpm}, sdnn {sdnn:.1} ms", durations_ms.len());
    Report {
        generated_at: chrono::Local::now().to_rfc3339(),
        beats: store.peaks().len(),
        duration_s: store.duration(),
        time_domain,
        nonlinear: metrics::nonlinear(&rr),
        spectrum: metrics::spectrum(&rr, DEFAULT_INTERP_HZ),
        backend,
        poincare: poincare(&durations_ms),
        histogram: rr_histogram(&durations_ms),
        trend: hrv_trend(store.intervals()),
        rhythm: assess_rhythm(&durations_ms),
        health: health_score(bpm, sdnn),
    }
}
