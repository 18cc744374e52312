//! Heart-rate variability over an RR series (durations in seconds).
//! All outputs are in milliseconds unless noted.

use crate::signal::RRSeries;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const VLF_BAND: (f64, f64) = (0.003, 0.04);
pub const LF_BAND: (f64, f64) = (0.04, 0.15);
pub const HF_BAND: (f64, f64) = (0.15, 0.4);

/// Tachogram resampling rate used by the report spectrum.
pub const DEFAULT_INTERP_HZ: f64 = 4.0;
const WELCH_SEGMENT_S: f64 = 30.0;
const MIN_SEGMENT_SAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDomain {
    pub n: usize,
    pub avnn_ms: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    /// Percentage of successive differences above 50 ms.
    pub pnn50: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandShares {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spectrum {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    pub lf_hf: f64,
    pub total_power: f64,
    pub shares: BandShares,
    /// `(frequency Hz, power ms^2/Hz)` per bin.
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nonlinear {
    pub sd1_ms: f64,
    pub sd2_ms: f64,
    pub sd1_sd2: f64,
    pub dfa_alpha1: f64,
}

fn to_ms(rr: &RRSeries) -> Vec<f64> {
    rr.rr.iter().map(|d| d * 1000.0).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
}

pub fn time_domain(rr: &RRSeries) -> TimeDomain {
    let ms = to_ms(rr);
    let n = ms.len();
    let diffs: Vec<f64> = ms.windows(2).map(|w| w[1] - w[0]).collect();
    let (rmssd_ms, pnn50) = if diffs.is_empty() {
        (0.0, 0.0)
    } else {
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
        let over = diffs.iter().filter(|d| d.abs() > 50.0).count();
        (rmssd, 100.0 * over as f64 / diffs.len() as f64)
    };
    TimeDomain {
        n,
        avnn_ms: mean(&ms),
        sdnn_ms: sample_sd(&ms),
        rmssd_ms,
        pnn50,
    }
}

/// Welch spectrum of the RR tachogram resampled at `interp_hz`.
pub fn spectrum(rr: &RRSeries, interp_hz: f64) -> Spectrum {
    let (freqs, powers) = welch(&tachogram(rr, interp_hz), interp_hz).unwrap_or_default();
    let vlf = band_power(&freqs, &powers, VLF_BAND);
    let lf = band_power(&freqs, &powers, LF_BAND);
    let hf = band_power(&freqs, &powers, HF_BAND);
    let banded = vlf + lf + hf;
    let shares = if banded > 0.0 {
        BandShares {
            vlf: 100.0 * vlf / banded,
            lf: 100.0 * lf / banded,
            hf: 100.0 * hf / banded,
        }
    } else {
        BandShares::default()
    };
    Spectrum {
        vlf,
        lf,
        hf,
        lf_hf: if hf > 0.0 { lf / hf } else { 0.0 },
        total_power: powers.iter().sum(),
        shares,
        points: freqs.into_iter().zip(powers).map(|(f, p)| [f, p]).collect(),
    }
}

pub fn nonlinear(rr: &RRSeries) -> Nonlinear {
    let ms = to_ms(rr);
    let sdnn = sample_sd(&ms);
    let diffs: Vec<f64> = ms.windows(2).map(|w| w[1] - w[0]).collect();
    let sd1 = if diffs.is_empty() {
        0.0
    } else {
        let m = mean(&diffs);
        let var = diffs.iter().map(|d| (d - m).powi(2)).sum::<f64>() / diffs.len() as f64;
        (0.5 * var).sqrt()
    };
    let sd2 = (2.0 * sdnn * sdnn - sd1 * sd1).max(0.0).sqrt();
    Nonlinear {
        sd1_ms: sd1,
        sd2_ms: sd2,
        sd1_sd2: if sd2 > 0.0 { sd1 / sd2 } else { 0.0 },
        dfa_alpha1: dfa_alpha1(&ms),
    }
}

/// Short-term detrended fluctuation exponent over box sizes 4..=16 beats.
fn dfa_alpha1(values: &[f64]) -> f64 {
    const MIN_BOX: usize = 4;
    const MAX_BOX: usize = 16;
    if values.len() < MIN_BOX * 2 {
        return 0.0;
    }
    let m = mean(values);
    let profile: Vec<f64> = values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v - m;
            Some(*acc)
        })
        .collect();
    let mut fluctuations = Vec::new();
    for size in MIN_BOX..=values.len().min(MAX_BOX) {
        let boxes: Vec<f64> = profile.chunks_exact(size).map(residual_power).collect();
        if boxes.is_empty() {
            continue;
        }
        let rms = mean(&boxes).sqrt();
        if rms.is_finite() && rms > 0.0 {
            fluctuations.push((size as f64).ln());
            fluctuations.push(rms.ln());
        }
    }
    let points: Vec<(f64, f64)> = fluctuations.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    if points.len() < 2 {
        return 0.0;
    }
    least_squares(&points).0
}

/// Mean squared residual after removing the linear trend of `segment`.
fn residual_power(segment: &[f64]) -> f64 {
    let points: Vec<(f64, f64)> = segment
        .iter()
        .enumerate()
        .map(|(i, &y)| (i as f64, y))
        .collect();
    let (slope, intercept) = least_squares(&points);
    points
        .iter()
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum::<f64>()
        / segment.len() as f64
}

/// `(slope, intercept)`; a degenerate fit returns a flat line at the mean.
fn least_squares(points: &[(f64, f64)]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let (sx, sy, sxx, sxy) = points.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, (x, y)| {
        (acc.0 + x, acc.1 + y, acc.2 + x * x, acc.3 + x * y)
    });
    let denom = n * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        return (0.0, sy / n);
    }
    let slope = (n * sxy - sx * sy) / denom;
    (slope, (sy - slope * sx) / n)
}

fn band_power(freqs: &[f64], powers: &[f64], band: (f64, f64)) -> f64 {
    freqs
        .iter()
        .zip(powers)
        .filter(|(f, _)| **f >= band.0 && **f < band.1)
        .map(|(_, p)| *p)
        .sum()
}

/// RR durations (ms) linearly interpolated on a uniform grid starting at the
/// first beat, mean removed.
fn tachogram(rr: &RRSeries, fs: f64) -> Vec<f64> {
    if rr.rr.len() < 2 || !fs.is_finite() || fs <= 0.0 {
        return Vec::new();
    }
    let values = to_ms(rr);
    let times: Vec<f64> = rr
        .rr
        .iter()
        .scan(0.0, |t, d| {
            *t += d;
            Some(*t)
        })
        .collect();
    let (first, last) = (times[0], times[times.len() - 1]);
    let n = ((last - first) * fs).floor() as usize + 1;
    let mut out = Vec::with_capacity(n);
    let mut k = 0;
    for i in 0..n {
        let t = first + i as f64 / fs;
        while k + 2 < times.len() && times[k + 1] < t {
            k += 1;
        }
        let span = times[k + 1] - times[k];
        let frac = if span > 0.0 {
            ((t - times[k]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(values[k] + frac * (values[k + 1] - values[k]));
    }
    let m = mean(&out);
    out.iter_mut().for_each(|v| *v -= m);
    out
}

/// Averaged Hann-windowed periodograms with 50% overlap.
fn welch(signal: &[f64], fs: f64) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = signal.len();
    if n < MIN_SEGMENT_SAMPLES {
        return None;
    }
    let size = ((fs * WELCH_SEGMENT_S) as usize).clamp(MIN_SEGMENT_SAMPLES, n);
    let step = (size / 2).max(1);
    let window = hann(size);
    let norm = fs * window.iter().map(|w| w * w).sum::<f64>();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(size);
    let mut spectrum = r2c.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0usize;
    let mut pos = 0;
    while pos + size <= n {
        let mut frame: Vec<f64> = signal[pos..pos + size]
            .iter()
            .zip(&window)
            .map(|(x, w)| x * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum).ok()?;
        for (k, bin) in spectrum.iter().enumerate() {
            let one_sided = k != 0 && !(size % 2 == 0 && k == size / 2);
            let factor = if one_sided { 2.0 } else { 1.0 };
            powers[k] += factor * bin.norm_sqr() / norm;
        }
        segments += 1;
        pos += step;
    }
    powers.iter_mut().for_each(|p| *p /= segments as f64);
    let freqs = (0..powers.len()).map(|k| k as f64 * fs / size as f64).collect();
    Some((freqs, powers))
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}
