//! Wire types of the ECG backend.

use ecgscope_lib::report::MetricGroups;
use ecgscope_lib::signal::{RPeaks, RRInterval, SignalStore, TimeSeries};
use ecgscope_lib::SignalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgRecordOut {
    pub id: u64,
    pub patient_id: u64,
    pub fichier_csv: String,
    pub lieu: String,
    pub frequence_hz: f64,
    pub date_prise: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientOut {
    pub id: u64,
    pub nom: String,
    pub prenom: String,
    pub date_naissance: String,
    pub age: u32,
    pub poids: f64,
    pub taille: f64,
    #[serde(default)]
    pub adresse: String,
    #[serde(default)]
    pub antecedant: String,
    #[serde(default)]
    pub prise_medoc: String,
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub ecg_records: Vec<EcgRecordOut>,
}

/// A window of a recording with its peaks, RR intervals and HRV metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub patient_id: u64,
    pub ecg_id: u64,
    pub sampling_rate: f64,
    pub t0: f64,
    pub t1: f64,
    pub ecg_data: Vec<[f64; 2]>,
    pub r_peaks: Vec<[f64; 2]>,
    pub rr_intervals: Vec<[f64; 2]>,
    #[serde(default)]
    pub metrics: MetricGroups,
    #[serde(default)]
    pub segment_length: f64,
}

impl SegmentResponse {
    /// Build a store whose time axis starts at `t0`.
    pub fn to_store(&self) -> Result<SignalStore, SignalError> {
        let series = TimeSeries {
            fs: self.sampling_rate,
            data: self.ecg_data.iter().map(|p| p[1]).collect(),
        };
        let peaks = RPeaks::new(self.r_peaks.iter().map(|p| p[0] - self.t0).collect());
        let intervals = self
            .rr_intervals
            .iter()
            .map(|p| RRInterval {
                timestamp: p[0] - self.t0,
                duration: p[1],
            })
            .collect();
        SignalStore::new(series, peaks, intervals)
    }
}

/// Classification response. Entries stay raw so malformed pairs can be
/// reported per beat instead of failing the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatClassificationResponse {
    pub patient_id: u64,
    pub ecg_id: u64,
    #[serde(default, alias = "nombre_de_battements")]
    pub nb_beats: Option<usize>,
    #[serde(rename = "beatsPrediction")]
    pub beats_prediction: Vec<Value>,
    #[serde(default)]
    pub analysis_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatResponse {
    pub patient_id: u64,
    pub ecg_id: u64,
    pub beat_index: usize,
    pub pre: f64,
    pub post: f64,
    pub r_time: f64,
    pub beat: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResponse {
    pub status: String,
    pub patient_id: u64,
    pub ecg_id: u64,
    pub csv_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub patient_id: u64,
    pub ecg_id: u64,
    pub has_analysis: bool,
    pub analysis_file_exists: bool,
    pub analysis_path: Option<String>,
}

/// Patient part of an import form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientForm {
    pub first_name: String,
    pub last_name: String,
    /// ISO `YYYY-MM-DD` or `DD-MM-YYYY`.
    pub date_of_birth: String,
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub address: String,
    pub medical_history: String,
    pub medication: bool,
    pub allergies: String,
}

/// Recording metadata of an import form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcgMeta {
    pub date: String,
    pub location: String,
    pub sampling_rate: u32,
}

/// `YYYY-MM-DD` becomes `DD-MM-YYYY`; anything else is returned unchanged.
pub fn iso_to_dmy(date: &str) -> String {
    let parts: Vec<&str> = date.split('-').collect();
    let shaped = matches!(parts.as_slice(), [y, m, d]
        if y.len() == 4 && m.len() == 2 && d.len() == 2
            && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())));
    if shaped {
        format!("{}-{}-{}", parts[2], parts[1], parts[0])
    } else {
        date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segment_converts_relative_to_t0() {
        let segment: SegmentResponse = serde_json::from_value(json!({
            "patient_id": 1, "ecg_id": 2, "sampling_rate": 4, "t0": 10.0, "t1": 12.0,
            "ecg_data": [[10.0, 0.1], [10.25, 0.2], [10.5, 0.9], [10.75, 0.1],
                         [11.0, 0.2], [11.25, 0.8], [11.5, 0.1], [11.75, 0.0]],
            "r_peaks": [[10.5, 0.9], [11.25, 0.8]],
            "rr_intervals": [[11.25, 0.75]],
            "metrics": {"time_domain": {"HRV_MeanNN": 750.0}},
            "segment_length": 2.0
        }))
        .unwrap();
        let store = segment.to_store().unwrap();
        assert_eq!(store.len(), 8);
        assert_eq!(store.peaks().times, vec![0.5, 1.25]);
        assert_eq!(store.intervals()[0].timestamp, 1.25);
        assert_eq!(segment.metrics.time_domain["HRV_MeanNN"], Some(750.0));
    }

    #[test]
    fn inconsistent_segment_is_rejected() {
        let segment: SegmentResponse = serde_json::from_value(json!({
            "patient_id": 1, "ecg_id": 2, "sampling_rate": 4, "t0": 0.0, "t1": 1.0,
            "ecg_data": [[0.0, 0.1], [0.25, 0.2]],
            "r_peaks": [[0.0, 0.1], [0.25, 0.2]],
            "rr_intervals": []
        }))
        .unwrap();
        assert!(matches!(
            segment.to_store(),
            Err(SignalError::IntervalCountMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn classification_accepts_both_count_fields() {
        let french: BeatClassificationResponse = serde_json::from_value(json!({
            "patient_id": 1, "ecg_id": 2, "nombre_de_battements": 2,
            "beatsPrediction": [["0", "Battement normal"], ["1", 5]]
        }))
        .unwrap();
        assert_eq!(french.nb_beats, Some(2));
        assert_eq!(french.beats_prediction.len(), 2);
        let english: BeatClassificationResponse = serde_json::from_value(json!({
            "patient_id": 1, "ecg_id": 2, "nb_beats": 0, "beatsPrediction": []
        }))
        .unwrap();
        assert_eq!(english.nb_beats, Some(0));
    }

    #[test]
    fn iso_dates_are_reordered() {
        assert_eq!(iso_to_dmy("1984-03-07"), "07-03-1984");
        assert_eq!(iso_to_dmy("07-03-1984"), "07-03-1984");
        assert_eq!(iso_to_dmy(""), "");
    }
}
