//! Blocking client for the ECG backend HTTP API.

use crate::config::ViewerConfig;
use crate::session::{patient_key, record_key, SessionCache, PATIENTS_KEY};
use crate::types::{
    iso_to_dmy, AnalysisStatus, BeatClassificationResponse, BeatResponse, DeleteAck, EcgMeta,
    ImportResponse, PatientForm, PatientOut, SegmentResponse,
};
use log::{debug, warn};
use reqwest::blocking::{multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Returned by [`ApiClient::llm_analysis`] when no narrative could be produced.
pub const LLM_UNAVAILABLE: &str = "LLM analysis unavailable";
/// Page size of the patient list; only this first page is session cached.
pub const DEFAULT_PATIENT_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("cannot attach {path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct LlmReply {
    analysis: String,
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
    session: Option<Arc<SessionCache>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            session: None,
        })
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self, ApiError> {
        let client = Self::new(
            &config.api_base_url,
            Duration::from_secs_f64(config.request_timeout_s.max(0.0)),
        )?;
        Ok(if config.use_session_cache {
            client.with_session_cache(Arc::new(SessionCache::new()))
        } else {
            client
        })
    }

    pub fn with_session_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.session = Some(cache);
        self
    }

    pub fn session(&self) -> Option<&SessionCache> {
        self.session.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn execute<T: DeserializeOwned>(&self, url: &str, request: RequestBuilder) -> Result<T, ApiError> {
        let transport = |source| ApiError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = request.send().map_err(transport)?;
        let status = resp.status();
        let text = resp.text().map_err(transport)?;
        if !status.is_success() {
            let detail = error_detail(&text)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_string());
            warn!("{url} answered {status}: {detail}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        serde_json::from_str(&text).map_err(|err| ApiError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("GET {url}");
        self.execute(&url, self.http.get(&url).query(query))
    }

    fn cached_get<T>(&self, key: &str, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned + serde::Serialize,
    {
        if let Some(hit) = self.session().and_then(|cache| cache.read::<T>(key)) {
            return Ok(hit);
        }
        let value: T = self.get(path, query)?;
        if let Some(cache) = self.session() {
            cache.write(key, &value);
        }
        Ok(value)
    }

    fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("DELETE {url}");
        self.execute(&url, self.http.delete(&url))
    }

    pub fn list_patients(&self, skip: usize, limit: usize) -> Result<Vec<PatientOut>, ApiError> {
        let query = [("skip", skip.to_string()), ("limit", limit.to_string())];
        if skip == 0 && limit == DEFAULT_PATIENT_LIMIT {
            self.cached_get(PATIENTS_KEY, "patients", &query)
        } else {
            self.get("patients", &query)
        }
    }

    pub fn get_patient(&self, patient_id: u64) -> Result<PatientOut, ApiError> {
        self.cached_get(&patient_key(patient_id), &format!("patients/{patient_id}"), &[])
    }

    /// The default opening window of a recording.
    pub fn get_record(&self, patient_id: u64, ecg_id: u64) -> Result<SegmentResponse, ApiError> {
        self.cached_get(
            &record_key(patient_id, ecg_id),
            &format!("{patient_id}/{ecg_id}"),
            &[],
        )
    }

    pub fn get_segment(
        &self,
        patient_id: u64,
        ecg_id: u64,
        t0: f64,
        t1: f64,
    ) -> Result<SegmentResponse, ApiError> {
        let query = [("t0", t0.to_string()), ("t1", t1.to_string())];
        self.get(&format!("{patient_id}/{ecg_id}/segment"), &query)
    }

    pub fn get_beat(&self, patient_id: u64, ecg_id: u64, beat_index: usize) -> Result<BeatResponse, ApiError> {
        let query = [("beat_index", beat_index.to_string())];
        self.get(&format!("{patient_id}/{ecg_id}/beat"), &query)
    }

    pub fn get_fs(&self, patient_id: u64, ecg_id: u64) -> Result<f64, ApiError> {
        self.get(&format!("{patient_id}/{ecg_id}/fs"), &[])
    }

    /// Run (or fetch the stored) beat classification.
    pub fn classify(
        &self,
        patient_id: u64,
        ecg_id: u64,
        force_refresh: bool,
    ) -> Result<BeatClassificationResponse, ApiError> {
        let url = self.url(&format!("beat-classification/{patient_id}/{ecg_id}"));
        debug!("POST {url} (force_refresh={force_refresh})");
        let mut request = self.http.post(&url).json(&json!({}));
        if force_refresh {
            request = request.query(&[("force_refresh", "true")]);
        }
        self.execute(&url, request)
    }

    pub fn get_analysis(&self, patient_id: u64, ecg_id: u64) -> Result<BeatClassificationResponse, ApiError> {
        self.get(&format!("{patient_id}/{ecg_id}/analysis"), &[])
    }

    pub fn analysis_status(&self, patient_id: u64, ecg_id: u64) -> Result<AnalysisStatus, ApiError> {
        self.get(&format!("{patient_id}/{ecg_id}/analysis/status"), &[])
    }

    pub fn delete_ecg(&self, patient_id: u64, ecg_id: u64) -> Result<DeleteAck, ApiError> {
        let ack = self.delete(&format!("{patient_id}/{ecg_id}"))?;
        if let Some(cache) = self.session() {
            cache.remove(&record_key(patient_id, ecg_id));
            cache.remove(&patient_key(patient_id));
            cache.remove(PATIENTS_KEY);
        }
        Ok(ack)
    }

    pub fn delete_patient(&self, patient_id: u64) -> Result<DeleteAck, ApiError> {
        let ack = self.delete(&format!("{patient_id}"))?;
        if let Some(cache) = self.session() {
            cache.remove_prefix(&format!("ecg-{patient_id}-"));
            cache.remove(&patient_key(patient_id));
            cache.remove(PATIENTS_KEY);
        }
        Ok(ack)
    }

    /// Upload one CSV recording together with the patient form.
    pub fn import_ecg(
        &self,
        patient: &PatientForm,
        ecg: &EcgMeta,
        csv_path: &Path,
        convert_dates: bool,
    ) -> Result<ImportResponse, ApiError> {
        let date = |d: &str| {
            if convert_dates {
                iso_to_dmy(d)
            } else {
                d.to_string()
            }
        };
        let form = multipart::Form::new()
            .text("firstName", patient.first_name.clone())
            .text("lastName", patient.last_name.clone())
            .text("dateOfBirth", date(&patient.date_of_birth))
            .text("age", patient.age.to_string())
            .text("weight", patient.weight.to_string())
            .text("height", patient.height.to_string())
            .text("address", patient.address.clone())
            .text("medicalHistory", patient.medical_history.clone())
            .text("medication", patient.medication.to_string())
            .text("allergies", patient.allergies.clone())
            .text("date", date(&ecg.date))
            .text("location", ecg.location.clone())
            .text("samplingRate", ecg.sampling_rate.to_string())
            .file("file", csv_path)
            .map_err(|source| ApiError::Upload {
                path: csv_path.to_path_buf(),
                source,
            })?;
        let url = self.url("import_ecg");
        debug!("POST {url} ({})", csv_path.display());
        let response = self.execute(&url, self.http.post(&url).multipart(form))?;
        if let Some(cache) = self.session() {
            cache.remove(PATIENTS_KEY);
        }
        Ok(response)
    }

    pub fn try_llm_analysis(&self, patient_id: u64, ecg_id: u64, metrics: &Value) -> Result<String, ApiError> {
        let url = self.url(&format!("{patient_id}/{ecg_id}/llm_analysis"));
        debug!("POST {url}");
        let reply: LlmReply = self.execute(&url, self.http.post(&url).json(&json!({ "metrics": metrics })))?;
        Ok(reply.analysis)
    }

    /// Narrative report for `metrics`, or [`LLM_UNAVAILABLE`] on any failure.
    pub fn llm_analysis(&self, patient_id: u64, ecg_id: u64, metrics: &Value) -> String {
        self.try_llm_analysis(patient_id, ecg_id, metrics)
            .unwrap_or_else(|err| {
                warn!("LLM analysis failed: {err}");
                LLM_UNAVAILABLE.to_string()
            })
    }
}

/// `detail` of an error body: the string itself, or the JSON text otherwise.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_extraction() {
        assert_eq!(error_detail(r#"{"detail": "ECG 3 introuvable"}"#).as_deref(), Some("ECG 3 introuvable"));
        assert_eq!(error_detail(r#"{"detail": [{"loc": ["t0"]}]}"#).as_deref(), Some(r#"[{"loc":["t0"]}]"#));
        assert_eq!(error_detail("Internal Server Error"), None);
        assert_eq!(error_detail(r#"{"message": "x"}"#), None);
    }

    #[test]
    fn urls_join_cleanly() {
        let client = ApiClient::new("http://localhost:8000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/patients"), "http://localhost:8000/api/patients");
        assert_eq!(client.url("1/2/fs"), "http://localhost:8000/api/1/2/fs");
    }
}
