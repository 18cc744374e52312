use crate::offline::{apply_window, summarize};
use crate::WindowArgs;
use anyhow::{Context, Result};
use clap::Args;
use ecgscope_client::{ApiClient, ClassificationRouter, EcgMeta, PatientForm, ViewerConfig};
use ecgscope_lib::classification::RecordKey;
use ecgscope_lib::store::ChartStore;
use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args, Clone, Debug)]
pub struct ImportArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    /// Date of birth, `YYYY-MM-DD` or `DD-MM-YYYY`
    #[arg(long)]
    pub date_of_birth: String,
    #[arg(long)]
    pub age: u32,
    /// Weight in kg
    #[arg(long)]
    pub weight: f64,
    /// Height in cm
    #[arg(long)]
    pub height: f64,
    #[arg(long, default_value = "")]
    pub address: String,
    #[arg(long, default_value = "")]
    pub medical_history: String,
    #[arg(long)]
    pub medication: bool,
    #[arg(long, default_value = "")]
    pub allergies: String,
    /// Recording date
    #[arg(long, default_value = "")]
    pub date: String,
    #[arg(long)]
    pub location: String,
    #[arg(long)]
    pub sampling_rate: u32,
    /// CSV recording to upload
    #[arg(long)]
    pub file: PathBuf,
    /// Send ISO dates as `DD-MM-YYYY`
    #[arg(long)]
    pub french_dates: bool,
}

fn client(config: &ViewerConfig) -> Result<ApiClient> {
    ApiClient::from_config(config).context("creating HTTP client")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn cmd_patients(config: &ViewerConfig, skip: usize, limit: usize) -> Result<()> {
    print_json(&client(config)?.list_patients(skip, limit)?)
}

pub fn cmd_patient(config: &ViewerConfig, id: u64) -> Result<()> {
    print_json(&client(config)?.get_patient(id)?)
}

/// Fetch a window, classify its beats through the router and summarize it.
pub fn cmd_segment(
    config: &ViewerConfig,
    patient: u64,
    ecg: u64,
    bounds: Option<(f64, f64)>,
    label_timeout_s: f64,
    window: &WindowArgs,
) -> Result<()> {
    let api = client(config)?;
    let segment = match bounds {
        Some((t0, t1)) => api.get_segment(patient, ecg, t0, t1)?,
        None => api.get_record(patient, ecg)?,
    };
    let signal = segment
        .to_store()
        .with_context(|| format!("segment of {patient}/{ecg} is inconsistent"))?;
    let mut router = ClassificationRouter::new(ChartStore::new(config.default_segment_s), api);
    router.load(Some(RecordKey::new(patient, ecg)), signal);
    if !router.wait_for_labels(Duration::from_secs_f64(label_timeout_s.max(0.0))) {
        warn!("beat labels did not arrive within {label_timeout_s} s");
    }
    let mut chart = router.into_chart();
    apply_window(&mut chart, window);
    print_json(&summarize(&mut chart)?)
}

pub fn cmd_classify(config: &ViewerConfig, patient: u64, ecg: u64, force: bool) -> Result<()> {
    print_json(&client(config)?.classify(patient, ecg, force)?)
}

pub fn cmd_beat(config: &ViewerConfig, patient: u64, ecg: u64, index: usize) -> Result<()> {
    print_json(&client(config)?.get_beat(patient, ecg, index)?)
}

pub fn cmd_fs(config: &ViewerConfig, patient: u64, ecg: u64) -> Result<()> {
    println!("{}", client(config)?.get_fs(patient, ecg)?);
    Ok(())
}

pub fn cmd_delete_ecg(config: &ViewerConfig, patient: u64, ecg: u64) -> Result<()> {
    print_json(&client(config)?.delete_ecg(patient, ecg)?)
}

pub fn cmd_delete_patient(config: &ViewerConfig, patient: u64) -> Result<()> {
    print_json(&client(config)?.delete_patient(patient)?)
}

pub fn cmd_import(config: &ViewerConfig, args: &ImportArgs) -> Result<()> {
    let patient = PatientForm {
        first_name: args.first_name.clone(),
        last_name: args.last_name.clone(),
        date_of_birth: args.date_of_birth.clone(),
        age: args.age,
        weight: args.weight,
        height: args.height,
        address: args.address.clone(),
        medical_history: args.medical_history.clone(),
        medication: args.medication,
        allergies: args.allergies.clone(),
    };
    let meta = EcgMeta {
        date: args.date.clone(),
        location: args.location.clone(),
        sampling_rate: args.sampling_rate,
    };
    let response = client(config)?.import_ecg(&patient, &meta, &args.file, args.french_dates)?;
    print_json(&response)
}

pub fn cmd_llm(config: &ViewerConfig, patient: u64, ecg: u64, metrics: &Path) -> Result<()> {
    let text = std::fs::read_to_string(metrics)
        .with_context(|| format!("failed to read {}", metrics.display()))?;
    let metrics: Value = serde_json::from_str(&text).context("metrics file is not JSON")?;
    println!("{}", client(config)?.llm_analysis(patient, ecg, &metrics));
    Ok(())
}
