mod offline;
mod online;
mod render;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ecgscope_client::{ViewerConfig, DEFAULT_PATIENT_LIMIT};
use ecgscope_lib::theme::{FileThemePersistence, ThemeStore};
use env_logger::Env;
use log::info;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ecgscope", version, about = "ECG viewport, overlay and beat classification tools")]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// TOML viewer configuration (else $ECGSCOPE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Width of the opening window in seconds
    #[arg(long, global = true)]
    segment_s: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

/// A local recording: samples, R-peak times and optional labels.
#[derive(Args, Clone, Debug)]
pub struct RecordingArgs {
    /// Newline-delimited samples
    #[arg(long, conflicts_with = "csv")]
    pub samples: Option<PathBuf>,
    /// CSV export with one column per lead
    #[arg(long)]
    pub csv: Option<PathBuf>,
    /// Lead to read from --csv
    #[arg(long, default_value = "MLII")]
    pub column: String,
    /// Sampling rate in Hz
    #[arg(long, default_value_t = 360.0)]
    pub fs: f64,
    /// Newline-delimited R-peak times in seconds
    #[arg(long)]
    pub peaks: PathBuf,
    /// Saved classification response or bare `[[index, label], ...]` array
    #[arg(long)]
    pub labels: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum NavStep {
    Prev,
    Next,
    ZoomOut,
    Reset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LayerArg {
    Signal,
    Peaks,
    Rr,
}

/// How to move the window before reporting on it.
#[derive(Args, Clone, Debug, Default)]
pub struct WindowArgs {
    /// Typed segment start in seconds
    #[arg(long, requires = "end", allow_hyphen_values = true)]
    pub start: Option<String>,
    /// Typed segment end in seconds
    #[arg(long, requires = "start", allow_hyphen_values = true)]
    pub end: Option<String>,
    /// Drag-to-zoom selection edges (seconds)
    #[arg(long, requires = "drag_to")]
    pub drag_from: Option<f64>,
    #[arg(long, requires = "drag_from")]
    pub drag_to: Option<f64>,
    /// Navigation steps applied in order
    #[arg(long, value_delimiter = ',')]
    pub nav: Vec<NavStep>,
    /// Show the RR trace instead of the waveform
    #[arg(long)]
    pub rr_trace: bool,
    /// Legend entries to hide
    #[arg(long, value_delimiter = ',')]
    pub hide: Vec<LayerArg>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply window controls to a local recording and print the overlay summary
    View {
        #[command(flatten)]
        recording: RecordingArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Resolve a clicked R-peak time into beat detail
    Select {
        #[command(flatten)]
        recording: RecordingArgs,
        /// Time of the clicked peak in seconds
        #[arg(long)]
        time: f64,
    },
    /// Whole-recording HRV report
    Report {
        #[command(flatten)]
        recording: RecordingArgs,
        /// Backend metric groups JSON (`time_domain`, ...) to prefer
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Draw the current window to a PNG
    Render {
        #[command(flatten)]
        recording: RecordingArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1200)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
    /// List patients
    Patients {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = DEFAULT_PATIENT_LIMIT)]
        limit: usize,
    },
    /// Show one patient with its recordings
    Patient {
        #[arg(long)]
        id: u64,
    },
    /// Load a recording from the backend, classify it and print the overlay summary
    Segment {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
        /// Request an explicit window instead of the default one
        #[arg(long, requires = "t1")]
        t0: Option<f64>,
        #[arg(long, requires = "t0")]
        t1: Option<f64>,
        /// Seconds to wait for beat labels
        #[arg(long, default_value_t = 30.0)]
        label_timeout_s: f64,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run beat classification
    Classify {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
        /// Ignore any stored analysis
        #[arg(long)]
        force: bool,
    },
    /// Fetch the excerpt around one beat
    Beat {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
        #[arg(long)]
        index: usize,
    },
    /// Sampling rate of a recording
    Fs {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
    },
    /// Delete one recording
    DeleteEcg {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
    },
    /// Delete a patient and all of their recordings
    DeletePatient {
        #[arg(long)]
        patient: u64,
    },
    /// Upload a CSV recording with its patient form
    Import(online::ImportArgs),
    /// Narrative analysis of a metrics JSON file
    Llm {
        #[arg(long)]
        patient: u64,
        #[arg(long)]
        ecg: u64,
        #[arg(long)]
        metrics: PathBuf,
    },
    /// Show or change the light/dark preference
    Theme {
        #[arg(long, conflicts_with_all = ["toggle", "dark"])]
        show: bool,
        #[arg(long, conflicts_with = "dark")]
        toggle: bool,
        #[arg(long)]
        dark: Option<bool>,
        /// System preference used when nothing is stored
        #[arg(long)]
        system_dark: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let mut config = ViewerConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(segment_s) = cli.segment_s {
        config.default_segment_s = segment_s;
    }
    info!("using backend {}", config.api_base_url);

    match cli.command {
        Command::View { recording, window } => offline::cmd_view(&config, &recording, &window),
        Command::Select { recording, time } => offline::cmd_select(&config, &recording, time),
        Command::Report { recording, metrics } => {
            offline::cmd_report(&recording, metrics.as_deref())
        }
        Command::Render {
            recording,
            window,
            out,
            width,
            height,
        } => offline::cmd_render(&config, &recording, &window, &out, (width, height)),
        Command::Patients { skip, limit } => online::cmd_patients(&config, skip, limit),
        Command::Patient { id } => online::cmd_patient(&config, id),
        Command::Segment {
            patient,
            ecg,
            t0,
            t1,
            label_timeout_s,
            window,
        } => online::cmd_segment(&config, patient, ecg, t0.zip(t1), label_timeout_s, &window),
        Command::Classify { patient, ecg, force } => {
            online::cmd_classify(&config, patient, ecg, force)
        }
        Command::Beat { patient, ecg, index } => online::cmd_beat(&config, patient, ecg, index),
        Command::Fs { patient, ecg } => online::cmd_fs(&config, patient, ecg),
        Command::DeleteEcg { patient, ecg } => online::cmd_delete_ecg(&config, patient, ecg),
        Command::DeletePatient { patient } => online::cmd_delete_patient(&config, patient),
        Command::Import(args) => online::cmd_import(&config, &args),
        Command::Llm {
            patient,
            ecg,
            metrics,
        } => online::cmd_llm(&config, patient, ecg, &metrics),
        Command::Theme {
            show: _,
            toggle,
            dark,
            system_dark,
        } => cmd_theme(&config, toggle, dark, system_dark),
    }
}

fn cmd_theme(config: &ViewerConfig, toggle: bool, dark: Option<bool>, system_dark: bool) -> Result<()> {
    let path = config.theme_path()?;
    let mut theme = ThemeStore::new(FileThemePersistence::new(&path), system_dark);
    if toggle {
        theme.toggle().context("saving theme preference")?;
    } else if let Some(dark) = dark {
        theme.set_dark(dark).context("saving theme preference")?;
    }
    println!(
        "{}",
        json!({ "dark": theme.is_dark(), "path": path.display().to_string() })
    );
    Ok(())
}
