//! Beat classification labels and the per-recording classification cache.
//!
//! Labels come from the remote classifier as `[index, label]` pairs aligned
//! positionally with the R-peak set. The cache holds them for one
//! `(patient, ecg)` pair at a time; every fetch carries a [`RequestTag`] and
//! only the most recently issued tag may complete it.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const LABEL_NOT_AVAILABLE: &str = "classification not available";
pub const LABEL_NOT_SELECTED: &str = "beat not selected";
pub const LABEL_INVALID_FORMAT: &str = "invalid format";
pub const LABEL_OUT_OF_BOUNDS: &str = "out of bounds";

/// Statistic buckets for beat labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatClass {
    Normal,
    Ventricular,
    Supraventricular,
    Fusion,
    Unknown,
}

impl BeatClass {
    pub const ALL: [BeatClass; 5] = [
        BeatClass::Normal,
        BeatClass::Ventricular,
        BeatClass::Supraventricular,
        BeatClass::Fusion,
        BeatClass::Unknown,
    ];

    /// Case-insensitive substring match; "supraventric" must be tested
    /// before "ventric" since the former contains the latter.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("normal") {
            BeatClass::Normal
        } else if label.contains("supraventric") {
            BeatClass::Supraventricular
        } else if label.contains("ventric") {
            BeatClass::Ventricular
        } else if label.contains("fusion") {
            BeatClass::Fusion
        } else {
            BeatClass::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BeatClass::Normal => "normal",
            BeatClass::Ventricular => "ventricular",
            BeatClass::Supraventricular => "supraventricular",
            BeatClass::Fusion => "fusion",
            BeatClass::Unknown => "unknown",
        }
    }
}

/// One classifier entry, kept even when it does not have the expected shape.
#[derive(Debug, Clone, PartialEq)]
pub enum BeatLabel {
    Label(String),
    Malformed,
}

impl BeatLabel {
    pub fn from_entry(entry: &Value) -> Self {
        match entry.as_array() {
            Some(pair) if pair.len() >= 2 => match pair[1].as_str() {
                Some(label) => BeatLabel::Label(label.to_string()),
                None => BeatLabel::Malformed,
            },
            _ => BeatLabel::Malformed,
        }
    }
}

pub fn parse_predictions(entries: &[Value]) -> Vec<BeatLabel> {
    entries.iter().map(BeatLabel::from_entry).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub patient_id: u64,
    pub ecg_id: u64,
}

impl RecordKey {
    pub const fn new(patient_id: u64, ecg_id: u64) -> Self {
        Self { patient_id, ecg_id }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.patient_id, self.ecg_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTag(u64);

impl RequestTag {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A fetch the caller must perform and report back through
/// [`ClassificationCache::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub tag: RequestTag,
    pub key: RecordKey,
}

/// Raw classifier entries, or the failure text of the fetch.
pub type ClassificationOutcome = Result<Vec<Value>, String>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClassificationState {
    #[default]
    Unavailable,
    Pending,
    Ready(Vec<BeatLabel>),
}

/// Result of looking up the label of one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelLookup<'a> {
    Label(&'a str),
    NotAvailable,
    NotSelected,
    InvalidFormat,
    OutOfBounds,
}

impl LabelLookup<'_> {
    pub fn class(&self) -> BeatClass {
        match self {
            LabelLookup::Label(label) => BeatClass::from_label(label),
            _ => BeatClass::Unknown,
        }
    }
}

impl fmt::Display for LabelLookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelLookup::Label(label) => f.write_str(label),
            LabelLookup::NotAvailable => f.write_str(LABEL_NOT_AVAILABLE),
            LabelLookup::NotSelected => f.write_str(LABEL_NOT_SELECTED),
            LabelLookup::InvalidFormat => f.write_str(LABEL_INVALID_FORMAT),
            LabelLookup::OutOfBounds => f.write_str(LABEL_OUT_OF_BOUNDS),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassificationCache {
    key: Option<RecordKey>,
    state: ClassificationState,
    next_tag: u64,
    latest: Option<RequestTag>,
    revision: u64,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for the labels of `key`. Returns a request only when the key
    /// differs from the cached one.
    pub fn request(&mut self, key: RecordKey) -> Option<FetchRequest> {
        if self.key == Some(key) {
            return None;
        }
        Some(self.issue(key))
    }

    /// Unconditionally re-fetch `key`, superseding any request in flight.
    pub fn refresh(&mut self, key: RecordKey) -> FetchRequest {
        self.issue(key)
    }

    fn issue(&mut self, key: RecordKey) -> FetchRequest {
        self.next_tag += 1;
        let tag = RequestTag(self.next_tag);
        self.key = Some(key);
        self.latest = Some(tag);
        self.state = ClassificationState::Pending;
        self.revision += 1;
        info!("requesting beat classification for {key} (tag {})", tag.0);
        FetchRequest { tag, key }
    }

    /// Apply a fetch result. Responses for superseded tags are dropped and
    /// `false` is returned.
    pub fn complete(&mut self, tag: RequestTag, outcome: ClassificationOutcome) -> bool {
        if self.latest != Some(tag) {
            debug!("discarding stale classification response (tag {})", tag.0);
            return false;
        }
        self.latest = None;
        self.state = match outcome {
            Ok(entries) => ClassificationState::Ready(parse_predictions(&entries)),
            Err(err) => {
                warn!("beat classification unavailable: {err}");
                ClassificationState::Unavailable
            }
        };
        self.revision += 1;
        true
    }

    /// Forget the cached labels, e.g. when the recording is unloaded.
    pub fn clear(&mut self) {
        self.key = None;
        self.latest = None;
        self.state = ClassificationState::Unavailable;
        self.revision += 1;
    }

    pub fn key(&self) -> Option<RecordKey> {
        self.key
    }

    pub fn state(&self) -> &ClassificationState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ClassificationState::Pending)
    }

    /// Bumped on every state change; used to key memoized statistics.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn labels(&self) -> Option<&[BeatLabel]> {
        match &self.state {
            ClassificationState::Ready(labels) => Some(labels),
            _ => None,
        }
    }

    pub fn lookup(&self, beat_index: Option<usize>) -> LabelLookup<'_> {
        let Some(labels) = self.labels() else {
            return LabelLookup::NotAvailable;
        };
        let Some(index) = beat_index else {
            return LabelLookup::NotSelected;
        };
        match labels.get(index) {
            Some(BeatLabel::Label(label)) => LabelLookup::Label(label),
            Some(BeatLabel::Malformed) => LabelLookup::InvalidFormat,
            None => LabelLookup::OutOfBounds,
        }
    }

    pub fn class_of(&self, beat_index: usize) -> BeatClass {
        self.lookup(Some(beat_index)).class()
    }
}
