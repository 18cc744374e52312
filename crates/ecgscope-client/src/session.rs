//! Per-session response cache keyed like the browser's session storage.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

pub const PATIENTS_KEY: &str = "patients";

pub fn patient_key(patient_id: u64) -> String {
    format!("patient-{patient_id}")
}

pub fn record_key(patient_id: u64, ecg_id: u64) -> String {
    format!("ecg-{patient_id}-{ecg_id}")
}

/// JSON text per key. Entries that no longer decode read as misses.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().ok()?;
        let text = entries.get(key)?;
        match serde_json::from_str(text) {
            Ok(value) => {
                debug!("session cache hit for {key}");
                Some(value)
            }
            Err(err) => {
                debug!("session cache entry {key} unreadable: {err}");
                None
            }
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(text) = serde_json::to_string(value) else {
            debug!("session cache skipped {key}: value does not serialize");
            return;
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), text);
        }
    }

    /// Store raw text as-is, mostly useful to seed the cache.
    pub fn write_raw(&self, key: &str, text: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), text.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|key, _| !key.starts_with(prefix));
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_naming() {
        assert_eq!(patient_key(3), "patient-3");
        assert_eq!(record_key(3, 14), "ecg-3-14");
    }

    #[test]
    fn write_then_read() {
        let cache = SessionCache::new();
        cache.write("patient-1", &vec![1u32, 2, 3]);
        assert_eq!(cache.read::<Vec<u32>>("patient-1"), Some(vec![1, 2, 3]));
        assert_eq!(cache.read::<Vec<u32>>("patient-2"), None);
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let cache = SessionCache::new();
        cache.write_raw("patients", "{not json");
        assert_eq!(cache.read::<Vec<u32>>("patients"), None);
        cache.write_raw("patients", "\"text\"");
        assert_eq!(cache.read::<Vec<u32>>("patients"), None);
    }

    #[test]
    fn prefix_removal() {
        let cache = SessionCache::new();
        cache.write("ecg-1-1", &1);
        cache.write("ecg-1-2", &2);
        cache.write("ecg-10-1", &3);
        cache.remove_prefix("ecg-1-");
        assert!(!cache.contains("ecg-1-1"));
        assert!(!cache.contains("ecg-1-2"));
        assert!(cache.contains("ecg-10-1"));
        assert_eq!(cache.len(), 1);
    }
}
