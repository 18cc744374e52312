use thiserror::Error;

/// Construction failures for a [`crate::signal::SignalStore`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    #[error("sampling rate must be a positive finite number, got {0}")]
    InvalidSamplingRate(f64),
    #[error("ECG recording contains no samples")]
    EmptySeries,
    #[error("R-peak {index} at {time:.3}s is not after the previous peak")]
    NonMonotonicPeaks { index: usize, time: f64 },
    #[error("expected {expected} RR intervals for the peak set, got {actual}")]
    IntervalCountMismatch { expected: usize, actual: usize },
}

/// Inline validation errors for an explicitly typed segment.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SegmentError {
    #[error("segment bounds must be valid numbers")]
    NotANumber,
    #[error("segment bounds must lie between 0 and {max_s:.3}s")]
    OutOfRange { max_s: f64 },
    #[error("segment start must be before its end")]
    InvertedBounds,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("theme storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("theme storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
