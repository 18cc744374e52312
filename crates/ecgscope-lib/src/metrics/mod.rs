pub mod hrv;

pub use hrv::*;
