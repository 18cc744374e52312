pub mod api;
pub mod config;
pub mod router;
pub mod session;
pub mod types;

pub use api::{ApiClient, ApiError, DEFAULT_PATIENT_LIMIT, LLM_UNAVAILABLE};
pub use config::ViewerConfig;
pub use router::{BeatClassifier, ClassificationRouter};
pub use session::SessionCache;
pub use types::*;
