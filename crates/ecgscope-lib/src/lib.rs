pub mod classification;
pub mod error;
pub mod io;
pub mod metrics;
pub mod overlay;
pub mod plot;
pub mod report;
pub mod selection;
pub mod signal;
pub mod store;
pub mod theme;
pub mod viewport;

pub use classification::*;
pub use error::*;
pub use signal::*;
pub use viewport::*;
pub use overlay::{Overlay, TraceMode};
pub use selection::{BeatDetail, SelectedBeat, SelectionPanel};
pub use store::{ChartStore, Layer, LayerVisibility};
pub use theme::{FileThemePersistence, MemoryThemePersistence, ThemePersistence, ThemeStore};
