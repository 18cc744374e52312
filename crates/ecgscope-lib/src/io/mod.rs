pub mod csv;
pub mod predictions;
pub mod text;

pub use self::csv::read_csv_column;
pub use predictions::read_predictions;
pub use text::{parse_f64_series, read_f64_series};
