// Source access and report export

pub mod extract;
pub mod query;
pub mod sink;
pub mod source;

pub use extract::{extract_with_algebra, extract_with_query};
pub use source::SourceConnection;

/// Field delimiter for exported reports.
pub const REPORT_DELIMITER: u8 = b';';

/// Header labels for exported reports, in column order.
pub const REPORT_HEADER: [&str; 4] = ["Customer", "Age", "Item", "Quantity"];
