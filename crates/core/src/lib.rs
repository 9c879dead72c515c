pub mod debt;
pub mod normalize;
pub mod overlay;
pub mod table;

pub use debt::{Debt, Numerals, DEBT_CURRENCY};
pub use normalize::{cancellation_key, normalize_date, normalize_name};
pub use overlay::CancellationOverlay;
pub use table::{Cell, CellValue, Column, Row, SheetIssue, SheetPayload, Table};
