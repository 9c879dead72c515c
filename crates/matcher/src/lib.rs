pub mod date;
pub mod header;
pub mod matcher;
pub(crate) mod util;

pub use date::{parse_date_parts, DateFilter, DateParts};
pub use header::{resolve_columns, ColumnLayout, HeaderOrigin};
pub use matcher::{
    names_match, price_window_total, MatchRecord, QueryError, RecordField, RecordMatcher,
    SearchQuery, DEBT_FIELD_LABEL,
};
