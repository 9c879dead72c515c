use std::collections::BTreeMap;

use phonix_core::Table;
use serde::Serialize;

/// First-cell label that identifies the header row.
pub const NAME_LABEL: &str = "الاسم";
/// Only this many leading rows are searched for the header.
pub const HEADER_SCAN_ROWS: usize = 20;
/// Header position assumed when no header row is found.
pub const FALLBACK_HEADER_ROW: usize = 9;
/// Labels used when the sheet has neither a header row nor column metadata.
pub const BUILTIN_LABELS: [&str; 6] = [
    NAME_LABEL,
    "المرحلة",
    "الشعبة",
    "التاريخ",
    "نوع الورق",
    "السعر",
];

const DATE_HINTS: &[&str] = &["التاريخ", "تاريخ", "date"];
const DEBT_HINTS: &[&str] = &["الدين", "الديون", "debt"];

/// Where the column labels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderOrigin {
    Detected,
    ColumnMetadata,
    Builtin,
}

/// Result of resolving a table's header, computed once per load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnLayout {
    pub header_row: usize,
    pub data_start: usize,
    pub labels: BTreeMap<usize, String>,
    pub date_column: Option<usize>,
    pub debt_column: Option<usize>,
    pub origin: HeaderOrigin,
}

impl ColumnLayout {
    /// The label for `idx`, or the positional fallback when unlabelled.
    pub fn label(&self, idx: usize) -> String {
        self.labels
            .get(&idx)
            .cloned()
            .unwrap_or_else(|| positional_label(idx))
    }
}

/// `العمود N` ("column N"), one-based.
pub fn positional_label(idx: usize) -> String {
    format!("العمود {}", idx + 1)
}

/// Locates the header row and the date / debt columns.
///
/// Scans the first [`HEADER_SCAN_ROWS`] rows for a first cell containing
/// [`NAME_LABEL`]. Without one, the header is assumed at
/// [`FALLBACK_HEADER_ROW`] and labelled from the table's column metadata, or
/// from [`BUILTIN_LABELS`] when there is none. Never fails.
pub fn resolve_columns(table: &Table) -> ColumnLayout {
    let detected = table
        .rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| row.text(0).is_some_and(|first| first.contains(NAME_LABEL)));

    let (header_row, labels, origin) = match detected {
        Some(idx) => {
            let row = &table.rows[idx];
            let labels = (0..row.len())
                .map(|col| (col, row.non_blank(col).unwrap_or_else(|| positional_label(col))))
                .collect();
            (idx, labels, HeaderOrigin::Detected)
        }
        None if !table.cols.is_empty() => {
            let labels = table
                .cols
                .iter()
                .enumerate()
                .map(|(col, meta)| {
                    let label = meta.label.trim();
                    let label = if label.is_empty() {
                        positional_label(col)
                    } else {
                        label.to_string()
                    };
                    (col, label)
                })
                .collect();
            (FALLBACK_HEADER_ROW, labels, HeaderOrigin::ColumnMetadata)
        }
        None => {
            let labels = BUILTIN_LABELS
                .iter()
                .enumerate()
                .map(|(col, label)| (col, label.to_string()))
                .collect();
            (FALLBACK_HEADER_ROW, labels, HeaderOrigin::Builtin)
        }
    };

    let date_column = find_column(&labels, DATE_HINTS);
    let debt_column = find_column(&labels, DEBT_HINTS);

    tracing::debug!(
        header_row,
        ?origin,
        ?date_column,
        ?debt_column,
        "resolved column layout"
    );

    ColumnLayout {
        header_row,
        data_start: header_row + 1,
        labels,
        date_column,
        debt_column,
        origin,
    }
}

fn find_column(labels: &BTreeMap<usize, String>, hints: &[&str]) -> Option<usize> {
    labels.iter().find_map(|(idx, label)| {
        let label = label.to_lowercase();
        hints.iter().any(|hint| label.contains(hint)).then_some(*idx)
    })
}
