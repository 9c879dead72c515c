use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar cell value as delivered by the spreadsheet query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(b) => write!(f, "{b}"),
            // f64's Display already drops a trailing ".0" for whole numbers.
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One `{v, f}` cell object. `v` may be explicitly null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub v: Option<CellValue>,
    /// Formatted display value; carried through but never matched on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<String>,
}

impl Cell {
    pub fn new(value: impl Into<CellValue>) -> Self {
        Self { v: Some(value.into()), f: None }
    }

    pub fn value(&self) -> Option<&CellValue> {
        self.v.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub c: Vec<Option<Cell>>,
}

impl Row {
    pub fn new(cells: Vec<Option<Cell>>) -> Self {
        Self { c: cells }
    }

    /// Builds a row of text cells; empty strings become null cells.
    pub fn from_texts(texts: &[&str]) -> Self {
        Self {
            c: texts
                .iter()
                .map(|t| if t.is_empty() { None } else { Some(Cell::new(*t)) })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// True when the row has no cells or every cell is null.
    pub fn is_empty(&self) -> bool {
        self.c.iter().all(|cell| cell.as_ref().and_then(Cell::value).is_none())
    }

    /// The value at `idx`, if the cell exists and is non-null.
    pub fn value(&self, idx: usize) -> Option<&CellValue> {
        self.c.get(idx)?.as_ref()?.value()
    }

    /// Trimmed text form of the value at `idx`. `Some("")` is possible for
    /// whitespace-only text.
    pub fn text(&self, idx: usize) -> Option<String> {
        self.value(idx).map(|v| v.to_string().trim().to_string())
    }

    /// Like [`Row::text`] but collapses absent and blank cells to `None`.
    pub fn non_blank(&self, idx: usize) -> Option<String> {
        self.text(idx).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Column {
    pub fn labelled(label: &str) -> Self {
        Self { id: None, label: label.to_string(), kind: None }
    }
}

/// The in-memory copy of the fetched spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub cols: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(cols: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { cols, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.cols.len()
    }
}

/// An error entry reported by the query endpoint alongside `status: "error"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetIssue {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detailed_message: Option<String>,
}

/// Top-level query response. Only `table` matters for lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<SheetIssue>,
    #[serde(default)]
    pub table: Option<Table>,
}

impl SheetPayload {
    /// The first reported issue when `status` is `"error"`.
    pub fn error_message(&self) -> Option<String> {
        if self.status.as_deref() != Some("error") {
            return None;
        }
        let message = self
            .errors
            .first()
            .and_then(|issue| {
                issue
                    .detailed_message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .or_else(|| Some(issue.message.clone()).filter(|m| !m.is_empty()))
                    .or_else(|| Some(issue.reason.clone()).filter(|m| !m.is_empty()))
            })
            .unwrap_or_else(|| "unknown error".to_string());
        Some(message)
    }
}
