use std::ops::RangeInclusive;

use phonix_core::{
    cancellation_key, normalize_name, CancellationOverlay, Debt, Numerals, Row, Table,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::date::DateFilter;
use crate::header::ColumnLayout;
use crate::util::parse_loose_number;

/// Columns scanned for prices when the sheet has no debt column.
pub const DEBT_SCAN_COLUMNS: RangeInclusive<usize> = 3..=5;
/// Scanned values must be strictly below this to count toward the total.
pub const DEBT_CEILING: i64 = 1_000_000;
/// Label of the computed debt field added to every record that has one.
pub const DEBT_FIELD_LABEL: &str = "إجمالي الدين";
/// Columns below this index are always projected, even when blank.
pub const ALWAYS_SHOWN_COLUMNS: usize = 6;

const MIN_NAME_CHARS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("a search needs a name or at least one date component")]
    Empty,
    #[error("day must be between 1 and 31, got {0}")]
    InvalidDay(u32),
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("year must be between 1 and 9999, got {0}")]
    InvalidYear(i32),
}

/// A validated search: normalized name plus optional date components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    name: String,
    date: DateFilter,
}

impl SearchQuery {
    /// Builds a query. An empty `name` disables the name predicate, but then
    /// at least one date component is required.
    pub fn new(name: &str, date: DateFilter) -> Result<Self, QueryError> {
        if let Some(day) = date.day.filter(|d| !(1..=31).contains(d)) {
            return Err(QueryError::InvalidDay(day));
        }
        if let Some(month) = date.month.filter(|m| !(1..=12).contains(m)) {
            return Err(QueryError::InvalidMonth(month));
        }
        if let Some(year) = date.year.filter(|y| !(1..=9999).contains(y)) {
            return Err(QueryError::InvalidYear(year));
        }

        let name = normalize_name(name);
        if name.is_empty() && date.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self { name, date })
    }

    pub fn by_name(name: &str) -> Result<Self, QueryError> {
        Self::new(name, DateFilter::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> &DateFilter {
        &self.date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordField {
    pub label: String,
    pub value: String,
}

/// One matching spreadsheet row, projected for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub row_index: usize,
    pub name: String,
    /// Raw date-cell text, empty when the sheet has no date column.
    pub date: String,
    pub debt: Option<String>,
    pub fields: Vec<RecordField>,
}

impl MatchRecord {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }

    fn set_field(&mut self, label: String, value: String) {
        match self.fields.iter_mut().find(|f| f.label == label) {
            Some(existing) => existing.value = value,
            None => self.fields.push(RecordField { label, value }),
        }
    }
}

/// True if either normalized name contains the other.
///
/// Prefix matches are a special case of containment, so this also covers
/// either name being a prefix of the other.
pub fn names_match(row_name: &str, search_name: &str) -> bool {
    row_name.contains(search_name) || search_name.contains(row_name)
}

#[derive(Debug, Clone, Default)]
pub struct RecordMatcher {
    pub numerals: Numerals,
}

impl RecordMatcher {
    pub fn new(numerals: Numerals) -> Self {
        Self { numerals }
    }

    /// Scans the data rows of `table` top to bottom and returns every row that
    /// satisfies `query` and is not cancelled in `overlay`.
    ///
    /// Each row index is visited once, so results are unique by `row_index`
    /// and come out in ascending row order.
    pub fn find_matches(
        &self,
        table: &Table,
        layout: &ColumnLayout,
        query: &SearchQuery,
        overlay: &CancellationOverlay,
    ) -> Vec<MatchRecord> {
        let mut matches = Vec::new();

        for (row_index, row) in table.rows.iter().enumerate().skip(layout.data_start) {
            if row.is_empty() {
                continue;
            }
            let Some(name) = row.text(0) else {
                continue;
            };
            if name.chars().count() < MIN_NAME_CHARS {
                continue;
            }

            if !query.name.is_empty() && !names_match(&normalize_name(&name), &query.name) {
                continue;
            }

            let date = layout
                .date_column
                .and_then(|col| row.text(col))
                .unwrap_or_default();
            if layout.date_column.is_some() && !query.date.matches_text(&date) {
                continue;
            }

            if overlay.contains_key(&cancellation_key(&name, &date)) {
                tracing::debug!(row_index, "skipping cancelled record");
                continue;
            }

            tracing::debug!(row_index, name = %name, "match found");
            matches.push(self.build_record(row_index, row, layout, name, date));
        }

        matches
    }

    fn build_record(
        &self,
        row_index: usize,
        row: &Row,
        layout: &ColumnLayout,
        name: String,
        date: String,
    ) -> MatchRecord {
        let mut record = MatchRecord {
            row_index,
            name,
            date,
            debt: None,
            fields: Vec::new(),
        };

        for idx in 0..row.len() {
            let value = row.text(idx).unwrap_or_default();
            if !value.is_empty() || idx < ALWAYS_SHOWN_COLUMNS {
                record.set_field(layout.label(idx), value);
            }
        }

        if let Some(debt) = self.compute_debt(row, layout) {
            record.set_field(DEBT_FIELD_LABEL.to_string(), debt.clone());
            record.debt = Some(debt);
        }

        record
    }

    /// The debt shown for a row: the debt column verbatim when it has a
    /// value, otherwise the formatted total of the price window.
    pub fn compute_debt(&self, row: &Row, layout: &ColumnLayout) -> Option<String> {
        if let Some(verbatim) = layout.debt_column.and_then(|col| row.non_blank(col)) {
            return Some(verbatim);
        }
        price_window_total(row).map(|total| total.format(self.numerals))
    }
}

/// Sums the plausible prices in [`DEBT_SCAN_COLUMNS`]. Values outside
/// `(0, DEBT_CEILING)` and non-numeric cells are ignored; `None` unless the
/// total is positive.
pub fn price_window_total(row: &Row) -> Option<Debt> {
    let ceiling = Decimal::from(DEBT_CEILING);
    let mut total = Debt::zero();
    let mut found = false;

    for idx in DEBT_SCAN_COLUMNS {
        let Some(text) = row.text(idx) else {
            continue;
        };
        match parse_loose_number(&text) {
            Some(value) if value > Decimal::ZERO && value < ceiling => {
                total = total + Debt::from_decimal(value);
                found = true;
            }
            _ => {}
        }
    }

    (found && total.is_positive()).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::resolve_columns;
    use phonix_core::{Cell, Column};

    const HEADER: [&str; 6] = ["الاسم", "المرحلة", "الشعبة", "التاريخ", "نوع الورق", "السعر"];

    fn sheet(data: &[&[&str]]) -> Table {
        let mut rows: Vec<Row> = (0..9).map(|_| Row::default()).collect();
        rows.push(Row::from_texts(&HEADER));
        rows.extend(data.iter().map(|r| Row::from_texts(r)));
        Table::new(vec![], rows)
    }

    fn search(
        table: &Table,
        query: &SearchQuery,
        overlay: &CancellationOverlay,
    ) -> Vec<MatchRecord> {
        let layout = resolve_columns(table);
        RecordMatcher::new(Numerals::Latin).find_matches(table, &layout, query, overlay)
    }

    fn by_name(name: &str) -> SearchQuery {
        SearchQuery::by_name(name).unwrap()
    }

    // ── name matching ─────────────────────────────────────────────────────────

    #[test]
    fn substring_matches_both_directions() {
        assert!(names_match("ali hassan", "ali"));
        assert!(names_match("ali", "ali hassan"));
        assert!(names_match("ali hassan", "hassan"));
        assert!(!names_match("ali hassan", "omar"));
    }

    #[test]
    fn matches_case_and_whitespace_insensitively() {
        let table = sheet(&[
            &["Ali   Hassan", "3", "A", "15/01/2024", "A4", "500"],
            &["Omar Khalid", "2", "B", "16/01/2024", "A4", "700"],
        ]);
        let results = search(&table, &by_name("  ALI hassan "), &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].row_index, 10);
        assert_eq!(results[0].name, "Ali   Hassan");
    }

    #[test]
    fn query_longer_than_row_name_still_matches() {
        let table = sheet(&[&["علي", "", "", "", "", ""]]);
        let results = search(&table, &by_name("علي حسن محمد"), &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn rows_before_data_start_are_never_matched() {
        let mut table = sheet(&[&["Ali Hassan", "", "", "", "", ""]]);
        table.rows[3] = Row::from_texts(&["Ali Hassan (note)"]);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        assert_eq!(results.iter().map(|r| r.row_index).collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn short_blank_and_cellless_rows_are_skipped() {
        let mut table = sheet(&[
            &["A", "", "", "", "", ""],
            &["   ", "x", "", "", "", ""],
            &["Ali", "", "", "", "", ""],
        ]);
        table.rows.push(Row::default());
        table.rows.push(Row::new(vec![None, None, None]));
        table.rows.push(Row::new(vec![None, Some(Cell::new("Ali"))]));
        let results = search(&table, &by_name("a"), &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ali");
    }

    #[test]
    fn numeric_name_cell_is_matched_as_text() {
        let mut table = sheet(&[]);
        table.rows.push(Row::new(vec![Some(Cell::new(1234.0))]));
        let results = search(&table, &by_name("123"), &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "1234");
    }

    #[test]
    fn results_are_unique_and_in_row_order() {
        let table = sheet(&[
            &["Sara Ali", "", "", "", "", ""],
            &["Ali Hassan", "", "", "", "", ""],
            &["Omar", "", "", "", "", ""],
            &["ali", "", "", "", "", ""],
        ]);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        let rows: Vec<usize> = results.iter().map(|r| r.row_index).collect();
        assert_eq!(rows, vec![10, 11, 13]);
    }

    // ── date filtering ────────────────────────────────────────────────────────

    #[test]
    fn date_components_must_all_match() {
        let table = sheet(&[
            &["Ali Hassan", "", "", "15/01/2024", "", ""],
            &["Ali Hassan", "", "", "15/02/2024", "", ""],
            &["Ali Hassan", "", "", "2023-01-15", "", ""],
        ]);
        let filter = DateFilter::new(Some(15), Some(1), Some(2024));
        let query = SearchQuery::new("ali", filter).unwrap();
        let results = search(&table, &query, &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].date, "15/01/2024");

        let query = SearchQuery::new("ali", DateFilter::new(None, Some(1), None)).unwrap();
        assert_eq!(search(&table, &query, &CancellationOverlay::new()).len(), 2);
    }

    #[test]
    fn date_only_query_matches_every_name() {
        let table = sheet(&[
            &["Ali Hassan", "", "", "15/01/2024", "", ""],
            &["Omar Khalid", "", "", "15/01/2024", "", ""],
            &["Sara", "", "", "16/01/2024", "", ""],
        ]);
        let query = SearchQuery::new("", DateFilter::new(Some(15), None, None)).unwrap();
        assert_eq!(search(&table, &query, &CancellationOverlay::new()).len(), 2);
    }

    #[test]
    fn date_filter_ignored_without_date_column() {
        let cols = vec![Column::labelled("Name"), Column::labelled("Stage")];
        let mut rows: Vec<Row> = (0..10).map(|_| Row::default()).collect();
        rows.push(Row::from_texts(&["Ali Hassan", "3"]));
        let table = Table::new(cols, rows);
        let query = SearchQuery::new("ali", DateFilter::new(Some(1), None, None)).unwrap();
        let results = search(&table, &query, &CancellationOverlay::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].date, "");
    }

    // ── debt ──────────────────────────────────────────────────────────────────

    #[test]
    fn debt_window_ignores_out_of_range_and_text() {
        let row = Row::from_texts(&["Ali", "x", "10", "abc", "2,000,000", "500"]);
        assert_eq!(price_window_total(&row).map(Debt::amount), Some(Decimal::from(500)));
    }

    #[test]
    fn debt_window_sums_values() {
        let row = Row::from_texts(&["Ali", "", "", "1,500", "2500 دينار", "0"]);
        assert_eq!(price_window_total(&row).map(Debt::amount), Some(Decimal::from(4000)));
    }

    #[test]
    fn debt_window_without_prices_is_none() {
        let row = Row::from_texts(&["Ali", "", "", "", "-", "0"]);
        assert_eq!(price_window_total(&row), None);
        assert_eq!(price_window_total(&Row::from_texts(&["Ali"])), None);
    }

    #[test]
    fn computed_debt_is_added_as_field() {
        let table = sheet(&[&["Ali Hassan", "3", "A", "15/01/2024", "ملون", "13000"]]);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        assert_eq!(results[0].debt.as_deref(), Some("13,000 دينار"));
        assert_eq!(results[0].field(DEBT_FIELD_LABEL), Some("13,000 دينار"));
        assert_eq!(results[0].field("السعر"), Some("13000"));
    }

    #[test]
    fn debt_column_is_used_verbatim() {
        let header = ["الاسم", "التاريخ", "", "", "", "", "الدين"];
        let mut rows: Vec<Row> = vec![Row::from_texts(&header)];
        rows.push(Row::from_texts(&["Ali Hassan", "", "", "900", "", "", "يسدد لاحقا"]));
        let table = Table::new(vec![], rows);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        assert_eq!(results[0].debt.as_deref(), Some("يسدد لاحقا"));
    }

    #[test]
    fn blank_debt_column_falls_back_to_window() {
        let mut rows: Vec<Row> = vec![Row::from_texts(&["الاسم", "", "", "", "", "", "الدين"])];
        rows.push(Row::from_texts(&["Ali Hassan", "", "", "900", "", "", ""]));
        let table = Table::new(vec![], rows);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        assert_eq!(results[0].debt.as_deref(), Some("900 دينار"));
    }

    #[test]
    fn default_matcher_renders_arabic_digits() {
        let table = sheet(&[&["Ali Hassan", "", "", "", "", "2500"]]);
        let layout = resolve_columns(&table);
        let results = RecordMatcher::default().find_matches(
            &table,
            &layout,
            &by_name("ali"),
            &CancellationOverlay::new(),
        );
        assert_eq!(results[0].debt.as_deref(), Some("٢٬٥٠٠ دينار"));
    }

    // ── projection ────────────────────────────────────────────────────────────

    #[test]
    fn blank_trailing_columns_are_dropped_but_first_six_kept() {
        let table = sheet(&[&["Ali Hassan", "", "", "", "", "", "", "extra"]]);
        let results = search(&table, &by_name("ali"), &CancellationOverlay::new());
        let labels: Vec<&str> = results[0].fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["الاسم", "المرحلة", "الشعبة", "التاريخ", "نوع الورق", "السعر", "العمود 8"]
        );
        assert_eq!(results[0].field("المرحلة"), Some(""));
    }

    // ── cancellation ──────────────────────────────────────────────────────────

    #[test]
    fn cancelled_records_never_return() {
        let table = sheet(&[
            &["Ali Hassan", "", "", "15/01/2024", "", "500"],
            &["Ali Hassan", "", "", "16/01/2024", "", "700"],
        ]);
        let mut overlay = CancellationOverlay::new();
        overlay.add("ALI  HASSAN", "15/01/2024 ");

        for _ in 0..3 {
            let results = search(&table, &by_name("ali"), &overlay);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].date, "16/01/2024");
        }
    }

    #[test]
    fn cancellation_without_date_column_uses_empty_date() {
        let cols = vec![Column::labelled("Name")];
        let mut rows: Vec<Row> = (0..10).map(|_| Row::default()).collect();
        rows.push(Row::from_texts(&["Ali Hassan"]));
        let table = Table::new(cols, rows);
        let mut overlay = CancellationOverlay::new();
        overlay.add("Ali Hassan", "");
        assert!(search(&table, &by_name("ali"), &overlay).is_empty());
    }

    // ── query validation ──────────────────────────────────────────────────────

    #[test]
    fn query_validation() {
        assert_eq!(SearchQuery::by_name("   "), Err(QueryError::Empty));
        assert_eq!(
            SearchQuery::new("ali", DateFilter::new(Some(32), None, None)),
            Err(QueryError::InvalidDay(32))
        );
        assert_eq!(
            SearchQuery::new("ali", DateFilter::new(None, Some(0), None)),
            Err(QueryError::InvalidMonth(0))
        );
        assert_eq!(SearchQuery::by_name(" Ali  Hassan ").unwrap().name(), "ali hassan");
    }
}
