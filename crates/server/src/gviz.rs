use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

pub const SHEETS_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_callback, r"(?s)google\.visualization\.Query\.setResponse\((.*)\);?\s*$");

#[derive(Debug, Error)]
pub enum GvizError {
    #[error("Invalid sheet URL: {0}")]
    InvalidUrl(String),
    #[error("Response body contains no JSON")]
    NoJson,
    #[error("Response JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid response format from Google Sheets")]
    MissingTable,
    #[error("Sheet query failed: {0}")]
    Query(String),
}

/// The JSON query URL for a published sheet. The sheet name is
/// form-encoded into the query string.
pub fn sheet_url(sheet_id: &str, sheet_name: Option<&str>) -> Result<Url, GvizError> {
    let mut url = Url::parse(&format!("{SHEETS_BASE_URL}/{sheet_id}/gviz/tq?tqx=out:json"))
        .map_err(|e| GvizError::InvalidUrl(e.to_string()))?;
    if let Some(name) = sheet_name.filter(|n| !n.is_empty()) {
        url.query_pairs_mut().append_pair("sheet", name);
    }
    Ok(url)
}

/// Extracts the JSON payload from a `setResponse(...)` wrapper.
///
/// Tries the exact callback form, then the outermost `{...}` span, then
/// everything between the first `(` and a trailing `);`. The payload must
/// carry a `table`; an error-status payload reports its first message.
pub fn unwrap_response(text: &str) -> Result<Value, GvizError> {
    let json = if let Some(caps) = re_callback().captures(text) {
        caps.get(1).map_or("", |m| m.as_str()).to_string()
    } else if let Some(span) = outer_braces(text) {
        span.to_string()
    } else {
        strip_call(text).ok_or(GvizError::NoJson)?.to_string()
    };

    let value: Value = serde_json::from_str(&json)?;

    if value.get("status").and_then(Value::as_str) == Some("error") {
        return Err(GvizError::Query(first_error_message(&value)));
    }
    if value.get("table").is_none_or_null() {
        return Err(GvizError::MissingTable);
    }
    Ok(value)
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn strip_call(text: &str) -> Option<&str> {
    let open = text.find('(')?;
    let inner = text[open + 1..].trim_end();
    let inner = inner.strip_suffix(';').unwrap_or(inner);
    let inner = inner.strip_suffix(')')?;
    (!inner.trim().is_empty()).then_some(inner)
}

fn first_error_message(value: &Value) -> String {
    value
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| {
            e.get("detailed_message")
                .or_else(|| e.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or("unknown error")
        .to_string()
}

trait NoneOrNull {
    fn is_none_or_null(&self) -> bool;
}

impl NoneOrNull for Option<&Value> {
    fn is_none_or_null(&self) -> bool {
        self.map_or(true, Value::is_null)
    }
}
