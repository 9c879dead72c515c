/// Lower-cases and collapses every run of whitespace to a single space.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_date(date: &str) -> String {
    date.trim().to_string()
}

/// The `name|date` key a cancelled record is stored under.
pub fn cancellation_key(name: &str, date: &str) -> String {
    format!("{}|{}", normalize_name(name), normalize_date(date))
}
