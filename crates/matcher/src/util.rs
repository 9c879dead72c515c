use rust_decimal::Decimal;
use std::str::FromStr;

/// Reads a number out of loosely formatted cell text.
///
/// Every character other than an ASCII digit or `.` is dropped first, then the
/// longest leading `digits[.digits]` run is parsed. `"3,000 IQD"` reads as
/// 3000, `"1.2.3"` as 1.2, and text without digits yields `None`.
pub fn parse_loose_number(s: &str) -> Option<Decimal> {
    let kept: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();

    let mut chars = kept.chars().peekable();
    let mut int_digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        int_digits.push(c);
    }
    let mut frac_digits = String::new();
    if chars.next_if_eq(&'.').is_some() {
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
            frac_digits.push(c);
        }
    }

    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let literal = match (int_digits.is_empty(), frac_digits.is_empty()) {
        (_, true) => int_digits,
        (true, false) => format!("0.{frac_digits}"),
        (false, false) => format!("{int_digits}.{frac_digits}"),
    };
    // Overlong digit runs overflow Decimal; they are far outside any
    // plausible amount anyway.
    Decimal::from_str(&literal).ok()
}
