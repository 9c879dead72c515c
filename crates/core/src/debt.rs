use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Currency suffix appended to every rendered debt total.
pub const DEBT_CURRENCY: &str = "دينار";

/// Digit set used when rendering a debt total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Numerals {
    Latin,
    /// Arabic-Indic digits with the Arabic thousands and decimal separators.
    #[default]
    Arabic,
}

impl Numerals {
    fn digit(self, c: char) -> char {
        match self {
            Numerals::Latin => c,
            Numerals::Arabic => c
                .to_digit(10)
                .and_then(|d| char::from_u32(0x0660 + d))
                .unwrap_or(c),
        }
    }

    fn group_separator(self) -> char {
        match self {
            Numerals::Latin => ',',
            Numerals::Arabic => '\u{066C}',
        }
    }

    fn decimal_separator(self) -> char {
        match self {
            Numerals::Latin => '.',
            Numerals::Arabic => '\u{066B}',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Debt(Decimal);

impl Debt {
    pub fn zero() -> Self {
        Debt(Decimal::ZERO)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Debt(decimal)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Thousands-grouped amount with at most three fraction digits, followed
    /// by the currency suffix.
    pub fn format(self, numerals: Numerals) -> String {
        let rendered = self.0.round_dp(3).normalize().to_string();
        let (negative, rendered) = match rendered.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, rendered.as_str()),
        };
        let (int_part, frac_part) = match rendered.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (rendered, None),
        };

        let mut out = String::new();
        if negative {
            out.push('-');
        }
        let len = int_part.len();
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(numerals.group_separator());
            }
            out.push(numerals.digit(c));
        }
        if let Some(frac) = frac_part {
            out.push(numerals.decimal_separator());
            out.extend(frac.chars().map(|c| numerals.digit(c)));
        }
        out.push(' ');
        out.push_str(DEBT_CURRENCY);
        out
    }
}

impl fmt::Display for Debt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(Numerals::Latin))
    }
}

impl Add for Debt {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Debt(self.0 + rhs.0)
    }
}
