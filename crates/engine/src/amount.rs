use std::{fmt, str::FromStr};

use crate::EngineError;

/// Signed amount in **minor units** (e.g. cents).
///
/// Balances and record amounts are stored as plain `i64` minor units; this
/// type is the boundary used to parse operator input and render balances.
///
/// # Examples
///
/// ```rust
/// use engine::Amount;
///
/// assert_eq!("10".parse::<Amount>().unwrap().minor(), 1000);
/// assert_eq!("10,5".parse::<Amount>().unwrap().minor(), 1050);
/// assert_eq!(Amount::new(-1050).to_string(), "-10.50");
/// assert!("12.345".parse::<Amount>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        f.pad(&format!("{sign}{}.{:02}", abs / 100, abs % 100))
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = EngineError;

    /// Accepts `.` or `,` as decimal separator, an optional sign and at most
    /// two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidAmount(format!("invalid amount: {s:?}"));
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(stripped) => (true, stripped),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let rest = rest.replace(',', ".");
        let (units, fraction) = match rest.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (rest.as_str(), ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if units.is_empty() || !all_digits(units) || !all_digits(fraction) {
            return Err(invalid());
        }

        let units: i64 = units.parse().map_err(|_| overflow())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            2 => fraction.parse::<i64>().map_err(|_| invalid())?,
            _ => return Err(EngineError::InvalidAmount("too many decimals".to_string())),
        };

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(overflow)?;

        Ok(Amount(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_minor_units() {
        assert_eq!(Amount::new(0).to_string(), "0.00");
        assert_eq!(Amount::new(7).to_string(), "0.07");
        assert_eq!(Amount::new(40000).to_string(), "400.00");
        assert_eq!(Amount::new(-1050).to_string(), "-10.50");
        assert_eq!(format!("{:>8}", Amount::new(1050)), "   10.50");
    }

    #[test]
    fn parse_accepts_sign_and_separators() {
        assert_eq!("300".parse::<Amount>().unwrap().minor(), 30000);
        assert_eq!("2,3".parse::<Amount>().unwrap().minor(), 230);
        assert_eq!(" -0.01 ".parse::<Amount>().unwrap().minor(), -1);
        assert_eq!("+1.00".parse::<Amount>().unwrap().minor(), 100);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Amount>().is_err());
        assert!("-".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!("0.001".parse::<Amount>().is_err());
    }
}
