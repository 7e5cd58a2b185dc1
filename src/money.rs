//! Fixed-point currency for the ledger.
//!
//! Every amount in the system is an integer count of minor units (cents),
//! stored in SQLite INTEGER columns and carried through the allocation math
//! as plain `i64`. Binary floating point never touches money: a debt settles
//! at exactly zero cents or it is not settled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::error::LedgerError;

/// An amount of money in minor units (cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn min(self, other: Cents) -> Cents {
        Cents(self.0.min(other.0))
    }

    /// Parse a user-supplied decimal string ("120", "120.5", "120.50").
    ///
    /// At most two fractional digits are accepted; anything finer cannot be
    /// represented in minor units and is rejected rather than rounded.
    pub fn parse(raw: &str) -> Result<Cents, LedgerError> {
        let trimmed = raw.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (units_str, frac_str) = match body.split_once('.') {
            Some((u, f)) => (u, f),
            None => (body, ""),
        };

        if units_str.is_empty() && frac_str.is_empty() {
            return Err(LedgerError::InvalidAmount(format!(
                "not a decimal amount: {raw:?}"
            )));
        }
        if frac_str.len() > 2 {
            return Err(LedgerError::InvalidAmount(format!(
                "more than two fractional digits: {raw:?}"
            )));
        }
        if !units_str.chars().all(|c| c.is_ascii_digit())
            || !frac_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(LedgerError::InvalidAmount(format!(
                "not a decimal amount: {raw:?}"
            )));
        }

        let units: i64 = if units_str.is_empty() {
            0
        } else {
            units_str
                .parse()
                .map_err(|_| LedgerError::InvalidAmount(format!("not a decimal amount: {raw:?}")))?
        };

        let frac: i64 = if frac_str.is_empty() {
            0
        } else {
            let padded = format!("{frac_str:0<2}");
            padded
                .parse()
                .map_err(|_| LedgerError::InvalidAmount(format!("not a decimal amount: {raw:?}")))?
        };

        let magnitude = units
            .checked_mul(100)
            .and_then(|u| u.checked_add(frac))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("amount out of range: {raw:?}")))?;

        Ok(Cents(if negative { -magnitude } else { magnitude }))
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl Sub for Cents {
    type Output = Cents;
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        Cents(iter.map(|c| c.0).sum())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(Cents::parse("120").unwrap(), Cents(12000));
        assert_eq!(Cents::parse("120.5").unwrap(), Cents(12050));
        assert_eq!(Cents::parse("120.50").unwrap(), Cents(12050));
        assert_eq!(Cents::parse("0.07").unwrap(), Cents(7));
        assert_eq!(Cents::parse(".5").unwrap(), Cents(50));
        assert_eq!(Cents::parse(" 3.25 ").unwrap(), Cents(325));
        assert_eq!(Cents::parse("-4.10").unwrap(), Cents(-410));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Cents::parse("").is_err());
        assert!(Cents::parse(".").is_err());
        assert!(Cents::parse("abc").is_err());
        assert!(Cents::parse("1.234").is_err(), "sub-cent precision rejected");
        assert!(Cents::parse("12,50").is_err());
        assert!(Cents::parse("1.-5").is_err(), "signed fraction rejected");
        assert!(Cents::parse("--4.10").is_err(), "double sign rejected");
    }

    #[test]
    fn test_display() {
        assert_eq!(Cents(12050).to_string(), "120.50");
        assert_eq!(Cents(7).to_string(), "0.07");
        assert_eq!(Cents(-410).to_string(), "-4.10");
        assert_eq!(Cents::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let total: Cents = [Cents(5000), Cents(3000), Cents(25)].into_iter().sum();
        assert_eq!(total, Cents(8025));
        assert_eq!(Cents(5000).min(Cents(3000)), Cents(3000));
        let mut c = Cents(100);
        c -= Cents(40);
        c += Cents(1);
        assert_eq!(c, Cents(61));
    }
}
