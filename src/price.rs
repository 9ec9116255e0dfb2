use anyhow::bail;
use serde_with::DeserializeFromStr;

use std::{
    fmt::{Debug, Display},
    ops::Mul,
    str::FromStr,
};

/// An amount of money in the report's currency.
///
/// The amount is stored internally as an integer number of minor units
/// (cents), but the [`Display`] implementation formats it to 2 decimal
/// places.
///
/// Cardmarket writes prices with a decimal comma (`4,99`) and an optional
/// thousands separator (`1.234,56`); parsing normalizes the comma to a
/// decimal point, so re-parsing a displayed value yields the same amount.
#[derive(Clone, Copy, Default, DeserializeFromStr, Eq, PartialEq, Ord, PartialOrd)]
pub struct Price(i64);

impl Price {
    /// Builds a price from an integer number of minor units (cents).
    #[must_use]
    pub const fn from_minor_units(units: i64) -> Self {
        Self(units)
    }
}

impl Debug for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Price {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().replace(',', ".");
        if normalized.starts_with('-') {
            bail!("negative price: {s:?}");
        }
        let (whole, frac) = match normalized.rsplit_once('.') {
            // Any separator left of the decimal point is a thousands
            // separator.
            Some((whole, frac)) => (whole.replace('.', ""), frac),
            None => (normalized.clone(), ""),
        };
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            bail!("invalid price: {s:?}");
        }
        let whole: i64 = whole.parse()?;
        let frac = &frac[..frac.len().min(2)];
        let minor: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>()? * 10,
            _ => frac.parse()?,
        };
        Ok(Self(whole * 100 + minor))
    }
}

impl Mul<i64> for Price {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}
