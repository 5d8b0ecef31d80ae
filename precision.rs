//! Fixed-precision decimal arithmetic.
//!
//! All quantities in the simulator are `rust_decimal::Decimal`. Addition,
//! subtraction and multiplication are exact (up to the 28 significant digits
//! the type carries); division and square root round to the context's
//! `decimal_places` with its [`Rounding`] mode. Values denominated in a token
//! are then cut to that token's decimals with [`DecimalContext::to_fixed`].
//!
//! The order in which rounding happens changes the numbers a run produces,
//! so callers round at the same points every time.

use rust_decimal::prelude::*;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Largest scale a `Decimal` can represent.
pub const MAX_DECIMAL_PLACES: u32 = 28;

/// Default number of decimal places kept after division and sqrt.
pub const DEFAULT_DECIMAL_PLACES: u32 = 18;

/// Rounding mode applied whenever a value is cut to a fixed number of places.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Rounding {
    /// Ties go toward positive infinity.
    #[default]
    HalfCeil,
    /// Ties go to the even neighbour.
    HalfEven,
    /// Ties go away from zero.
    HalfAwayFromZero,
    /// Truncate.
    TowardZero,
    AwayFromZero,
}

impl Rounding {
    /// `rust_decimal` strategy for rounding `value`. Half-ceil depends on sign.
    fn strategy(self, value: Decimal) -> RoundingStrategy {
        match self {
            Rounding::HalfCeil if value.is_sign_negative() => RoundingStrategy::MidpointTowardZero,
            Rounding::HalfCeil => RoundingStrategy::MidpointAwayFromZero,
            Rounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            Rounding::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            Rounding::TowardZero => RoundingStrategy::ToZero,
            Rounding::AwayFromZero => RoundingStrategy::AwayFromZero,
        }
    }

    /// Round `value` to `dp` decimal places.
    #[inline]
    pub fn apply(self, value: Decimal, dp: u32) -> Decimal {
        value.round_dp_with_strategy(dp, self.strategy(value))
    }
}

/// Precision settings shared by every computation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalContext {
    pub decimal_places: u32,
    pub rounding: Rounding,
}

impl Default for DecimalContext {
    fn default() -> Self {
        Self { decimal_places: DEFAULT_DECIMAL_PLACES, rounding: Rounding::HalfCeil }
    }
}

impl DecimalContext {
    pub fn new(decimal_places: u32, rounding: Rounding) -> Result<Self> {
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(SimError::invalid(
                "decimal_places",
                format!("{decimal_places} exceeds the maximum of {MAX_DECIMAL_PLACES}"),
            ));
        }
        Ok(Self { decimal_places, rounding })
    }

    /// Round to a token's decimals using the context rounding mode.
    #[inline]
    pub fn to_fixed(&self, value: Decimal, decimals: u32) -> Decimal {
        self.rounding.apply(value, decimals)
    }

    pub fn add(&self, a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_add(b).ok_or(SimError::Overflow("add"))
    }

    pub fn sub(&self, a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_sub(b).ok_or(SimError::Overflow("sub"))
    }

    pub fn mul(&self, a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_mul(b).ok_or(SimError::Overflow("mul"))
    }

    /// Division rounded to `decimal_places`.
    ///
    /// # Errors
    ///
    /// [`SimError::ArithmeticDegenerate`] when `divisor` is zero.
    pub fn div(
        &self,
        dividend: Decimal,
        divisor: Decimal,
        context: &'static str,
    ) -> Result<Decimal> {
        if divisor.is_zero() {
            return Err(SimError::degenerate(context, format!("division of {dividend} by zero")));
        }
        let q = dividend.checked_div(divisor).ok_or(SimError::Overflow(context))?;
        Ok(self.rounding.apply(q, self.decimal_places))
    }

    /// Square root rounded to `decimal_places`; `None` for negative input.
    pub fn sqrt(&self, value: Decimal) -> Option<Decimal> {
        value.sqrt().map(|r| self.rounding.apply(r, self.decimal_places))
    }
}
