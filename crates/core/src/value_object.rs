//! Value objects: equality by value, not identity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Non-negative stock quantity with fixed precision.
///
/// Backed by `Decimal` so repeated small transfers never drift the way binary
/// floats would. At most [`Quantity::MAX_SCALE`] fractional digits are
/// accepted, matching a `NUMERIC(18, 4)` column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const MAX_SCALE: u32 = 4;

    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Accepts zero or any positive amount with an allowed scale.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        if value.normalize().scale() > Self::MAX_SCALE {
            return Err(DomainError::validation(format!(
                "quantity {value} has more than {} decimal places",
                Self::MAX_SCALE
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Accepts strictly positive amounts only (document lines, ledger deltas).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        let q = Self::new(value)?;
        if q.is_zero() {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(q)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(|v| Quantity(v.normalize()))
    }

    /// Returns `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(|v| Quantity(v.normalize()))
    }
}

impl ValueObject for Quantity {}

impl Default for Quantity {
    fn default() -> Self {
        Self::ZERO
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}
