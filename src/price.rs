//! Fixed-point price scalar.
//!
//! Prices are stored as `i64` with 7 implied decimal places
//! (e.g., $100.50 -> 1_005_000_000). Integer representation keeps equality
//! exact, which the ladder relies on for level lookup. The two extreme raw
//! values are reserved as market-order sentinels: a market buy carries
//! [`Px::MARKET_BUY`] and compares above every finite price, a market sell
//! carries [`Px::MARKET_SELL`] and compares below.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Number of implied decimal places.
pub const PRICE_DECIMALS: u32 = 7;

/// Scaling factor between integer units and raw ticks.
pub const PRICE_SCALE: i64 = 10_000_000;

/// Fixed-point price.
///
/// `Ord` follows the numeric value, so the sentinels sort outside every
/// finite price. Sentinels never take part in arithmetic: trades always
/// execute at the finite passive price.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Px(i64);

impl Px {
    /// Zero price (initial average price of an unfilled order).
    pub const ZERO: Px = Px(0);

    /// Sentinel price of a market buy: crosses any resting ask.
    pub const MARKET_BUY: Px = Px(i64::MAX);

    /// Sentinel price of a market sell: crosses any resting bid.
    pub const MARKET_SELL: Px = Px(i64::MIN);

    /// Build a price from whole currency units.
    #[inline]
    pub const fn from_int(units: i64) -> Self {
        Px(units * PRICE_SCALE)
    }

    /// Build a price from a raw tick count.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Px(raw)
    }

    /// Raw tick count.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// True for either market sentinel.
    #[inline]
    pub const fn is_market(self) -> bool {
        self.0 == i64::MAX || self.0 == i64::MIN
    }

    /// Volume-weighted average after a fill:
    /// `(avg*cum + price*qty) / (cum + qty)`.
    ///
    /// Runs in i128 so the products cannot overflow for any realistic
    /// cumulative quantity. `cum + qty` must be positive; fills of zero
    /// quantity never happen by construction of the matching loop.
    #[inline]
    pub fn vwap(avg: Px, cum: i64, price: Px, qty: i64) -> Px {
        debug_assert!(qty > 0, "vwap over an empty fill");
        debug_assert!(!price.is_market(), "vwap over a sentinel price");
        let num = avg.0 as i128 * cum as i128 + price.0 as i128 * qty as i128;
        Px((num / (cum as i128 + qty as i128)) as i64)
    }

    /// Decimal rendering of a finite price. Sentinels have no Decimal form.
    pub fn to_decimal(self) -> Option<Decimal> {
        if self.is_market() {
            return None;
        }
        Some(Decimal::new(self.0, PRICE_DECIMALS))
    }
}

/// Errors converting an external decimal into a price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("price is not representable in {PRICE_DECIMALS} decimal places")]
    Unrepresentable,
    #[error("price string did not parse as a decimal")]
    Unparseable,
}

impl TryFrom<Decimal> for Px {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let scaled = value * Decimal::from(PRICE_SCALE);
        if scaled.fract() != Decimal::ZERO {
            return Err(PriceError::Unrepresentable);
        }
        scaled
            .to_i64()
            .map(Px)
            .ok_or(PriceError::Unrepresentable)
    }
}

impl FromStr for Px {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dec = Decimal::from_str(s).map_err(|_| PriceError::Unparseable)?;
        Px::try_from(dec)
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Px::MARKET_BUY => write!(f, "MKT-BUY"),
            Px::MARKET_SELL => write!(f, "MKT-SELL"),
            _ => write!(f, "{}", self.to_decimal().expect("finite price").normalize()),
        }
    }
}

impl fmt::Debug for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Px({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(s: &str) -> Px {
        s.parse().unwrap()
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(px("1.0") > px("0.75"));
        assert!(px("-2") < px("0"));
        assert_eq!(px("100"), Px::from_int(100));
    }

    #[test]
    fn test_sentinels_bracket_all_finite_prices() {
        let prices = [px("0"), px("0.0000001"), px("99999999"), px("-99999999")];
        for p in prices {
            assert!(Px::MARKET_BUY > p);
            assert!(Px::MARKET_SELL < p);
        }
        assert!(Px::MARKET_BUY.is_market());
        assert!(Px::MARKET_SELL.is_market());
        assert!(!px("1.5").is_market());
    }

    #[test]
    fn test_exact_equality() {
        assert_eq!(px("0.1"), px("0.1000000"));
        assert_ne!(px("0.1"), px("0.1000001"));
    }

    #[test]
    fn test_vwap_single_fill() {
        let avg = Px::vwap(Px::ZERO, 0, px("1.0"), 10);
        assert_eq!(avg, px("1.0"));
    }

    #[test]
    fn test_vwap_two_fills() {
        // 10 @ 1.00 then 30 @ 2.00 -> 1.75
        let avg = Px::vwap(Px::ZERO, 0, px("1.0"), 10);
        let avg = Px::vwap(avg, 10, px("2.0"), 30);
        assert_eq!(avg, px("1.75"));
    }

    #[test]
    fn test_vwap_large_quantities_no_overflow() {
        let avg = Px::vwap(px("99999999"), 1_000_000_000, px("99999999"), 1_000_000_000);
        assert_eq!(avg, px("99999999"));
    }

    #[test]
    fn test_parse_and_display_round_trip() {
        for s in ["1", "0.75", "100.5", "-3.25", "0.0000001"] {
            assert_eq!(px(s).to_string().parse::<Px>().unwrap(), px(s));
        }
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert_eq!("0.00000001".parse::<Px>(), Err(PriceError::Unrepresentable));
        assert_eq!("nope".parse::<Px>(), Err(PriceError::Unparseable));
    }

    #[test]
    fn test_sentinel_display() {
        assert_eq!(Px::MARKET_BUY.to_string(), "MKT-BUY");
        assert_eq!(Px::MARKET_SELL.to_string(), "MKT-SELL");
        assert_eq!(Px::MARKET_BUY.to_decimal(), None);
    }
}
