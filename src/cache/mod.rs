//! BBO cache module
//!
//! Holds the latest best-bid/offer snapshot per symbol, written by the stream
//! transport and read by the notification loop and chat commands.

mod store;

pub use store::BboCache;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-of-book snapshot for a single symbol
///
/// Snapshots are immutable; every update for a symbol replaces the previous
/// snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BboSnapshot {
    pub symbol: String,
    pub bid_price: Decimal,
    pub bid_quantity: Decimal,
    pub ask_price: Decimal,
    pub ask_quantity: Decimal,
    /// Exchange timestamp (epoch milliseconds)
    pub timestamp: u64,
}

impl BboSnapshot {
    /// Mid price (average of best bid and ask); None on overflow
    pub fn mid_price(&self) -> Option<Decimal> {
        self.bid_price
            .checked_add(self.ask_price)
            .and_then(|sum| sum.checked_div(Decimal::TWO))
    }

    /// Absolute spread between best ask and best bid
    pub fn spread(&self) -> Option<Decimal> {
        self.ask_price.checked_sub(self.bid_price)
    }

    /// Spread in basis points of the mid price
    pub fn spread_bps(&self) -> Option<Decimal> {
        let mid = self.mid_price().filter(|mid| *mid > Decimal::ZERO)?;
        self.spread()?
            .checked_div(mid)?
            .checked_mul(Decimal::from(10_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> BboSnapshot {
        BboSnapshot {
            symbol: "ETHUSDT".to_string(),
            bid_price: dec!(3000.5),
            bid_quantity: dec!(1.2),
            ask_price: dec!(3001.0),
            ask_quantity: dec!(0.8),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_mid_and_spread() {
        let bbo = snapshot();
        assert_eq!(bbo.mid_price(), Some(dec!(3000.75)));
        assert_eq!(bbo.spread(), Some(dec!(0.5)));
        assert!(bbo.spread_bps().unwrap() > dec!(1.66));
        assert!(bbo.spread_bps().unwrap() < dec!(1.67));
    }

    #[test]
    fn test_spread_bps_without_prices() {
        let bbo = BboSnapshot {
            bid_price: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            ..snapshot()
        };
        assert_eq!(bbo.spread_bps(), None);
    }

    #[test]
    fn test_extreme_prices_do_not_overflow() {
        let bbo = BboSnapshot {
            bid_price: Decimal::MAX,
            ask_price: Decimal::MAX,
            ..snapshot()
        };
        assert_eq!(bbo.mid_price(), None);
        assert_eq!(bbo.spread(), Some(Decimal::ZERO));
        assert_eq!(bbo.spread_bps(), None);

        let bbo = BboSnapshot {
            bid_price: Decimal::MIN,
            ask_price: Decimal::MAX,
            ..snapshot()
        };
        assert_eq!(bbo.spread(), None);
    }
}
