//! Text rendering of BBO snapshots for chat messages

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use teloxide::utils::html::escape;

use crate::cache::BboSnapshot;

/// Render one snapshot as an HTML `<pre>` block
pub fn format_snapshot(bbo: &BboSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<b>{}</b>", escape(&bbo.symbol));
    out.push_str("<pre>");
    let _ = writeln!(out, "{:<10}: {} x {}", "Bid", bbo.bid_price, bbo.bid_quantity);
    let _ = writeln!(out, "{:<10}: {} x {}", "Ask", bbo.ask_price, bbo.ask_quantity);
    match (bbo.spread(), bbo.spread_bps()) {
        (Some(spread), Some(bps)) => {
            let _ = writeln!(out, "{:<10}: {} ({} bps)", "Spread", spread, bps.round_dp(2));
        }
        (Some(spread), None) => {
            let _ = writeln!(out, "{:<10}: {}", "Spread", spread);
        }
        (None, _) => {
            let _ = writeln!(out, "{:<10}: n/a", "Spread");
        }
    }
    let _ = write!(out, "{:<10}: {}", "Updated", format_timestamp(bbo.timestamp));
    out.push_str("</pre>");
    out
}

/// Render every cached snapshot into one notification
pub fn format_update(snapshots: &BTreeMap<String, Arc<BboSnapshot>>) -> String {
    let blocks: Vec<String> = snapshots.values().map(|bbo| format_snapshot(bbo)).collect();
    format!("Best bid/offer update\n\n{}", blocks.join("\n\n"))
}

fn format_timestamp(epoch_ms: u64) -> String {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eth() -> BboSnapshot {
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
    fn test_format_snapshot() {
        let text = format_snapshot(&eth());
        assert!(text.starts_with("<b>ETHUSDT</b>\n<pre>"));
        assert!(text.contains("Bid       : 3000.5 x 1.2"));
        assert!(text.contains("Ask       : 3001.0 x 0.8"));
        assert!(text.contains("Spread    : 0.5 (1.67 bps)"));
        assert!(text.contains("Updated   : 2023-11-14 22:13:20 UTC"));
        assert!(text.ends_with("</pre>"));
    }

    #[test]
    fn test_format_update_orders_symbols() {
        let mut snapshots = BTreeMap::new();
        snapshots.insert("ETHUSDT".to_string(), Arc::new(eth()));
        snapshots.insert(
            "BTCUSDT".to_string(),
            Arc::new(BboSnapshot {
                symbol: "BTCUSDT".to_string(),
                ..eth()
            }),
        );

        let text = format_update(&snapshots);
        let btc = text.find("BTCUSDT").unwrap();
        let eth = text.find("ETHUSDT").unwrap();
        assert!(btc < eth);
    }

    #[test]
    fn test_format_snapshot_with_extreme_prices() {
        let cache = crate::cache::BboCache::new();
        crate::websocket::handle_frame(
            &cache,
            r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"79228162514264337593543950335","bz":"1","a":"79228162514264337593543950335","az":"1","t":1}}"#,
        )
        .unwrap();

        let text = format_snapshot(&cache.get("ETHUSDT").unwrap());
        assert!(text.contains("Spread    : 0\n"));
        assert!(text.contains("79228162514264337593543950335 x 1"));

        let crossed = BboSnapshot {
            bid_price: rust_decimal::Decimal::MIN,
            ask_price: rust_decimal::Decimal::MAX,
            ..eth()
        };
        assert!(format_snapshot(&crossed).contains("Spread    : n/a"));
    }

    #[test]
    fn test_symbol_is_escaped() {
        let bbo = BboSnapshot {
            symbol: "A<B>&C".to_string(),
            ..eth()
        };
        assert!(format_snapshot(&bbo).starts_with("<b>A&lt;B&gt;&amp;C</b>"));
    }
}
