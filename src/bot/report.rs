//! VWAP report shown by `/vwap`

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::Write;
use teloxide::utils::html::escape;

use crate::error::Result;
use crate::rest::{MarketDataSource, Ticker24h};

const BAR_LENGTH: usize = 20;

/// VWAP windows as (interval, limit)
const WINDOW_24H: (&str, u32) = ("3m", 480);
const WINDOW_7D: (&str, u32) = ("15m", 672);
const WINDOW_30D: (&str, u32) = ("1h", 720);

/// Inputs for the report, all in quote currency
#[derive(Debug, Clone)]
pub struct VwapReport {
    pub symbol: String,
    pub vwap_24h: Decimal,
    pub vwap_7d: Decimal,
    pub vwap_30d: Decimal,
    pub ticker: Ticker24h,
}

impl VwapReport {
    /// Fetch the three VWAP windows and the 24h ticker
    pub async fn fetch(source: &dyn MarketDataSource, symbol: &str) -> Result<Self> {
        let vwap_24h = source.get_vwap(symbol, WINDOW_24H.0, WINDOW_24H.1).await?;
        let vwap_7d = source.get_vwap(symbol, WINDOW_7D.0, WINDOW_7D.1).await?;
        let vwap_30d = source.get_vwap(symbol, WINDOW_30D.0, WINDOW_30D.1).await?;
        let ticker = source.get_24hr_ticker(symbol).await?;

        Ok(Self {
            symbol: symbol.to_string(),
            vwap_24h,
            vwap_7d,
            vwap_30d,
            ticker,
        })
    }

    /// Render as an HTML `<pre>` block
    pub fn render(&self) -> String {
        let t = &self.ticker;
        let vwap_pct = position_in_range(self.vwap_24h, t.low, t.high);
        let last_pct = position_in_range(t.last, t.low, t.high);

        let mut out = String::from("<pre>");
        let _ = writeln!(out, "The 24-hour prices for {}:", escape(&self.symbol));
        for (label, value) in [
            ("VWAP", self.vwap_24h),
            ("Last", t.last),
            ("High", t.high),
            ("Low", t.low),
            ("Opening", t.open),
            ("Bid", t.bid),
            ("Ask", t.ask),
        ] {
            let _ = writeln!(out, "{:<10}: {:>7}", label, group_thousands(value));
        }
        let _ = writeln!(out, "{:<10}: {:>6}%", "VWAP %", percent(vwap_pct));
        let _ = writeln!(out, "{:<10}: {:>6}%", "Last %", percent(last_pct));
        let _ = writeln!(out, "{:<10}: [{}]", "Position", position_bar(vwap_pct, last_pct));
        out.push_str("Other timeframes:\n");
        let _ = writeln!(out, "{:<10}: {:>7}", "VWAP 7d", group_thousands(self.vwap_7d));
        let _ = writeln!(out, "{:<10}: {:>7}", "VWAP 30d", group_thousands(self.vwap_30d));
        out.push_str("</pre>");
        out
    }
}

/// Where `value` sits between `low` and `high`, in percent; 0 for an empty
/// range or when the arithmetic overflows
pub fn position_in_range(value: Decimal, low: Decimal, high: Decimal) -> Decimal {
    if high <= low {
        return Decimal::ZERO;
    }
    value
        .checked_sub(low)
        .zip(high.checked_sub(low))
        .and_then(|(offset, range)| offset.checked_div(range))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// 20-cell bar marking VWAP (`V`) and last price (`L`); `VL`/`LV` when they share a cell
pub fn position_bar(vwap_pct: Decimal, last_pct: Decimal) -> String {
    let vwap_cell = bar_cell(vwap_pct);
    let last_cell = bar_cell(last_pct);

    let mut cells = vec!["-"; BAR_LENGTH];
    if vwap_cell == last_cell {
        cells[vwap_cell] = if vwap_pct > last_pct { "LV" } else { "VL" };
    } else {
        cells[vwap_cell] = "V";
        cells[last_cell] = "L";
    }
    cells.concat()
}

fn percent(pct: Decimal) -> String {
    pct.round_dp(2).normalize().to_string()
}

fn bar_cell(pct: Decimal) -> usize {
    (pct / Decimal::ONE_HUNDRED)
        .checked_mul(Decimal::from(BAR_LENGTH))
        .and_then(|scaled| scaled.floor().to_usize())
        .unwrap_or(0)
        .min(BAR_LENGTH - 1)
}

/// Round to an integer and insert thousands separators
pub fn group_thousands(value: Decimal) -> String {
    let rounded = value.round();
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
