//! Exchange resolution and instrument symbols.
//!
//! Symbols are routed with a static table: known cash equities go to NSE,
//! index derivatives go to NFO, and anything unrecognized falls back to NSE.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cash equities recognized by the symbol table.
const NSE_EQUITIES: &[&str] = &[
    "RELIANCE",
    "TCS",
    "INFY",
    "HDFCBANK",
    "ICICIBANK",
    "SBIN",
    "ITC",
    "LT",
    "HINDUNILVR",
    "BHARTIARTL",
    "KOTAKBANK",
    "AXISBANK",
    "WIPRO",
    "MARUTI",
    "TATAMOTORS",
];

/// Index underlyings whose derivatives trade on NFO.
const NFO_INDEX_PREFIXES: &[&str] = &["MIDCPNIFTY", "BANKNIFTY", "FINNIFTY", "NIFTY"];

/// Contract suffixes for futures and options.
const NFO_SUFFIXES: &[&str] = &["FUT", "CE", "PE"];

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Exchange segment code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// Cash equity segment.
    #[serde(rename = "NSE")]
    Nse,
    /// Futures and options segment.
    #[serde(rename = "NFO")]
    Nfo,
}

impl Exchange {
    /// Resolve the exchange for a trading symbol.
    ///
    /// Unknown symbols default to [`Exchange::Nse`] without error.
    pub fn for_symbol(symbol: &str) -> Self {
        let symbol = symbol.trim().to_ascii_uppercase();

        if NSE_EQUITIES.contains(&symbol.as_str()) {
            return Self::Nse;
        }

        if is_index_derivative(&symbol) {
            return Self::Nfo;
        }

        Self::Nse
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Nfo => "NFO",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_index_derivative(symbol: &str) -> bool {
    NFO_INDEX_PREFIXES.iter().any(|prefix| {
        symbol
            .strip_prefix(prefix)
            .map(|rest| {
                // The remainder must carry a contract code, e.g. "24JANFUT".
                rest.chars().next().is_some_and(|c| c.is_ascii_digit())
                    && NFO_SUFFIXES.iter().any(|suffix| rest.ends_with(suffix))
            })
            .unwrap_or(false)
    })
}

/// Current-month NIFTY futures symbol, e.g. `NIFTY24JANFUT`.
pub fn current_nifty_future<D: Datelike>(date: &D) -> String {
    let year = date.year().rem_euclid(100);
    let month = MONTHS[date.month0() as usize];
    format!("NIFTY{year:02}{month}FUT")
}
