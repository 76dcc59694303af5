//! Position rows and P&L aggregation.

use kdesk_broker::NetPosition;

/// One rendered open position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
    /// Falls back to the average price when the broker reports none.
    pub last_price: f64,
    pub pnl: f64,
    /// Percent move of last price over average price.
    pub day_change_pct: f64,
}

impl PositionRow {
    pub fn from_position(position: &NetPosition) -> Self {
        let last_price = if position.last_price > 0.0 {
            position.last_price
        } else {
            position.average_price
        };
        let day_change_pct = if position.last_price > 0.0 && position.average_price > 0.0 {
            (position.last_price - position.average_price) / position.average_price * 100.0
        } else {
            0.0
        };
        Self {
            symbol: position.tradingsymbol.clone(),
            quantity: position.quantity,
            average_price: position.average_price,
            last_price,
            pnl: position.pnl,
            day_change_pct,
        }
    }
}

/// Rows for open (nonzero quantity) positions.
pub fn position_rows(positions: &[NetPosition]) -> Vec<PositionRow> {
    positions
        .iter()
        .filter(|p| p.quantity != 0)
        .map(PositionRow::from_position)
        .collect()
}

/// Sum of `pnl` over open positions.
pub fn total_pnl(positions: &[NetPosition]) -> f64 {
    positions
        .iter()
        .filter(|p| p.quantity != 0)
        .map(|p| p.pnl)
        .sum()
}
