//! Order-related types for the regular order endpoint.
//!
//! Provides order side and the fixed intraday market-order payload
//! submitted to `/orders/regular`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::market::Exchange;

/// Order variety used for every submission.
pub const VARIETY_REGULAR: &str = "regular";

/// Intraday product code.
pub const PRODUCT_MIS: &str = "MIS";

/// Market order type.
pub const ORDER_TYPE_MARKET: &str = "MARKET";

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Wire value for `transaction_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" => Ok(Self::Buy),
            "SELL" | "S" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Parameters of a single market order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParams {
    pub tradingsymbol: String,
    pub exchange: Exchange,
    pub side: OrderSide,
    pub quantity: u32,
}

impl OrderParams {
    /// Build params for `symbol`, resolving the exchange from the symbol table.
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: u32) -> Self {
        let tradingsymbol = symbol.into().trim().to_ascii_uppercase();
        let exchange = Exchange::for_symbol(&tradingsymbol);
        Self {
            tradingsymbol,
            exchange,
            side,
            quantity,
        }
    }

    /// Form fields in submission order.
    pub fn to_form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("variety".to_string(), VARIETY_REGULAR.to_string()),
            ("exchange".to_string(), self.exchange.to_string()),
            ("tradingsymbol".to_string(), self.tradingsymbol.clone()),
            ("transaction_type".to_string(), self.side.to_string()),
            ("quantity".to_string(), self.quantity.to_string()),
            ("product".to_string(), PRODUCT_MIS.to_string()),
            ("order_type".to_string(), ORDER_TYPE_MARKET.to_string()),
        ]
    }
}

/// A successfully accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
}
