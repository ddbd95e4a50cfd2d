use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that opens a position in `side`
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position in `side`
    pub fn closing(side: Side) -> Self {
        Self::opening(side.opposite())
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    StopLoss,
    TakeProfit,
}

/// Order request handed to the execution collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub client_order_id: String,
    pub symbol: String,
    pub order_side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Trigger price for stop/target orders, `None` for market orders
    pub trigger_price: Option<Decimal>,
    /// Closing orders must not flip the position
    pub reduce_only: bool,
}

impl OrderSpec {
    pub fn market(symbol: &str, order_side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            order_side,
            order_type: OrderType::Market,
            quantity,
            trigger_price: None,
            reduce_only: false,
        }
    }

    pub fn close_market(symbol: &str, side: Side, quantity: Decimal) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(symbol, OrderSide::closing(side), quantity)
        }
    }

    pub fn stop_loss(symbol: &str, side: Side, quantity: Decimal, trigger: Decimal) -> Self {
        Self {
            order_type: OrderType::StopLoss,
            trigger_price: Some(trigger),
            ..Self::close_market(symbol, side, quantity)
        }
    }

    pub fn take_profit(symbol: &str, side: Side, quantity: Decimal, trigger: Decimal) -> Self {
        Self {
            order_type: OrderType::TakeProfit,
            trigger_price: Some(trigger),
            ..Self::close_market(symbol, side, quantity)
        }
    }
}

/// Handle returned by the exchange for an accepted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub client_order_id: String,
    /// Average fill price when the exchange reports one synchronously
    pub fill_price: Option<Decimal>,
}
