use std::fmt;

use crate::orders::{Order, OrderType};

/// Stable wire discriminants, one per message kind.
pub mod discriminant {
    pub const NEW_ORDER: u32 = 0;
    pub const CANCEL_ORDER: u32 = 1;
    pub const SET_MARKET_PRICE: u32 = 2;
    pub const TRADE: u32 = 3;
    pub const ORDER_EXECUTED: u32 = 4;
    pub const PANIC: u32 = 5;
}

/// Everything that can cross the boundary between the engine and its clients.
///
/// - `NewOrder`, `CancelOrder` and `SetMarketPrice` are sent by clients. The
///   engine echoes them back (and broadcasts market price changes of its own).
/// - `Trade` and `OrderExecuted` are only ever produced by the engine.
/// - `Panic` shuts the engine down; it is broadcast to every attached client.
///
/// A `Trade` carries the executed side of one fill: `order.quantity` is the
/// filled amount and `order.price` the execution price. `matched_order_id`
/// names the order on the other side. A trade does not imply the order left
/// the book; that is reported by `OrderExecuted` with a zero quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Message {
    Panic,
    NewOrder(Order),
    OrderExecuted(Order),
    Trade { order: Order, matched_order_id: u64 },
    CancelOrder { security_id: u64, order_id: u64 },
    SetMarketPrice { security_id: u64, price: i64 },
}

impl Message {
    pub fn security_id(&self) -> Option<u64> {
        match self {
            Message::Panic => None,
            Message::NewOrder(order)
            | Message::OrderExecuted(order)
            | Message::Trade { order, .. } => Some(order.security_id),
            Message::CancelOrder { security_id, .. }
            | Message::SetMarketPrice { security_id, .. } => Some(*security_id),
        }
    }

    /// Whether only the engine may originate this message.
    pub fn is_engine_only(&self) -> bool {
        matches!(self, Message::Trade { .. } | Message::OrderExecuted(_))
    }

    /// Whether this message mentions `order_id`, either as its own order or as
    /// the matched counterpart of a trade.
    pub fn references_order(&self, order_id: u64) -> bool {
        match self {
            Message::NewOrder(order) | Message::OrderExecuted(order) => order.id == order_id,
            Message::Trade {
                order,
                matched_order_id,
            } => order.id == order_id || *matched_order_id == order_id,
            Message::CancelOrder { order_id: id, .. } => *id == order_id,
            Message::Panic | Message::SetMarketPrice { .. } => false,
        }
    }
}

/// One line per message, in the engine's ascii log format.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Panic => write!(f, "PANIC: engine shutdown"),
            Message::NewOrder(o) => match o.order_type {
                OrderType::Market => write!(
                    f,
                    "{:>8}: NEW ORDER (MARKET): SIDE={} QUANTITY={} ID={}",
                    o.security_id, o.side, o.quantity, o.id
                ),
                OrderType::Limit => write!(
                    f,
                    "{:>8}: NEW ORDER (LIMIT): SIDE={} QUANTITY={} PRICE={} ID={}",
                    o.security_id, o.side, o.quantity, o.price, o.id
                ),
            },
            Message::Trade {
                order,
                matched_order_id,
            } => write!(
                f,
                "{:>8}: TRADE: SIDE={} QUANTITY={} PRICE={} ID={} MATCHED_ID={}",
                order.security_id, order.side, order.quantity, order.price, order.id, matched_order_id
            ),
            Message::OrderExecuted(o) => {
                write!(f, "{:>8}: ORDER EXECUTED: ID={}", o.security_id, o.id)
            }
            Message::CancelOrder {
                security_id,
                order_id,
            } => write!(f, "{:>8}: CANCEL ORDER: ID={}", security_id, order_id),
            Message::SetMarketPrice { security_id, price } => {
                write!(f, "{:>8}: SET MARKET PRICE: PRICE={}", security_id, price)
            }
        }
    }
}
