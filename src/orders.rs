use std::fmt;

use crate::errors::OrderError;

/// Represents which side of the market the order is on.
///
/// # Intuition
/// - `Buy` (Bid): a higher price means more willingness to buy, i.e. more aggressive.
/// - `Sell` (Ask): a lower price means more willingness to sell, i.e. more aggressive.
///
/// The explicit discriminants are the values carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy = 0,  // Bid
    Sell = 1, // Ask
}

impl Side {
    pub fn wire(self) -> i64 {
        self as i64
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// Specifies whether an order is a Limit or Market order.
///
/// - `Limit`: Executes at a specific price or better
/// - `Market`: Executes immediately at the best available price; `price` is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OrderType {
    Market = 0,
    Limit = 1,
}

impl OrderType {
    pub fn wire(self) -> i64 {
        self as i64
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(OrderType::Market),
            1 => Some(OrderType::Limit),
            _ => None,
        }
    }
}

/// Order id 0 means "not assigned yet"; the engine assigns one on arrival.
pub const UNASSIGNED_ORDER_ID: u64 = 0;

/// An order submitted by a trader.
///
/// - `price` is in ticks and is ignored for market orders
/// - `timestamp` is only ever compared, never interpreted as wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: u64,
    pub security_id: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub price: i64,
    pub quantity: u64,
    pub timestamp: u64,
}

impl Order {
    pub fn limit(security_id: u64, side: Side, price: i64, quantity: u64, timestamp: u64) -> Self {
        Order {
            id: UNASSIGNED_ORDER_ID,
            security_id,
            side,
            order_type: OrderType::Limit,
            price,
            quantity,
            timestamp,
        }
    }

    pub fn market(security_id: u64, side: Side, quantity: u64, timestamp: u64) -> Self {
        Order {
            id: UNASSIGNED_ORDER_ID,
            security_id,
            side,
            order_type: OrderType::Market,
            price: 0,
            quantity,
            timestamp,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn is_filled(&self) -> bool {
        self.quantity == 0
    }

    /// Ranks `self` against `other` with the default ([`Priority::Observed`]) rule.
    pub fn is_higher_priority(&self, other: &Order) -> Result<bool, OrderError> {
        Priority::default().is_higher_priority(self, other)
    }
}

/// Ranking rule for two orders resting on the same side of the same security.
///
/// `Observed` is the rule existing clients rank with: price advantage OR a
/// later timestamp. It is not a strict weak order (`a` and `b` can both
/// outrank each other). `PriceTime` is the lexicographic rule: better price
/// first, then the earlier timestamp.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    #[default]
    Observed,
    PriceTime,
}

impl Priority {
    /// Returns whether `a` has execution priority over `b`.
    ///
    /// Fails with [`OrderError::IncomparableOrders`] when the orders belong to
    /// different securities or sides.
    pub fn is_higher_priority(self, a: &Order, b: &Order) -> Result<bool, OrderError> {
        if a.security_id != b.security_id || a.side != b.side {
            return Err(OrderError::IncomparableOrders {
                left_security: a.security_id,
                left_side: a.side,
                right_security: b.security_id,
                right_side: b.side,
            });
        }

        let better_price = match a.side {
            Side::Buy => a.price > b.price,
            Side::Sell => a.price < b.price,
        };

        Ok(match self {
            Priority::Observed => better_price || a.timestamp > b.timestamp,
            Priority::PriceTime => {
                better_price || (a.price == b.price && a.timestamp < b.timestamp)
            }
        })
    }
}
