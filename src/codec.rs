//! Wire encoding of [`Message`]s.
//!
//! A message becomes a [`WireRecord`]: a discriminant plus a fixed-arity,
//! positional list of `i64` fields. The field order per kind is the
//! compatibility surface and must not change:
//!
//! | kind                      | fields                                                              |
//! |---------------------------|---------------------------------------------------------------------|
//! | NewOrder / OrderExecuted  | security, side, quantity, order type, price, id, timestamp          |
//! | Trade                     | the seven above, then the matched order id                          |
//! | CancelOrder               | security, order id                                                  |
//! | SetMarketPrice            | security, price                                                     |
//! | Panic                     | (none)                                                              |
//!
//! Unsigned values are carried as their `i64` bit pattern, so every value
//! survives the round trip. Records travel between tasks as bincode frames.

use bincode::{config, error::EncodeError};

use crate::{
    errors::DecodeError,
    message::{Message, discriminant},
    orders::{Order, OrderType, Side},
};

const ORDER_ARITY: usize = 7;
const TRADE_ARITY: usize = 8;
const PAIR_ARITY: usize = 2;

/// Encoded record as it appears on the wire.
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct WireRecord {
    pub discriminant: u32,
    pub fields: Vec<i64>,
}

/// Bytes of one bincode-encoded [`WireRecord`].
pub type Frame = Vec<u8>;

/// How `Trade` messages are tagged on the wire.
///
/// - `Distinct`: trades use [`discriminant::TRADE`].
/// - `Shared`: trades reuse [`discriminant::ORDER_EXECUTED`] and are told
///   apart by arity (7 fields = executed, 8 = trade). Existing client
///   bindings write trades this way.
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
pub enum TradeEncoding {
    #[default]
    Distinct,
    Shared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    trade_encoding: TradeEncoding,
}

#[inline]
fn word(value: u64) -> i64 {
    value as i64
}

#[inline]
fn unsigned(value: i64) -> u64 {
    value as u64
}

fn order_fields(order: &Order) -> Vec<i64> {
    vec![
        word(order.security_id),
        order.side.wire(),
        word(order.quantity),
        order.order_type.wire(),
        order.price,
        word(order.id),
        word(order.timestamp),
    ]
}

fn malformed(discriminant: u32, reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedPayload {
        discriminant,
        reason: reason.into(),
    }
}

fn expect_arity(record: &WireRecord, arity: usize) -> Result<(), DecodeError> {
    if record.fields.len() != arity {
        return Err(malformed(
            record.discriminant,
            format!("expected {} fields, found {}", arity, record.fields.len()),
        ));
    }
    Ok(())
}

/// Reads the seven order fields at the front of `record`.
fn order_from(record: &WireRecord) -> Result<Order, DecodeError> {
    let f = &record.fields;
    let side = Side::from_wire(f[1])
        .ok_or_else(|| malformed(record.discriminant, format!("invalid side {}", f[1])))?;
    let order_type = OrderType::from_wire(f[3])
        .ok_or_else(|| malformed(record.discriminant, format!("invalid order type {}", f[3])))?;
    Ok(Order {
        security_id: unsigned(f[0]),
        side,
        quantity: unsigned(f[2]),
        order_type,
        price: f[4],
        id: unsigned(f[5]),
        timestamp: unsigned(f[6]),
    })
}

fn trade_from(record: &WireRecord) -> Result<Message, DecodeError> {
    expect_arity(record, TRADE_ARITY)?;
    Ok(Message::Trade {
        order: order_from(record)?,
        matched_order_id: unsigned(record.fields[7]),
    })
}

impl Codec {
    pub fn new(trade_encoding: TradeEncoding) -> Self {
        Self { trade_encoding }
    }

    pub fn trade_encoding(&self) -> TradeEncoding {
        self.trade_encoding
    }

    pub fn encode(&self, message: &Message) -> WireRecord {
        let (discriminant, fields) = match message {
            Message::Panic => (discriminant::PANIC, Vec::new()),
            Message::NewOrder(order) => (discriminant::NEW_ORDER, order_fields(order)),
            Message::OrderExecuted(order) => (discriminant::ORDER_EXECUTED, order_fields(order)),
            Message::Trade {
                order,
                matched_order_id,
            } => {
                let mut fields = order_fields(order);
                fields.push(word(*matched_order_id));
                let tag = match self.trade_encoding {
                    TradeEncoding::Distinct => discriminant::TRADE,
                    TradeEncoding::Shared => discriminant::ORDER_EXECUTED,
                };
                (tag, fields)
            }
            Message::CancelOrder {
                security_id,
                order_id,
            } => (
                discriminant::CANCEL_ORDER,
                vec![word(*security_id), word(*order_id)],
            ),
            Message::SetMarketPrice { security_id, price } => (
                discriminant::SET_MARKET_PRICE,
                vec![word(*security_id), *price],
            ),
        };
        WireRecord {
            discriminant,
            fields,
        }
    }

    /// Decodes `record`, refusing anything whose shape does not match its
    /// discriminant. Nothing is built from a partially valid record.
    pub fn decode(&self, record: &WireRecord) -> Result<Message, DecodeError> {
        match record.discriminant {
            discriminant::PANIC => {
                expect_arity(record, 0)?;
                Ok(Message::Panic)
            }
            discriminant::NEW_ORDER => {
                expect_arity(record, ORDER_ARITY)?;
                Ok(Message::NewOrder(order_from(record)?))
            }
            discriminant::ORDER_EXECUTED => match (self.trade_encoding, record.fields.len()) {
                (TradeEncoding::Shared, TRADE_ARITY) => trade_from(record),
                _ => {
                    expect_arity(record, ORDER_ARITY)?;
                    Ok(Message::OrderExecuted(order_from(record)?))
                }
            },
            discriminant::TRADE => trade_from(record),
            discriminant::CANCEL_ORDER => {
                expect_arity(record, PAIR_ARITY)?;
                Ok(Message::CancelOrder {
                    security_id: unsigned(record.fields[0]),
                    order_id: unsigned(record.fields[1]),
                })
            }
            discriminant::SET_MARKET_PRICE => {
                expect_arity(record, PAIR_ARITY)?;
                Ok(Message::SetMarketPrice {
                    security_id: unsigned(record.fields[0]),
                    price: record.fields[1],
                })
            }
            other => Err(DecodeError::UnknownDiscriminant(other)),
        }
    }

    pub fn encode_frame(&self, message: &Message) -> Result<Frame, EncodeError> {
        bincode::encode_to_vec(self.encode(message), config::standard())
    }

    pub fn decode_frame(&self, frame: &[u8]) -> Result<Message, DecodeError> {
        let (record, read): (WireRecord, usize) =
            bincode::decode_from_slice(frame, config::standard())?;
        if read != frame.len() {
            return Err(malformed(
                record.discriminant,
                format!("{} trailing bytes after record", frame.len() - read),
            ));
        }
        self.decode(&record)
    }
}

/// Encodes with the default ([`TradeEncoding::Distinct`]) codec.
pub fn encode(message: &Message) -> WireRecord {
    Codec::default().encode(message)
}

/// Decodes with the default ([`TradeEncoding::Distinct`]) codec.
pub fn decode(record: &WireRecord) -> Result<Message, DecodeError> {
    Codec::default().decode(record)
}
