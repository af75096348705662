use thiserror::Error;

use crate::orders::Side;

/// Misuse of the priority comparator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error(
        "orders are not comparable: security {left_security}/{left_side:?} vs security {right_security}/{right_side:?}"
    )]
    IncomparableOrders {
        left_security: u64,
        left_side: Side,
        right_security: u64,
        right_side: Side,
    },
}

/// Failures turning a wire record (or frame) back into a [`crate::message::Message`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown message discriminant {0}")]
    UnknownDiscriminant(u32),

    #[error("malformed payload for discriminant {discriminant}: {reason}")]
    MalformedPayload { discriminant: u32, reason: String },

    #[error("undecodable frame: {0}")]
    Frame(#[from] bincode::error::DecodeError),
}

/// Why a client could not join the engine's context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("engine context is closed")]
    ContextClosed,

    #[error("engine context is full ({max} clients attached)")]
    CapacityExhausted { max: usize },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("engine context is closed")]
    Closed,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache size (backlog capacity) must be greater than zero")]
    ZeroBacklog,

    #[error("securities count must be greater than zero")]
    NoSecurities,

    #[error("max clients must be greater than zero")]
    NoClients,
}

/// Engine-internal failures. Clients only ever see these as a `Panic`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("book error: {0}")]
    Order(#[from] OrderError),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}
