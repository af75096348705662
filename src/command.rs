//! Text commands for talking to the engine from a terminal.
//!
//! ```text
//! <security> buy  quantity=<n> [price=<n>] [id=<n>]   # no price (or 0) is a market order
//! <security> sell quantity=<n> [price=<n>] [id=<n>]
//! <security> set price=<n>
//! <security> cancel id=<n>
//! <security> panic                                    # security is ignored
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::{
    message::Message,
    orders::{Order, Side, UNASSIGNED_ORDER_ID},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("expected `<security> <message type> [key=value ...]`")]
    Incomplete,

    #[error("invalid security id `{0}`")]
    BadSecurity(String),

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid argument `{0}`")]
    BadArgument(String),

    #[error("missing `{0}`")]
    Missing(&'static str),

    #[error("refusing to cancel order id 0")]
    CancelUnassigned,
}

#[derive(Default)]
struct Args {
    quantity: Option<u64>,
    price: Option<i64>,
    id: Option<u64>,
}

fn parse_args<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Args, CommandError> {
    let mut args = Args::default();
    for token in tokens {
        let bad = || CommandError::BadArgument(token.to_string());
        let (key, value) = token.split_once('=').ok_or_else(bad)?;
        match key {
            "quantity" => args.quantity = Some(value.parse().map_err(|_| bad())?),
            "price" => args.price = Some(value.parse().map_err(|_| bad())?),
            "id" => args.id = Some(value.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        }
    }
    Ok(args)
}

/// Parses one command line. `timestamp` stamps new orders.
pub fn parse_command(line: &str, timestamp: u64) -> Result<Message, CommandError> {
    let mut tokens = line.split_whitespace();
    let security = tokens.next().ok_or(CommandError::Incomplete)?;
    let kind = tokens.next().ok_or(CommandError::Incomplete)?;
    let security_id: u64 = security
        .parse()
        .map_err(|_| CommandError::BadSecurity(security.to_string()))?;
    let args = parse_args(tokens)?;

    let side = match kind {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        "set" => {
            let price = args.price.ok_or(CommandError::Missing("price"))?;
            return Ok(Message::SetMarketPrice { security_id, price });
        }
        "cancel" => {
            return match args.id.unwrap_or(UNASSIGNED_ORDER_ID) {
                UNASSIGNED_ORDER_ID => Err(CommandError::CancelUnassigned),
                order_id => Ok(Message::CancelOrder {
                    security_id,
                    order_id,
                }),
            };
        }
        "panic" => return Ok(Message::Panic),
        other => return Err(CommandError::UnknownType(other.to_string())),
    };

    let quantity = args.quantity.ok_or(CommandError::Missing("quantity"))?;
    let order = match args.price {
        None | Some(0) => Order::market(security_id, side, quantity, timestamp),
        Some(price) => Order::limit(security_id, side, price, quantity, timestamp),
    };
    Ok(Message::NewOrder(order.with_id(args.id.unwrap_or(UNASSIGNED_ORDER_ID))))
}

/// Nanoseconds since the epoch, for stamping orders.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderType;

    #[test]
    fn test_market_buy_when_price_is_absent() {
        let msg = parse_command("3 buy quantity=30", 9).unwrap();
        assert_eq!(msg, Message::NewOrder(Order::market(3, Side::Buy, 30, 9)));
    }

    #[test]
    fn test_limit_sell_with_id() {
        let msg = parse_command("5 sell quantity=20 price=10 id=77", 1).unwrap();
        let Message::NewOrder(order) = msg else {
            panic!("expected a new order, got {msg:?}");
        };
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.price, 10);
        assert_eq!(order.quantity, 20);
        assert_eq!(order.id, 77);
    }

    #[test]
    fn test_zero_price_is_a_market_order() {
        let msg = parse_command("1 sell quantity=2 price=0", 1).unwrap();
        assert!(matches!(
            msg,
            Message::NewOrder(Order {
                order_type: OrderType::Market,
                ..
            })
        ));
    }

    #[test]
    fn test_admin_commands() {
        assert_eq!(
            parse_command("3 set price=30", 0).unwrap(),
            Message::SetMarketPrice {
                security_id: 3,
                price: 30
            }
        );
        assert_eq!(
            parse_command("2 cancel id=8", 0).unwrap(),
            Message::CancelOrder {
                security_id: 2,
                order_id: 8
            }
        );
        assert_eq!(parse_command("0 panic", 0).unwrap(), Message::Panic);
    }

    #[test]
    fn test_rejected_commands() {
        assert_eq!(parse_command("", 0), Err(CommandError::Incomplete));
        assert_eq!(parse_command("3", 0), Err(CommandError::Incomplete));
        assert_eq!(
            parse_command("x buy quantity=1", 0),
            Err(CommandError::BadSecurity("x".into()))
        );
        assert_eq!(
            parse_command("1 hold", 0),
            Err(CommandError::UnknownType("hold".into()))
        );
        assert_eq!(
            parse_command("1 buy", 0),
            Err(CommandError::Missing("quantity"))
        );
        assert_eq!(
            parse_command("1 buy quantity=ten", 0),
            Err(CommandError::BadArgument("quantity=ten".into()))
        );
        assert_eq!(parse_command("1 cancel", 0), Err(CommandError::CancelUnassigned));
        assert_eq!(
            parse_command("1 cancel id=0", 0),
            Err(CommandError::CancelUnassigned)
        );
    }
}
