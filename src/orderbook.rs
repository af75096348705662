use crate::{
    context::ClientId,
    errors::OrderError,
    message::Message,
    orders::{Order, OrderType, Priority, Side},
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Who an engine-emitted message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Client(ClientId),
    Everyone,
}

/// A message produced by the book together with its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub to: Recipient,
    pub message: Message,
}

impl Emitted {
    pub fn to(client: ClientId, message: Message) -> Self {
        Self {
            to: Recipient::Client(client),
            message,
        }
    }

    pub fn everyone(message: Message) -> Self {
        Self {
            to: Recipient::Everyone,
            message,
        }
    }
}

/// An order held in the book plus the client that submitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resting {
    pub order: Order,
    pub owner: ClientId,
}

/// The book of a single security.
///
/// Each side is a queue kept sorted by the book's [`Priority`] rule, best
/// order at the front:
/// - `bids` (buy orders)
/// - `asks` (sell orders)
///
/// `market_price` is the reference price: the last execution price, or
/// whatever a client last set. Market orders that cannot be filled rest as
/// limit orders at this price.
pub struct SecurityBook {
    pub security_id: u64,
    pub bids: VecDeque<Resting>,
    pub asks: VecDeque<Resting>,
    pub market_price: i64,
    priority: Priority,
}

/// Whether `incoming` can trade against the best resting order of the other side.
fn crosses(incoming: &Order, resting: &Order) -> bool {
    match (incoming.order_type, incoming.side) {
        (OrderType::Market, _) => true,
        (OrderType::Limit, Side::Buy) => incoming.price >= resting.price,
        (OrderType::Limit, Side::Sell) => incoming.price <= resting.price,
    }
}

impl SecurityBook {
    pub fn new(security_id: u64, priority: Priority) -> Self {
        Self {
            security_id,
            bids: VecDeque::new(),
            asks: VecDeque::new(),
            market_price: 0,
            priority,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Places `order` in its side's queue, behind every order it does not outrank.
    pub fn rest(&mut self, order: Order, owner: ClientId) -> Result<(), OrderError> {
        let priority = self.priority;
        let queue = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let mut at = queue.len();
        for (idx, resting) in queue.iter().enumerate() {
            if priority.is_higher_priority(&order, &resting.order)? {
                at = idx;
                break;
            }
        }
        queue.insert(at, Resting { order, owner });
        Ok(())
    }

    /// Matches an incoming order from `owner` against the opposite side and
    /// rests whatever is left.
    ///
    /// # Emits, in order
    /// - the `NewOrder` echo to `owner`
    /// - per fill: a `Trade` to each side's owner (quantity = filled amount,
    ///   price = resting price, cross-referencing ids), a broadcast
    ///   `SetMarketPrice` when the price moved, and `OrderExecuted` to the
    ///   resting owner when the resting order is used up
    /// - `OrderExecuted` to `owner` if the incoming order is filled
    /// - for a market order with quantity left: a second `NewOrder` echo of
    ///   the limit order it was turned into
    pub fn submit(&mut self, mut incoming: Order, owner: ClientId) -> Result<Vec<Emitted>, OrderError> {
        info!("matching incoming order: {:?}", incoming);
        let mut out = vec![Emitted::to(owner, Message::NewOrder(incoming))];

        let opposite = match incoming.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        while incoming.quantity > 0 {
            let Some(best) = opposite.front_mut() else {
                break;
            };
            if !crosses(&incoming, &best.order) {
                break;
            }

            let fill = incoming.quantity.min(best.order.quantity);
            let price = best.order.price;
            incoming.quantity -= fill;
            best.order.quantity -= fill;

            out.push(Emitted::to(
                owner,
                Message::Trade {
                    order: Order {
                        quantity: fill,
                        price,
                        ..incoming
                    },
                    matched_order_id: best.order.id,
                },
            ));
            out.push(Emitted::to(
                best.owner,
                Message::Trade {
                    order: Order {
                        quantity: fill,
                        ..best.order
                    },
                    matched_order_id: incoming.id,
                },
            ));

            if price != self.market_price {
                self.market_price = price;
                out.push(Emitted::everyone(Message::SetMarketPrice {
                    security_id: self.security_id,
                    price,
                }));
            }

            if best.order.is_filled() {
                if let Some(done) = opposite.pop_front() {
                    debug!("resting order {} fully executed", done.order.id);
                    out.push(Emitted::to(done.owner, Message::OrderExecuted(done.order)));
                }
            }
        }

        if incoming.is_filled() {
            out.push(Emitted::to(owner, Message::OrderExecuted(incoming)));
            return Ok(out);
        }

        if incoming.order_type == OrderType::Market {
            warn!(
                "market order {} not fully matched, resting {} at market price {}",
                incoming.id, incoming.quantity, self.market_price
            );
            incoming.order_type = OrderType::Limit;
            incoming.price = self.market_price;
            out.push(Emitted::to(owner, Message::NewOrder(incoming)));
        }
        self.rest(incoming, owner)?;
        Ok(out)
    }

    /// Removes the resting order `order_id` from either side, if present.
    pub fn cancel(&mut self, order_id: u64) -> Option<Resting> {
        for queue in [&mut self.bids, &mut self.asks] {
            if let Some(pos) = queue.iter().position(|r| r.order.id == order_id) {
                return queue.remove(pos);
            }
        }
        None
    }

    pub fn set_market_price(&mut self, price: i64) {
        self.market_price = price;
    }
}

//tests
#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: ClientId = ClientId(1);
    const BOB: ClientId = ClientId(2);

    fn book() -> SecurityBook {
        SecurityBook::new(1, Priority::PriceTime)
    }

    fn limit(id: u64, side: Side, price: i64, quantity: u64, timestamp: u64) -> Order {
        Order::limit(1, side, price, quantity, timestamp).with_id(id)
    }

    fn market(id: u64, side: Side, quantity: u64) -> Order {
        Order::market(1, side, quantity, 100).with_id(id)
    }

    fn trades(out: &[Emitted]) -> Vec<(ClientId, Order, u64)> {
        out.iter()
            .filter_map(|e| match (e.to, e.message) {
                (
                    Recipient::Client(to),
                    Message::Trade {
                        order,
                        matched_order_id,
                    },
                ) => Some((to, order, matched_order_id)),
                _ => None,
            })
            .collect()
    }

    fn executed(out: &[Emitted]) -> Vec<(ClientId, Order)> {
        out.iter()
            .filter_map(|e| match (e.to, e.message) {
                (Recipient::Client(to), Message::OrderExecuted(order)) => Some((to, order)),
                _ => None,
            })
            .collect()
    }

    /// Tests a market buy order that partially fills against multiple sell orders.
    #[test]
    fn test_partial_fill_market_buy() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 101, 5, 1), BOB).unwrap();
        ob.rest(limit(2, Side::Sell, 102, 3, 2), BOB).unwrap();

        let out = ob.submit(market(100, Side::Buy, 6), ALICE).unwrap();
        let fills = trades(&out);

        // two fills, each reported to both owners
        assert_eq!(fills.len(), 4);
        assert_eq!(fills[0], (ALICE, Order { quantity: 5, price: 101, ..market(100, Side::Buy, 1) }, 1));
        assert_eq!(fills[1].0, BOB);
        assert_eq!(fills[1].1.quantity, 5);
        assert_eq!(fills[1].2, 100);
        assert_eq!(fills[2].1.quantity, 1);
        assert_eq!(fills[2].1.price, 102);

        assert_eq!(ob.asks.len(), 1);
        assert_eq!(ob.asks[0].order.quantity, 2);
        assert_eq!(ob.market_price, 102);
        assert_eq!(executed(&out), vec![(BOB, Order { quantity: 0, ..limit(1, Side::Sell, 101, 5, 1) }), (ALICE, Order { quantity: 0, ..market(100, Side::Buy, 6) })]);
    }

    /// A market sell larger than the bid rests the remainder at the market price.
    #[test]
    fn test_partial_fill_market_sell_rests_remainder_as_limit() {
        let mut ob = book();
        ob.rest(limit(1, Side::Buy, 100, 4, 1), BOB).unwrap();

        let out = ob.submit(market(200, Side::Sell, 10), ALICE).unwrap();

        assert_eq!(trades(&out).len(), 2);
        assert!(ob.bids.is_empty());
        assert_eq!(ob.asks.len(), 1);
        let rested = ob.asks[0].order;
        assert_eq!(rested.order_type, OrderType::Limit);
        assert_eq!(rested.price, 100);
        assert_eq!(rested.quantity, 6);

        // the converted order is echoed to its owner as the last message
        assert_eq!(out.last().unwrap(), &Emitted::to(ALICE, Message::NewOrder(rested)));
    }

    /// Tests that a market order with no liquidity rests at the market price.
    #[test]
    fn test_market_order_without_liquidity() {
        let mut ob = book();
        ob.set_market_price(55);

        let out = ob.submit(market(300, Side::Buy, 10), ALICE).unwrap();

        assert!(trades(&out).is_empty());
        assert_eq!(out.len(), 2);
        assert_eq!(ob.bids[0].order.price, 55);
        assert!(ob.asks.is_empty());
    }

    /// Tests a market order that exactly matches an available quantity.
    #[test]
    fn test_exact_match_market_order() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 100, 5, 1), BOB).unwrap();

        let out = ob.submit(market(400, Side::Buy, 5), ALICE).unwrap();

        assert_eq!(trades(&out).len(), 2);
        assert!(ob.is_empty());
        let done = executed(&out);
        assert_eq!(done.len(), 2);
        assert!(done.iter().all(|(_, o)| o.quantity == 0));
    }

    /// Tests a limit buy order that partially fills and rests the remainder.
    #[test]
    fn test_limit_order_partial_match_and_remainder() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 100, 5, 1), BOB).unwrap();

        let out = ob.submit(limit(2, Side::Buy, 101, 10, 2), ALICE).unwrap();

        assert_eq!(trades(&out)[0].1.quantity, 5);
        assert_eq!(ob.bids.len(), 1);
        assert_eq!(ob.bids[0].order.quantity, 5);
        assert_eq!(ob.bids[0].order.price, 101);
        // only the resting sell was used up
        assert_eq!(executed(&out), vec![(BOB, Order { quantity: 0, ..limit(1, Side::Sell, 100, 5, 1) })]);
    }

    /// Tests a limit buy order that finds no match and gets added to the book.
    #[test]
    fn test_limit_order_no_match_goes_to_book() {
        let mut ob = book();

        let out = ob.submit(limit(10, Side::Buy, 90, 8, 1), ALICE).unwrap();

        assert_eq!(out, vec![Emitted::to(ALICE, Message::NewOrder(limit(10, Side::Buy, 90, 8, 1)))]);
        assert_eq!(ob.bids[0].order.quantity, 8);
    }

    /// Tests that time priority is respected for orders at the same price.
    #[test]
    fn test_queue_fairness_fill_order() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 100, 4, 1), BOB).unwrap();
        ob.rest(limit(2, Side::Sell, 100, 6, 2), BOB).unwrap();

        let out = ob.submit(market(3, Side::Buy, 9), ALICE).unwrap();
        let fills: Vec<_> = trades(&out).into_iter().filter(|(to, _, _)| *to == ALICE).collect();

        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].2, 1);
        assert_eq!(fills[0].1.quantity, 4);
        assert_eq!(fills[1].2, 2);
        assert_eq!(fills[1].1.quantity, 5);
        assert_eq!(ob.asks[0].order.quantity, 1);
    }

    #[test]
    fn test_better_price_jumps_the_queue() {
        let mut ob = book();
        ob.rest(limit(1, Side::Buy, 100, 1, 1), BOB).unwrap();
        ob.rest(limit(2, Side::Buy, 101, 1, 2), BOB).unwrap();
        ob.rest(limit(3, Side::Buy, 99, 1, 3), BOB).unwrap();

        let ids: Vec<u64> = ob.bids.iter().map(|r| r.order.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_observed_rule_puts_later_orders_first() {
        let mut ob = SecurityBook::new(1, Priority::Observed);
        ob.rest(limit(1, Side::Sell, 100, 1, 1), BOB).unwrap();
        ob.rest(limit(2, Side::Sell, 100, 1, 2), BOB).unwrap();

        let ids: Vec<u64> = ob.asks.iter().map(|r| r.order.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    /// Tests that a limit sell below the bid price matches at the bid (crossing).
    #[test]
    fn test_crossing_limit_sell_executes_at_resting_price() {
        let mut ob = book();
        ob.rest(limit(1, Side::Buy, 100, 5, 1), BOB).unwrap();

        let out = ob.submit(limit(2, Side::Sell, 90, 4, 2), ALICE).unwrap();

        let fills = trades(&out);
        assert_eq!(fills[0].1.price, 100);
        assert_eq!(fills[0].1.quantity, 4);
        assert_eq!(ob.bids[0].order.quantity, 1);
        assert!(ob.asks.is_empty());
    }

    #[test]
    fn test_market_price_broadcast_only_when_it_moves() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 30, 1, 1), BOB).unwrap();
        ob.rest(limit(2, Side::Sell, 30, 1, 2), BOB).unwrap();

        let out = ob.submit(market(3, Side::Buy, 2), ALICE).unwrap();
        let broadcasts: Vec<_> = out.iter().filter(|e| e.to == Recipient::Everyone).collect();

        assert_eq!(broadcasts.len(), 1);
        assert_eq!(
            broadcasts[0].message,
            Message::SetMarketPrice {
                security_id: 1,
                price: 30
            }
        );
    }

    #[test]
    fn test_cancel_existing_order() {
        let mut ob = book();
        ob.rest(limit(42, Side::Buy, 101, 10, 1), ALICE).unwrap();

        let cancelled = ob.cancel(42).unwrap();

        assert_eq!(cancelled.owner, ALICE);
        assert!(ob.is_empty());
    }

    #[test]
    fn test_cancel_nonexistent_order() {
        let mut ob = book();
        ob.rest(limit(1, Side::Sell, 99, 5, 1), ALICE).unwrap();

        assert!(ob.cancel(999).is_none());
        assert_eq!(ob.asks.len(), 1);
    }
}
