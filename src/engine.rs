//! The engine endpoint.
//!
//! [`Engine::new`] creates the shared [`Context`] clients attach to, and
//! [`Engine::run`] is the single-threaded dispatch loop: every change to a
//! book happens inside it, one message at a time, in arrival order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    codec::Codec,
    context::{Context, EngineConfig, Envelope, Role},
    errors::{ConfigError, EngineError},
    message::Message,
    orderbook::{Emitted, Recipient, SecurityBook},
    orders::UNASSIGNED_ORDER_ID,
};

/// Ids the engine hands out to orders submitted without one start here.
pub const ENGINE_ORDER_ID_BASE: u64 = 1 << 63;

/// How long shutdown waits on a full client outbox before giving up on
/// delivering the `Panic` to it.
const PANIC_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

enum Flow {
    Continue,
    Halt,
}

pub struct Engine {
    context: Context,
    inbox: mpsc::Receiver<Envelope>,
    books: Vec<SecurityBook>,
    codec: Codec,
    next_order_id: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (inbound, inbox) = mpsc::channel(config.cache_size);
        let context = Context::new(config, inbound);
        let books = (0..config.securities as u64)
            .map(|id| SecurityBook::new(id, config.priority))
            .collect();
        info!(
            cache_size = config.cache_size,
            securities = config.securities,
            priority = ?config.priority,
            trade_encoding = ?config.trade_encoding,
            "booting engine"
        );
        Ok(Self {
            codec: context.codec(),
            context,
            inbox,
            books,
            next_order_id: ENGINE_ORDER_ID_BASE,
        })
    }

    /// Handle for clients to attach with.
    pub fn context(&self) -> Context {
        self.context.clone()
    }

    /// Runs until a client sends `Panic`, `cancel` fires, or the engine
    /// fails. In every case the engine stops reading, broadcasts `Panic` to
    /// every attached client and closes the context before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        info!("engine running");
        let result = loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("received shutdown, stopping engine");
                    break Ok(());
                }
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break Ok(()),
                },
            };

            match self.dispatch(envelope).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => {
                    info!("panic received, stopping engine");
                    break Ok(());
                }
                Err(err) => {
                    error!(%err, "engine failure, broadcasting panic");
                    break Err(err);
                }
            }
        };
        self.halt().await;
        info!("engine bailing out");
        result
    }

    async fn dispatch(&mut self, envelope: Envelope) -> Result<Flow, EngineError> {
        let Envelope { from, frame } = envelope;
        let message = match self.codec.decode_frame(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(%from, %err, "dropping undecodable frame");
                return Ok(Flow::Continue);
            }
        };
        debug!(%from, %message, "dispatching");

        if message == Message::Panic {
            return Ok(Flow::Halt);
        }
        if message.is_engine_only() {
            warn!(%from, %message, "ignoring engine-only message from client");
            return Ok(Flow::Continue);
        }

        let Some(security_id) = message.security_id() else {
            return Ok(Flow::Continue);
        };
        let Some(book) = usize::try_from(security_id)
            .ok()
            .and_then(|idx| self.books.get_mut(idx))
        else {
            warn!(%from, security_id, "ignoring message for unknown security");
            return Ok(Flow::Continue);
        };

        let emitted = match message {
            Message::NewOrder(mut order) => {
                if order.is_filled() {
                    warn!(%from, order_id = order.id, "ignoring order with zero quantity");
                    return Ok(Flow::Continue);
                }
                if order.id == UNASSIGNED_ORDER_ID {
                    order.id = self.next_order_id;
                    self.next_order_id += 1;
                }
                book.submit(order, from)?
            }
            Message::CancelOrder { order_id, .. } => {
                match book.cancel(order_id) {
                    Some(resting) => info!(%from, order_id, owner = %resting.owner, "order cancelled"),
                    None => debug!(%from, order_id, "cancel for an order not in the book"),
                }
                vec![Emitted::to(from, message)]
            }
            Message::SetMarketPrice { price, .. } => {
                book.set_market_price(price);
                vec![Emitted::everyone(message)]
            }
            Message::Panic | Message::Trade { .. } | Message::OrderExecuted(_) => {
                return Ok(Flow::Continue);
            }
        };

        self.deliver(emitted).await?;
        Ok(Flow::Continue)
    }

    /// Sends each message to its recipients (and every monitor), in order.
    /// Waits while a recipient's outbox is full. Clients whose outbox is gone
    /// are detached.
    async fn deliver(&self, emitted: Vec<Emitted>) -> Result<(), EngineError> {
        for Emitted { to, message } in emitted {
            let frame = self.codec.encode_frame(&message)?;
            for (id, route) in self.context.routes() {
                let wanted = match (route.role, to) {
                    (Role::Monitor, _) | (Role::Participant, Recipient::Everyone) => true,
                    (Role::Participant, Recipient::Client(owner)) => owner == id,
                };
                if !wanted {
                    continue;
                }
                if route.outbox.send(frame.clone()).await.is_err() {
                    debug!(%id, "outbox closed, detaching client");
                    self.context.detach(id);
                }
            }
        }
        Ok(())
    }

    async fn halt(&mut self) {
        self.inbox.close();
        let routes = self.context.close();

        let frame = match self.codec.encode_frame(&Message::Panic) {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "could not encode panic");
                return;
            }
        };
        for (id, route) in routes {
            if let Err(err) = route
                .outbox
                .send_timeout(frame.clone(), PANIC_DELIVERY_TIMEOUT)
                .await
            {
                warn!(%id, %err, "panic not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = EngineConfig {
            securities: 0,
            ..Default::default()
        };
        assert!(matches!(Engine::new(config), Err(ConfigError::NoSecurities)));
    }

    #[test]
    fn test_engine_sizes_book_table_from_config() {
        let engine = Engine::new(EngineConfig {
            securities: 3,
            ..Default::default()
        })
        .unwrap();
        let ids: Vec<u64> = engine.books.iter().map(|b| b.security_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(!engine.context().is_closed());
    }

    #[test]
    fn test_dropping_engine_closes_context() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let ctx = engine.context();
        drop(engine);
        assert!(ctx.is_closed());
    }
}
