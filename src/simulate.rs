//! Simulation harness: a noisy order flow driven through a [`Client`].
//!
//! - `SimConfig` holds the simulation parameters:
//!   - `run_secs`: optional total duration in seconds; `None` runs until cancelled.
//!   - `rate_hz`: Poisson arrival rate (λ) for orders (exponential inter-arrival).
//!   - `noise_sigma`: standard deviation of the Gaussian drift applied to the
//!     simulator's local mid-price on each order.
//!   - `mean_qty`: average order size; each order's size is an Exp(1) draw times `mean_qty`.
//!   - `spread`: distance from mid-price at which limit orders are placed.
//! - `run_simulation(client, cfg, cancel)` sends limit orders at `mid ± spread`
//!   while reading back the engine's messages for this client, and returns a
//!   [`SimReport`] once time runs out, `cancel` fires, or the engine panics.

use rand::Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    client::Client,
    errors::ClientError,
    message::Message,
    orders::{Order, Side},
};

#[derive(Debug, Clone, clap::Args)]
pub struct SimConfig {
    /// Stop after this many seconds (runs until Ctrl-C if unset)
    #[arg(long)]
    pub run_secs: Option<u64>,

    /// Mean order arrival rate, per second
    #[arg(long, default_value_t = 20.0)]
    pub rate_hz: f64,

    /// Standard deviation of the mid-price drift per order
    #[arg(long, default_value_t = 0.5)]
    pub noise_sigma: f64,

    /// Mean order size
    #[arg(long, default_value_t = 5.0)]
    pub mean_qty: f64,

    /// Starting mid-price, in ticks
    #[arg(long, default_value_t = 50.0)]
    pub mid_price: f64,

    /// Distance from the mid-price at which orders are placed, in ticks
    #[arg(long, default_value_t = 1.0)]
    pub spread: f64,

    /// Security to trade
    #[arg(long, default_value_t = 0)]
    pub security: u64,
}

/// What the simulated participant saw, from its own messages.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SimReport {
    pub orders_sent: u64,
    pub trades: u64,
    pub bought: u64,
    pub sold: u64,
    pub executed: u64,
    /// Net cash flow in ticks: positive after selling, negative after buying.
    pub cash: i64,
    pub engine_panicked: bool,
}

impl SimReport {
    pub fn inventory(&self) -> i64 {
        self.bought as i64 - self.sold as i64
    }

    fn record(&mut self, message: &Message) {
        match message {
            Message::Trade { order, .. } => {
                self.trades += 1;
                let notional = order.price.saturating_mul(order.quantity as i64);
                match order.side {
                    Side::Buy => {
                        self.bought += order.quantity;
                        self.cash -= notional;
                    }
                    Side::Sell => {
                        self.sold += order.quantity;
                        self.cash += notional;
                    }
                }
            }
            Message::OrderExecuted(_) => self.executed += 1,
            Message::Panic => self.engine_panicked = true,
            _ => {}
        }
    }
}

/// Drive a "noisy" order flow against the engine.
///
/// 1. Draws inter-arrival delays from an Exponential(rate = `cfg.rate_hz`).
/// 2. On each arrival:
///    - draws an order size as `Exp1 * cfg.mean_qty` (at least 1),
///    - applies Gaussian drift `N(0, cfg.noise_sigma)` to a local mid-price,
///    - sends a limit order at `mid ± spread` on a random side.
/// 3. Meanwhile, tallies trades and executions addressed to `client`.
///
/// Waiting for the next arrival restarts whenever a message comes in; the
/// exponential distribution is memoryless, so the arrival process is unchanged.
///
/// # Errors
/// Invalid distribution parameters, or a client error other than the engine
/// closing the context.
pub async fn run_simulation(
    client: &mut Client,
    cfg: SimConfig,
    cancel: CancellationToken,
) -> anyhow::Result<SimReport> {
    //1) Exponential inter-arrival times with rate = rate_hz
    let ia_dist = Exp::new(cfg.rate_hz)
        .map_err(|e| anyhow::anyhow!("rate_hz must be > 0 (got {}): {e}", cfg.rate_hz))?;
    //2) Gaussian drift on the mid-price
    let drift = Normal::new(0.0, cfg.noise_sigma)
        .map_err(|e| anyhow::anyhow!("noise_sigma must be >= 0 (got {}): {e}", cfg.noise_sigma))?;

    let mut report = SimReport::default();
    let mut mid_price = cfg.mid_price;
    let start = Instant::now();

    loop {
        //check overall time-limit
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }
        //draw the next wait
        let wait_secs = ia_dist.sample(&mut rand::rng());

        let order = tokio::select! {
            //user hits ctrl-c
            _ = cancel.cancelled() => {
                info!("received shutdown, exiting simulation");
                break;
            }
            received = client.get() => {
                match received {
                    Ok(message) => report.record(&message),
                    Err(ClientError::Closed) => break,
                    Err(err) => return Err(err.into()),
                }
                if report.engine_panicked {
                    break;
                }
                continue;
            }
            _ = sleep(Duration::from_secs_f64(wait_secs)) => {
                let raw: f64 = <Exp1 as Distribution<f64>>::sample(&Exp1, &mut rand::rng());
                let quantity = ((raw * cfg.mean_qty) as u64).max(1);
                mid_price += drift.sample(&mut rand::rng());
                let (price, side) = if rand::rng().random_bool(0.5) {
                    (mid_price - cfg.spread, Side::Buy)
                } else {
                    (mid_price + cfg.spread, Side::Sell)
                };
                let timestamp = start.elapsed().as_nanos() as u64;
                Order::limit(cfg.security, side, price.round() as i64, quantity, timestamp)
            }
        };

        match client.send(&Message::NewOrder(order)).await {
            Ok(()) => report.orders_sent += 1,
            Err(ClientError::Closed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        orders = report.orders_sent,
        trades = report.trades,
        inventory = report.inventory(),
        cash = report.cash,
        "simulation done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tallies_fills() {
        let mut report = SimReport::default();
        report.record(&Message::Trade {
            order: Order::limit(0, Side::Buy, 10, 3, 1),
            matched_order_id: 2,
        });
        report.record(&Message::Trade {
            order: Order::limit(0, Side::Sell, 12, 1, 1),
            matched_order_id: 3,
        });
        report.record(&Message::OrderExecuted(Order::limit(0, Side::Sell, 12, 0, 1)));
        report.record(&Message::Panic);

        assert_eq!(report.trades, 2);
        assert_eq!(report.inventory(), 2);
        assert_eq!(report.cash, -30 + 12);
        assert_eq!(report.executed, 1);
        assert!(report.engine_panicked);
    }
}
