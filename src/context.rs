use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    codec::{Codec, Frame, TradeEncoding},
    errors::{AttachError, ConfigError},
    orders::Priority,
};

pub const DEFAULT_CACHE_SIZE: usize = 1024;
pub const DEFAULT_SECURITIES: usize = 400;
pub const DEFAULT_MAX_CLIENTS: usize = 256;

/// Engine construction parameters. Fixed once the engine exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::Args)]
#[serde(default)]
pub struct EngineConfig {
    /// Backlog capacity, in messages, of the engine's inbox and of every client outbox
    #[arg(short = 'c', long, default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,

    /// Number of securities; ids are 0..securities
    #[arg(short = 's', long, default_value_t = DEFAULT_SECURITIES)]
    pub securities: usize,

    /// Maximum number of attached clients
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    pub max_clients: usize,

    /// Rule the books rank resting orders with
    #[arg(long, value_enum, default_value_t = Priority::PriceTime)]
    pub priority: Priority,

    /// How trades are tagged on the wire
    #[arg(long, value_enum, default_value_t = TradeEncoding::Distinct)]
    pub trade_encoding: TradeEncoding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            securities: DEFAULT_SECURITIES,
            max_clients: DEFAULT_MAX_CLIENTS,
            priority: Priority::PriceTime,
            trade_encoding: TradeEncoding::Distinct,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::ZeroBacklog);
        }
        if self.securities == 0 {
            return Err(ConfigError::NoSecurities);
        }
        if self.max_clients == 0 {
            return Err(ConfigError::NoClients);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// What an attached client receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Messages addressed to it plus broadcasts.
    Participant,
    /// A copy of every message the engine emits.
    Monitor,
}

/// A frame on its way to the engine, tagged with its sender.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub from: ClientId,
    pub frame: Frame,
}

#[derive(Debug, Clone)]
pub(crate) struct Route {
    pub role: Role,
    pub outbox: mpsc::Sender<Frame>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    routes: HashMap<ClientId, Route>,
}

#[derive(Debug)]
struct Shared {
    config: EngineConfig,
    inbound: mpsc::Sender<Envelope>,
    registry: Mutex<Registry>,
    closed: CancellationToken,
}

/// Handle to the communication context an [`crate::engine::Engine`] creates.
///
/// Clients attach through it. Cloning is cheap; every clone refers to the
/// same engine.
#[derive(Debug, Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Context {
    pub(crate) fn new(config: EngineConfig, inbound: mpsc::Sender<Envelope>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inbound,
                registry: Mutex::new(Registry::default()),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn codec(&self) -> Codec {
        Codec::new(self.shared.config.trade_encoding)
    }

    /// True once the engine has shut down (or was dropped without running).
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.shared.inbound.is_closed()
    }

    /// Resolves when the context closes.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    pub fn attached(&self) -> usize {
        self.registry().routes.len()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn inbound(&self) -> &mpsc::Sender<Envelope> {
        &self.shared.inbound
    }

    pub(crate) fn register(
        &self,
        role: Role,
    ) -> Result<(ClientId, mpsc::Receiver<Frame>), AttachError> {
        if self.is_closed() {
            return Err(AttachError::ContextClosed);
        }
        let max = self.shared.config.max_clients;
        let mut registry = self.registry();
        if registry.routes.len() >= max {
            return Err(AttachError::CapacityExhausted { max });
        }

        registry.next_id += 1;
        let id = ClientId(registry.next_id);
        let (outbox, rx) = mpsc::channel(self.shared.config.cache_size);
        registry.routes.insert(id, Route { role, outbox });
        info!(%id, ?role, "client attached");
        Ok((id, rx))
    }

    pub(crate) fn detach(&self, id: ClientId) {
        if self.registry().routes.remove(&id).is_some() {
            debug!(%id, "client detached");
        }
    }

    /// Snapshot of every route; the lock is released before anything is sent.
    pub(crate) fn routes(&self) -> Vec<(ClientId, Route)> {
        self.registry()
            .routes
            .iter()
            .map(|(id, route)| (*id, route.clone()))
            .collect()
    }

    /// Marks the context closed and hands back every route. Once the caller
    /// drops them, pending `get` calls see the end of the stream after
    /// draining what was already sent.
    pub(crate) fn close(&self) -> Vec<(ClientId, Route)> {
        self.shared.closed.cancel();
        let routes = std::mem::take(&mut self.registry().routes);
        info!(clients = routes.len(), "context closed");
        routes.into_iter().collect()
    }
}
