/// Team and question assignment.
pub mod assignment;
/// Baron codes and damage.
pub mod combat;
/// The admin's game model.
pub mod game;
/// Listener slots for subscription tasks.
pub mod listeners;
/// Persisted page state.
pub mod session;
/// Game state machine.
pub mod state_machine;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    clock::Clock,
    config::AppConfig,
    dao::{client::StoreClient, room_store::RoomStore, storage::StorageResult},
    identity::IdentityProvider,
    state::session::{MemorySessionStore, SessionStore},
};

/// Shared handle passed to every service.
pub type SharedContext = Arc<AppContext>;

/// Everything one device needs to take part in the protocol: its store client
/// (and therefore identity), clock, configuration and session hook.
pub struct AppContext {
    client: StoreClient,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    session: Arc<dyn SessionStore>,
    seed: Option<u64>,
    seeds_drawn: AtomicU64,
}

impl AppContext {
    /// Construct a new [`AppContext`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        client: StoreClient,
        clock: Arc<dyn Clock>,
        config: AppConfig,
        session: Arc<dyn SessionStore>,
    ) -> SharedContext {
        Arc::new(Self {
            client,
            clock,
            config,
            session,
            seed: None,
            seeds_drawn: AtomicU64::new(0),
        })
    }

    /// Device context over `store` with an in-memory session hook.
    pub fn for_device(
        store: Arc<dyn RoomStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> SharedContext {
        Self::new(
            StoreClient::new(store, identity),
            clock,
            config,
            Arc::new(MemorySessionStore::new()),
        )
    }

    /// Same as [`for_device`](Self::for_device) with reproducible randomness.
    pub fn seeded(
        store: Arc<dyn RoomStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
        seed: u64,
    ) -> SharedContext {
        Arc::new(Self {
            client: StoreClient::new(store, identity),
            clock,
            config,
            session: Arc::new(MemorySessionStore::new()),
            seed: Some(seed),
            seeds_drawn: AtomicU64::new(0),
        })
    }

    /// Store client acting as this device.
    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Identity of this device.
    pub fn current_id(&self) -> StorageResult<String> {
        self.client.current_id()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Session hook.
    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    /// Current epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Fresh random generator. Seeded contexts hand out a deterministic sequence.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => {
                let drawn = self.seeds_drawn.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(drawn))
            }
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}
