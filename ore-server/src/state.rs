//! Application state management

use ore_core::adapter::FrameAdapter;
use ore_core::persist::{self, CombinationStore, MemoryStore, PersistError};
use ore_core::ranked::RankedInfoProvider;
use ore_core::{EventEngine, EventLog, Frame};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// All registered adapters
    pub adapters: Arc<RwLock<Vec<Box<dyn FrameAdapter>>>>,

    /// Key of the currently active adapter
    pub active_adapter: Arc<RwLock<Option<String>>>,

    /// Broadcast channel for engine events
    /// Multiple consumers can subscribe to receive them
    pub events_tx: broadcast::Sender<EventLog>,

    /// Only the manager loop calls `cycle`; handlers take short read-only looks
    pub engine: Arc<Mutex<EventEngine>>,

    /// Last frame fed to the engine
    pub latest_frame: Arc<RwLock<Option<Arc<Frame>>>>,

    pub store: Arc<dyn CombinationStore>,

    pub rankings: Option<Arc<dyn RankedInfoProvider>>,
}

impl AppState {
    /// In-memory state with a default engine, mostly for tests
    pub fn new() -> Self {
        Self::with_parts(EventEngine::default(), Arc::new(MemoryStore::new()), None)
    }

    pub fn with_parts(
        engine: EventEngine,
        store: Arc<dyn CombinationStore>,
        rankings: Option<Arc<dyn RankedInfoProvider>>,
    ) -> Self {
        // Events are sparse compared to frames; 256 covers a full grid crossing the line at once
        let (events_tx, _) = broadcast::channel(256);

        Self {
            adapters: Arc::new(RwLock::new(Vec::new())),
            active_adapter: Arc::new(RwLock::new(None)),
            events_tx,
            engine: Arc::new(Mutex::new(engine)),
            latest_frame: Arc::new(RwLock::new(None)),
            store,
            rankings,
        }
    }

    /// Register an adapter
    pub async fn register_adapter(&self, adapter: Box<dyn FrameAdapter>) {
        let mut adapters = self.adapters.write().await;
        adapters.push(adapter);
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EventLog> {
        self.events_tx.subscribe()
    }

    /// Write the engine's combination tables to the store
    pub async fn flush_tables(&self) -> Result<(), PersistError> {
        let (fuel, lap_points) = {
            let engine = self.engine.lock().await;
            (
                persist::encode_fuel_table(engine.stats())?,
                persist::encode_lap_points_table(engine.sampler())?,
            )
        };

        // Stores do blocking I/O; keep it off the runtime's worker threads
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            store.persist_combination(persist::FUEL_TABLE, &fuel)?;
            store.persist_combination(persist::LAP_POINTS_TABLE, &lap_points)
        })
        .await
        .map_err(|e| PersistError::Io {
            key: "flush".to_string(),
            source: std::io::Error::other(e),
        })?
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
