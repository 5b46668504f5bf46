//! Shared state behind the control plane's axum handlers: the one
//! `PoolManager` in this process, guarded the way the teacher guards its
//! `AppState` fields (`parking_lot`-style sync lock, cheap to hold briefly).

use crate::application::ipc::OutboundEvent;
use crate::application::pool_manager::PoolManager;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

pub struct AppState {
    pub pool: Mutex<PoolManager>,
}

impl AppState {
    pub fn new(pool: PoolManager) -> Arc<Self> {
        Arc::new(Self { pool: Mutex::new(pool) })
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.pool.lock().await.subscribe()
    }
}
