//! Handover server - delivery-reception dossiers countersigned by the
//! receiving worker and the zone managers

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod evidence;
pub mod guard;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod status;
pub mod store;

#[cfg(test)]
mod test_support;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::notify::Notifier;

/// Application state shared across handlers
pub struct AppState {
    pub store: store::Store,
    pub directory: directory::Directory,
}

impl AppState {
    pub fn new(pool: SqlitePool, notifier: Notifier) -> Arc<Self> {
        Arc::new(Self {
            store: store::Store::new(pool.clone(), notifier),
            directory: directory::Directory::new(pool),
        })
    }
}
