// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod categories;
pub mod doctor;
pub mod entries;
pub mod exporter;
pub mod reports;
pub mod sync;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::RemoteGateway;
use crate::session::{SessionProvider, StoredSession};
use crate::store::{LocalStore, SqliteStore};
use crate::sync::{SyncCoordinator, SyncSettings};

/// Everything a command needs, resolved once per invocation.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub gateway: Arc<RemoteGateway>,
    pub sessions: Arc<StoredSession>,
}

impl AppContext {
    pub fn open(config: Config) -> Result<Self> {
        let path = crate::db::db_path(config.db_path.as_deref())?;
        let store = Arc::new(SqliteStore::open(&path)?);
        let gateway =
            RemoteGateway::from_config(&config).context("Could not set up the remote gateway")?;
        Ok(Self::new(config, store, Arc::new(gateway)))
    }

    pub fn new(config: Config, store: Arc<SqliteStore>, gateway: Arc<RemoteGateway>) -> Self {
        let sessions = Arc::new(StoredSession::new(Arc::clone(&store)));
        Self {
            config,
            store,
            gateway,
            sessions,
        }
    }

    pub fn local_store(&self) -> Arc<dyn LocalStore> {
        self.store.clone()
    }

    pub fn coordinator(&self) -> SyncCoordinator {
        let sessions: Arc<dyn SessionProvider> = self.sessions.clone();
        SyncCoordinator::new(
            self.local_store(),
            Arc::clone(&self.gateway),
            sessions,
            SyncSettings::from_config(&self.config),
        )
    }

    pub async fn user_id(&self) -> Option<String> {
        self.sessions.get_session().await.map(|s| s.id)
    }
}
