//! Application context - wires everything together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use trustdesk_audit::AuditRecorder;
use trustdesk_core::{Clock, IdGenerator, RandomIds, SystemClock};
use trustdesk_dispute::DisputeWorkflow;
use trustdesk_identity::IdentityWorkflow;
use trustdesk_risk::FraudRiskEngine;
use trustdesk_store::SqliteStore;

use crate::config::TrustConfig;

/// Database file inside the data directory
pub const DB_FILE: &str = "trustdesk.db";

/// Application context - one store shared by every component
pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub recorder: AuditRecorder,
    pub risk: FraudRiskEngine,
    pub disputes: DisputeWorkflow,
    pub identity: IdentityWorkflow,
    pub clock: Arc<dyn Clock>,
    pub config: TrustConfig,
    db_path: Option<PathBuf>,
}

impl AppContext {
    /// Open (or create) the database under `data_path`
    pub fn new(data_path: impl AsRef<Path>, config: TrustConfig) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref();
        std::fs::create_dir_all(data_path)?;

        let db_path = data_path.join(DB_FILE);
        let store = SqliteStore::open(&db_path)?;
        tracing::debug!(path = %db_path.display(), "Opened database");

        let mut ctx = Self::assemble(
            Arc::new(store),
            Arc::new(SystemClock),
            Arc::new(RandomIds),
            config,
        );
        ctx.db_path = Some(db_path);
        Ok(ctx)
    }

    /// In-memory database with injected time and ids (for testing)
    pub fn in_memory(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: TrustConfig,
    ) -> Result<Self, anyhow::Error> {
        let store = SqliteStore::in_memory()?;
        Ok(Self::assemble(Arc::new(store), clock, ids, config))
    }

    fn assemble(
        store: Arc<SqliteStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: TrustConfig,
    ) -> Self {
        let recorder = AuditRecorder::new(store.clone(), clock.clone(), ids.clone());
        let risk = FraudRiskEngine::new(config.risk.clone());
        let disputes = DisputeWorkflow::new(
            store.clone(),
            recorder.clone(),
            clock.clone(),
            ids.clone(),
            config.dispute.clone(),
        );
        let identity = IdentityWorkflow::new(
            store.clone(),
            recorder.clone(),
            clock.clone(),
            ids,
            config.identity.clone(),
        );

        Self {
            store,
            recorder,
            risk,
            disputes,
            identity,
            clock,
            config,
            db_path: None,
        }
    }

    /// Database location, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
