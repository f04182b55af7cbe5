// =============================================================================
// PaperEngineManager — per-user isolated Paper Engine instances
// =============================================================================
//
// Grounded on `multi_user_paper_trading.py`'s `MultiUserPaperTradingManager`:
// a lazily-populated map from user id to engine, guarded by a plain lock
// rather than that file's `threading.Lock`. Single-user deployments run this
// with exactly one implicit `UserId` (see DESIGN.md).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::market_data::upstream::UpstreamClient;
use crate::paper_engine::{PaperEngine, RiskLimits};
use crate::store::{Store, StoreError};
use crate::types::{ExecutionMode, UserId};

/// Where each user's persistence database lives and what a fresh engine is
/// seeded with. Shared across every engine the manager creates.
#[derive(Clone)]
pub struct EngineConfig {
    pub db_dir: String,
    pub default_capital: f64,
    pub execution_mode: Arc<RwLock<ExecutionMode>>,
    pub risk_limits: RiskLimits,
    pub upstream: Option<Arc<dyn UpstreamClient>>,
    pub fallback_price: f64,
}

/// Lazily constructs and caches one [`PaperEngine`] per [`UserId`] (§3
/// supplement from `multi_user_paper_trading.py`).
pub struct PaperEngineManager {
    engines: Mutex<HashMap<UserId, Arc<PaperEngine>>>,
    config: EngineConfig,
}

impl PaperEngineManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn db_path(&self, user_id: &UserId) -> String {
        format!("{}/{}.db", self.config.db_dir, user_id.0)
    }

    /// Get the engine for `user_id`, constructing (and restoring from its
    /// on-disk store) one on first access.
    pub async fn get_engine(&self, user_id: &UserId) -> Result<Arc<PaperEngine>, StoreError> {
        if let Some(engine) = self.engines.lock().get(user_id).cloned() {
            return Ok(engine);
        }

        let db_path = self.db_path(user_id);
        let store = if self.config.db_dir == ":memory:" {
            Store::open_in_memory()?
        } else {
            Store::open(&db_path)?
        };

        let engine = Arc::new(
            PaperEngine::restore(
                store,
                self.config.default_capital,
                self.config.execution_mode.clone(),
                self.config.risk_limits,
                self.config.upstream.clone(),
                self.config.fallback_price,
            )
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        );

        info!(user = %user_id, "created paper trading engine");
        self.engines.lock().insert(user_id.clone(), engine.clone());
        Ok(engine)
    }

    /// Drop the cached engine for `user_id` (called on logout); its on-disk
    /// store is left untouched and will be reloaded on next access.
    pub fn remove_engine(&self, user_id: &UserId) {
        if self.engines.lock().remove(user_id).is_some() {
            info!(user = %user_id, "removed paper trading engine");
        }
    }

    pub fn active_users(&self) -> Vec<UserId> {
        self.engines.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            db_dir: ":memory:".into(),
            default_capital: 100_000.0,
            execution_mode: Arc::new(RwLock::new(ExecutionMode::Paper)),
            risk_limits: RiskLimits::default(),
            upstream: None,
            fallback_price: 100.0,
        }
    }

    #[tokio::test]
    async fn get_engine_creates_lazily_and_caches() {
        let manager = PaperEngineManager::new(config());
        let user = UserId("alice".into());

        let e1 = manager.get_engine(&user).await.unwrap();
        let e2 = manager.get_engine(&user).await.unwrap();
        assert!(Arc::ptr_eq(&e1, &e2));
        assert_eq!(manager.active_users().len(), 1);
    }

    #[tokio::test]
    async fn distinct_users_get_distinct_engines() {
        let manager = PaperEngineManager::new(config());
        let alice = manager.get_engine(&UserId("alice".into())).await.unwrap();
        let bob = manager.get_engine(&UserId("bob".into())).await.unwrap();
        assert!(!Arc::ptr_eq(&alice, &bob));
    }

    #[tokio::test]
    async fn remove_engine_drops_from_cache() {
        let manager = PaperEngineManager::new(config());
        let user = UserId("alice".into());
        manager.get_engine(&user).await.unwrap();
        manager.remove_engine(&user);
        assert!(manager.active_users().is_empty());
    }
}
