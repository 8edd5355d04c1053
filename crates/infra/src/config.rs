//! Engine configuration loaded from the environment.
//!
//! | variable | values | default |
//! |---|---|---|
//! | `STOCKFLOW_SCOPE_ENFORCEMENT` | `strict` / `permissive` | `strict` |
//! | `STOCKFLOW_LOCK_TIMEOUT_MS` | milliseconds, > 0 | `5000` |
//! | `DATABASE_URL` | Postgres connection string | unset (in-memory store) |

use std::time::Duration;

use anyhow::{Context, bail};

use stockflow_auth::{ScopeEnforcement, TenantScopeGuard};

use crate::store::{InMemoryStore, PostgresStore};

pub const SCOPE_ENFORCEMENT_VAR: &str = "STOCKFLOW_SCOPE_ENFORCEMENT";
pub const LOCK_TIMEOUT_VAR: &str = "STOCKFLOW_LOCK_TIMEOUT_MS";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub scope_enforcement: ScopeEnforcement,
    /// Upper bound on any single row-lock wait.
    pub lock_timeout: Duration,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scope_enforcement: ScopeEnforcement::Strict,
            lock_timeout: InMemoryStore::DEFAULT_LOCK_TIMEOUT,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests, config files).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(SCOPE_ENFORCEMENT_VAR) {
            config.scope_enforcement = raw
                .parse::<ScopeEnforcement>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {SCOPE_ENFORCEMENT_VAR}"))?;
        }

        if let Some(raw) = lookup(LOCK_TIMEOUT_VAR) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {LOCK_TIMEOUT_VAR} '{raw}'"))?;
            if ms == 0 {
                bail!("{LOCK_TIMEOUT_VAR} must be greater than zero");
            }
            config.lock_timeout = Duration::from_millis(ms);
        }

        config.database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());

        if config.scope_enforcement == ScopeEnforcement::Permissive {
            tracing::warn!("tenant scope enforcement is permissive; missing context will not be rejected");
        }
        Ok(config)
    }

    pub fn guard(&self) -> TenantScopeGuard {
        TenantScopeGuard::new(self.scope_enforcement)
    }

    pub fn in_memory_store(&self) -> InMemoryStore {
        InMemoryStore::with_lock_timeout(self.lock_timeout)
    }

    /// Postgres store for `DATABASE_URL`, or `None` when it is unset.
    pub fn postgres_store(
        &self,
        runtime: tokio::runtime::Handle,
    ) -> anyhow::Result<Option<PostgresStore>> {
        let Some(url) = self.database_url.as_deref() else {
            return Ok(None);
        };
        let store = PostgresStore::connect_lazy(url, runtime)
            .with_context(|| format!("invalid {DATABASE_URL_VAR}"))?
            .with_lock_timeout(self.lock_timeout);
        Ok(Some(store))
    }
}
