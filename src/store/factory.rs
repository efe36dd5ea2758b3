//! Store backend factory

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::postgres::PostgresPool;

use super::backend::StoreBackends;
use super::memory_backend::MemoryStores;
use super::postgres_backend::{PostgresHistoryStore, PostgresQueueStore, PostgresTokenDirectory};

/// Create the store backends based on configuration.
///
/// - `"postgres"`: PostgreSQL tables, if a pool is provided
/// - `"memory"`: process-local maps
///
/// A postgres request without a pool falls back to memory with a warning.
pub fn create_store_backends(
    settings: &StoreConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> StoreBackends {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(
                    backend = "postgres",
                    lookup_chunk_size = settings.lookup_chunk_size,
                    "Creating PostgreSQL store backends"
                );
                let pg = pool.pool().clone();
                StoreBackends {
                    queue: Arc::new(PostgresQueueStore::new(pg.clone())),
                    tokens: Arc::new(PostgresTokenDirectory::new(
                        pg.clone(),
                        settings.lookup_chunk_size,
                    )),
                    history: Arc::new(PostgresHistoryStore::new(pg)),
                    backend_type: "postgres",
                }
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                MemoryStores::new().backends()
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory store backends");
            MemoryStores::new().backends()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_selected() {
        let config = StoreConfig {
            backend: "memory".to_string(),
            lookup_chunk_size: 30,
        };
        let backends = create_store_backends(&config, None);
        assert_eq!(backends.backend_type, "memory");
    }

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let config = StoreConfig::default();
        let backends = create_store_backends(&config, None);
        assert_eq!(backends.backend_type, "memory");
    }
}
