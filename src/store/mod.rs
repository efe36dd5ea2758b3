//! Persistence for the notification queue, token lookup and history collections

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{HistoryStore, NotificationQueueStore, StoreBackends, StoreError, TokenDirectory};
pub use factory::create_store_backends;
pub use memory_backend::{MemoryHistoryStore, MemoryQueueStore, MemoryStores, MemoryTokenDirectory};
pub use postgres_backend::{PostgresHistoryStore, PostgresQueueStore, PostgresTokenDirectory};
