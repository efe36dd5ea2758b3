use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::notification::NotificationDispatcher;
use crate::postgres::PostgresPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Present when the postgres store backend is in use
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, dispatcher: Arc<NotificationDispatcher>) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            dispatcher,
            postgres_pool: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_postgres(mut self, pool: Option<Arc<PostgresPool>>) -> Self {
        self.postgres_pool = pool;
        self
    }
}
