use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::engine::Economy;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Every engine component over one store
    pub economy: Arc<Economy>,

    /// Required on `/admin` routes when set
    pub admin_token: Option<Arc<str>>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(economy: Arc<Economy>) -> Self {
        Self {
            economy,
            admin_token: None,
            start_time: Utc::now(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Arc::from);
        self
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
