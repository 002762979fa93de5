use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant in the rewards economy.
///
/// XP and balances are never stored here; they are derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub department: Option<String>,
    /// Index into the configured tier ladder
    pub current_tier: usize,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            department: None,
            current_tier: 0,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}
