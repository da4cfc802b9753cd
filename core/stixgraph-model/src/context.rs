use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stixgraph_types::{EntityId, UserId};

/// "User X is currently editing entity Y". Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditContext {
    pub entity_id: EntityId,
    pub user_id: UserId,
    pub user_name: String,
    /// The field the user has focused, if any.
    #[serde(default)]
    pub focus_on: Option<String>,
    pub updated_at: DateTime<Utc>,
}
