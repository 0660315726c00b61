//! Quest catalog seam.
//!
//! The relational catalog of quests and users lives outside this service;
//! the core consumes it read-mostly for boilerplate source locations and
//! per-user limits. Any error from `validate_user_limits` means the user may
//! not start another lab.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Catalog record for one quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub slug: String,
    pub name: String,
    pub language: String,
    /// Storage key of the quest's boilerplate tree.
    pub boilerplate_code: String,
}

#[async_trait]
pub trait QuestCatalog: Send + Sync {
    async fn quest_by_slug(&self, slug: &str) -> anyhow::Result<Option<Quest>>;

    /// Err means the user is over their limit (or cannot be validated) and
    /// must not start another lab.
    async fn validate_user_limits(&self, user_id: &str) -> anyhow::Result<()>;
}

/// Fixed in-memory catalog with no user limits. Used for deployments that
/// run without the relational catalog, and in tests.
#[derive(Default)]
pub struct StaticCatalog {
    quests: Vec<Quest>,
}

impl StaticCatalog {
    pub fn new(quests: Vec<Quest>) -> Self {
        Self { quests }
    }
}

#[async_trait]
impl QuestCatalog for StaticCatalog {
    async fn quest_by_slug(&self, slug: &str) -> anyhow::Result<Option<Quest>> {
        Ok(self.quests.iter().find(|q| q.slug == slug).cloned())
    }

    async fn validate_user_limits(&self, _user_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
