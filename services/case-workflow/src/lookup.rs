use std::sync::Arc;
use std::time::Duration;

use tix_database::{CacheStore, SummaryStore};
use tix_models::GroupType;
use tix_utils::{TixError, TixResult};

/// Cache-or-database reader for the case-type group table.
///
/// The cache is an optimization only: read and write failures fall back to
/// the database and are logged, never returned.
#[derive(Clone)]
pub struct GroupTypeCache {
    summaries: Arc<dyn SummaryStore>,
    cache: Arc<dyn CacheStore>,
    key: String,
    ttl: Duration,
}

impl GroupTypeCache {
    pub fn new(summaries: Arc<dyn SummaryStore>, cache: Arc<dyn CacheStore>, key: String, ttl: Duration) -> Self {
        Self { summaries, cache, key, ttl }
    }

    pub async fn get_or_load_group_types(&self) -> TixResult<Vec<GroupType>> {
        match self.cache.get(&self.key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<GroupType>>(&raw) {
                Ok(groups) => return Ok(groups),
                Err(e) => tracing::warn!(key = %self.key, error = %e, "Discarding malformed group-type cache"),
            },
            Ok(None) => tracing::debug!(key = %self.key, "Group-type cache miss"),
            Err(e) => tracing::warn!(key = %self.key, error = %e, "Group-type cache read failed"),
        }

        let groups = self.summaries.load_group_types().await?;

        match serde_json::to_string(&groups) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&self.key, &raw, Some(self.ttl)).await {
                    tracing::warn!(key = %self.key, error = %e, "Failed to refresh group-type cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize group types"),
        }

        Ok(groups)
    }

    /// Group of `org_id` containing `case_type_id`. A case type outside every
    /// group is a validation failure.
    pub async fn group_for(&self, org_id: &str, case_type_id: &str) -> TixResult<GroupType> {
        self.get_or_load_group_types()
            .await?
            .into_iter()
            .find(|g| g.org_id == org_id && g.contains(case_type_id))
            .ok_or_else(|| {
                TixError::validation(
                    "caseTypeId",
                    format!("case type {} belongs to no group in org {}", case_type_id, org_id),
                )
            })
    }

    pub async fn groups_of(&self, org_id: &str) -> TixResult<Vec<GroupType>> {
        Ok(self
            .get_or_load_group_types()
            .await?
            .into_iter()
            .filter(|g| g.org_id == org_id)
            .collect())
    }
}
