//! Idempotent create-or-update keyed by external id.

use serde::Serialize;
use tracing::instrument;

use crate::notion::{NotionError, PropertyMap, RecordStore};

/// What an upsert did (or would have done, in a dry run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Writes records into one database, matching on the external-id property.
///
/// The external id is authoritative: two source records with the same id
/// resolve to the same page and the later write wins.
pub struct Upserter<'a> {
    store: &'a dyn RecordStore,
    database_id: &'a str,
    dry_run: bool,
}

impl<'a> Upserter<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn RecordStore, database_id: &'a str, dry_run: bool) -> Self {
        Self {
            store,
            database_id,
            dry_run,
        }
    }

    /// Look up `external_id` and update the match, or create a new record.
    ///
    /// In a dry run the lookup still happens but nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the lookup or the write.
    #[instrument(skip(self, properties), fields(database_id = self.database_id))]
    pub async fn upsert(
        &self,
        external_id: &str,
        properties: &PropertyMap,
    ) -> Result<UpsertOutcome, NotionError> {
        let existing = self
            .store
            .find_by_external_id(self.database_id, external_id)
            .await?;

        match existing {
            Some(page_id) => {
                if !self.dry_run {
                    self.store.update_record(&page_id, properties).await?;
                }
                tracing::debug!(page_id = %page_id, "Updated record");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                if self.dry_run {
                    tracing::debug!("Would create record");
                } else {
                    let page_id = self.store.create_record(self.database_id, properties).await?;
                    tracing::debug!(page_id = %page_id, "Created record");
                }
                Ok(UpsertOutcome::Created)
            }
        }
    }
}
