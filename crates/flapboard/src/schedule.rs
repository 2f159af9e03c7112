//! Create, edit and delete scheduled trips.

use std::sync::Arc;

use tracing::info;

use crate::auth::AuthGate;
use crate::error::{Error, Result};
use crate::filter::sort_entries;
use crate::model::{EntryId, ScheduleDraft, ScheduleEntry, TripField};
use crate::store::DocumentStore;

/// Schedule writes behind the auth gate.
#[derive(Debug, Clone)]
pub struct ScheduleService {
    store: Arc<dyn DocumentStore>,
    gate: AuthGate,
}

impl ScheduleService {
    /// Build a service writing to `store` behind `gate`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gate: AuthGate) -> Self {
        Self { store, gate }
    }

    /// Every trip ordered by day then time.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn list(&self) -> Result<Vec<ScheduleEntry>> {
        let mut entries = self.store.list_schedule().await?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// One trip by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, or store errors.
    pub async fn get(&self, id: EntryId) -> Result<ScheduleEntry> {
        self.store
            .get_schedule(id)
            .await?
            .ok_or_else(|| Error::not_found("courses", id))
    }

    /// Validate `draft`, then update the trip it names or create a new one.
    ///
    /// New trips are owned by the signed-in user, if any. On update, day,
    /// place, carrier and notes left as `None` keep their stored values.
    ///
    /// # Errors
    ///
    /// Validation errors before any store call; auth or store errors after.
    pub async fn upsert(&self, draft: ScheduleDraft) -> Result<EntryId> {
        self.save(draft, &[]).await
    }

    /// Like [`upsert`](Self::upsert), also blanking the `clear` fields when
    /// the draft names an existing trip. `clear` is ignored on create.
    ///
    /// # Errors
    ///
    /// Validation errors before any store call; auth or store errors after.
    pub async fn save(&self, draft: ScheduleDraft, clear: &[TripField]) -> Result<EntryId> {
        let draft = draft.validated()?;
        let user = self.gate.check().await?;

        if let Some(id) = draft.id {
            self.store.update_schedule(id, &draft, clear).await?;
            info!("Updated trip {} ({} {})", id, draft.course_name, draft.time);
            return Ok(id);
        }

        let owner = user.as_ref().map(|u| u.id.as_str());
        let id = self.store.insert_schedule(&draft, owner).await?;
        info!("Created trip {} ({} {})", id, draft.course_name, draft.time);
        Ok(id)
    }

    /// Delete a trip. Deleting an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Auth or store errors.
    pub async fn delete(&self, id: EntryId) -> Result<bool> {
        self.gate.check().await?;
        let removed = self.store.delete_schedule(id).await?;
        info!("Deleted trip {} (existed: {})", id, removed);
        Ok(removed)
    }
}
