#![allow(dead_code)]

//! Local Draft State — the editable, exclusively-owned list behind one
//! section's form. Removal is optimistic: the entry disappears from the list
//! first, the remote delete follows, and a failed delete rolls the entry back
//! at its original index.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::profile::models::{Entry, RemoteRecord, SectionContent};
use crate::profile::store::SectionStore;

#[derive(Debug, Clone, Default)]
pub struct DraftList<C> {
    entries: Vec<Entry<C>>,
}

/// An optimistically removed entry, held so a failed remote delete can put
/// it back where it was.
#[derive(Debug)]
pub struct RemovedEntry<C> {
    index: usize,
    entry: Entry<C>,
}

impl<C: SectionContent> DraftList<C> {
    pub fn from_entries(entries: Vec<Entry<C>>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry<C>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a new draft with empty content; returns its local id.
    pub fn add(&mut self) -> Uuid
    where
        C: Default,
    {
        let entry = Entry::draft(C::default());
        let local_id = entry.local_id();
        self.entries.push(entry);
        local_id
    }

    /// Mutates one entry's content in place. Returns false for an unknown id.
    pub fn update(&mut self, local_id: Uuid, edit: impl FnOnce(&mut C)) -> bool {
        match self.entries.iter_mut().find(|e| e.local_id() == local_id) {
            Some(entry) => {
                edit(entry.content_mut());
                true
            }
            None => false,
        }
    }

    /// Removes an entry from the list, recording where it sat.
    pub fn remove(&mut self, local_id: Uuid) -> Option<RemovedEntry<C>> {
        let index = self.entries.iter().position(|e| e.local_id() == local_id)?;
        Some(RemovedEntry {
            index,
            entry: self.entries.remove(index),
        })
    }

    /// Rolls an optimistic removal back at its original index.
    pub fn restore(&mut self, removed: RemovedEntry<C>) {
        let index = removed.index.min(self.entries.len());
        self.entries.insert(index, removed.entry);
    }

    /// The full optimistic-removal flow: drop the entry locally, then issue
    /// the immediate remote delete when it was persisted. A record that is
    /// already gone counts as success; any other failure restores the entry
    /// and surfaces the error.
    pub async fn remove_synced(
        &mut self,
        store: &dyn SectionStore<C>,
        local_id: Uuid,
    ) -> Result<(), ApiError> {
        let Some(removed) = self.remove(local_id) else {
            return Ok(());
        };
        let Some(server_id) = removed.entry.server_id().map(str::to_string) else {
            return Ok(()); // draft: nothing to delete remotely
        };
        match store.delete(&server_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_gone() => {
                info!("Record {server_id} already gone remotely, treating delete as applied");
                Ok(())
            }
            Err(e) => {
                warn!("Delete of {server_id} failed, restoring entry: {e}");
                self.restore(removed);
                Err(e)
            }
        }
    }

    /// Server ids referenced by the current entries (drafts excluded).
    pub fn server_ids(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter_map(|e| e.server_id().map(str::to_string))
            .collect()
    }

    /// Replaces the list with the post-save remote snapshot; every entry
    /// comes back `Persisted`.
    pub fn rehydrate(&mut self, records: Vec<RemoteRecord<C>>) {
        self.entries = records
            .into_iter()
            .map(|r| Entry::persisted(r.id, r.content))
            .collect();
    }
}
