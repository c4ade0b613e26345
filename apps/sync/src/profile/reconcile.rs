//! Reconciliation Engine — converges a section's remote collection to match
//! local intent with the fewest necessary network calls.
//!
//! Save-time phases per section:
//! 1. drop blank entries, reject if an upload is still in flight
//! 2. fetch the remote snapshot
//! 3. delete every remote record no local entry references (fan-out/join,
//!    outcomes collected, never fail-fast)
//! 4. re-fetch so the duplicate-detection set sees the deletions
//! 5. per entry: skip unchanged, update changed, create drafts unless a
//!    natural-key match already exists remotely
//! 6. final re-read for the caller to rehydrate Local Draft State
//!
//! There is no cross-call transaction: successful calls are never rolled
//! back, and every failure is recorded in the report instead of thrown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::errors::ApiError;
use crate::profile::models::{Entry, ProfileDocument, SectionContent};
use crate::profile::report::{MutationOutcome, SaveReport, SectionActivity, SectionReport, SectionResult};
use crate::profile::store::{ProfileStores, SectionStore};

pub async fn reconcile_section<C: SectionContent>(
    store: &Arc<dyn SectionStore<C>>,
    local: &[Entry<C>],
) -> SectionResult<C> {
    let section = C::SECTION;
    let mut activity = SectionActivity::default();

    // Entries with missing required content never reach the network.
    let entries: Vec<&Entry<C>> = local.iter().filter(|e| !e.content().is_blank()).collect();
    activity.blanks_dropped = local.len() - entries.len();

    // Upload gating: reject before any network call is made.
    if let Some(reason) = entries.iter().find_map(|e| e.content().save_blocker()) {
        return SectionResult::Blocked { section, reason };
    }

    let snapshot = match store.list().await {
        Ok(snapshot) => snapshot,
        Err(error) => return SectionResult::Unavailable { section, error },
    };

    // Deletion phase: one delete per remote id not referenced locally,
    // fanned out concurrently and awaited to completion.
    let local_server_ids: HashSet<&str> = entries.iter().filter_map(|e| e.server_id()).collect();
    let orphaned: Vec<String> = snapshot
        .iter()
        .filter(|r| !local_server_ids.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();

    let mut join = JoinSet::new();
    for id in orphaned {
        let store = Arc::clone(store);
        join.spawn(async move { delete_one(store, id).await });
    }
    while let Some(joined) = join.join_next().await {
        match joined {
            Ok(outcome) => activity.deletes.push(outcome),
            Err(e) => warn!("Delete task for {} aborted: {e}", section.label()),
        }
    }

    // The first snapshot is stale relative to the deletions just issued;
    // re-read before building the duplicate-detection set. With no deletions
    // issued the snapshot is still fresh and the re-read is skipped.
    let refreshed = if activity.deletes.is_empty() {
        snapshot
    } else {
        match store.list().await {
            Ok(refreshed) => refreshed,
            Err(error) => {
                warn!(
                    "Post-delete snapshot of {} failed, skipping create/update phase: {error}",
                    section.label()
                );
                return SectionResult::Saved(SectionReport {
                    section,
                    activity,
                    refreshed: Vec::new(),
                    refresh_error: Some(error),
                });
            }
        }
    };

    // Create-or-update phase. Per-entry failures are recorded and the loop
    // keeps going.
    {
        let remote_by_id: HashMap<&str, &C> = refreshed
            .iter()
            .map(|r| (r.id.as_str(), &r.content))
            .collect();
        let mut known_keys: HashSet<String> =
            refreshed.iter().map(|r| r.content.natural_key()).collect();

        for entry in &entries {
            match entry
                .server_id()
                .and_then(|id| remote_by_id.get(id).map(|remote| (id, *remote)))
            {
                Some((id, remote)) => {
                    if *remote == *entry.content() {
                        activity.unchanged += 1; // no-op update suppressed
                        continue;
                    }
                    let outcome = match store.update(id, entry.content()).await {
                        Ok(()) => MutationOutcome::Applied { id: id.to_string() },
                        Err(error) => {
                            warn!("Update of {} {id} failed: {error}", section.label());
                            MutationOutcome::Failed {
                                id: Some(id.to_string()),
                                error,
                            }
                        }
                    };
                    activity.updates.push(outcome);
                }
                // A draft, or a server id that no longer exists remotely:
                // check the refreshed snapshot for a natural-key match before
                // creating, so a concurrently recreated record is not
                // duplicated.
                None => {
                    let key = entry.content().natural_key();
                    if known_keys.contains(&key) {
                        activity.duplicates_suppressed += 1;
                        continue;
                    }
                    match store.create(entry.content()).await {
                        Ok(record) => {
                            known_keys.insert(key);
                            activity.creates.push(MutationOutcome::Applied { id: record.id });
                        }
                        Err(error) => {
                            warn!("Create in {} failed: {error}", section.label());
                            activity.creates.push(MutationOutcome::Failed { id: None, error });
                        }
                    }
                }
            }
        }
    }

    // Final re-read so the caller can rehydrate Local Draft State. Skipped
    // when nothing changed after the post-delete snapshot.
    let applied_after_refresh = activity
        .updates
        .iter()
        .chain(&activity.creates)
        .any(|o| matches!(o, MutationOutcome::Applied { .. }));
    let (final_snapshot, refresh_error) = if applied_after_refresh {
        match store.list().await {
            Ok(snapshot) => (snapshot, None),
            Err(error) => {
                warn!("Final snapshot of {} failed: {error}", section.label());
                (Vec::new(), Some(error))
            }
        }
    } else {
        (refreshed, None)
    };

    SectionResult::Saved(SectionReport {
        section,
        activity,
        refreshed: final_snapshot,
        refresh_error,
    })
}

async fn delete_one<C: SectionContent>(
    store: Arc<dyn SectionStore<C>>,
    id: String,
) -> MutationOutcome {
    match store.delete(&id).await {
        Ok(()) => MutationOutcome::Applied { id },
        Err(e) if e.is_already_gone() => {
            info!("Record {id} already gone remotely, treating delete as applied");
            MutationOutcome::AlreadyGone { id }
        }
        Err(error) => {
            warn!("Delete of {id} failed: {error}");
            MutationOutcome::Failed {
                id: Some(id),
                error,
            }
        }
    }
}

/// Runs the whole save. The core profile-fields update is a single top-level
/// call that is allowed to fail the save; the three sections then reconcile
/// sequentially, each independently; one section's failure never prevents
/// the others from being attempted.
pub async fn reconcile_profile(
    stores: &ProfileStores,
    document: &ProfileDocument,
) -> Result<SaveReport, ApiError> {
    stores.core.update_core(&document.core).await?;
    info!("Core profile fields saved");

    let education = reconcile_section(&stores.education, &document.education).await;
    let experience = reconcile_section(&stores.experience, &document.experience).await;
    let certifications = reconcile_section(&stores.certifications, &document.certifications).await;

    Ok(SaveReport {
        education,
        experience,
        certifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::profile::models::{
        Attachment, Certification, Education, Experience, ProfileCore, Section,
    };
    use crate::profile::store::mock::{MockCoreStore, MockSectionStore};

    fn education(school: &str, degree: &str) -> Education {
        Education {
            school: school.to_string(),
            degree: degree.to_string(),
            ..Default::default()
        }
    }

    fn certification(name: &str, issuer: &str, credential: Attachment) -> Certification {
        Certification {
            name: name.to_string(),
            issuer: issuer.to_string(),
            issue_date: None,
            credential,
        }
    }

    /// Keeps a typed handle on the mock while handing the engine its dyn view.
    fn arced<C: SectionContent>(
        mock: MockSectionStore<C>,
    ) -> (Arc<MockSectionStore<C>>, Arc<dyn SectionStore<C>>) {
        let mock = Arc::new(mock);
        let store: Arc<dyn SectionStore<C>> = mock.clone();
        (mock, store)
    }

    fn saved<C: std::fmt::Debug>(result: SectionResult<C>) -> SectionReport<C> {
        match result {
            SectionResult::Saved(report) => report,
            other => panic!("expected Saved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unchanged_entry_with_orphan_deletes_only() {
        // local: [a/E1 MIT BSc]; remote: [E1 MIT BSc, E2 Yale MA]
        let (mock, store) = arced(MockSectionStore::with_records(vec![
            ("E1", education("MIT", "BSc")),
            ("E2", education("Yale", "MA")),
        ]));
        let local = vec![Entry::persisted("E1", education("MIT", "BSc"))];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("delete"), 1);
        assert!(mock.calls().contains(&"delete E2".to_string()));
        assert_eq!(mock.count_calls("update"), 0);
        assert_eq!(mock.count_calls("create"), 0);
        assert_eq!(report.activity.unchanged, 1);
        assert!(report.is_clean());
        assert_eq!(report.refreshed.len(), 1);
        assert_eq!(report.refreshed[0].id, "E1");
    }

    #[tokio::test]
    async fn test_single_draft_creates_exactly_one_record() {
        // local: [draft Duke BA]; remote: []
        let (mock, store) = arced(MockSectionStore::<Education>::with_records(vec![]));
        let local = vec![Entry::draft(education("Duke", "BA"))];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("create"), 1);
        assert_eq!(mock.count_calls("delete"), 0);
        assert_eq!(mock.count_calls("update"), 0);
        assert_eq!(mock.record_ids().len(), 1);
        assert_eq!(report.refreshed.len(), 1);
        assert_eq!(report.refreshed[0].content.school, "Duke");
    }

    #[tokio::test]
    async fn test_empty_local_deletes_everything() {
        let (mock, store) = arced(MockSectionStore::with_records(vec![(
            "E1",
            education("MIT", "BSc"),
        )]));

        let report = saved(reconcile_section(&store, &[]).await);

        assert_eq!(mock.calls().iter().filter(|c| *c == "delete E1").count(), 1);
        assert_eq!(mock.count_calls("create"), 0);
        assert_eq!(mock.count_calls("update"), 0);
        assert!(report.is_clean());
        assert!(report.refreshed.is_empty());
    }

    #[tokio::test]
    async fn test_resave_without_edits_is_idempotent() {
        let (mock, store) = arced(MockSectionStore::with_records(vec![
            ("E1", education("MIT", "BSc")),
            ("E2", education("Yale", "MA")),
        ]));
        let local = vec![
            Entry::persisted("E1", education("MIT", "BSc")),
            Entry::persisted("E2", education("Yale", "MA")),
        ];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("update"), 0);
        assert_eq!(mock.count_calls("create"), 0);
        assert_eq!(mock.count_calls("delete"), 0);
        assert_eq!(report.activity.unchanged, 2);
        // no deletions, no mutations: one list call total
        assert_eq!(mock.count_calls("list"), 1);
    }

    #[tokio::test]
    async fn test_changed_entry_is_updated_in_place() {
        let (mock, store) = arced(MockSectionStore::with_records(vec![(
            "E1",
            education("MIT", "BSc"),
        )]));
        let local = vec![Entry::persisted("E1", education("MIT", "MSc"))];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("update E1"), 1);
        assert_eq!(mock.count_calls("create"), 0);
        assert!(report.is_clean());
        assert_eq!(report.refreshed[0].content.degree, "MSc");
    }

    #[tokio::test]
    async fn test_natural_key_match_suppresses_duplicate_creation() {
        // The draft's content already exists remotely under another id.
        let (mock, store) = arced(MockSectionStore::with_records(vec![(
            "E7",
            education("Duke", "BA"),
        )]));
        let local = vec![Entry::draft(education("duke", "ba"))];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("create"), 0);
        assert_eq!(report.activity.duplicates_suppressed, 1);
        assert_eq!(mock.record_ids(), vec!["E7"]);
    }

    #[tokio::test]
    async fn test_two_identical_drafts_create_once() {
        let (mock, store) = arced(MockSectionStore::<Education>::with_records(vec![]));
        let local = vec![
            Entry::draft(education("Duke", "BA")),
            Entry::draft(education("Duke", "BA")),
        ];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("create"), 1);
        assert_eq!(report.activity.duplicates_suppressed, 1);
    }

    #[tokio::test]
    async fn test_stale_server_id_falls_back_to_create() {
        // Persisted locally under E9, but E9 vanished remotely and no
        // natural-key match exists: create, without reusing the dead id.
        let (mock, store) = arced(MockSectionStore::<Education>::with_records(vec![]));
        let local = vec![Entry::persisted("E9", education("Duke", "BA"))];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("create"), 1);
        assert!(report.is_clean());
        assert_ne!(report.refreshed[0].id, "E9");
    }

    #[tokio::test]
    async fn test_delete_404_is_not_a_failure() {
        let mut mock = MockSectionStore::with_records(vec![("E2", education("Yale", "MA"))]);
        mock.gone_on_delete.insert("E2".to_string());
        let (mock, store) = arced(mock);

        let report = saved(reconcile_section(&store, &[]).await);

        assert_eq!(mock.count_calls("delete E2"), 1);
        assert!(report.is_clean());
        assert!(matches!(
            report.activity.deletes[0],
            MutationOutcome::AlreadyGone { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_failures_do_not_abort_remaining_deletions() {
        let mut mock = MockSectionStore::with_records(vec![
            ("E1", education("MIT", "BSc")),
            ("E2", education("Yale", "MA")),
            ("E3", education("Duke", "BA")),
        ]);
        mock.fail_on_delete.insert("E2".to_string());
        let (mock, store) = arced(mock);

        let report = saved(reconcile_section(&store, &[]).await);

        // all three deletions attempted despite E2 failing
        assert_eq!(mock.count_calls("delete"), 3);
        assert_eq!(report.activity.deletes.len(), 3);
        assert_eq!(
            report
                .activity
                .deletes
                .iter()
                .filter(|o| o.is_failure())
                .count(),
            1
        );
        assert!(!report.is_clean());
        let messages = report.error_summary();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("deletion"));
    }

    #[tokio::test]
    async fn test_update_failure_does_not_block_other_entries() {
        let mut mock = MockSectionStore::with_records(vec![
            ("E1", education("MIT", "BSc")),
            ("E2", education("Yale", "MA")),
        ]);
        mock.fail_on_update.insert("E1".to_string());
        let (mock, store) = arced(mock);
        let local = vec![
            Entry::persisted("E1", education("MIT", "MSc")),
            Entry::persisted("E2", education("Yale", "PhD")),
        ];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("update"), 2);
        assert!(!report.is_clean());
        assert_eq!(report.activity.updates.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_entries_never_reach_the_network() {
        let (mock, store) = arced(MockSectionStore::<Education>::with_records(vec![]));
        let local = vec![
            Entry::draft(education("", "BSc")),
            Entry::draft(education("Duke", "BA")),
        ];

        let report = saved(reconcile_section(&store, &local).await);

        assert_eq!(mock.count_calls("create"), 1);
        assert_eq!(report.activity.blanks_dropped, 1);
    }

    #[tokio::test]
    async fn test_pending_upload_blocks_the_save_before_any_call() {
        let (mock, store) = arced(MockSectionStore::<Certification>::with_records(vec![]));
        let local = vec![Entry::draft(certification(
            "CKA",
            "CNCF",
            Attachment::Uploading,
        ))];

        let result = reconcile_section(&store, &local).await;

        match result {
            SectionResult::Blocked { section, reason } => {
                assert_eq!(section, Section::Certification);
                assert!(reason.contains("uploading"));
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_attempts_nothing() {
        let mut mock = MockSectionStore::<Education>::with_records(vec![]);
        mock.fail_on_list = true;
        let (mock, store) = arced(mock);

        let result = reconcile_section(&store, &[Entry::draft(education("Duke", "BA"))]).await;

        assert!(matches!(result, SectionResult::Unavailable { .. }));
        assert_eq!(mock.calls(), vec!["list"]);
    }

    #[tokio::test]
    async fn test_core_failure_aborts_the_whole_save() {
        let stores = ProfileStores {
            core: Arc::new(MockCoreStore {
                fail: true,
                calls: Mutex::new(0),
            }),
            education: arced(MockSectionStore::with_records(vec![(
                "E1",
                education("MIT", "BSc"),
            )]))
            .1,
            experience: arced(MockSectionStore::<Experience>::with_records(vec![])).1,
            certifications: arced(MockSectionStore::<Certification>::with_records(vec![])).1,
        };
        let document = ProfileDocument {
            core: ProfileCore::default(),
            education: vec![],
            experience: vec![],
            certifications: vec![],
            attachments: vec![],
        };

        assert!(reconcile_profile(&stores, &document).await.is_err());
    }

    #[tokio::test]
    async fn test_section_failure_does_not_prevent_the_others() {
        let mut education_mock = MockSectionStore::<Education>::with_records(vec![]);
        education_mock.fail_on_list = true;
        let (_, education_store) = arced(education_mock);
        let (experience_mock, experience_store) =
            arced(MockSectionStore::<Experience>::with_records(vec![]));
        let (certification_mock, certification_store) =
            arced(MockSectionStore::<Certification>::with_records(vec![]));

        let stores = ProfileStores {
            core: Arc::new(MockCoreStore {
                fail: false,
                calls: Mutex::new(0),
            }),
            education: education_store,
            experience: experience_store,
            certifications: certification_store,
        };
        let document = ProfileDocument {
            core: ProfileCore::default(),
            education: vec![Entry::draft(education("Duke", "BA"))],
            experience: vec![Entry::draft(Experience {
                company: "Acme".to_string(),
                role: "Engineer".to_string(),
                ..Default::default()
            })],
            certifications: vec![Entry::draft(certification(
                "CKA",
                "CNCF",
                Attachment::None,
            ))],
            attachments: vec![],
        };

        let report = reconcile_profile(&stores, &document).await.unwrap();

        assert!(matches!(
            report.education,
            SectionResult::Unavailable { .. }
        ));
        assert_eq!(experience_mock.count_calls("create"), 1);
        assert_eq!(certification_mock.count_calls("create"), 1);
        assert!(!report.is_clean());
    }
}
