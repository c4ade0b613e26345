//! Save reports — explicit per-mutation outcomes instead of caught-and-logged
//! exceptions. The caller decides what partial failure means; the engine only
//! records what happened.

use crate::errors::ApiError;
use crate::profile::models::{
    Certification, Education, Experience, RemoteRecord, Section, SectionContent,
};

/// Outcome of a single remote mutation.
#[derive(Debug)]
pub enum MutationOutcome {
    Applied { id: String },
    /// Delete target was already missing remotely (404/405); converged.
    AlreadyGone { id: String },
    Failed { id: Option<String>, error: ApiError },
}

impl MutationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, MutationOutcome::Failed { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            MutationOutcome::Failed {
                error: ApiError::Unauthorized,
                ..
            }
        )
    }
}

/// What one section's save actually did, phase by phase.
#[derive(Debug, Default)]
pub struct SectionActivity {
    pub deletes: Vec<MutationOutcome>,
    pub updates: Vec<MutationOutcome>,
    pub creates: Vec<MutationOutcome>,
    /// Entries whose content matched the remote record; zero network calls.
    pub unchanged: usize,
    /// Creations suppressed by a natural-key match in the refreshed snapshot.
    pub duplicates_suppressed: usize,
    /// Entries dropped before both phases for missing required content.
    pub blanks_dropped: usize,
}

impl SectionActivity {
    fn failures(category: &[MutationOutcome]) -> usize {
        category.iter().filter(|o| o.is_failure()).count()
    }

    fn last_failure(category: &[MutationOutcome]) -> Option<&ApiError> {
        category.iter().rev().find_map(|o| match o {
            MutationOutcome::Failed { error, .. } => Some(error),
            _ => None,
        })
    }
}

/// Report for one reconciled section.
#[derive(Debug)]
pub struct SectionReport<C> {
    pub section: Section,
    pub activity: SectionActivity,
    /// The final post-save snapshot; callers rehydrate Local Draft State
    /// from it. Empty when `refresh_error` is set.
    pub refreshed: Vec<RemoteRecord<C>>,
    /// A snapshot re-read failed mid-save; the phases after it were skipped
    /// and `refreshed` is not usable.
    pub refresh_error: Option<ApiError>,
}

impl<C> SectionReport<C> {
    pub fn is_clean(&self) -> bool {
        let a = &self.activity;
        self.refresh_error.is_none()
            && SectionActivity::failures(&a.deletes) == 0
            && SectionActivity::failures(&a.updates) == 0
            && SectionActivity::failures(&a.creates) == 0
    }

    /// At most one user-facing message per mutation category.
    pub fn error_summary(&self) -> Vec<String> {
        let label = self.section.label();
        let mut messages = Vec::new();
        for (category, outcomes) in [
            ("deletion", &self.activity.deletes),
            ("update", &self.activity.updates),
            ("creation", &self.activity.creates),
        ] {
            let failed = SectionActivity::failures(outcomes);
            if failed > 0 {
                let last = SectionActivity::last_failure(outcomes)
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                messages.push(format!("{label}: {failed} {category}(s) failed: {last}"));
            }
        }
        if let Some(e) = &self.refresh_error {
            messages.push(format!("{label}: could not re-read the server state: {e}"));
        }
        messages
    }

    pub fn saw_unauthorized(&self) -> bool {
        let a = &self.activity;
        a.deletes
            .iter()
            .chain(&a.updates)
            .chain(&a.creates)
            .any(|o| o.is_unauthorized())
            || matches!(self.refresh_error, Some(ApiError::Unauthorized))
    }

    pub fn summary_line(&self) -> String {
        let a = &self.activity;
        format!(
            "{}: {} created, {} updated, {} deleted, {} unchanged, {} duplicate(s) suppressed, {} blank(s) dropped",
            self.section.label(),
            a.creates.iter().filter(|o| !o.is_failure()).count(),
            a.updates.iter().filter(|o| !o.is_failure()).count(),
            a.deletes.iter().filter(|o| !o.is_failure()).count(),
            a.unchanged,
            a.duplicates_suppressed,
            a.blanks_dropped,
        )
    }
}

/// Result of one section's save attempt.
#[derive(Debug)]
pub enum SectionResult<C> {
    Saved(SectionReport<C>),
    /// Rejected before any network call (e.g. an upload still in flight).
    Blocked { section: Section, reason: String },
    /// The initial snapshot fetch failed; nothing was attempted.
    Unavailable { section: Section, error: ApiError },
}

impl<C> SectionResult<C> {
    pub fn is_clean(&self) -> bool {
        match self {
            SectionResult::Saved(report) => report.is_clean(),
            _ => false,
        }
    }

    pub fn error_summary(&self) -> Vec<String> {
        match self {
            SectionResult::Saved(report) => report.error_summary(),
            SectionResult::Blocked { section, reason } => {
                vec![format!("{}: save blocked: {reason}", section.label())]
            }
            SectionResult::Unavailable { section, error } => {
                vec![format!(
                    "{}: could not load current entries: {error}",
                    section.label()
                )]
            }
        }
    }

    pub fn saw_unauthorized(&self) -> bool {
        match self {
            SectionResult::Saved(report) => report.saw_unauthorized(),
            SectionResult::Blocked { .. } => false,
            SectionResult::Unavailable { error, .. } => matches!(error, ApiError::Unauthorized),
        }
    }
}

/// The whole save: core fields plus the three section results.
#[derive(Debug)]
pub struct SaveReport {
    pub education: SectionResult<Education>,
    pub experience: SectionResult<Experience>,
    pub certifications: SectionResult<Certification>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.education.is_clean() && self.experience.is_clean() && self.certifications.is_clean()
    }

    pub fn error_summaries(&self) -> Vec<String> {
        let mut messages = self.education.error_summary();
        messages.extend(self.experience.error_summary());
        messages.extend(self.certifications.error_summary());
        messages
    }

    pub fn saw_unauthorized(&self) -> bool {
        self.education.saw_unauthorized()
            || self.experience.saw_unauthorized()
            || self.certifications.saw_unauthorized()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        [
            summary_of(&self.education),
            summary_of(&self.experience),
            summary_of(&self.certifications),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn summary_of<C: SectionContent>(result: &SectionResult<C>) -> Option<String> {
    match result {
        SectionResult::Saved(report) => Some(report.summary_line()),
        _ => None,
    }
}
