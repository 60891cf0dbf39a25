//! Per-request issuance context.

use chrono::{DateTime, Utc};
use openbadges_canonical::{BadgeId, Uid};
use tracing::Span;

/// State scoped to a single issuance: its tracing span and clock reading.
///
/// Nothing here is shared between requests, so independent issuances can run
/// side by side.
#[derive(Debug, Clone)]
pub struct IssueContext {
    span: Span,
    issued_at: DateTime<Utc>,
}

impl IssueContext {
    /// Opens a context for `badge_id` stamped with the current time.
    pub fn new(badge_id: &BadgeId) -> Self {
        Self::at(badge_id, Utc::now())
    }

    /// Opens a context with a fixed issuance time.
    pub fn at(badge_id: &BadgeId, issued_at: DateTime<Utc>) -> Self {
        let span = tracing::info_span!(
            "issue",
            badge = %badge_id,
            uid = tracing::field::Empty
        );
        Self { span, issued_at }
    }

    /// Records the uid once the pipeline has derived it.
    pub fn record_uid(&self, uid: &Uid) {
        self.span.record("uid", tracing::field::display(uid));
    }

    /// Span all pipeline events are emitted under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Time stamped into the assertion.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}
