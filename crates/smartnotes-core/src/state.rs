//! Shared client state types.

use crate::sync::{ItemOutcome, ReconcileReport, RefreshStatus, SkipReason};

/// Sync status shown by front-ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Offline,
    SignedOut,
    Syncing,
    Synced,
    Error,
}

impl SyncStatus {
    /// Status after a pass. Conflicts wait for the user and do not count as errors.
    pub fn from_report(report: &ReconcileReport) -> Self {
        match report.skipped {
            Some(SkipReason::Offline) => Self::Offline,
            Some(SkipReason::NoSession) => Self::SignedOut,
            None if report.count(ItemOutcome::Retrying) > 0 => Self::Error,
            None if matches!(report.refresh, RefreshStatus::Merged(_)) => Self::Synced,
            None => Self::Error,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::SignedOut => "signed out",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "retrying",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MergeSummary;

    #[test]
    fn status_follows_report() {
        let mut report = ReconcileReport {
            skipped: Some(SkipReason::NoSession),
            ..ReconcileReport::default()
        };
        assert_eq!(SyncStatus::from_report(&report), SyncStatus::SignedOut);

        report.skipped = None;
        report.refresh = RefreshStatus::Failed("HTTP 502".to_string());
        assert_eq!(SyncStatus::from_report(&report), SyncStatus::Error);

        report.refresh = RefreshStatus::Merged(MergeSummary::default());
        assert_eq!(SyncStatus::from_report(&report), SyncStatus::Synced);
    }
}
