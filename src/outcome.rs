//! Records what the opener observed for a vacancy.
//!
//! Each operation applies exactly one status transition to the matching row.
//! Unknown ids are not errors: the transition simply matches nothing.
use tracing::{info, instrument, warn};

use crate::block::BlockController;
use crate::parser::{FailureReport, VacancyId};
use crate::store::Store;
use crate::types::protocol::OutcomeResponse;
use crate::types::{ProbeTag, Vacancy, VacancyStatus};

/// A recorded outcome plus the vacancy pre-claimed to follow it, if any.
#[derive(Debug)]
pub struct NextClaim {
    pub recorded: Option<Vacancy>,
    pub next: Option<Vacancy>,
}

impl NextClaim {
    /// Reply for outcomes that report both whether to open another vacancy
    /// and whether the queue ran dry.
    pub fn response(&self) -> OutcomeResponse {
        OutcomeResponse {
            success: true,
            should_open_next: Some(self.next.is_some()),
            all_completed: Some(self.next.is_none()),
        }
    }
}

#[derive(Clone)]
pub struct Recorder {
    store: Store,
    block: BlockController,
}

impl Recorder {
    pub fn new(store: Store, block: BlockController) -> Self {
        Self { store, block }
    }

    pub async fn start(&self, id: VacancyId) -> sqlx::Result<Option<Vacancy>> {
        self.store.set_status(id, VacancyStatus::Processing).await
    }

    /// Marks a vacancy completed. A completion while blocked proves the block
    /// has lifted.
    #[instrument(skip_all, fields(id = id.0))]
    pub async fn complete(
        &self,
        id: VacancyId,
    ) -> sqlx::Result<Option<Vacancy>> {
        let recorded = self.store.mark_completed(id).await?;
        info!(found = recorded.is_some(), "response completed");

        if self.block.is_blocked() {
            self.block.recover().await?;
        }

        Ok(recorded)
    }

    /// Completes a vacancy and pre-claims the next one in the same call.
    pub async fn complete_and_next(
        &self,
        id: VacancyId,
    ) -> sqlx::Result<NextClaim> {
        let recorded = self.complete(id).await?;
        let next = self.store.claim_next().await?;

        Ok(NextClaim { recorded, next })
    }

    #[instrument(skip_all, fields(id = report.id.0, reason = %report.reason))]
    pub async fn fail(
        &self,
        report: &FailureReport,
    ) -> sqlx::Result<Option<Vacancy>> {
        let recorded = self.store.mark_failed(report.id, &report.reason).await?;
        let was_probe = self.settle_probe(recorded.as_ref());
        warn!(found = recorded.is_some(), was_probe, "response failed");

        Ok(recorded)
    }

    pub async fn requires_quiz(&self, id: VacancyId) -> sqlx::Result<NextClaim> {
        self.record_and_claim(id, VacancyStatus::RequiresQuiz).await
    }

    pub async fn requires_cover_letter(
        &self,
        id: VacancyId,
    ) -> sqlx::Result<NextClaim> {
        self.record_and_claim(id, VacancyStatus::RequiresCoverLetter)
            .await
    }

    /// The vacancy cannot be seen by this account, e.g. hidden by its owner.
    pub async fn unavailable(&self, id: VacancyId) -> sqlx::Result<NextClaim> {
        self.record_and_claim(id, VacancyStatus::Unavailable).await
    }

    /// Marks a single vacancy blocked. This never enters the global blocked
    /// state by itself, but a failed probe schedules the next one.
    #[instrument(skip_all, fields(id = id.0))]
    pub async fn blocked(
        &self,
        id: VacancyId,
    ) -> sqlx::Result<Option<Vacancy>> {
        let recorded =
            self.store.set_status(id, VacancyStatus::Blocked403).await?;

        let was_probe = self.settle_probe(recorded.as_ref());
        warn!(found = recorded.is_some(), was_probe, "vacancy blocked");

        Ok(recorded)
    }

    #[instrument(skip_all, fields(id = id.0, %status))]
    async fn record_and_claim(
        &self,
        id: VacancyId,
        status: VacancyStatus,
    ) -> sqlx::Result<NextClaim> {
        let recorded = self.store.set_status(id, status).await?;
        let was_probe = self.settle_probe(recorded.as_ref());
        let next = self.store.claim_next().await?;

        info!(
            found = recorded.is_some(),
            was_probe,
            next = next.as_ref().map(|v| v.id),
            "outcome recorded"
        );

        Ok(NextClaim { recorded, next })
    }

    /// Any outcome other than a completion on a dispatched probe means the
    /// site still refuses us; the next probe gets scheduled.
    fn settle_probe(&self, recorded: Option<&Vacancy>) -> bool {
        let was_probe =
            recorded.is_some_and(|v| v.probe == Some(ProbeTag::Dispatched));
        if was_probe && self.block.is_blocked() {
            self.block.probe_failed();
        }

        was_probe
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::block::BlockConfig;
    use crate::notify::Notifier;
    use crate::store::tests::seeded;

    fn recorder(store: &Store) -> (Recorder, BlockController) {
        let block = BlockController::new(
            store.clone(),
            Notifier::disabled(),
            BlockConfig {
                retry_interval: Duration::from_secs(60),
                monitor_interval: Duration::from_millis(10),
            },
        );

        (Recorder::new(store.clone(), block.clone()), block)
    }

    #[tokio::test]
    async fn test_complete_recovers_from_block() {
        let store = seeded(&["a", "b"]).await;
        let (recorder, block) = recorder(&store);

        block.block();
        let done = recorder.complete(VacancyId(1)).await.unwrap().unwrap();

        assert_eq!(done.status, VacancyStatus::Completed);
        assert!(done.responded_at.is_some());
        assert!(!block.is_blocked());

        // Unknown ids still count as a successful response.
        block.block();
        assert!(recorder.complete(VacancyId(42)).await.unwrap().is_none());
        assert!(!block.is_blocked());
    }

    #[tokio::test]
    async fn test_outcomes_claim_next() {
        let store = seeded(&["a", "b", "c"]).await;
        let (recorder, _) = recorder(&store);

        let first = store.dispense_next().await.unwrap().unwrap();
        let claim = recorder.requires_quiz(VacancyId(first.id)).await.unwrap();
        assert_eq!(
            claim.recorded.unwrap().status,
            VacancyStatus::RequiresQuiz
        );
        let second = claim.next.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.status, VacancyStatus::Processing);

        let claim = recorder
            .requires_cover_letter(VacancyId(second.id))
            .await
            .unwrap();
        assert_eq!(claim.next.as_ref().map(|v| v.id), Some(3));

        let claim = recorder.unavailable(VacancyId(3)).await.unwrap();
        assert!(claim.next.is_none());
        assert_eq!(
            claim.response(),
            OutcomeResponse {
                success: true,
                should_open_next: Some(false),
                all_completed: Some(true),
            }
        );

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts[&VacancyStatus::RequiresQuiz], 1);
        assert_eq!(counts[&VacancyStatus::RequiresCoverLetter], 1);
        assert_eq!(counts[&VacancyStatus::Unavailable], 1);
    }

    #[tokio::test]
    async fn test_complete_and_next() {
        let store = seeded(&["a", "b"]).await;
        let (recorder, block) = recorder(&store);

        store.dispense_next().await.unwrap();
        block.block();

        let claim = recorder.complete_and_next(VacancyId(1)).await.unwrap();
        assert!(!block.is_blocked());
        assert_eq!(claim.next.map(|v| v.id), Some(2));
    }

    #[tokio::test]
    async fn test_blocked_outside_global_block() {
        let store = seeded(&["a"]).await;
        let (recorder, block) = recorder(&store);

        let claimed = store.dispense_next().await.unwrap().unwrap();
        let blocked = recorder.blocked(VacancyId(claimed.id)).await.unwrap();

        assert_eq!(blocked.unwrap().status, VacancyStatus::Blocked403);
        assert!(!block.is_blocked());
    }

    #[tokio::test]
    async fn test_failed_probe_rearms() {
        let store = seeded(&["a"]).await;
        let (recorder, block) = recorder(&store);

        block.block();
        block.force_retry().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let probe = store.get(VacancyId(1)).await.unwrap().unwrap();
        assert_eq!(probe.probe, Some(ProbeTag::Dispatched));
        assert!(block.status().next_retry.is_none());

        recorder.blocked(VacancyId(1)).await.unwrap();
        assert!(block.is_blocked());
        assert!(block.status().next_retry.is_some());
    }

    #[tokio::test]
    async fn test_other_outcomes_on_dispatched_vacancy_rearm() {
        let store = seeded(&["a", "b", "c"]).await;
        let (recorder, block) = recorder(&store);

        block.block();
        block.force_retry().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(block.status().next_retry.is_none());

        let claim = recorder.requires_quiz(VacancyId(1)).await.unwrap();
        assert_eq!(
            claim.recorded.unwrap().status,
            VacancyStatus::RequiresQuiz
        );
        assert_eq!(claim.next.map(|v| v.id), Some(2));
        assert!(block.is_blocked());
        assert!(block.status().next_retry.is_some());

        // A failure report on the next dispatched vacancy behaves the same.
        block.force_retry().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let dispatched = store.get(VacancyId(3)).await.unwrap().unwrap();
        assert_eq!(dispatched.probe, Some(ProbeTag::Dispatched));
        assert!(block.status().next_retry.is_none());

        let report = FailureReport {
            id: VacancyId(3),
            reason: "captcha".into(),
        };
        recorder.fail(&report).await.unwrap();
        assert!(block.status().next_retry.is_some());
    }

    #[tokio::test]
    async fn test_fail_keeps_reason() {
        let store = seeded(&["a"]).await;
        let (recorder, _) = recorder(&store);

        let report = FailureReport {
            id: VacancyId(1),
            reason: "form changed".into(),
        };
        let failed = recorder.fail(&report).await.unwrap().unwrap();

        assert_eq!(failed.status, VacancyStatus::Failed);
        assert_eq!(failed.fail_reason.as_deref(), Some("form changed"));
    }
}
