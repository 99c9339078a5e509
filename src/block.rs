//! Process-wide block state and the retry prober that runs while blocked.
//!
//! Entering the blocked state arms a single-shot retry timer and starts the
//! test monitor. When the timer fires, one vacancy is tagged as a probe
//! candidate (status untouched); the monitor then promotes candidates to
//! `processing` so the opener handles them like any dispensed vacancy. A
//! successful outcome clears the block, another block outcome re-arms the
//! timer.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::select;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::notify::Notifier;
use crate::store::Store;
use crate::types::protocol::BlockStatus;
use crate::types::Vacancy;

#[derive(Clone, Copy, Debug)]
pub struct BlockConfig {
    /// Wait between entering the blocked state (or a failed probe) and the
    /// next probe.
    pub retry_interval: Duration,
    /// How often the test monitor promotes probe candidates.
    pub monitor_interval: Duration,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(60),
            monitor_interval: Duration::from_secs(2),
        }
    }
}

struct RetryTimer {
    fires_at: DateTime<Utc>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    blocked_since: Option<DateTime<Utc>>,
    retry: Option<RetryTimer>,
    monitor: Option<CancellationToken>,
}

struct Inner {
    store: Store,
    notifier: Notifier,
    config: BlockConfig,
    state: Mutex<State>,
    /// Held across the awaits of unblocking and probing so a probe tag is
    /// never written into a block that is being torn down, nor wiped from
    /// one that started meanwhile.
    transition: AsyncMutex<()>,
}

/// Owns the block flag and both prober timers. Cheap to clone.
#[derive(Clone)]
pub struct BlockController {
    inner: Arc<Inner>,
}

impl BlockController {
    pub fn new(store: Store, notifier: Notifier, config: BlockConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                config,
                state: Mutex::new(State::default()),
                transition: AsyncMutex::new(()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_blocked(&self) -> bool {
        self.state().blocked_since.is_some()
    }

    pub fn status(&self) -> BlockStatus {
        let state = self.state();

        BlockStatus {
            is_blocked: state.blocked_since.is_some(),
            blocked_since: state.blocked_since,
            next_retry: state.retry.as_ref().map(|r| r.fires_at),
        }
    }

    /// Enters the blocked state, arming the retry timer and starting the test
    /// monitor. Returns false if already blocked, in which case nothing
    /// changes.
    pub fn block(&self) -> bool {
        let since = {
            let mut state = self.state();
            if state.blocked_since.is_some() {
                return false;
            }

            let since = Utc::now();
            state.blocked_since = Some(since);
            self.arm_retry(&mut state);
            state.monitor = Some(self.spawn_monitor());
            since
        };

        warn!(%since, "site signalled a block; dispensing suspended");
        self.inner.notifier.notify(format!(
            "Blocked by the site at {since}. Probing every {}s.",
            self.inner.config.retry_interval.as_secs()
        ));

        true
    }

    /// Manually leaves the blocked state and pre-claims the next pending
    /// vacancy so processing resumes. Does nothing when not blocked.
    #[instrument(skip_all)]
    pub async fn clear(&self) -> sqlx::Result<Option<Vacancy>> {
        if !self.unblock().await? {
            return Ok(None);
        }

        info!("block cleared manually");
        self.inner.notifier.notify("Block cleared manually.");

        self.inner.store.claim_next().await
    }

    /// Leaves the blocked state after a real response succeeded. Returns
    /// whether a block was lifted.
    #[instrument(skip_all)]
    pub async fn recover(&self) -> sqlx::Result<bool> {
        if !self.unblock().await? {
            return Ok(false);
        }

        info!("successful response while blocked; block lifted");
        self.inner
            .notifier
            .notify("A response went through; the block is lifted.");

        Ok(true)
    }

    /// Runs a probe now instead of waiting for the timer. Returns false when
    /// not blocked.
    pub async fn force_retry(&self) -> bool {
        {
            let mut state = self.state();
            if state.blocked_since.is_none() {
                return false;
            }
            if let Some(retry) = state.retry.take() {
                retry.cancel.cancel();
            }
        }

        info!("forced probe");
        self.probe().await;

        true
    }

    /// Called when a dispatched probe came back blocked: schedules the next
    /// probe unless one is already pending.
    pub fn probe_failed(&self) {
        let mut state = self.state();
        if state.blocked_since.is_none() || state.retry.is_some() {
            return;
        }

        self.arm_retry(&mut state);
        info!("probe still blocked; retry re-armed");
    }

    /// Stops both timers without touching stored data. Used on shutdown.
    pub fn shutdown(&self) {
        let mut state = self.state();
        if let Some(retry) = state.retry.take() {
            retry.cancel.cancel();
        }
        if let Some(monitor) = state.monitor.take() {
            monitor.cancel();
        }
    }

    /// Resets the in-memory state and every probe tag. Returns whether the
    /// controller was blocked.
    async fn unblock(&self) -> sqlx::Result<bool> {
        let _transition = self.inner.transition.lock().await;
        {
            let mut state = self.state();
            if state.blocked_since.take().is_none() {
                return Ok(false);
            }
            if let Some(retry) = state.retry.take() {
                retry.cancel.cancel();
            }
            if let Some(monitor) = state.monitor.take() {
                monitor.cancel();
            }
        }

        let cleared = self.inner.store.clear_probe_tags().await?;
        debug!(cleared, "probe tags reset");

        Ok(true)
    }

    fn arm_retry(&self, state: &mut State) {
        if let Some(previous) = state.retry.take() {
            previous.cancel.cancel();
        }

        let interval = self.inner.config.retry_interval;
        let cancel = CancellationToken::new();
        let fires_at = Utc::now()
            + chrono::Duration::from_std(interval)
                .unwrap_or_else(|_| chrono::Duration::zero());

        let this = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            select! {
                _ = sleep(interval) => this.retry_fired(&token).await,
                _ = token.cancelled() => {},
            }
        });

        state.retry = Some(RetryTimer { fires_at, cancel });
    }

    async fn retry_fired(&self, token: &CancellationToken) {
        {
            let mut state = self.state();
            // Only the currently armed timer may consume the slot.
            if token.is_cancelled() {
                return;
            }
            state.retry = None;
        }

        debug!("retry timer fired");
        self.probe().await;
    }

    /// Tags one vacancy as a probe candidate. Re-arms when there is nothing
    /// to probe so the cycle never stalls.
    async fn probe(&self) {
        let _transition = self.inner.transition.lock().await;
        if !self.is_blocked() {
            return;
        }

        match self.inner.store.select_probe_candidate().await {
            Ok(Some(vacancy)) => {
                info!(
                    id = vacancy.id,
                    status = %vacancy.status,
                    "selected probe candidate"
                );
            },
            Ok(None) => {
                warn!("nothing to probe; waiting for the next cycle");
                self.probe_failed();
            },
            Err(error) => {
                error!(%error, "failed to select probe candidate");
                self.probe_failed();
            },
        }
    }

    fn spawn_monitor(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        let period = self.inner.config.monitor_interval;
        let store = self.inner.store.clone();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                select! {
                    _ = ticks.tick() => {},
                    _ = token.cancelled() => break,
                }

                match store.promote_probe_candidates().await {
                    Ok(promoted) => {
                        for vacancy in promoted {
                            info!(id = vacancy.id, "dispatched probe vacancy");
                        }
                    },
                    Err(error) => {
                        warn!(%error, "failed to promote probe candidates")
                    },
                }
            }

            debug!("test monitor stopped");
        });

        cancel
    }
}
