//! Idle compaction scheduler
//!
//! After a startup delay the scheduler checks every managed conversation at
//! a fixed interval and queues the eligible ones. A single worker drains the
//! queue, so compactions never overlap even across conversations.

use crate::config::IdleConfig;
use crate::eligibility::{Eligibility, EligibilityChecker};
use crate::error::{IdleError, IdleResult};
use crate::sources::{ActivitySource, CompactionExecutor, IdleThresholds};
use lattice_history::{ConversationId, HistoryLog};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct QueuedCompaction {
    id: ConversationId,
    threshold: Duration,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<QueuedCompaction>,
    queued_ids: HashSet<ConversationId>,
    active: Option<ConversationId>,
    worker_running: bool,
    /// Set by `stop()`; new work is refused until the next `start()`
    halted: bool,
}

struct Inner {
    config: IdleConfig,
    checker: EligibilityChecker,
    thresholds: Arc<dyn IdleThresholds>,
    executor: Arc<dyn CompactionExecutor>,
    state: Mutex<QueueState>,
    timer: Mutex<Option<CancellationToken>>,
}

/// Runs idle compactions one at a time across all conversations
#[derive(Clone)]
pub struct IdleCompactionScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for IdleCompactionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self.is_running();
        let state = self.inner.state.lock();
        f.debug_struct("IdleCompactionScheduler")
            .field("config", &self.inner.config)
            .field("queued", &state.queue.len())
            .field("active", &state.active)
            .field("running", &running)
            .finish()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl IdleCompactionScheduler {
    pub fn new(
        config: IdleConfig,
        log: Arc<HistoryLog>,
        activity: Arc<dyn ActivitySource>,
        thresholds: Arc<dyn IdleThresholds>,
        executor: Arc<dyn CompactionExecutor>,
    ) -> IdleResult<Self> {
        config.validate()?;
        let checker = EligibilityChecker::new(log, activity, config.tail_window);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                checker,
                thresholds,
                executor,
                state: Mutex::new(QueueState::default()),
                timer: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &IdleConfig {
        &self.inner.config
    }

    pub fn checker(&self) -> &EligibilityChecker {
        &self.inner.checker
    }

    /// Begin periodic checks: one pass after the startup delay, then one per
    /// check interval. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(|t| !t.is_cancelled()) {
            warn!("Idle compaction scheduler already running");
            return;
        }
        self.inner.state.lock().halted = false;

        let token = CancellationToken::new();
        *timer = Some(token.clone());
        drop(timer);

        let inner = self.inner.clone();
        let startup_delay = inner.config.startup_delay;
        let check_interval = inner.config.check_interval;
        info!(
            "Starting idle compaction scheduler (startup delay {:?}, interval {:?})",
            startup_delay, check_interval
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(startup_delay) => {}
            }

            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.check_all().await {
                            error!("Idle compaction pass failed: {}", e);
                        }
                    }
                }
            }
            debug!("Idle compaction timer stopped");
        });
    }

    /// Cancel the timer and drop queued work; an in-flight compaction finishes
    pub fn stop(&self) {
        if let Some(token) = self.inner.timer.lock().take() {
            token.cancel();
        }
        let dropped = {
            let mut state = self.inner.state.lock();
            state.halted = true;
            state.queued_ids.clear();
            let dropped = state.queue.len();
            state.queue.clear();
            dropped
        };
        info!("Stopped idle compaction scheduler ({} queued dropped)", dropped);
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Conversations waiting to be compacted, in queue order
    pub fn queued(&self) -> Vec<ConversationId> {
        self.inner
            .state
            .lock()
            .queue
            .iter()
            .map(|job| job.id.clone())
            .collect()
    }

    /// The conversation being checked or compacted right now
    pub fn active(&self) -> Option<ConversationId> {
        self.inner.state.lock().active.clone()
    }

    /// No queued work and nothing in flight
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.queue.is_empty() && state.active.is_none()
    }

    /// Check every managed conversation once; returns how many were queued
    pub async fn check_all(&self) -> IdleResult<usize> {
        self.inner.check_all().await
    }

    /// Run a pass immediately, independent of the timer
    pub async fn trigger_now(&self) -> IdleResult<usize> {
        info!("Running out-of-band idle compaction check");
        self.inner.check_all().await
    }

    /// Queue `id` unless it is already queued or being compacted.
    ///
    /// Returns whether the conversation was added. Must be called inside a
    /// Tokio runtime.
    pub fn enqueue(&self, id: ConversationId, threshold: Duration) -> bool {
        self.inner.enqueue(id, threshold)
    }
}

impl Inner {
    async fn check_all(self: &Arc<Self>) -> IdleResult<usize> {
        let managed = self
            .thresholds
            .managed()
            .await
            .map_err(|e| IdleError::config(format!("failed to list managed conversations: {:#}", e)))?;

        let now = now_ms();
        let mut queued = 0;
        for conversation in managed {
            let Some(threshold) = conversation.threshold() else {
                continue;
            };
            match self.checker.check(&conversation.id, threshold, now).await {
                Ok(Eligibility::Eligible) => {
                    if self.enqueue(conversation.id, threshold) {
                        queued += 1;
                    }
                }
                Ok(Eligibility::Ineligible(reason)) => {
                    debug!(conversation_id = %conversation.id, "Not eligible for idle compaction: {}", reason);
                }
                Err(e) => {
                    error!(conversation_id = %conversation.id, "Idle eligibility check failed: {}", e);
                }
            }
        }
        debug!("Idle compaction pass queued {} conversations", queued);
        Ok(queued)
    }

    fn enqueue(self: &Arc<Self>, id: ConversationId, threshold: Duration) -> bool {
        let mut state = self.state.lock();
        if state.halted {
            debug!(conversation_id = %id, "Scheduler stopped, not queueing");
            return false;
        }
        if state.queued_ids.contains(&id) || state.active.as_ref() == Some(&id) {
            debug!(conversation_id = %id, "Already queued for idle compaction");
            return false;
        }

        state.queued_ids.insert(id.clone());
        info!(conversation_id = %id, "Queued for idle compaction");
        state.queue.push_back(QueuedCompaction { id, threshold });

        if !state.worker_running {
            state.worker_running = true;
            tokio::spawn(self.clone().run_worker());
        }
        true
    }

    async fn run_worker(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.state.lock();
                let next = if state.halted {
                    None
                } else {
                    state.queue.pop_front()
                };
                match next {
                    Some(job) => {
                        state.queued_ids.remove(&job.id);
                        state.active = Some(job.id.clone());
                        job
                    }
                    None => {
                        state.worker_running = false;
                        return;
                    }
                }
            };

            self.process(&job).await;
            self.state.lock().active = None;
        }
    }

    async fn process(&self, job: &QueuedCompaction) {
        let id = &job.id;
        match self.checker.check(id, job.threshold, now_ms()).await {
            Ok(Eligibility::Eligible) => {}
            Ok(Eligibility::Ineligible(reason)) => {
                debug!(conversation_id = %id, "Skipping queued compaction, no longer eligible: {}", reason);
                return;
            }
            Err(e) => {
                error!(conversation_id = %id, "Re-check before compaction failed: {}", e);
                return;
            }
        }

        info!(conversation_id = %id, "Starting idle compaction");
        // A panicking executor must not take the worker down with it
        let executor = self.executor.clone();
        let task_id = id.clone();
        let outcome = tokio::spawn(async move { executor.execute(&task_id).await }).await;
        match outcome {
            Ok(Ok(())) => info!(conversation_id = %id, "Idle compaction finished"),
            Ok(Err(e)) => {
                let err = IdleError::compaction(e);
                error!(conversation_id = %id, "{}", err);
            }
            Err(join_error) => {
                let err = IdleError::Compaction(format!("executor panicked: {}", join_error));
                error!(conversation_id = %id, "{}", err);
            }
        }
    }
}
