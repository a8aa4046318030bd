//! Tick scheduler.
//!
//! Fires a [`TickEvent`] at a fixed cadence and hands it to every
//! subscribed [`TickHandler`]. Each handler runs on its own task, so a slow
//! or failing handler never delays or aborts the others.
//!
//! ## Overlap
//!
//! A tick is spawned off the timer task. If one tick is still running when
//! the next fires, both run. Handlers keep this safe by serialising per
//! entity (see `HouseSimulation`) rather than relying on tick exclusivity.
//!
//! ## Cancellation
//!
//! [`TickScheduler::stop`] aborts the timer only. Ticks already in flight
//! run to completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::types::TickEvent;

/// Per-handler summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entities updated successfully.
    pub processed: usize,
    /// Entities whose update failed (logged, not propagated).
    pub failed: usize,
}

/// Something that wants to run on every tick.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Process one tick. Per-entity failures belong in the report; an `Err`
    /// means the handler could not run at all.
    async fn on_tick(&self, tick: TickEvent) -> Result<TickReport>;
}

/// What happened to one handler during [`TickScheduler::fire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Handler name.
    pub name: String,
    /// The report, or the error / panic message.
    pub result: std::result::Result<TickReport, String>,
}

struct Registry {
    handlers: Mutex<Vec<(u64, Arc<dyn TickHandler>)>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl Registry {
    async fn fire(&self) -> Vec<HandlerOutcome> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let tick = TickEvent::now(sequence);
        let handlers: Vec<Arc<dyn TickHandler>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        let start = std::time::Instant::now();
        let tasks: Vec<(String, JoinHandle<Result<TickReport>>)> = handlers
            .into_iter()
            .map(|handler| {
                let name = handler.name().to_string();
                (name, tokio::spawn(async move { handler.on_tick(tick).await }))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let result = match task.await {
                Ok(Ok(report)) => {
                    debug!(
                        handler = %name,
                        tick = sequence,
                        processed = report.processed,
                        failed = report.failed,
                        "tick handler done"
                    );
                    Ok(report)
                }
                Ok(Err(err)) => {
                    error!(handler = %name, tick = sequence, error = %err, "tick handler failed");
                    Err(err.to_string())
                }
                Err(join) => {
                    error!(handler = %name, tick = sequence, error = %join, "tick handler panicked");
                    Err(join.to_string())
                }
            };
            outcomes.push(HandlerOutcome { name, result });
        }

        info!(
            tick = sequence,
            handlers = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "tick complete"
        );
        outcomes
    }
}

/// Capability to remove one subscription.
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Unique id of this subscription.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove exactly this subscription. Returns `false` if it was already
    /// gone or the scheduler has been dropped.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut handlers = registry.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        handlers.len() != before
    }
}

/// Fixed-cadence tick source.
pub struct TickScheduler {
    registry: Arc<Registry>,
    period: Duration,
    align_to_wall_clock: bool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    /// Build a stopped scheduler from config.
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_period(
            Duration::from_secs(config.tick_interval_secs.max(1)),
            config.align_to_wall_clock,
        )
    }

    /// Build a stopped scheduler with an explicit period.
    #[must_use]
    pub fn with_period(period: Duration, align_to_wall_clock: bool) -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                sequence: AtomicU64::new(0),
            }),
            period,
            align_to_wall_clock,
            timer: Mutex::new(None),
        }
    }

    /// Register `handler`. Subscribing the same handler twice yields two
    /// independent subscriptions, each removable on its own.
    pub fn subscribe(&self, handler: Arc<dyn TickHandler>) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(handler = handler.name(), subscription = id, "tick handler subscribed");
        self.registry.handlers.lock().push((id, handler));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Start the timer. Returns `false` (and does nothing) if it is already
    /// running. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let registry = Arc::clone(&self.registry);
        let period = self.period;
        let first = if self.align_to_wall_clock {
            Instant::now() + until_next_boundary(period, Utc::now().timestamp_millis())
        } else {
            Instant::now() + period
        };

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.fire().await;
                });
            }
        }));
        info!(period_secs = period.as_secs(), aligned = self.align_to_wall_clock, "tick scheduler started");
        true
    }

    /// Stop the timer. Returns `false` if it was not running. Ticks already
    /// in flight finish.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.timer.lock().take() else {
            return false;
        };
        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            info!("tick scheduler stopped");
        }
        was_running
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run one tick now and wait for every handler.
    pub async fn fire(&self) -> Vec<HandlerOutcome> {
        self.registry.fire().await
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.lock().len()
    }

    /// Ticks fired so far, by the timer or by [`TickScheduler::fire`].
    #[must_use]
    pub fn ticks_fired(&self) -> u64 {
        self.registry.sequence.load(Ordering::SeqCst)
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Time from `now_ms` (Unix millis) to the next UTC multiple of `period`.
/// A timestamp exactly on a boundary waits a full period.
#[must_use]
pub fn until_next_boundary(period: Duration, now_ms: i64) -> Duration {
    let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1);
    let wait = period_ms - now_ms.rem_euclid(period_ms);
    Duration::from_millis(wait.unsigned_abs())
}
